use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Block header: stream UID (2) + payload size (2) = 4 bytes.
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Largest payload a block can carry.
pub const MAX_BLOCK_PAYLOAD: usize = u16::MAX as usize;

/// One stream's block within a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The stream this payload belongs to.
    pub uid: u16,
    /// The stream payload, still in its protocol-specific layout.
    pub payload: Bytes,
}

/// Encode a block into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Stream UID   │ Payload size │ Payload             │
/// │ (2B BE)      │ (2B BE)      │ (Payload size bytes)│
/// └──────────────┴──────────────┴─────────────────────┘
/// ```
pub fn encode_block(uid: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_BLOCK_PAYLOAD {
        return Err(FrameError::BlockTooLarge {
            size: payload.len(),
            max: MAX_BLOCK_PAYLOAD,
        });
    }
    dst.reserve(BLOCK_HEADER_SIZE + payload.len());
    dst.put_u16(uid);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decode the next block from the front of `src`.
///
/// Returns `Ok(None)` once `src` is empty. Unlike a stream decoder there is
/// no "need more data": a datagram is complete, so a short block is an error.
pub fn decode_block(src: &mut Bytes) -> Result<Option<Block>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src.len() < BLOCK_HEADER_SIZE {
        return Err(FrameError::Truncated {
            context: "block header",
            needed: BLOCK_HEADER_SIZE,
            available: src.len(),
        });
    }

    let uid = u16::from_be_bytes([src[0], src[1]]);
    let payload_len = usize::from(u16::from_be_bytes([src[2], src[3]]));
    if src.len() < BLOCK_HEADER_SIZE + payload_len {
        return Err(FrameError::Truncated {
            context: "block payload",
            needed: payload_len,
            available: src.len() - BLOCK_HEADER_SIZE,
        });
    }

    src.advance(BLOCK_HEADER_SIZE);
    let payload = src.split_to(payload_len);
    Ok(Some(Block { uid, payload }))
}

/// Iterates the blocks of a frame body.
///
/// Yields at most one error, after which iteration stops.
#[derive(Debug, Clone)]
pub struct BlockReader {
    src: Bytes,
    failed: bool,
}

impl BlockReader {
    /// Read blocks from `body` (a frame with its header already removed).
    pub fn new(body: Bytes) -> Self {
        Self {
            src: body,
            failed: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.src.len()
    }
}

impl Iterator for BlockReader {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match decode_block(&mut self.src) {
            Ok(block) => block.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

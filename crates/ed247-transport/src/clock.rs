use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Wire size of an absolute timestamp: epoch seconds (4) + nanosecond offset (4).
pub const TIMESTAMP_SIZE: usize = 8;

/// An absolute point in time as carried on the wire.
///
/// `offset_ns` is kept in `[0, 1e9)` by every constructor in this crate.
/// Timestamps decoded from the wire are taken as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub epoch_s: u32,
    /// Nanoseconds within the second.
    pub offset_ns: u32,
}

impl Timestamp {
    /// The all-zero timestamp, used when no clock is available.
    pub const ZERO: Timestamp = Timestamp {
        epoch_s: 0,
        offset_ns: 0,
    };

    /// Create a timestamp from its two wire fields.
    pub const fn new(epoch_s: u32, offset_ns: u32) -> Self {
        Self { epoch_s, offset_ns }
    }

    /// Shift this timestamp by a signed number of nanoseconds.
    ///
    /// The whole-second part of `delta_ns` is carried into `epoch_s` and the
    /// result is normalized so that `offset_ns` stays in `[0, 1e9)`.
    pub fn offset_by_nanos(self, delta_ns: i64) -> Self {
        let nanos = i64::from(NANOS_PER_SECOND);
        let total_ns = i64::from(self.offset_ns) + delta_ns;
        let epoch_s = i64::from(self.epoch_s) + total_ns.div_euclid(nanos);
        Self {
            epoch_s: epoch_s as u32,
            offset_ns: total_ns.rem_euclid(nanos) as u32,
        }
    }

    /// Signed distance from `earlier` to `self`, in nanoseconds.
    pub fn nanos_since(&self, earlier: &Timestamp) -> i64 {
        let seconds = i64::from(self.epoch_s) - i64::from(earlier.epoch_s);
        seconds * i64::from(NANOS_PER_SECOND) + i64::from(self.offset_ns)
            - i64::from(earlier.offset_ns)
    }

    /// Big-endian wire encoding.
    pub fn to_be_bytes(&self) -> [u8; TIMESTAMP_SIZE] {
        let mut out = [0u8; TIMESTAMP_SIZE];
        out[..4].copy_from_slice(&self.epoch_s.to_be_bytes());
        out[4..].copy_from_slice(&self.offset_ns.to_be_bytes());
        out
    }

    /// Decode the big-endian wire encoding.
    pub fn from_be_bytes(bytes: [u8; TIMESTAMP_SIZE]) -> Self {
        Self {
            epoch_s: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            offset_ns: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    fn to_packed(self) -> u64 {
        (u64::from(self.epoch_s) << 32) | u64::from(self.offset_ns)
    }

    fn from_packed(packed: u64) -> Self {
        Self {
            epoch_s: (packed >> 32) as u32,
            offset_ns: packed as u32,
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self {
                epoch_s: elapsed.as_secs() as u32,
                offset_ns: elapsed.subsec_nanos(),
            },
            Err(_) => Self::ZERO,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.epoch_s, self.offset_ns)
    }
}

/// A source of timestamps.
///
/// Clocks are passed explicitly to the components that need them; there is
/// no process-wide default.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

impl<F> Clock for F
where
    F: Fn() -> Timestamp + Send + Sync,
{
    fn now(&self) -> Timestamp {
        self()
    }
}

impl fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(SystemTime::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    packed: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            packed: AtomicU64::new(start.to_packed()),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.packed.store(now.to_packed(), Ordering::SeqCst);
    }

    /// Move forward (or backward) by `delta_ns` nanoseconds.
    pub fn advance(&self, delta_ns: i64) {
        let now = Timestamp::from_packed(self.packed.load(Ordering::SeqCst));
        self.set(now.offset_by_nanos(delta_ns));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_packed(self.packed.load(Ordering::SeqCst))
    }
}

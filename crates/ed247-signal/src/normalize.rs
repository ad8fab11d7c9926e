//! Host <-> wire byte order for signal elements.

use crate::signal::ElementSize;

/// Copy `src` into `dst`, converting every element between host order and
/// big-endian. The conversion is its own inverse, so this serves both
/// directions.
///
/// `src` and `dst` must have the same length, a multiple of the element size.
pub fn swap_elements(src: &[u8], element_size: ElementSize, dst: &mut [u8]) {
    dst.copy_from_slice(src);
    let size = element_size.bytes();
    if cfg!(target_endian = "little") && size > 1 {
        for element in dst.chunks_exact_mut(size) {
            element.reverse();
        }
    }
}

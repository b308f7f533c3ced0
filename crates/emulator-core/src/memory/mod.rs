//! Bounds-checked memory regions backing emulated flash and RAM.

/// Offset-based byte buffer with atomic span validation.
pub mod region;

pub use region::MemoryRegion;

/// Maximum width in bytes of a single pipeline data access.
pub const MAX_ACCESS_BYTES: u8 = 4;

/// Returns `true` when `address` is a multiple of `bytes`.
#[must_use]
pub fn is_aligned(address: u32, bytes: u8) -> bool {
    bytes <= 1 || address % u32::from(bytes) == 0
}

//! Offset-based memory region with atomic span validation.

use std::ops::Range;

use crate::MemoryError;

/// Zero-initialized byte buffer logically based at an absolute address.
///
/// An address `a` belongs to the region iff `offset <= a < offset + size`.
/// Every read or write validates the complete span before touching a byte,
/// so a rejected access never leaves partial effects behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegion {
    offset: u32,
    bytes: Box<[u8]>,
}

impl MemoryRegion {
    /// Allocates a zeroed region of `size` bytes based at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRegion`] when `size` is zero or the
    /// region would extend past the 32-bit address space.
    pub fn new(offset: u32, size: u32) -> Result<Self, MemoryError> {
        let mut region = Self::default();
        region.configure(offset, size)?;
        Ok(region)
    }

    /// Reallocates the region, discarding any previous contents.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRegion`] when `size` is zero or the
    /// region would extend past the 32-bit address space. The region is left
    /// untouched in that case.
    pub fn configure(&mut self, offset: u32, size: u32) -> Result<(), MemoryError> {
        let end = u64::from(offset) + u64::from(size);
        if size == 0 || end > 1 << 32 {
            return Err(MemoryError::InvalidRegion { offset, size });
        }

        let len = usize::try_from(size).map_err(|_| MemoryError::InvalidRegion { offset, size })?;
        self.offset = offset;
        self.bytes = vec![0; len].into_boxed_slice();
        Ok(())
    }

    /// Base address of the region.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Size of the region in bytes (zero while unconfigured).
    #[must_use]
    pub fn size(&self) -> u32 {
        u32::try_from(self.bytes.len()).unwrap_or(u32::MAX)
    }

    /// Returns `true` once the region has been configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Returns `true` when `address` lies inside the region.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        self.validate_address(address).is_ok()
    }

    /// Resolves an absolute address into an index of the backing buffer.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unconfigured`] before configuration and
    /// [`MemoryError::OutOfBounds`] when `address` is outside the region.
    pub fn validate_address(&self, address: u32) -> Result<usize, MemoryError> {
        self.validate_span(address, 1).map(|span| span.start)
    }

    /// Resolves `[address, address + len)` into a range of the backing buffer.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unconfigured`] before configuration and
    /// [`MemoryError::OutOfBounds`] when any byte of the span is outside the
    /// region, including spans that wrap the 32-bit address space.
    pub fn validate_span(&self, address: u32, len: usize) -> Result<Range<usize>, MemoryError> {
        if !self.is_configured() {
            return Err(MemoryError::Unconfigured);
        }

        let out_of_bounds = MemoryError::OutOfBounds { address, len };
        let start = address
            .checked_sub(self.offset)
            .and_then(|start| usize::try_from(start).ok())
            .ok_or(out_of_bounds)?;
        let end = start.checked_add(len).ok_or(out_of_bounds)?;
        if end > self.bytes.len() {
            return Err(out_of_bounds);
        }

        Ok(start..end)
    }

    /// Copies `buffer.len()` bytes starting at `address` into `buffer`.
    ///
    /// # Errors
    ///
    /// Fails without touching `buffer` when the span is not fully inside the
    /// region.
    pub fn read(&self, address: u32, buffer: &mut [u8]) -> Result<(), MemoryError> {
        let span = self.validate_span(address, buffer.len())?;
        buffer.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    /// Copies `data` into the region starting at `address`.
    ///
    /// # Errors
    ///
    /// Fails without modifying the region when the span is not fully inside
    /// it.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let span = self.validate_span(address, data.len())?;
        self.bytes[span].copy_from_slice(data);
        Ok(())
    }

    /// Backing buffer, for bulk inspection.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable backing buffer, for bulk image loading.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRegion;
    use crate::MemoryError;

    #[test]
    fn configure_allocates_zeroed_buffer_at_offset() {
        let region = MemoryRegion::new(0x2000_0000, 0x100).expect("valid region");

        assert_eq!(region.offset(), 0x2000_0000);
        assert_eq!(region.size(), 0x100);
        assert!(region.as_slice().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn reconfigure_discards_previous_contents() {
        let mut region = MemoryRegion::new(0x0, 0x10).expect("valid region");
        region.write(0x4, &[0xAA, 0xBB]).expect("in bounds");

        region.configure(0x100, 0x20).expect("valid region");

        assert_eq!(region.offset(), 0x100);
        assert_eq!(region.size(), 0x20);
        assert!(region.as_slice().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn invalid_configuration_is_rejected_and_keeps_region() {
        let mut region = MemoryRegion::new(0x0, 0x10).expect("valid region");

        assert_eq!(
            region.configure(0x10, 0),
            Err(MemoryError::InvalidRegion {
                offset: 0x10,
                size: 0
            })
        );
        assert_eq!(
            region.configure(0xFFFF_FFF0, 0x20),
            Err(MemoryError::InvalidRegion {
                offset: 0xFFFF_FFF0,
                size: 0x20
            })
        );
        assert_eq!(region.size(), 0x10);
    }

    #[test]
    fn region_may_end_exactly_at_top_of_address_space() {
        let region = MemoryRegion::new(0xFFFF_FF00, 0x100).expect("valid region");
        assert!(region.contains(0xFFFF_FFFF));
        assert!(!region.contains(0xFFFF_FEFF));
    }

    #[test]
    fn validate_address_checks_both_bounds() {
        let region = MemoryRegion::new(0x1000, 0x10).expect("valid region");

        assert_eq!(region.validate_address(0x1000), Ok(0));
        assert_eq!(region.validate_address(0x100F), Ok(0xF));
        assert!(matches!(
            region.validate_address(0x0FFF),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(matches!(
            region.validate_address(0x1010),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn unconfigured_region_reports_unconfigured() {
        let region = MemoryRegion::default();
        let mut buffer = [0u8; 4];

        assert_eq!(region.read(0, &mut buffer), Err(MemoryError::Unconfigured));
        assert!(!region.is_configured());
    }

    #[test]
    fn straddling_write_fails_without_partial_mutation() {
        let mut region = MemoryRegion::new(0x1000, 0x10).expect("valid region");

        let result = region.write(0x100E, &[1, 2, 3, 4]);

        assert_eq!(
            result,
            Err(MemoryError::OutOfBounds {
                address: 0x100E,
                len: 4
            })
        );
        assert!(region.as_slice().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn straddling_read_leaves_buffer_untouched() {
        let region = MemoryRegion::new(0x1000, 0x10).expect("valid region");
        let mut buffer = [0xEE; 4];

        assert!(region.read(0x0FFE, &mut buffer).is_err());
        assert_eq!(buffer, [0xEE; 4]);
    }

    #[test]
    fn read_returns_written_bytes() {
        let mut region = MemoryRegion::new(0x1000, 0x10).expect("valid region");
        region.write(0x1008, &[0xDE, 0xAD, 0xBE, 0xEF]).expect("in bounds");

        let mut buffer = [0u8; 4];
        region.read(0x1008, &mut buffer).expect("in bounds");

        assert_eq!(buffer, [0xDE, 0xAD, 0xBE, 0xEF]);
    }
}

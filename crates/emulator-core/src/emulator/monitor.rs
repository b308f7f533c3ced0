//! Single-core exclusive monitor for `LDREX`/`STREX` pairs.

use crate::Emulator;

const fn tag(address: u32, align: u32) -> u32 {
    if align == 0 {
        address
    } else {
        address & !(align - 1)
    }
}

impl Emulator {
    /// Records `address`, rounded down to `align` bytes, as the outstanding
    /// exclusive tag. A previous tag is discarded.
    pub fn set_exclusive_monitors(&mut self, address: u32, align: u32) {
        self.cpu.exclusive_address = Some(tag(address, align));
    }

    /// Returns `true` iff a tag is outstanding and matches `address` rounded
    /// to `align` bytes. The tag is left in place.
    #[must_use]
    pub fn exclusive_monitors_pass(&self, address: u32, align: u32) -> bool {
        self.cpu.exclusive_address == Some(tag(address, align))
    }

    /// Drops the outstanding tag.
    pub const fn clear_exclusive_monitors(&mut self) {
        self.cpu.exclusive_address = None;
    }
}

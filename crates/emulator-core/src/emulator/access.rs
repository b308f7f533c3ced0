//! Hook-raising register and memory accessors used while an instruction
//! executes, and the three program-counter write paths.

use crate::hooks::HookKind;
use crate::memory::MAX_ACCESS_BYTES;
use crate::{Emulator, FaultCode, Register};

use super::Bank;

impl Emulator {
    /// Reads a register as the executing instruction sees it (`PC` reads as
    /// the instruction address plus 4).
    pub(crate) fn read_register_internal(&mut self, reg: Register) -> u32 {
        let stored = self.cpu.register(reg);
        self.fire_register_hooks(HookKind::RegisterBeforeRead, reg, stored);
        let value = match reg {
            Register::Pc => self.cpu.register(reg).wrapping_add(4),
            _ => self.cpu.register(reg),
        };
        self.fire_register_hooks(HookKind::RegisterAfterRead, reg, value);
        value
    }

    /// Writes a register on behalf of the executing instruction.
    ///
    /// `SP` is word-aligned on write; `PC` writes are plain branches.
    pub(crate) fn write_register_internal(&mut self, reg: Register, value: u32) {
        match reg {
            Register::Pc => self.branch_write_pc(value),
            Register::Sp => self.write_core(reg, value & !3),
            _ => self.write_core(reg, value),
        }
    }

    fn write_core(&mut self, reg: Register, value: u32) {
        self.fire_register_hooks(HookKind::RegisterBeforeWrite, reg, value);
        self.cpu.set_register(reg, value);
        self.fire_register_hooks(HookKind::RegisterAfterWrite, reg, value);
    }

    /// Plain branch: bit 0 of the target is ignored.
    pub(crate) fn branch_write_pc(&mut self, address: u32) {
        self.write_core(Register::Pc, address & !1);
        self.pc_written = true;
    }

    /// Interworking branch: bit 0 of the target becomes `EPSR.T`.
    pub(crate) fn bx_write_pc(&mut self, address: u32) {
        self.cpu.psr.thumb = address & 1 != 0;
        self.write_core(Register::Pc, address & !1);
        self.pc_written = true;
    }

    /// Branch with link and exchange: `LR` receives the return address with
    /// the Thumb bit set before the interworking branch.
    pub(crate) fn blx_write_pc(&mut self, address: u32, return_address: u32) {
        self.write_core(Register::Lr, return_address | 1);
        self.bx_write_pc(address);
    }

    fn data_bank(&self, address: u32, width: u8) -> Result<Bank, FaultCode> {
        if width == 0 || width > MAX_ACCESS_BYTES {
            return Err(FaultCode::InvalidMemoryAccess);
        }
        self.locate(address, usize::from(width))
            .map_err(|_| FaultCode::InvalidMemoryAccess)
    }

    fn load_le(&self, bank: Bank, address: u32, width: u8) -> Result<u32, FaultCode> {
        let mut bytes = [0_u8; 4];
        self.bank(bank)
            .read(address, &mut bytes[..usize::from(width)])
            .map_err(|_| FaultCode::InvalidMemoryAccess)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads `width` bytes (1, 2 or 4) little-endian.
    ///
    /// Before-read hooks see the current content, after-read hooks the value
    /// returned. The span is validated before any hook runs.
    pub(crate) fn read_memory_internal(&mut self, address: u32, width: u8) -> Result<u32, FaultCode> {
        let bank = self.data_bank(address, width)?;
        if self.hooks.has(HookKind::MemoryBeforeRead) {
            let current = self.load_le(bank, address, width)?;
            self.fire_memory_hooks(HookKind::MemoryBeforeRead, address, width, current);
        }
        let value = self.load_le(bank, address, width)?;
        self.fire_memory_hooks(HookKind::MemoryAfterRead, address, width, value);
        Ok(value)
    }

    /// Writes the low `width` bytes of `value` little-endian.
    pub(crate) fn write_memory_internal(
        &mut self,
        address: u32,
        width: u8,
        value: u32,
    ) -> Result<(), FaultCode> {
        let bank = self.data_bank(address, width)?;
        let value = match width {
            1 => value & 0xFF,
            2 => value & 0xFFFF,
            _ => value,
        };
        self.fire_memory_hooks(HookKind::MemoryBeforeWrite, address, width, value);
        let bytes = value.to_le_bytes();
        self.bank_mut(bank)
            .write(address, &bytes[..usize::from(width)])
            .map_err(|_| FaultCode::InvalidMemoryAccess)?;
        self.fire_memory_hooks(HookKind::MemoryAfterWrite, address, width, value);
        Ok(())
    }
}

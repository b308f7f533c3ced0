//! Emulator instance: memory regions, CPU state, hooks and run control.

mod access;
mod monitor;
mod pipeline;

use std::fmt;

use tracing::debug;

use crate::decoder::Decoder;
use crate::hooks::HookRegistry;
use crate::memory::MemoryRegion;
use crate::state::{it_active, it_last, CONTROL_NPRIV};
use crate::{
    Architecture, CpuState, EmulatorConfig, EmulatorSnapshot, MemoryError, Register, ReturnCode,
};

/// Which configured region an access resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bank {
    Flash,
    Ram,
}

/// Single-core Thumb emulator.
///
/// Owns a flash and a RAM region, the CPU state and the hook tables. All
/// execution is synchronous: hooks run in-line on the caller's stack.
pub struct Emulator {
    pub(crate) config: EmulatorConfig,
    pub(crate) decoder: Decoder,
    pub(crate) flash: MemoryRegion,
    pub(crate) ram: MemoryRegion,
    pub(crate) cpu: CpuState,
    pub(crate) hooks: HookRegistry,
    pub(crate) emulated_time: u64,
    pub(crate) running: bool,
    pub(crate) in_emulate: bool,
    pub(crate) stop_reason: Option<ReturnCode>,
    pub(crate) pc_written: bool,
}

/// Deep copy of memory, CPU state, configuration and counters.
///
/// Hook registrations are not copied: the clone starts with an empty
/// registry whose ids restart at 1.
impl Clone for Emulator {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            decoder: self.decoder,
            flash: self.flash.clone(),
            ram: self.ram.clone(),
            cpu: self.cpu,
            hooks: HookRegistry::default(),
            emulated_time: self.emulated_time,
            running: false,
            in_emulate: false,
            stop_reason: None,
            pc_written: false,
        }
    }
}

impl fmt::Debug for Emulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emulator")
            .field("config", &self.config)
            .field("flash_offset", &self.flash.offset())
            .field("flash_size", &self.flash.size())
            .field("ram_offset", &self.ram.offset())
            .field("ram_size", &self.ram.size())
            .field("cpu", &self.cpu)
            .field("emulated_time", &self.emulated_time)
            .field("running", &self.running)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::with_config(EmulatorConfig::default())
    }
}

impl Emulator {
    /// Creates an emulator for `architecture` with default policies and no
    /// memory configured.
    #[must_use]
    pub fn new(architecture: Architecture) -> Self {
        Self::with_config(EmulatorConfig::new(architecture))
    }

    /// Creates an emulator from a full configuration.
    #[must_use]
    pub fn with_config(config: EmulatorConfig) -> Self {
        Self {
            config,
            decoder: Decoder::new(config.architecture),
            flash: MemoryRegion::default(),
            ram: MemoryRegion::default(),
            cpu: CpuState::default(),
            hooks: HookRegistry::default(),
            emulated_time: 0,
            running: false,
            in_emulate: false,
            stop_reason: None,
            pc_written: false,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> EmulatorConfig {
        self.config
    }

    /// Decoder used by the pipeline.
    #[must_use]
    pub const fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Configured architecture profile.
    #[must_use]
    pub const fn architecture(&self) -> Architecture {
        self.config.architecture
    }

    /// (Re)allocates flash as `size` zeroed bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRegion`] for an empty region or one that
    /// extends past the 32-bit address space.
    pub fn set_flash_region(&mut self, offset: u32, size: u32) -> Result<(), MemoryError> {
        self.flash.configure(offset, size)?;
        debug!(offset, size, "flash region configured");
        Ok(())
    }

    /// (Re)allocates RAM as `size` zeroed bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRegion`] for an empty region or one that
    /// extends past the 32-bit address space.
    pub fn set_ram_region(&mut self, offset: u32, size: u32) -> Result<(), MemoryError> {
        self.ram.configure(offset, size)?;
        debug!(offset, size, "ram region configured");
        Ok(())
    }

    /// Flash contents.
    #[must_use]
    pub fn flash(&self) -> &[u8] {
        self.flash.as_slice()
    }

    /// Mutable flash contents, for loading firmware images.
    pub fn flash_mut(&mut self) -> &mut [u8] {
        self.flash.as_mut_slice()
    }

    /// RAM contents.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        self.ram.as_slice()
    }

    /// Mutable RAM contents.
    pub fn ram_mut(&mut self) -> &mut [u8] {
        self.ram.as_mut_slice()
    }

    /// Flash base address.
    #[must_use]
    pub const fn flash_offset(&self) -> u32 {
        self.flash.offset()
    }

    /// Flash size in bytes, zero while unconfigured.
    #[must_use]
    pub fn flash_size(&self) -> u32 {
        self.flash.size()
    }

    /// RAM base address.
    #[must_use]
    pub const fn ram_offset(&self) -> u32 {
        self.ram.offset()
    }

    /// RAM size in bytes, zero while unconfigured.
    #[must_use]
    pub fn ram_size(&self) -> u32 {
        self.ram.size()
    }

    /// Reads a core register without raising hooks.
    #[must_use]
    pub const fn read_register(&self, reg: Register) -> u32 {
        self.cpu.register(reg)
    }

    /// Writes a core register without raising hooks. The value is stored as given.
    pub const fn write_register(&mut self, reg: Register, value: u32) {
        self.cpu.set_register(reg, value);
    }

    /// Copies `buffer.len()` bytes at `address` out of flash or RAM without
    /// raising hooks. The span must lie inside a single region.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unconfigured`] when no region is configured and
    /// [`MemoryError::OutOfBounds`] when the span fits no region. The buffer
    /// is left untouched on failure.
    pub fn read_memory(&self, address: u32, buffer: &mut [u8]) -> Result<(), MemoryError> {
        let bank = self.locate(address, buffer.len())?;
        self.bank(bank).read(address, buffer)
    }

    /// Copies `data` to `address` in flash or RAM without raising hooks.
    ///
    /// # Errors
    ///
    /// Same as [`Emulator::read_memory`]; memory is left unmodified on failure.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let bank = self.locate(address, data.len())?;
        self.bank_mut(bank).write(address, data)
    }

    fn locate(&self, address: u32, len: usize) -> Result<Bank, MemoryError> {
        if !self.flash.is_configured() && !self.ram.is_configured() {
            return Err(MemoryError::Unconfigured);
        }
        if self.flash.validate_span(address, len).is_ok() {
            return Ok(Bank::Flash);
        }
        if self.ram.validate_span(address, len).is_ok() {
            return Ok(Bank::Ram);
        }
        Err(MemoryError::OutOfBounds { address, len })
    }

    const fn bank(&self, bank: Bank) -> &MemoryRegion {
        match bank {
            Bank::Flash => &self.flash,
            Bank::Ram => &self.ram,
        }
    }

    const fn bank_mut(&mut self, bank: Bank) -> &mut MemoryRegion {
        match bank {
            Bank::Flash => &mut self.flash,
            Bank::Ram => &mut self.ram,
        }
    }

    /// Copy of the complete CPU state.
    #[must_use]
    pub const fn cpu_state(&self) -> CpuState {
        self.cpu
    }

    /// Replaces the complete CPU state, including the lifetime clock.
    pub const fn set_cpu_state(&mut self, state: CpuState) {
        self.cpu = state;
    }

    /// Returns `true` while an IT block is active.
    #[must_use]
    pub const fn in_it_block(&self) -> bool {
        it_active(self.cpu.psr.it_state)
    }

    /// Returns `true` when the next instruction is the last of its IT block.
    #[must_use]
    pub const fn last_in_it_block(&self) -> bool {
        it_last(self.cpu.psr.it_state)
    }

    /// Instructions retired over the lifetime of the CPU state.
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.cpu.time
    }

    /// Instructions retired by the current or most recent `emulate` call.
    #[must_use]
    pub const fn emulated_time(&self) -> u64 {
        self.emulated_time
    }

    /// Returns `true` inside `emulate` until a stop has been requested.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Requests the running `emulate` call to return after the current
    /// instruction retires. Has no effect outside `emulate`.
    pub fn stop_emulation(&mut self) {
        if self.in_emulate {
            self.request_stop(ReturnCode::StopEmulationCalled);
        }
    }

    /// Ends the run after the current instruction retires. The first request
    /// of a step decides the return code.
    pub(crate) const fn request_stop(&mut self, reason: ReturnCode) {
        self.running = false;
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }

    /// Returns `true` when thread mode runs privileged (`CONTROL.nPRIV == 0`).
    #[must_use]
    pub const fn in_privileged_mode(&self) -> bool {
        self.cpu.control & CONTROL_NPRIV == 0
    }

    /// Current execution priority: 256 at base level, lowered by BASEPRI,
    /// 0 under PRIMASK and -1 under FAULTMASK.
    #[must_use]
    pub fn execution_priority(&self) -> i32 {
        let mut priority = 256;
        if self.cpu.basepri != 0 {
            priority = i32::from(self.cpu.basepri);
        }
        if self.cpu.primask & 1 != 0 {
            priority = 0;
        }
        if self.cpu.faultmask & 1 != 0 {
            priority = -1;
        }
        priority
    }

    /// Captures CPU state and RAM contents.
    #[must_use]
    pub fn snapshot(&self) -> EmulatorSnapshot {
        EmulatorSnapshot {
            cpu: self.cpu,
            ram: self.ram.as_slice().into(),
        }
    }

    /// Restores CPU state and RAM contents captured by [`Emulator::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::SnapshotSizeMismatch`] when the snapshot's RAM
    /// image does not match the configured RAM size; nothing is restored.
    pub fn restore(&mut self, snapshot: &EmulatorSnapshot) -> Result<(), MemoryError> {
        let ram = self.ram.as_mut_slice();
        if ram.len() != snapshot.ram.len() {
            return Err(MemoryError::SnapshotSizeMismatch {
                expected: ram.len(),
                actual: snapshot.ram.len(),
            });
        }
        ram.copy_from_slice(&snapshot.ram);
        self.cpu = snapshot.cpu;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Emulator;
    use crate::{Architecture, MemoryError, Register, CONTROL_NPRIV};

    fn emulator() -> Emulator {
        let mut emu = Emulator::new(Architecture::ArmV7M);
        emu.set_flash_region(0x0000_0000, 0x100).expect("flash");
        emu.set_ram_region(0x2000_0000, 0x100).expect("ram");
        emu
    }

    #[test]
    fn raw_memory_access_requires_a_configured_region() {
        let emu = Emulator::new(Architecture::ArmV7M);
        let mut buffer = [0_u8; 4];
        assert_eq!(emu.read_memory(0, &mut buffer), Err(MemoryError::Unconfigured));
    }

    #[test]
    fn raw_memory_access_spans_one_region() {
        let mut emu = emulator();
        emu.write_memory(0x2000_00FC, &[1, 2, 3, 4]).expect("in range");
        assert_eq!(&emu.ram()[0xFC..], &[1, 2, 3, 4]);

        let straddle = emu.write_memory(0x2000_00FE, &[9, 9, 9, 9]);
        assert_eq!(
            straddle,
            Err(MemoryError::OutOfBounds {
                address: 0x2000_00FE,
                len: 4
            })
        );
        assert_eq!(&emu.ram()[0xFC..], &[1, 2, 3, 4]);
    }

    #[test]
    fn flash_accepts_raw_writes() {
        let mut emu = emulator();
        emu.write_memory(0x10, &[0xAA]).expect("flash write");
        assert_eq!(emu.flash()[0x10], 0xAA);
    }

    #[test]
    fn raw_register_access_stores_values_verbatim() {
        let mut emu = emulator();
        emu.write_register(Register::Sp, 0x2000_0103);
        assert_eq!(emu.read_register(Register::Sp), 0x2000_0103);
    }

    #[test]
    fn priority_follows_masks() {
        let mut emu = emulator();
        assert_eq!(emu.execution_priority(), 256);
        emu.cpu.basepri = 0x40;
        assert_eq!(emu.execution_priority(), 0x40);
        emu.cpu.primask = 1;
        assert_eq!(emu.execution_priority(), 0);
        emu.cpu.faultmask = 1;
        assert_eq!(emu.execution_priority(), -1);
    }

    #[test]
    fn privilege_follows_control_npriv() {
        let mut emu = emulator();
        assert!(emu.in_privileged_mode());
        emu.cpu.control = CONTROL_NPRIV;
        assert!(!emu.in_privileged_mode());
    }

    #[test]
    fn restore_rejects_mismatched_ram() {
        let mut emu = emulator();
        let snapshot = emu.snapshot();
        emu.set_ram_region(0x2000_0000, 0x200).expect("ram");
        assert_eq!(
            emu.restore(&snapshot),
            Err(MemoryError::SnapshotSizeMismatch {
                expected: 0x200,
                actual: 0x100
            })
        );
    }

    #[test]
    fn stop_outside_emulate_is_ignored() {
        let mut emu = emulator();
        emu.stop_emulation();
        assert!(emu.stop_reason.is_none());
        assert!(!emu.is_running());
    }
}

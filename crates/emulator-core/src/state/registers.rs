/// Number of core registers held in [`CpuState::registers`] (`R0..R12`, `SP`, `LR`, `PC`).
pub const REGISTER_COUNT: usize = 16;
/// Reset value of `CCR` (`STKALIGN` set).
pub const CCR_RESET: u32 = 0x0000_0200;
/// `CCR` bit that traps unaligned word and halfword accesses.
pub const CCR_UNALIGN_TRP: u32 = 1 << 3;
/// `CCR` bit that traps integer division by zero.
pub const CCR_DIV_0_TRP: u32 = 1 << 4;
/// `CONTROL` bit selecting unprivileged thread mode.
pub const CONTROL_NPRIV: u8 = 1 << 0;
/// `CONTROL` bit selecting the process stack.
pub const CONTROL_SPSEL: u8 = 1 << 1;

/// Core register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    /// Stack pointer (`R13`).
    Sp = 13,
    /// Link register (`R14`).
    Lr = 14,
    /// Program counter (`R15`).
    Pc = 15,
}

impl Register {
    /// Ordered list of all core registers.
    pub const ALL: [Self; REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::Sp,
        Self::Lr,
        Self::Pc,
    ];

    /// Returns the array index for this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a register number; only the low four bits are considered.
    #[must_use]
    pub const fn from_index(bits: u8) -> Self {
        Self::ALL[(bits & 0x0F) as usize]
    }

    /// Returns `true` for `R0..R7`.
    #[must_use]
    pub const fn is_low(self) -> bool {
        (self as u8) < 8
    }
}

/// Program status flags plus the execution-state bits of `EPSR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct ProgramStatus {
    /// Negative flag.
    pub n: bool,
    /// Zero flag.
    pub z: bool,
    /// Carry flag.
    pub c: bool,
    /// Overflow flag.
    pub v: bool,
    /// Sticky saturation flag.
    pub q: bool,
    /// Residual IT-block schedule (`0` outside an IT block).
    pub it_state: u8,
    /// Thumb execution state bit (`EPSR.T`).
    pub thumb: bool,
}

impl Default for ProgramStatus {
    fn default() -> Self {
        Self {
            n: false,
            z: false,
            c: false,
            v: false,
            q: false,
            it_state: 0,
            thumb: true,
        }
    }
}

impl ProgramStatus {
    /// Packs `N/Z/C/V/Q` into `APSR` bit positions 31..27.
    #[must_use]
    pub const fn apsr(&self) -> u32 {
        (self.n as u32) << 31
            | (self.z as u32) << 30
            | (self.c as u32) << 29
            | (self.v as u32) << 28
            | (self.q as u32) << 27
    }

    /// Unpacks `N/Z/C/V/Q` from `APSR` bit positions 31..27.
    pub const fn set_apsr(&mut self, value: u32) {
        self.n = value & (1 << 31) != 0;
        self.z = value & (1 << 30) != 0;
        self.c = value & (1 << 29) != 0;
        self.v = value & (1 << 28) != 0;
        self.q = value & (1 << 27) != 0;
    }

    /// Packs the `EPSR` view: `T` at bit 24 and the IT bits at 26:25 and 15:10.
    #[must_use]
    pub const fn epsr(&self) -> u32 {
        let it = self.it_state as u32;
        (self.thumb as u32) << 24 | (it & 0x03) << 25 | (it >> 2) << 10
    }

    /// Combined `xPSR` value (thread mode, so `IPSR` reads as zero).
    #[must_use]
    pub const fn xpsr(&self) -> u32 {
        self.apsr() | self.epsr()
    }
}

/// Complete architectural CPU state.
///
/// This is plain copyable data: a snapshot is a value copy, and together with
/// a copy of RAM it reproduces execution from that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuState {
    /// Core register file indexed by [`Register::index`].
    pub registers: [u32; REGISTER_COUNT],
    /// Flags and execution-state bits.
    pub psr: ProgramStatus,
    /// Outstanding exclusive-access tag, `None` when the monitor is open.
    pub exclusive_address: Option<u32>,
    /// Configuration and control register.
    pub ccr: u32,
    /// Priority mask (bit 0).
    pub primask: u8,
    /// Fault mask (bit 0).
    pub faultmask: u8,
    /// Base priority mask.
    pub basepri: u8,
    /// `CONTROL` register (`nPRIV`, `SPSEL`).
    pub control: u8,
    /// Lifetime count of retired instructions.
    pub time: u64,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
            psr: ProgramStatus::default(),
            exclusive_address: None,
            ccr: CCR_RESET,
            primask: 0,
            faultmask: 0,
            basepri: 0,
            control: 0,
            time: 0,
        }
    }
}

impl CpuState {
    /// Reads a core register.
    #[must_use]
    pub const fn register(&self, reg: Register) -> u32 {
        self.registers[reg.index()]
    }

    /// Writes a core register.
    pub const fn set_register(&mut self, reg: Register, value: u32) {
        self.registers[reg.index()] = value;
    }

    /// Reads the `PC` register.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.register(Register::Pc)
    }
}

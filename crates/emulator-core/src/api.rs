//! Public host-facing configuration and snapshot types.

use crate::CpuState;

/// Instruction-set profile accepted by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Architecture {
    /// Baseline profile (Cortex-M0/M0+): 16-bit Thumb plus a handful of 32-bit encodings.
    ArmV6M,
    /// Mainline profile (Cortex-M3).
    #[default]
    ArmV7M,
    /// Mainline profile with DSP extension (Cortex-M4). Decodes as ARMv7-M.
    ArmV7EM,
}

impl Architecture {
    /// Returns `true` when the Thumb-2 (32-bit) instruction set is available.
    #[must_use]
    pub const fn has_thumb2(self) -> bool {
        !matches!(self, Self::ArmV6M)
    }

    /// Returns `true` when unaligned word and halfword accesses are permitted.
    #[must_use]
    pub const fn supports_unaligned(self) -> bool {
        self.has_thumb2()
    }
}

/// Whether an instruction that raises a fault advances the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultRetirement {
    /// A faulting instruction does not count as retired.
    #[default]
    Uncounted,
    /// A faulting instruction advances `time` and `emulated_time` once.
    Counted,
}

/// Top-level immutable configuration for an emulator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EmulatorConfig {
    /// Decoder profile.
    pub architecture: Architecture,
    /// Clock policy for faulting instructions.
    pub fault_retirement: FaultRetirement,
}

impl EmulatorConfig {
    /// Creates a configuration for `architecture` with default policies.
    #[must_use]
    pub const fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            fault_retirement: FaultRetirement::Uncounted,
        }
    }

    /// Returns a copy with the given fault-retirement policy.
    #[must_use]
    pub const fn with_fault_retirement(mut self, fault_retirement: FaultRetirement) -> Self {
        self.fault_retirement = fault_retirement;
        self
    }
}

/// Restorable copy of the mutable emulation state.
///
/// Flash is treated as firmware and is not captured; restoring a snapshot
/// replaces the CPU state and the RAM contents only.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EmulatorSnapshot {
    /// CPU state at capture time.
    pub cpu: CpuState,
    /// RAM contents at capture time.
    pub ram: Box<[u8]>,
}

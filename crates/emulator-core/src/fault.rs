use thiserror::Error;

/// Fault classes used to group fault codes by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder could not produce an executable instruction.
    Decode,
    /// Executor rejected an operation of a decoded instruction.
    Execute,
    /// Fetch or data access fell outside the configured regions.
    Memory,
}

/// Stable fault taxonomy surfaced through [`ReturnCode::Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// Encoding is not a defined instruction for the configured architecture.
    #[error("undefined instruction encoding")]
    UndefinedInstruction = 0x01,
    /// Encoding is architecturally unpredictable in the current context.
    #[error("unpredictable instruction")]
    UnpredictableInstruction = 0x02,
    /// Instruction is defined but its behavior is not emulated.
    #[error("unsupported instruction")]
    UnsupportedInstruction = 0x03,
    /// Fetch or data access outside every configured region.
    #[error("invalid memory access")]
    InvalidMemoryAccess = 0x04,
    /// Access alignment rejected by the architecture or `CCR.UNALIGN_TRP`.
    #[error("unaligned memory access")]
    UnalignedAccess = 0x05,
    /// Integer division by zero with `CCR.DIV_0_TRP` set.
    #[error("integer division by zero")]
    DivideByZero = 0x06,
    /// Instruction fetched while `EPSR.T` is clear.
    #[error("invalid execution state")]
    InvalidExecutionState = 0x07,
}

impl FaultCode {
    /// Converts a fault code to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::UndefinedInstruction),
            0x02 => Some(Self::UnpredictableInstruction),
            0x03 => Some(Self::UnsupportedInstruction),
            0x04 => Some(Self::InvalidMemoryAccess),
            0x05 => Some(Self::UnalignedAccess),
            0x06 => Some(Self::DivideByZero),
            0x07 => Some(Self::InvalidExecutionState),
            _ => None,
        }
    }

    /// Returns the pipeline stage class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::UndefinedInstruction | Self::UnpredictableInstruction => FaultClass::Decode,
            Self::UnsupportedInstruction
            | Self::UnalignedAccess
            | Self::DivideByZero
            | Self::InvalidExecutionState => FaultClass::Execute,
            Self::InvalidMemoryAccess => FaultClass::Memory,
        }
    }
}

/// Errors raised by region configuration and the raw (hook-free) accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MemoryError {
    /// Some byte of the span lies outside every configured region.
    #[error("access of {len} byte(s) at {address:#010x} is outside the configured regions")]
    OutOfBounds {
        /// First byte of the rejected span.
        address: u32,
        /// Length of the rejected span.
        len: usize,
    },
    /// No region has been configured yet.
    #[error("memory region is not configured")]
    Unconfigured,
    /// Region would be empty or extend past the 32-bit address space.
    #[error("invalid region: offset {offset:#010x}, size {size:#x}")]
    InvalidRegion {
        /// Requested base address.
        offset: u32,
        /// Requested size in bytes.
        size: u32,
    },
    /// Snapshot RAM image does not match the configured RAM size.
    #[error("snapshot ram holds {actual} bytes, configured ram holds {expected}")]
    SnapshotSizeMismatch {
        /// Configured RAM size.
        expected: usize,
        /// RAM size stored in the snapshot.
        actual: usize,
    },
}

/// Why the last `emulate` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ReturnCode {
    /// The instruction budget of the call was exhausted.
    MaxInstructionsReached,
    /// The program counter reached the requested end address.
    EndAddressReached,
    /// `stop_emulation` was called during the run.
    StopEmulationCalled,
    /// A `BKPT` instruction retired.
    BreakpointReached,
    /// `emulate` was called while another call was still active.
    AlreadyRunning,
    /// Fetch, decode or execute raised a fault.
    Fault {
        /// Fault raised by the failing instruction.
        cause: FaultCode,
    },
}

impl ReturnCode {
    /// Returns the fault cause when the run ended in a fault.
    #[must_use]
    pub const fn fault(self) -> Option<FaultCode> {
        match self {
            Self::Fault { cause } => Some(cause),
            Self::MaxInstructionsReached
            | Self::EndAddressReached
            | Self::StopEmulationCalled
            | Self::BreakpointReached
            | Self::AlreadyRunning => None,
        }
    }

    /// Returns `true` when the run ended in a fault.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        self.fault().is_some()
    }
}

impl From<FaultCode> for ReturnCode {
    fn from(cause: FaultCode) -> Self {
        Self::Fault { cause }
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, FaultCode, MemoryError, ReturnCode};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x07 {
            let fault = FaultCode::from_u8(code).expect("defined taxonomy code");
            assert_eq!(fault.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(FaultCode::from_u8(0x00).is_none());
        assert!(FaultCode::from_u8(0x08).is_none());
        assert!(FaultCode::from_u8(0xFF).is_none());
    }

    #[test]
    fn class_mapping_matches_pipeline_stage() {
        assert_eq!(FaultCode::UndefinedInstruction.class(), FaultClass::Decode);
        assert_eq!(
            FaultCode::UnpredictableInstruction.class(),
            FaultClass::Decode
        );
        assert_eq!(FaultCode::DivideByZero.class(), FaultClass::Execute);
        assert_eq!(FaultCode::InvalidMemoryAccess.class(), FaultClass::Memory);
    }

    #[test]
    fn return_code_exposes_fault_cause_only_for_faults() {
        let fault = ReturnCode::from(FaultCode::UnalignedAccess);
        assert!(fault.is_fault());
        assert_eq!(fault.fault(), Some(FaultCode::UnalignedAccess));

        assert!(!ReturnCode::EndAddressReached.is_fault());
        assert_eq!(ReturnCode::StopEmulationCalled.fault(), None);
    }

    #[test]
    fn memory_error_messages_name_the_span() {
        let err = MemoryError::OutOfBounds {
            address: 0x2000_0000,
            len: 4,
        };
        assert_eq!(
            err.to_string(),
            "access of 4 byte(s) at 0x20000000 is outside the configured regions"
        );
    }
}

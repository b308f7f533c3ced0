//! APSR flag update behaviors for different instruction classes.

use crate::ProgramStatus;

/// Describes how the condition flags change after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change to the flags.
    #[default]
    None,
    /// Logical result: `N` and `Z` follow the result, `C` and `V` are kept.
    Nz {
        /// Result the flags are derived from.
        result: u32,
    },
    /// Logical result with shifter carry-out: `V` is kept.
    Nzc {
        /// Result the flags are derived from.
        result: u32,
        /// Carry flag.
        carry: bool,
    },
    /// Arithmetic result: all four flags are written.
    Nzcv {
        /// Result the flags are derived from.
        result: u32,
        /// Carry flag.
        carry: bool,
        /// Overflow flag.
        overflow: bool,
    },
}

impl FlagsUpdate {
    /// Logical update with an optional carry; `None` keeps `C`.
    #[must_use]
    pub const fn logical(result: u32, carry: Option<bool>) -> Self {
        match carry {
            Some(carry) => Self::Nzc { result, carry },
            None => Self::Nz { result },
        }
    }

    /// Arithmetic update.
    #[must_use]
    pub const fn arithmetic(result: u32, carry: bool, overflow: bool) -> Self {
        Self::Nzcv {
            result,
            carry,
            overflow,
        }
    }

    /// Writes the update into `psr`.
    pub const fn apply(self, psr: &mut ProgramStatus) {
        let (result, carry, overflow) = match self {
            Self::None => return,
            Self::Nz { result } => (result, None, None),
            Self::Nzc { result, carry } => (result, Some(carry), None),
            Self::Nzcv {
                result,
                carry,
                overflow,
            } => (result, Some(carry), Some(overflow)),
        };
        psr.n = result >> 31 != 0;
        psr.z = result == 0;
        if let Some(carry) = carry {
            psr.c = carry;
        }
        if let Some(overflow) = overflow {
            psr.v = overflow;
        }
    }
}

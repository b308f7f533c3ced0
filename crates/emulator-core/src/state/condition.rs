use super::ProgramStatus;

/// ARM condition code, as encoded in `B<cond>` and `IT` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Condition {
    /// Equal (`Z == 1`).
    Eq = 0x0,
    /// Not equal (`Z == 0`).
    Ne = 0x1,
    /// Carry set / unsigned higher or same.
    Cs = 0x2,
    /// Carry clear / unsigned lower.
    Cc = 0x3,
    /// Minus, negative.
    Mi = 0x4,
    /// Plus, positive or zero.
    Pl = 0x5,
    /// Overflow.
    Vs = 0x6,
    /// No overflow.
    Vc = 0x7,
    /// Unsigned higher.
    Hi = 0x8,
    /// Unsigned lower or same.
    Ls = 0x9,
    /// Signed greater than or equal.
    Ge = 0xA,
    /// Signed less than.
    Lt = 0xB,
    /// Signed greater than.
    Gt = 0xC,
    /// Signed less than or equal.
    Le = 0xD,
    /// Always.
    #[default]
    Al = 0xE,
    /// Always (the `0b1111` encoding, only reachable through IT state).
    Nv = 0xF,
}

impl Condition {
    /// Decodes a four-bit condition field; upper bits are ignored.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xA => Self::Ge,
            0xB => Self::Lt,
            0xC => Self::Gt,
            0xD => Self::Le,
            0xE => Self::Al,
            _ => Self::Nv,
        }
    }

    /// Four-bit encoding of this condition.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Evaluates the condition against the current flags.
    #[must_use]
    pub const fn passed(self, psr: &ProgramStatus) -> bool {
        match self {
            Self::Eq => psr.z,
            Self::Ne => !psr.z,
            Self::Cs => psr.c,
            Self::Cc => !psr.c,
            Self::Mi => psr.n,
            Self::Pl => !psr.n,
            Self::Vs => psr.v,
            Self::Vc => !psr.v,
            Self::Hi => psr.c && !psr.z,
            Self::Ls => !psr.c || psr.z,
            Self::Ge => psr.n == psr.v,
            Self::Lt => psr.n != psr.v,
            Self::Gt => !psr.z && psr.n == psr.v,
            Self::Le => psr.z || psr.n != psr.v,
            Self::Al | Self::Nv => true,
        }
    }
}

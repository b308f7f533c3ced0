//! Architectural CPU state model primitives.

/// Condition codes and their evaluation against the flags.
pub mod condition;
/// Core register identifiers and the copyable CPU state.
pub mod registers;

pub use condition::Condition;
pub use registers::{
    CpuState, ProgramStatus, Register, CCR_DIV_0_TRP, CCR_RESET, CCR_UNALIGN_TRP, CONTROL_NPRIV,
    CONTROL_SPSEL, REGISTER_COUNT,
};

/// Returns `true` while inside an IT block.
#[must_use]
pub const fn it_active(it_state: u8) -> bool {
    it_state != 0
}

/// Returns `true` when the current instruction is the last of its IT block.
#[must_use]
pub const fn it_last(it_state: u8) -> bool {
    it_state & 0x0F == 0x08
}

/// Condition governing the current instruction of an IT block.
#[must_use]
pub const fn it_condition(it_state: u8) -> Condition {
    Condition::from_bits(it_state >> 4)
}

/// Advances the IT schedule by one instruction.
#[must_use]
pub const fn it_advance(it_state: u8) -> u8 {
    if it_state & 0x07 == 0 {
        0
    } else {
        (it_state & 0xE0) | ((it_state << 1) & 0x1F)
    }
}

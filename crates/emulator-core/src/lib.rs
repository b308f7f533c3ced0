//! Hookable ARMv7-M Thumb emulation core.
//!
//! The crate models a single microcontroller core with a flash and a RAM
//! region, runs Thumb and Thumb-2 code through a fetch/decode/execute
//! pipeline and exposes eleven hook points for observing fetches, decoded
//! and executed instructions, memory accesses and register accesses.
//!
//! State is inspected and injected through the raw accessors on
//! [`Emulator`], which never raise hooks. Instruction execution uses a
//! separate hook-raising layer internally.

/// Host-facing configuration and snapshot types.
pub mod api;
pub use api::{Architecture, EmulatorConfig, EmulatorSnapshot, FaultRetirement};

/// Fault taxonomy, run status codes and memory errors.
pub mod fault;
pub use fault::{FaultClass, FaultCode, MemoryError, ReturnCode};

/// Bounds-checked memory regions.
pub mod memory;
pub use memory::{MemoryRegion, MAX_ACCESS_BYTES};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{
    Condition, CpuState, ProgramStatus, Register, CCR_DIV_0_TRP, CCR_RESET, CCR_UNALIGN_TRP,
    CONTROL_NPRIV, CONTROL_SPSEL, REGISTER_COUNT,
};

/// Thumb and Thumb-2 instruction decoder.
pub mod decoder;
pub use decoder::{
    Addressing, BitField, Decoder, Instruction, ItContext, Mnemonic, Shift, ShiftKind,
};

/// Hook registration types.
pub mod hooks;
pub use hooks::{
    FetchHookClosure, FetchHookFn, HookCallback, HookId, HookKind, InstructionHookClosure,
    InstructionHookFn, MemoryHookClosure, MemoryHookFn, RegisterHookClosure, RegisterHookFn,
    UserData,
};

/// Emulator instance and run control.
pub mod emulator;
pub use emulator::Emulator;

/// Instruction execution and ALU helpers.
pub mod execute;
pub use execute::FlagsUpdate;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

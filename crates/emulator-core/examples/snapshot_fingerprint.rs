//! Deterministic run fingerprint used for cross-host comparison.
//!
//! Runs a small checksum loop over RAM, restores the starting snapshot,
//! runs it again and prints one hash covering both runs.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use thumb_emulator_core::{Architecture, Emulator, EmulatorSnapshot, Register, ReturnCode};
use tracing as _;

const RAM: u32 = 0x2000_0000;

/// Sums the eight words at `r0` into `r2`, storing the running total back.
const PROGRAM: [u16; 10] = [
    0x2108, // MOVS r1, #8
    0x2200, // MOVS r2, #0
    0x6803, // LDR r3, [r0]
    0x18D2, // ADDS r2, r2, r3
    0x6002, // STR r2, [r0]
    0x3004, // ADDS r0, #4
    0x3901, // SUBS r1, #1
    0xD1F9, // BNE 0x04
    0xBE00, // BKPT #0
    0xBF00, // NOP
];

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn hash_run(hash: &mut u64, code: ReturnCode, snapshot: &EmulatorSnapshot) {
    match code {
        ReturnCode::MaxInstructionsReached => hash_bytes(hash, &[0x10]),
        ReturnCode::EndAddressReached => hash_bytes(hash, &[0x11]),
        ReturnCode::StopEmulationCalled => hash_bytes(hash, &[0x12]),
        ReturnCode::BreakpointReached => hash_bytes(hash, &[0x13]),
        ReturnCode::AlreadyRunning => hash_bytes(hash, &[0x14]),
        ReturnCode::Fault { cause } => hash_bytes(hash, &[0x15, cause.as_u8()]),
    }
    for value in snapshot.cpu.registers {
        hash_bytes(hash, &value.to_le_bytes());
    }
    hash_bytes(hash, &snapshot.cpu.psr.xpsr().to_le_bytes());
    hash_bytes(hash, &snapshot.cpu.time.to_le_bytes());
    hash_bytes(hash, &snapshot.ram);
}

fn fingerprint() -> String {
    let mut emu = Emulator::new(Architecture::ArmV7M);
    emu.set_flash_region(0, 0x100).expect("flash region");
    emu.set_ram_region(RAM, 0x40).expect("ram region");

    let image: Vec<u8> = PROGRAM.iter().flat_map(|hw| hw.to_le_bytes()).collect();
    emu.write_memory(0, &image).expect("program fits in flash");
    let words: Vec<u8> = (1_u32..=8).flat_map(|word| (word * 0x0101_0101).to_le_bytes()).collect();
    emu.write_memory(RAM, &words).expect("table fits in ram");
    emu.write_register(Register::R0, RAM);

    let start = emu.snapshot();
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;

    let code = emu.emulate(1_000);
    hash_run(&mut hash, code, &emu.snapshot());

    emu.restore(&start).expect("snapshot matches ram size");
    let code = emu.emulate(1_000);
    hash_run(&mut hash, code, &emu.snapshot());

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}

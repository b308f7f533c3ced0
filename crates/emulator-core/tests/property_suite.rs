//! Property coverage for memory bounds, clocks, snapshots and hook ids.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use std::collections::HashSet;

use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use thumb_emulator_core::{Architecture, Emulator, HookKind, Register, ReturnCode};
use tracing as _;

const FLASH_SIZE: u32 = 0x400;
const RAM: u32 = 0x2000_0000;
const RAM_SIZE: u32 = 0x400;

fn emulator() -> Emulator {
    let mut emu = Emulator::new(Architecture::ArmV7M);
    emu.set_flash_region(0, FLASH_SIZE).expect("flash");
    emu.set_ram_region(RAM, RAM_SIZE).expect("ram");
    emu
}

fn load(emu: &mut Emulator, program: &[u16]) {
    let image: Vec<u8> = program.iter().flat_map(|hw| hw.to_le_bytes()).collect();
    emu.write_memory(0, &image).expect("program fits in flash");
}

/// Flag-setting ALU encodings on r0-r7 that never branch or touch memory.
fn alu_instruction() -> impl Strategy<Value = u16> {
    let imm8 = (0_u16..8, any::<u8>());
    let reg_pair = (0_u16..8, 0_u16..8);
    prop_oneof![
        imm8.clone()
            .prop_map(|(rd, imm)| 0x2000 | (rd << 8) | u16::from(imm)),
        imm8.clone()
            .prop_map(|(rd, imm)| 0x3000 | (rd << 8) | u16::from(imm)),
        imm8.prop_map(|(rd, imm)| 0x3800 | (rd << 8) | u16::from(imm)),
        reg_pair.clone().prop_map(|(rd, rm)| 0x4000 | (rm << 3) | rd),
        reg_pair.clone().prop_map(|(rd, rm)| 0x4040 | (rm << 3) | rd),
        reg_pair.clone().prop_map(|(rd, rm)| 0x4300 | (rm << 3) | rd),
        reg_pair.clone().prop_map(|(rd, rm)| 0x4340 | (rm << 3) | rd),
        (reg_pair, 1_u16..32).prop_map(|((rd, rm), imm5)| (imm5 << 6) | (rm << 3) | rd),
    ]
}

fn in_region(address: u32, len: u32, offset: u32, size: u32) -> bool {
    let end = u64::from(address) + u64::from(len);
    address >= offset && end <= u64::from(offset) + u64::from(size)
}

proptest! {
    #[test]
    fn raw_access_succeeds_iff_span_fits_one_region(address in any::<u32>(), len in 1_u32..16) {
        let mut emu = emulator();
        let expected = in_region(address, len, 0, FLASH_SIZE) || in_region(address, len, RAM, RAM_SIZE);
        let data = vec![0xA5_u8; len as usize];

        prop_assert_eq!(emu.write_memory(address, &data).is_ok(), expected);

        let mut back = vec![0_u8; len as usize];
        prop_assert_eq!(emu.read_memory(address, &mut back).is_ok(), expected);
        if expected {
            prop_assert_eq!(back, data);
        } else {
            prop_assert!(back.iter().all(|&byte| byte == 0));
        }
    }

    #[test]
    fn clocks_advance_by_retired_instructions(
        program in prop::collection::vec(alu_instruction(), 1..64),
        budgets in prop::collection::vec(0_u64..32, 1..4),
    ) {
        let mut emu = emulator();
        load(&mut emu, &program);

        let mut total = 0_u64;
        for budget in budgets {
            let before = emu.time();
            let code = emu.emulate(budget);
            prop_assert!(emu.emulated_time() <= budget);
            prop_assert_eq!(emu.time(), before + emu.emulated_time());
            if code == ReturnCode::MaxInstructionsReached {
                prop_assert_eq!(emu.emulated_time(), budget);
            }
            total += emu.emulated_time();
        }
        prop_assert_eq!(emu.time(), total);
    }

    #[test]
    fn restored_snapshot_replays_identically(
        program in prop::collection::vec(alu_instruction(), 1..64),
        seed in prop::array::uniform8(any::<u32>()),
        steps in 0_u64..64,
    ) {
        let mut emu = emulator();
        load(&mut emu, &program);
        for (index, value) in seed.into_iter().enumerate() {
            emu.write_register(Register::from_index(index as u8), value);
        }

        let start = emu.snapshot();
        let first_code = emu.emulate(steps);
        let first = emu.snapshot();

        emu.restore(&start).expect("same ram size");
        prop_assert_eq!(emu.snapshot(), start);
        let second_code = emu.emulate(steps);

        prop_assert_eq!(first_code, second_code);
        prop_assert_eq!(emu.snapshot(), first);
    }

    #[test]
    fn hook_ids_are_unique_and_never_reused(
        kinds in prop::collection::vec(0_usize..HookKind::COUNT, 1..40),
        removals in prop::collection::vec(any::<bool>(), 40),
    ) {
        let mut emu = emulator();
        let mut seen = HashSet::new();
        let mut last = 0;

        for (kind, remove) in kinds.into_iter().zip(removals) {
            let id = match HookKind::ALL[kind] {
                HookKind::BeforeFetch => emu.add_before_fetch_closure(|_, _, _| {}),
                HookKind::InstructionDecoded => emu.add_instruction_decoded_closure(|_, _| {}),
                HookKind::InstructionExecuted => emu.add_instruction_executed_closure(|_, _| {}),
                HookKind::MemoryBeforeRead => emu.add_memory_before_read_closure(|_, _, _, _| {}),
                HookKind::MemoryAfterRead => emu.add_memory_after_read_closure(|_, _, _, _| {}),
                HookKind::MemoryBeforeWrite => emu.add_memory_before_write_closure(|_, _, _, _| {}),
                HookKind::MemoryAfterWrite => emu.add_memory_after_write_closure(|_, _, _, _| {}),
                HookKind::RegisterBeforeRead => emu.add_register_before_read_closure(|_, _, _| {}),
                HookKind::RegisterAfterRead => emu.add_register_after_read_closure(|_, _, _| {}),
                HookKind::RegisterBeforeWrite => emu.add_register_before_write_closure(|_, _, _| {}),
                HookKind::RegisterAfterWrite => emu.add_register_after_write_closure(|_, _, _| {}),
            };
            prop_assert!(id.get() > last);
            prop_assert!(seen.insert(id));
            last = id.get();

            if remove {
                prop_assert!(emu.remove_hook(id));
                prop_assert!(!emu.remove_hook(id));
            }
        }
    }
}

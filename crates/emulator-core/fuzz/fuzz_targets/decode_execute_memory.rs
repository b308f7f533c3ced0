#![no_main]

use libfuzzer_sys::fuzz_target;
use thumb_emulator_core::{Architecture, Decoder, Emulator, ItContext, Register};

const RAM: u32 = 0x2000_0000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let first = u16::from_le_bytes([data[0], data[1]]);
    let second = u16::from_le_bytes([data[2], data[3]]);
    for architecture in [Architecture::ArmV6M, Architecture::ArmV7M, Architecture::ArmV7EM] {
        let decoder = Decoder::new(architecture);
        let _ = decoder.decode(0x100, first, second, ItContext::default());
    }

    let mut emu = Emulator::new(Architecture::ArmV7M);
    if emu.set_flash_region(0, 0x1000).is_err() || emu.set_ram_region(RAM, 0x1000).is_err() {
        return;
    }
    let image = &data[..data.len().min(0x1000)];
    let _ = emu.write_memory(0, image);
    for (index, reg) in [Register::R0, Register::R1, Register::R2, Register::R3]
        .into_iter()
        .enumerate()
    {
        emu.write_register(reg, RAM + (index as u32) * 0x100);
    }
    emu.write_register(Register::Sp, RAM + 0x1000);

    let _ = emu.emulate(256);
});

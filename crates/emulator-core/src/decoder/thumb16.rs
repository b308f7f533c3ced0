//! 16-bit Thumb encodings.

#![allow(clippy::cast_possible_truncation)]

use super::{sign_extend, Instruction, ItContext, Mnemonic, Shift};
use crate::execute::decode_imm_shift;
use crate::{Condition, FaultCode, Register};

/// Three-bit register field at `lsb`.
const fn low_reg(hw: u16, lsb: u32) -> Register {
    Register::from_index(((hw >> lsb) & 0x7) as u8)
}

/// Four-bit register field at `lsb`.
const fn reg(hw: u16, lsb: u32) -> Register {
    Register::from_index(((hw >> lsb) & 0xF) as u8)
}

pub(super) fn decode(address: u32, hw: u16, it: ItContext) -> Result<Instruction, FaultCode> {
    let at = Instruction::new(Mnemonic::Nop, address, 2, u32::from(hw));

    match hw >> 10 {
        0b00_0000..=0b00_1111 => shift_add_sub_move_compare(at, hw, it),
        0b01_0000 => Ok(data_processing(at, hw, it)),
        0b01_0001 => special_data_and_branch(at, hw),
        0b01_0010 | 0b01_0011 => Ok(at
            .with_mnemonic(Mnemonic::Ldr)
            .with_rt(low_reg(hw, 8))
            .with_rn(Register::Pc)
            .with_imm(u32::from(hw & 0xFF) << 2)),
        0b01_0100..=0b01_0111 => Ok(load_store_register(at, hw)),
        0b01_1000..=0b01_1111 => Ok(load_store_word_byte(at, hw)),
        0b10_0000..=0b10_0011 => {
            let mnemonic = if hw & 0x0800 == 0 {
                Mnemonic::Strh
            } else {
                Mnemonic::Ldrh
            };
            Ok(at
                .with_mnemonic(mnemonic)
                .with_rt(low_reg(hw, 0))
                .with_rn(low_reg(hw, 3))
                .with_imm(u32::from((hw >> 6) & 0x1F) << 1))
        }
        0b10_0100..=0b10_0111 => {
            let mnemonic = if hw & 0x0800 == 0 {
                Mnemonic::Str
            } else {
                Mnemonic::Ldr
            };
            Ok(at
                .with_mnemonic(mnemonic)
                .with_rt(low_reg(hw, 8))
                .with_rn(Register::Sp)
                .with_imm(u32::from(hw & 0xFF) << 2))
        }
        0b10_1000 | 0b10_1001 => Ok(at
            .with_mnemonic(Mnemonic::Adr)
            .with_rd(low_reg(hw, 8))
            .with_imm(u32::from(hw & 0xFF) << 2)),
        0b10_1010 | 0b10_1011 => Ok(at
            .with_mnemonic(Mnemonic::Add)
            .with_rd(low_reg(hw, 8))
            .with_rn(Register::Sp)
            .with_imm(u32::from(hw & 0xFF) << 2)),
        0b10_1100..=0b10_1111 => miscellaneous(at, hw),
        0b11_0000..=0b11_0011 => load_store_multiple(at, hw),
        0b11_0100..=0b11_0111 => Ok(conditional_branch_or_exception(at, hw)),
        0b11_1000 | 0b11_1001 => Ok(at
            .with_mnemonic(Mnemonic::B)
            .with_imm(sign_extend(u32::from(hw & 0x07FF) << 1, 12))),
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn shift_add_sub_move_compare(
    at: Instruction,
    hw: u16,
    it: ItContext,
) -> Result<Instruction, FaultCode> {
    let setflags = !it.in_it_block;
    let op = (hw >> 11) & 0x7;

    match op {
        0..=2 => {
            let imm5 = ((hw >> 6) & 0x1F) as u8;
            if op == 0 && imm5 == 0 {
                // MOVS Rd, Rm
                if it.in_it_block {
                    return Err(FaultCode::UnpredictableInstruction);
                }
                return Ok(at
                    .with_mnemonic(Mnemonic::Mov)
                    .with_rd(low_reg(hw, 0))
                    .with_rm(low_reg(hw, 3))
                    .with_setflags(true));
            }
            let mnemonic = match op {
                0 => Mnemonic::Lsl,
                1 => Mnemonic::Lsr,
                _ => Mnemonic::Asr,
            };
            Ok(at
                .with_mnemonic(mnemonic)
                .with_rd(low_reg(hw, 0))
                .with_rm(low_reg(hw, 3))
                .with_shift(decode_imm_shift(op as u8, imm5))
                .with_setflags(setflags))
        }
        3 => {
            let mnemonic = if hw & 0x0200 == 0 {
                Mnemonic::Add
            } else {
                Mnemonic::Sub
            };
            let at = at
                .with_mnemonic(mnemonic)
                .with_rd(low_reg(hw, 0))
                .with_rn(low_reg(hw, 3))
                .with_setflags(setflags);
            if hw & 0x0400 == 0 {
                Ok(at.with_rm(low_reg(hw, 6)))
            } else {
                Ok(at.with_imm(u32::from((hw >> 6) & 0x7)))
            }
        }
        _ => {
            let rdn = low_reg(hw, 8);
            let imm = u32::from(hw & 0xFF);
            let at = at.with_imm(imm);
            Ok(match op {
                4 => at
                    .with_mnemonic(Mnemonic::Mov)
                    .with_rd(rdn)
                    .with_setflags(setflags),
                5 => at
                    .with_mnemonic(Mnemonic::Cmp)
                    .with_rn(rdn)
                    .with_setflags(true),
                6 => at
                    .with_mnemonic(Mnemonic::Add)
                    .with_rd(rdn)
                    .with_rn(rdn)
                    .with_setflags(setflags),
                _ => at
                    .with_mnemonic(Mnemonic::Sub)
                    .with_rd(rdn)
                    .with_rn(rdn)
                    .with_setflags(setflags),
            })
        }
    }
}

fn data_processing(at: Instruction, hw: u16, it: ItContext) -> Instruction {
    let setflags = !it.in_it_block;
    let rdn = low_reg(hw, 0);
    let rm = low_reg(hw, 3);

    let binary = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rd(rdn)
            .with_rn(rdn)
            .with_rm(rm)
            .with_setflags(setflags)
    };
    let register_shift = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rd(rdn)
            .with_rm(rdn)
            .with_rn(rm)
            .with_setflags(setflags)
    };
    let compare = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rn(rdn)
            .with_rm(rm)
            .with_setflags(true)
    };

    match (hw >> 6) & 0xF {
        0x0 => binary(Mnemonic::And),
        0x1 => binary(Mnemonic::Eor),
        0x2 => register_shift(Mnemonic::Lsl),
        0x3 => register_shift(Mnemonic::Lsr),
        0x4 => register_shift(Mnemonic::Asr),
        0x5 => binary(Mnemonic::Adc),
        0x6 => binary(Mnemonic::Sbc),
        0x7 => register_shift(Mnemonic::Ror),
        0x8 => compare(Mnemonic::Tst),
        0x9 => at
            .with_mnemonic(Mnemonic::Rsb)
            .with_rd(rdn)
            .with_rn(rm)
            .with_imm(0)
            .with_setflags(setflags),
        0xA => compare(Mnemonic::Cmp),
        0xB => compare(Mnemonic::Cmn),
        0xC => binary(Mnemonic::Orr),
        0xD => at
            .with_mnemonic(Mnemonic::Mul)
            .with_rd(rdn)
            .with_rn(rm)
            .with_rm(rdn)
            .with_setflags(setflags),
        0xE => binary(Mnemonic::Bic),
        _ => at
            .with_mnemonic(Mnemonic::Mvn)
            .with_rd(rdn)
            .with_rm(rm)
            .with_setflags(setflags),
    }
}

fn special_data_and_branch(at: Instruction, hw: u16) -> Result<Instruction, FaultCode> {
    let rdn = Register::from_index((((hw >> 4) & 0x8) | (hw & 0x7)) as u8);
    let rm = reg(hw, 3);

    match (hw >> 8) & 0x3 {
        0 => {
            if rdn == Register::Pc && rm == Register::Pc {
                return Err(FaultCode::UnpredictableInstruction);
            }
            Ok(at
                .with_mnemonic(Mnemonic::Add)
                .with_rd(rdn)
                .with_rn(rdn)
                .with_rm(rm))
        }
        1 => {
            if (rdn.is_low() && rm.is_low()) || rdn == Register::Pc || rm == Register::Pc {
                return Err(FaultCode::UnpredictableInstruction);
            }
            Ok(at
                .with_mnemonic(Mnemonic::Cmp)
                .with_rn(rdn)
                .with_rm(rm)
                .with_setflags(true))
        }
        2 => Ok(at.with_mnemonic(Mnemonic::Mov).with_rd(rdn).with_rm(rm)),
        _ => {
            if hw & 0x0080 == 0 {
                Ok(at.with_mnemonic(Mnemonic::Bx).with_rm(rm))
            } else if rm == Register::Pc {
                Err(FaultCode::UnpredictableInstruction)
            } else {
                Ok(at.with_mnemonic(Mnemonic::Blx).with_rm(rm))
            }
        }
    }
}

fn load_store_register(at: Instruction, hw: u16) -> Instruction {
    let mnemonic = match (hw >> 9) & 0x7 {
        0 => Mnemonic::Str,
        1 => Mnemonic::Strh,
        2 => Mnemonic::Strb,
        3 => Mnemonic::Ldrsb,
        4 => Mnemonic::Ldr,
        5 => Mnemonic::Ldrh,
        6 => Mnemonic::Ldrb,
        _ => Mnemonic::Ldrsh,
    };
    at.with_mnemonic(mnemonic)
        .with_rt(low_reg(hw, 0))
        .with_rn(low_reg(hw, 3))
        .with_rm(low_reg(hw, 6))
        .with_shift(Shift::lsl(0))
}

fn load_store_word_byte(at: Instruction, hw: u16) -> Instruction {
    let byte = hw & 0x1000 != 0;
    let load = hw & 0x0800 != 0;
    let imm5 = u32::from((hw >> 6) & 0x1F);

    let (mnemonic, imm) = match (byte, load) {
        (false, false) => (Mnemonic::Str, imm5 << 2),
        (false, true) => (Mnemonic::Ldr, imm5 << 2),
        (true, false) => (Mnemonic::Strb, imm5),
        (true, true) => (Mnemonic::Ldrb, imm5),
    };
    at.with_mnemonic(mnemonic)
        .with_rt(low_reg(hw, 0))
        .with_rn(low_reg(hw, 3))
        .with_imm(imm)
}

fn miscellaneous(at: Instruction, hw: u16) -> Result<Instruction, FaultCode> {
    if hw & 0xFF00 == 0xB000 {
        let mnemonic = if hw & 0x0080 == 0 {
            Mnemonic::Add
        } else {
            Mnemonic::Sub
        };
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(Register::Sp)
            .with_rn(Register::Sp)
            .with_imm(u32::from(hw & 0x7F) << 2));
    }

    if hw & 0xF500 == 0xB100 {
        let mnemonic = if hw & 0x0800 == 0 {
            Mnemonic::Cbz
        } else {
            Mnemonic::Cbnz
        };
        let imm = (u32::from((hw >> 9) & 0x1) << 6) | (u32::from((hw >> 3) & 0x1F) << 1);
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rn(low_reg(hw, 0))
            .with_imm(imm));
    }

    if hw & 0xFF00 == 0xB200 {
        let mnemonic = match (hw >> 6) & 0x3 {
            0 => Mnemonic::Sxth,
            1 => Mnemonic::Sxtb,
            2 => Mnemonic::Uxth,
            _ => Mnemonic::Uxtb,
        };
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(low_reg(hw, 0))
            .with_rm(low_reg(hw, 3)));
    }

    if hw & 0xFE00 == 0xB400 {
        let list = (hw & 0xFF) | (((hw >> 8) & 0x1) << 14);
        return multiple(at, Mnemonic::Push, Register::Sp, list, true);
    }

    if hw & 0xFE00 == 0xBC00 {
        let list = (hw & 0xFF) | (((hw >> 8) & 0x1) << 15);
        return multiple(at, Mnemonic::Pop, Register::Sp, list, true);
    }

    if hw & 0xFFEC == 0xB660 {
        if hw & 0x3 == 0 {
            return Err(FaultCode::UnpredictableInstruction);
        }
        return Ok(at
            .with_mnemonic(Mnemonic::Cps)
            .with_imm(u32::from(hw & 0x13)));
    }

    if hw & 0xFF00 == 0xBA00 {
        let mnemonic = match (hw >> 6) & 0x3 {
            0 => Mnemonic::Rev,
            1 => Mnemonic::Rev16,
            3 => Mnemonic::Revsh,
            _ => return Err(FaultCode::UndefinedInstruction),
        };
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(low_reg(hw, 0))
            .with_rm(low_reg(hw, 3)));
    }

    if hw & 0xFF00 == 0xBE00 {
        return Ok(at
            .with_mnemonic(Mnemonic::Bkpt)
            .with_imm(u32::from(hw & 0xFF)));
    }

    if hw & 0xFF00 == 0xBF00 {
        return if_then_or_hint(at, hw);
    }

    Err(FaultCode::UndefinedInstruction)
}

fn if_then_or_hint(at: Instruction, hw: u16) -> Result<Instruction, FaultCode> {
    let first_cond = ((hw >> 4) & 0xF) as u8;
    let mask = hw & 0xF;

    if mask != 0 {
        if first_cond == 0xF || (first_cond == 0xE && mask.count_ones() != 1) {
            return Err(FaultCode::UnpredictableInstruction);
        }
        return Ok(at
            .with_mnemonic(Mnemonic::It)
            .with_imm(u32::from(hw & 0xFF)));
    }

    // Unallocated hints execute as NOP.
    let mnemonic = match first_cond {
        1 => Mnemonic::Yield,
        2 => Mnemonic::Wfe,
        3 => Mnemonic::Wfi,
        4 => Mnemonic::Sev,
        _ => Mnemonic::Nop,
    };
    Ok(at.with_mnemonic(mnemonic))
}

fn load_store_multiple(at: Instruction, hw: u16) -> Result<Instruction, FaultCode> {
    let rn = low_reg(hw, 8);
    let list = hw & 0xFF;

    if hw & 0x0800 == 0 {
        multiple(at, Mnemonic::Stm, rn, list, true)
    } else {
        let writeback = list & (1 << rn.index()) == 0;
        multiple(at, Mnemonic::Ldm, rn, list, writeback)
    }
}

fn multiple(
    at: Instruction,
    mnemonic: Mnemonic,
    rn: Register,
    list: u16,
    writeback: bool,
) -> Result<Instruction, FaultCode> {
    if list == 0 {
        return Err(FaultCode::UnpredictableInstruction);
    }
    let mut at = at
        .with_mnemonic(mnemonic)
        .with_rn(rn)
        .with_register_list(list);
    at.addressing.writeback = writeback;
    Ok(at)
}

fn conditional_branch_or_exception(at: Instruction, hw: u16) -> Instruction {
    let imm8 = u32::from(hw & 0xFF);
    match (hw >> 8) & 0xF {
        0xE => at.with_mnemonic(Mnemonic::Udf).with_imm(imm8),
        0xF => at.with_mnemonic(Mnemonic::Svc).with_imm(imm8),
        cond => at
            .with_mnemonic(Mnemonic::B)
            .with_condition(Condition::from_bits(cond as u8))
            .with_imm(sign_extend(imm8 << 1, 9)),
    }
}

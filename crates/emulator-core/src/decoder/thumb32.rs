//! 32-bit Thumb-2 encodings.

#![allow(clippy::cast_possible_truncation)]

use super::{sign_extend, Addressing, Instruction, Mnemonic, Shift, ShiftKind};
use crate::execute::{decode_imm_shift, thumb_expand_imm};
use crate::{Condition, FaultCode, Register};

const fn reg(hw: u16, lsb: u32) -> Register {
    Register::from_index(((hw >> lsb) & 0xF) as u8)
}

const fn bit(hw: u16, n: u32) -> bool {
    (hw >> n) & 1 != 0
}

pub(super) fn decode(address: u32, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let raw = (u32::from(hw1) << 16) | u32::from(hw2);
    let at = Instruction::new(Mnemonic::Nop, address, 4, raw);
    let op2 = (hw1 >> 4) & 0x7F;

    match (hw1 >> 11) & 0x3 {
        0b01 => {
            if op2 & 0x64 == 0x00 {
                load_store_multiple(at, hw1, hw2)
            } else if op2 & 0x64 == 0x04 {
                load_store_dual_exclusive(at, hw1, hw2)
            } else if op2 & 0x60 == 0x20 {
                data_processing_shifted(at, hw1, hw2)
            } else {
                Err(FaultCode::UndefinedInstruction)
            }
        }
        0b10 => {
            if bit(hw2, 15) {
                branch_and_control(at, hw1, hw2)
            } else if op2 & 0x20 == 0 {
                data_processing_modified_immediate(at, hw1, hw2)
            } else {
                data_processing_plain_immediate(at, hw1, hw2)
            }
        }
        0b11 => {
            if op2 & 0x71 == 0x00 {
                store_single(at, hw1, hw2)
            } else if op2 & 0x67 == 0x01 || op2 & 0x67 == 0x03 || op2 & 0x67 == 0x05 {
                load_single(at, hw1, hw2)
            } else if op2 & 0x70 == 0x20 {
                data_processing_register(at, hw1, hw2)
            } else if op2 & 0x78 == 0x30 {
                multiply_accumulate(at, hw1, hw2)
            } else if op2 & 0x78 == 0x38 {
                long_multiply_divide(at, hw1, hw2)
            } else {
                Err(FaultCode::UndefinedInstruction)
            }
        }
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn load_store_multiple(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let rn = reg(hw1, 0);
    let writeback = bit(hw1, 5);
    let load = bit(hw1, 4);
    let list = hw2;

    let mnemonic = match ((hw1 >> 7) & 0x3, load) {
        (0b01, false) => Mnemonic::Stm,
        (0b01, true) if writeback && rn == Register::Sp => Mnemonic::Pop,
        (0b01, true) => Mnemonic::Ldm,
        (0b10, false) if writeback && rn == Register::Sp => Mnemonic::Push,
        (0b10, false) => Mnemonic::Stmdb,
        (0b10, true) => Mnemonic::Ldmdb,
        _ => return Err(FaultCode::UndefinedInstruction),
    };

    let sp_or_pc_listed = if load {
        list & 0xC000 == 0xC000
    } else {
        list & 0x8000 != 0
    };
    if rn == Register::Pc
        || list.count_ones() < 2
        || list & 0x2000 != 0
        || sp_or_pc_listed
        || (writeback && list & (1 << rn.index()) != 0)
    {
        return Err(FaultCode::UnpredictableInstruction);
    }

    let mut at = at
        .with_mnemonic(mnemonic)
        .with_rn(rn)
        .with_register_list(list);
    at.addressing.writeback = writeback;
    Ok(at)
}

fn load_store_dual_exclusive(
    at: Instruction,
    hw1: u16,
    hw2: u16,
) -> Result<Instruction, FaultCode> {
    let op1 = (hw1 >> 7) & 0x3;
    let op2 = (hw1 >> 4) & 0x3;
    let rn = reg(hw1, 0);
    let rt = reg(hw2, 12);
    let imm8 = u32::from(hw2 & 0xFF) << 2;

    if op1 & 0x2 != 0 || op2 & 0x2 != 0 {
        let mnemonic = if bit(hw1, 4) {
            Mnemonic::Ldrd
        } else {
            Mnemonic::Strd
        };
        let puw = (((hw1 >> 8) & 1) << 2) | (((hw1 >> 7) & 1) << 1) | ((hw1 >> 5) & 1);
        let addressing = Addressing::from_puw(puw as u8);
        let rt2 = reg(hw2, 8);
        if rt == rt2 && mnemonic == Mnemonic::Ldrd {
            return Err(FaultCode::UnpredictableInstruction);
        }
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rt(rt)
            .with_rt2(rt2)
            .with_rn(rn)
            .with_imm(imm8)
            .with_addressing(addressing));
    }

    let op3 = (hw2 >> 4) & 0xF;
    match (op1, op2) {
        (0, 0) => Ok(at
            .with_mnemonic(Mnemonic::Strex)
            .with_rd(reg(hw2, 8))
            .with_rt(rt)
            .with_rn(rn)
            .with_imm(imm8)),
        (0, 1) => Ok(at
            .with_mnemonic(Mnemonic::Ldrex)
            .with_rt(rt)
            .with_rn(rn)
            .with_imm(imm8)),
        (1, 0) => {
            let mnemonic = match op3 {
                0x4 => Mnemonic::Strexb,
                0x5 => Mnemonic::Strexh,
                _ => return Err(FaultCode::UndefinedInstruction),
            };
            Ok(at
                .with_mnemonic(mnemonic)
                .with_rd(reg(hw2, 0))
                .with_rt(rt)
                .with_rn(rn)
                .with_imm(0))
        }
        (1, 1) => match op3 {
            0x0 | 0x1 => {
                let mnemonic = if op3 == 0 {
                    Mnemonic::Tbb
                } else {
                    Mnemonic::Tbh
                };
                Ok(at.with_mnemonic(mnemonic).with_rn(rn).with_rm(reg(hw2, 0)))
            }
            0x4 | 0x5 => {
                let mnemonic = if op3 == 4 {
                    Mnemonic::Ldrexb
                } else {
                    Mnemonic::Ldrexh
                };
                Ok(at
                    .with_mnemonic(mnemonic)
                    .with_rt(rt)
                    .with_rn(rn)
                    .with_imm(0))
            }
            _ => Err(FaultCode::UndefinedInstruction),
        },
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn data_processing_shifted(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let setflags = bit(hw1, 4);
    let rn = reg(hw1, 0);
    let rd = reg(hw2, 8);
    let rm = reg(hw2, 0);
    let imm5 = ((((hw2 >> 12) & 0x7) << 2) | ((hw2 >> 6) & 0x3)) as u8;
    let shift_type = ((hw2 >> 4) & 0x3) as u8;
    let shift = decode_imm_shift(shift_type, imm5);
    let compare_form = rd == Register::Pc && setflags;

    let at = at.with_rm(rm).with_shift(shift);
    let binary = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rd(rd)
            .with_rn(rn)
            .with_setflags(setflags)
    };
    let compare = |mnemonic| at.with_mnemonic(mnemonic).with_rn(rn).with_setflags(true);

    Ok(match (hw1 >> 5) & 0xF {
        0x0 if compare_form => compare(Mnemonic::Tst),
        0x0 => binary(Mnemonic::And),
        0x1 => binary(Mnemonic::Bic),
        0x2 if rn == Register::Pc => {
            let mnemonic = match (shift_type, imm5) {
                (0, 0) => Mnemonic::Mov,
                (0, _) => Mnemonic::Lsl,
                (1, _) => Mnemonic::Lsr,
                (2, _) => Mnemonic::Asr,
                _ => Mnemonic::Ror,
            };
            at.with_mnemonic(mnemonic)
                .with_rd(rd)
                .with_setflags(setflags)
        }
        0x2 => binary(Mnemonic::Orr),
        0x3 if rn == Register::Pc => at
            .with_mnemonic(Mnemonic::Mvn)
            .with_rd(rd)
            .with_setflags(setflags),
        0x3 => binary(Mnemonic::Orn),
        0x4 if compare_form => compare(Mnemonic::Teq),
        0x4 => binary(Mnemonic::Eor),
        0x8 if compare_form => compare(Mnemonic::Cmn),
        0x8 => binary(Mnemonic::Add),
        0xA => binary(Mnemonic::Adc),
        0xB => binary(Mnemonic::Sbc),
        0xD if compare_form => compare(Mnemonic::Cmp),
        0xD => binary(Mnemonic::Sub),
        0xE => binary(Mnemonic::Rsb),
        _ => return Err(FaultCode::UndefinedInstruction),
    })
}

fn data_processing_modified_immediate(
    at: Instruction,
    hw1: u16,
    hw2: u16,
) -> Result<Instruction, FaultCode> {
    let setflags = bit(hw1, 4);
    let rn = reg(hw1, 0);
    let rd = reg(hw2, 8);
    let imm12 = (u32::from((hw1 >> 10) & 0x1) << 11)
        | (u32::from((hw2 >> 12) & 0x7) << 8)
        | u32::from(hw2 & 0xFF);
    let (imm, carry) = thumb_expand_imm(imm12).ok_or(FaultCode::UnpredictableInstruction)?;
    let compare_form = rd == Register::Pc && setflags;

    let mut at = at.with_imm(imm);
    at.imm_carry = carry;
    let binary = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rd(rd)
            .with_rn(rn)
            .with_setflags(setflags)
    };
    let unary = |mnemonic| {
        at.with_mnemonic(mnemonic)
            .with_rd(rd)
            .with_setflags(setflags)
    };
    let compare = |mnemonic| at.with_mnemonic(mnemonic).with_rn(rn).with_setflags(true);

    Ok(match (hw1 >> 5) & 0xF {
        0x0 if compare_form => compare(Mnemonic::Tst),
        0x0 => binary(Mnemonic::And),
        0x1 => binary(Mnemonic::Bic),
        0x2 if rn == Register::Pc => unary(Mnemonic::Mov),
        0x2 => binary(Mnemonic::Orr),
        0x3 if rn == Register::Pc => unary(Mnemonic::Mvn),
        0x3 => binary(Mnemonic::Orn),
        0x4 if compare_form => compare(Mnemonic::Teq),
        0x4 => binary(Mnemonic::Eor),
        0x8 if compare_form => compare(Mnemonic::Cmn),
        0x8 => binary(Mnemonic::Add),
        0xA => binary(Mnemonic::Adc),
        0xB => binary(Mnemonic::Sbc),
        0xD if compare_form => compare(Mnemonic::Cmp),
        0xD => binary(Mnemonic::Sub),
        0xE => binary(Mnemonic::Rsb),
        _ => return Err(FaultCode::UndefinedInstruction),
    })
}

fn data_processing_plain_immediate(
    at: Instruction,
    hw1: u16,
    hw2: u16,
) -> Result<Instruction, FaultCode> {
    let rn = reg(hw1, 0);
    let rd = reg(hw2, 8);
    let imm12 = (u32::from((hw1 >> 10) & 0x1) << 11)
        | (u32::from((hw2 >> 12) & 0x7) << 8)
        | u32::from(hw2 & 0xFF);
    let imm16 = (u32::from(hw1 & 0xF) << 12) | imm12;
    let lsb = ((((hw2 >> 12) & 0x7) << 2) | ((hw2 >> 6) & 0x3)) as u8;
    let high = (hw2 & 0x1F) as u8;

    match (hw1 >> 4) & 0x1F {
        0b0_0000 if rn == Register::Pc => Ok(at
            .with_mnemonic(Mnemonic::Adr)
            .with_rd(rd)
            .with_imm(imm12)),
        0b0_0000 => Ok(at
            .with_mnemonic(Mnemonic::Add)
            .with_rd(rd)
            .with_rn(rn)
            .with_imm(imm12)),
        0b0_1010 if rn == Register::Pc => Ok(at
            .with_mnemonic(Mnemonic::Adr)
            .with_rd(rd)
            .with_imm(imm12)
            .with_addressing(Addressing::from_puw(0b100))),
        0b0_1010 => Ok(at
            .with_mnemonic(Mnemonic::Sub)
            .with_rd(rd)
            .with_rn(rn)
            .with_imm(imm12)),
        0b0_0100 => Ok(at.with_mnemonic(Mnemonic::Mov).with_rd(rd).with_imm(imm16)),
        0b0_1100 => Ok(at.with_mnemonic(Mnemonic::Movt).with_rd(rd).with_imm(imm16)),
        0b1_0110 => {
            if high < lsb {
                return Err(FaultCode::UnpredictableInstruction);
            }
            let width = high - lsb + 1;
            if rn == Register::Pc {
                Ok(at
                    .with_mnemonic(Mnemonic::Bfc)
                    .with_rd(rd)
                    .with_bitfield(lsb, width))
            } else {
                Ok(at
                    .with_mnemonic(Mnemonic::Bfi)
                    .with_rd(rd)
                    .with_rn(rn)
                    .with_bitfield(lsb, width))
            }
        }
        op @ (0b1_0100 | 0b1_1100) => {
            let width = high + 1;
            if u32::from(lsb) + u32::from(width) > 32 {
                return Err(FaultCode::UnpredictableInstruction);
            }
            let mnemonic = if op == 0b1_0100 {
                Mnemonic::Sbfx
            } else {
                Mnemonic::Ubfx
            };
            Ok(at
                .with_mnemonic(mnemonic)
                .with_rd(rd)
                .with_rn(rn)
                .with_bitfield(lsb, width))
        }
        // SSAT / USAT and their halfword forms.
        0b1_0000 | 0b1_0010 | 0b1_1000 | 0b1_1010 => Err(FaultCode::UnsupportedInstruction),
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn branch_and_control(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let op = (hw1 >> 4) & 0x7F;
    let s = u32::from((hw1 >> 10) & 0x1);
    let j1 = u32::from((hw2 >> 13) & 0x1);
    let j2 = u32::from((hw2 >> 11) & 0x1);
    let imm11 = u32::from(hw2 & 0x7FF);

    match (hw2 >> 12) & 0x7 {
        0b000 if op & 0x38 != 0x38 => {
            let imm6 = u32::from(hw1 & 0x3F);
            let imm = (s << 20) | (j2 << 19) | (j1 << 18) | (imm6 << 12) | (imm11 << 1);
            Ok(at
                .with_mnemonic(Mnemonic::B)
                .with_condition(Condition::from_bits(((hw1 >> 6) & 0xF) as u8))
                .with_imm(sign_extend(imm, 21)))
        }
        0b000 => system_control(at, op, hw1, hw2),
        0b010 if op == 0x7F => Ok(at
            .with_mnemonic(Mnemonic::Udf)
            .with_imm((u32::from(hw1 & 0xF) << 12) | u32::from(hw2 & 0xFFF))),
        op1 @ (0b001 | 0b011 | 0b101 | 0b111) => {
            let i1 = (j1 ^ s) ^ 1;
            let i2 = (j2 ^ s) ^ 1;
            let imm10 = u32::from(hw1 & 0x3FF);
            let imm = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
            let mnemonic = if op1 & 0b100 == 0 {
                Mnemonic::B
            } else {
                Mnemonic::Bl
            };
            Ok(at.with_mnemonic(mnemonic).with_imm(sign_extend(imm, 25)))
        }
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn system_control(at: Instruction, op: u16, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    match op {
        0x38 | 0x39 => {
            let rn = reg(hw1, 0);
            let mask = (hw2 >> 10) & 0x3;
            let sysm = hw2 & 0xFF;
            if matches!(rn, Register::Sp | Register::Pc)
                || mask == 0
                || (mask != 0b10 && sysm > 3)
            {
                return Err(FaultCode::UnpredictableInstruction);
            }
            Ok(at
                .with_mnemonic(Mnemonic::Msr)
                .with_rn(rn)
                .with_imm(u32::from(sysm) | (u32::from(mask) << 8)))
        }
        0x3A => {
            if hw2 & 0x0700 != 0 {
                return Err(FaultCode::UndefinedInstruction);
            }
            // Unallocated hints and DBG execute as NOP.
            let mnemonic = match hw2 & 0xFF {
                1 => Mnemonic::Yield,
                2 => Mnemonic::Wfe,
                3 => Mnemonic::Wfi,
                4 => Mnemonic::Sev,
                _ => Mnemonic::Nop,
            };
            Ok(at.with_mnemonic(mnemonic))
        }
        0x3B => {
            let mnemonic = match (hw2 >> 4) & 0xF {
                0x2 => Mnemonic::Clrex,
                0x4 => Mnemonic::Dsb,
                0x5 => Mnemonic::Dmb,
                0x6 => Mnemonic::Isb,
                _ => return Err(FaultCode::UndefinedInstruction),
            };
            Ok(at.with_mnemonic(mnemonic))
        }
        0x3E | 0x3F => {
            let rd = reg(hw2, 8);
            if matches!(rd, Register::Sp | Register::Pc) {
                return Err(FaultCode::UnpredictableInstruction);
            }
            Ok(at
                .with_mnemonic(Mnemonic::Mrs)
                .with_rd(rd)
                .with_imm(u32::from(hw2 & 0xFF)))
        }
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

/// Applies the immediate or register offset forms shared by single loads and stores.
fn single_transfer_addressing(
    at: Instruction,
    hw1: u16,
    hw2: u16,
) -> Result<Instruction, FaultCode> {
    if bit(hw1, 7) {
        return Ok(at.with_imm(u32::from(hw2 & 0xFFF)));
    }

    if bit(hw2, 11) {
        let puw = ((hw2 >> 8) & 0x7) as u8;
        return match puw {
            0b110 => Err(FaultCode::UnsupportedInstruction),
            0b000 | 0b010 => Err(FaultCode::UndefinedInstruction),
            _ => Ok(at
                .with_imm(u32::from(hw2 & 0xFF))
                .with_addressing(Addressing::from_puw(puw))),
        };
    }

    if hw2 & 0x0FC0 == 0 {
        return Ok(at
            .with_rm(reg(hw2, 0))
            .with_shift(Shift::lsl(((hw2 >> 4) & 0x3) as u8)));
    }

    Err(FaultCode::UndefinedInstruction)
}

fn store_single(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let rn = reg(hw1, 0);
    if rn == Register::Pc {
        return Err(FaultCode::UndefinedInstruction);
    }

    let mnemonic = match (hw1 >> 5) & 0x3 {
        0 => Mnemonic::Strb,
        1 => Mnemonic::Strh,
        2 => Mnemonic::Str,
        _ => return Err(FaultCode::UndefinedInstruction),
    };
    let at = at
        .with_mnemonic(mnemonic)
        .with_rt(reg(hw2, 12))
        .with_rn(rn);
    single_transfer_addressing(at, hw1, hw2)
}

fn load_single(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let rn = reg(hw1, 0);
    let rt = reg(hw2, 12);
    let size = (hw1 >> 5) & 0x3;

    let mnemonic = match (size, bit(hw1, 8)) {
        (0, false) => Mnemonic::Ldrb,
        (0, true) => Mnemonic::Ldrsb,
        (1, false) => Mnemonic::Ldrh,
        (1, true) => Mnemonic::Ldrsh,
        (2, false) => Mnemonic::Ldr,
        _ => return Err(FaultCode::UndefinedInstruction),
    };

    // Byte and halfword loads into PC are preload hints.
    if rt == Register::Pc && size < 2 {
        return Ok(at.with_mnemonic(Mnemonic::Nop));
    }

    let at = at.with_mnemonic(mnemonic).with_rt(rt).with_rn(rn);
    if rn == Register::Pc {
        let addressing = Addressing {
            add: bit(hw1, 7),
            ..Addressing::default()
        };
        return Ok(at
            .with_imm(u32::from(hw2 & 0xFFF))
            .with_addressing(addressing));
    }
    single_transfer_addressing(at, hw1, hw2)
}

fn data_processing_register(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    if hw2 & 0xF000 != 0xF000 {
        return Err(FaultCode::UndefinedInstruction);
    }

    let op1 = (hw1 >> 4) & 0xF;
    let op2 = (hw2 >> 4) & 0xF;
    let rn = reg(hw1, 0);
    let rd = reg(hw2, 8);
    let rm = reg(hw2, 0);

    if op2 == 0 && op1 & 0x8 == 0 {
        let mnemonic = match op1 >> 1 {
            0 => Mnemonic::Lsl,
            1 => Mnemonic::Lsr,
            2 => Mnemonic::Asr,
            _ => Mnemonic::Ror,
        };
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(rd)
            .with_rm(rn)
            .with_rn(rm)
            .with_setflags(op1 & 0x1 != 0));
    }

    if op2 & 0x8 != 0 && op1 & 0x8 == 0 {
        let mnemonic = match op1 {
            0b0000 => Mnemonic::Sxth,
            0b0001 => Mnemonic::Uxth,
            0b0100 => Mnemonic::Sxtb,
            0b0101 => Mnemonic::Uxtb,
            _ => return Err(FaultCode::UnsupportedInstruction),
        };
        if rn != Register::Pc {
            // Extend-and-add forms belong to the DSP extension.
            return Err(FaultCode::UnsupportedInstruction);
        }
        let rotation = Shift {
            kind: ShiftKind::Ror,
            amount: (((hw2 >> 4) & 0x3) as u8) * 8,
        };
        return Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(rd)
            .with_rm(rm)
            .with_shift(rotation));
    }

    if op2 & 0xC == 0x8 && op1 & 0xC == 0x8 {
        let mnemonic = match (op1 & 0x3, op2 & 0x3) {
            (1, 0) => Mnemonic::Rev,
            (1, 1) => Mnemonic::Rev16,
            (1, 2) => Mnemonic::Rbit,
            (1, 3) => Mnemonic::Revsh,
            (3, 0) => Mnemonic::Clz,
            _ => return Err(FaultCode::UnsupportedInstruction),
        };
        if rn != rm {
            return Err(FaultCode::UnpredictableInstruction);
        }
        return Ok(at.with_mnemonic(mnemonic).with_rd(rd).with_rm(rm));
    }

    Err(FaultCode::UnsupportedInstruction)
}

fn multiply_accumulate(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let op1 = (hw1 >> 4) & 0x7;
    let op2 = (hw2 >> 4) & 0x3;
    if op1 != 0 || hw2 & 0x00C0 != 0 {
        return Err(FaultCode::UnsupportedInstruction);
    }

    let ra = reg(hw2, 12);
    let at = at
        .with_rd(reg(hw2, 8))
        .with_rn(reg(hw1, 0))
        .with_rm(reg(hw2, 0));
    match op2 {
        0 if ra == Register::Pc => Ok(at.with_mnemonic(Mnemonic::Mul)),
        0 => Ok(at.with_mnemonic(Mnemonic::Mla).with_ra(ra)),
        1 => Ok(at.with_mnemonic(Mnemonic::Mls).with_ra(ra)),
        _ => Err(FaultCode::UndefinedInstruction),
    }
}

fn long_multiply_divide(at: Instruction, hw1: u16, hw2: u16) -> Result<Instruction, FaultCode> {
    let op1 = (hw1 >> 4) & 0x7;
    let op2 = (hw2 >> 4) & 0xF;
    let rn = reg(hw1, 0);
    let rm = reg(hw2, 0);
    let lo = reg(hw2, 12);
    let hi = reg(hw2, 8);

    let long = |mnemonic| {
        if lo == hi {
            return Err(FaultCode::UnpredictableInstruction);
        }
        Ok(at
            .with_mnemonic(mnemonic)
            .with_rt(lo)
            .with_rt2(hi)
            .with_rn(rn)
            .with_rm(rm))
    };
    let divide = |mnemonic| {
        if lo != Register::Pc {
            return Err(FaultCode::UndefinedInstruction);
        }
        Ok(at
            .with_mnemonic(mnemonic)
            .with_rd(hi)
            .with_rn(rn)
            .with_rm(rm))
    };

    match (op1, op2) {
        (0b000, 0x0) => long(Mnemonic::Smull),
        (0b001, 0xF) => divide(Mnemonic::Sdiv),
        (0b010, 0x0) => long(Mnemonic::Umull),
        (0b011, 0xF) => divide(Mnemonic::Udiv),
        (0b100, 0x0) => long(Mnemonic::Smlal),
        (0b110, 0x0) => long(Mnemonic::Umlal),
        _ => Err(FaultCode::UnsupportedInstruction),
    }
}

//! Instruction execution.
//!
//! Every operand access goes through the hook-raising internal accessors of
//! [`Emulator`], and every control-flow change through one of the three
//! program-counter write paths. Condition evaluation, IT bookkeeping and the
//! sequential `PC` advance are the pipeline's job, not the executor's.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

mod arith;
mod flags;

pub use arith::{
    add_with_carry, decode_imm_shift, shift, shift_c, thumb_expand_imm, thumb_expand_imm_c,
};
pub use flags::FlagsUpdate;

use crate::decoder::{Instruction, Mnemonic, ShiftKind};
use crate::memory::is_aligned;
use crate::{Emulator, FaultCode, Register, ReturnCode, CCR_DIV_0_TRP, CCR_UNALIGN_TRP};

const SYSM_MSP: u32 = 8;
const SYSM_PSP: u32 = 9;
const SYSM_PRIMASK: u32 = 16;
const SYSM_BASEPRI: u32 = 17;
const SYSM_BASEPRI_MAX: u32 = 18;
const SYSM_FAULTMASK: u32 = 19;
const SYSM_CONTROL: u32 = 20;

/// Executes one decoded instruction whose condition has already passed.
///
/// # Errors
///
/// Returns the fault raised by the instruction. Effects performed before the
/// fault are not rolled back.
pub(crate) fn execute(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    match instr.mnemonic {
        Mnemonic::And
        | Mnemonic::Orr
        | Mnemonic::Eor
        | Mnemonic::Bic
        | Mnemonic::Orn
        | Mnemonic::Mvn
        | Mnemonic::Mov
        | Mnemonic::Tst
        | Mnemonic::Teq => execute_logical(emu, instr),
        Mnemonic::Add
        | Mnemonic::Adc
        | Mnemonic::Sub
        | Mnemonic::Sbc
        | Mnemonic::Rsb
        | Mnemonic::Cmp
        | Mnemonic::Cmn => execute_arithmetic(emu, instr),
        Mnemonic::Lsl | Mnemonic::Lsr | Mnemonic::Asr | Mnemonic::Ror => execute_shift(emu, instr),
        Mnemonic::Adr => execute_adr(emu, instr),
        Mnemonic::Movt => execute_movt(emu, instr),
        Mnemonic::Mul | Mnemonic::Mla | Mnemonic::Mls => execute_multiply(emu, instr),
        Mnemonic::Umull | Mnemonic::Smull | Mnemonic::Umlal | Mnemonic::Smlal => {
            execute_long_multiply(emu, instr)
        }
        Mnemonic::Sdiv | Mnemonic::Udiv => execute_divide(emu, instr),
        Mnemonic::Clz | Mnemonic::Rbit | Mnemonic::Rev | Mnemonic::Rev16 | Mnemonic::Revsh => {
            execute_bit_reverse(emu, instr)
        }
        Mnemonic::Sxtb | Mnemonic::Sxth | Mnemonic::Uxtb | Mnemonic::Uxth => {
            execute_extend(emu, instr)
        }
        Mnemonic::Bfc | Mnemonic::Bfi | Mnemonic::Sbfx | Mnemonic::Ubfx => {
            execute_bitfield(emu, instr)
        }
        Mnemonic::Ldr
        | Mnemonic::Ldrb
        | Mnemonic::Ldrh
        | Mnemonic::Ldrsb
        | Mnemonic::Ldrsh
        | Mnemonic::Str
        | Mnemonic::Strb
        | Mnemonic::Strh => execute_single_transfer(emu, instr),
        Mnemonic::Ldrd | Mnemonic::Strd => execute_dual_transfer(emu, instr),
        Mnemonic::Ldm | Mnemonic::Ldmdb | Mnemonic::Pop => execute_load_multiple(emu, instr),
        Mnemonic::Stm | Mnemonic::Stmdb | Mnemonic::Push => execute_store_multiple(emu, instr),
        Mnemonic::Ldrex | Mnemonic::Ldrexb | Mnemonic::Ldrexh => execute_load_exclusive(emu, instr),
        Mnemonic::Strex | Mnemonic::Strexb | Mnemonic::Strexh => {
            execute_store_exclusive(emu, instr)
        }
        Mnemonic::Clrex => {
            emu.clear_exclusive_monitors();
            Ok(())
        }
        Mnemonic::B | Mnemonic::Bl | Mnemonic::Bx | Mnemonic::Blx => execute_branch(emu, instr),
        Mnemonic::Cbz | Mnemonic::Cbnz => execute_compare_branch(emu, instr),
        Mnemonic::Tbb | Mnemonic::Tbh => execute_table_branch(emu, instr),
        Mnemonic::It => {
            emu.cpu.psr.it_state = imm(instr)? as u8;
            Ok(())
        }
        Mnemonic::Cps => {
            execute_cps(emu, imm(instr)?);
            Ok(())
        }
        Mnemonic::Mrs => execute_mrs(emu, instr),
        Mnemonic::Msr => execute_msr(emu, instr),
        Mnemonic::Bkpt => {
            emu.request_stop(ReturnCode::BreakpointReached);
            Ok(())
        }
        Mnemonic::Nop
        | Mnemonic::Yield
        | Mnemonic::Wfe
        | Mnemonic::Wfi
        | Mnemonic::Sev
        | Mnemonic::Dmb
        | Mnemonic::Dsb
        | Mnemonic::Isb => Ok(()),
        Mnemonic::Udf => Err(FaultCode::UndefinedInstruction),
        Mnemonic::Svc => Err(FaultCode::UnsupportedInstruction),
    }
}

fn operand(reg: Option<Register>) -> Result<Register, FaultCode> {
    reg.ok_or(FaultCode::UndefinedInstruction)
}

fn imm(instr: &Instruction) -> Result<u32, FaultCode> {
    instr.imm.ok_or(FaultCode::UndefinedInstruction)
}

fn read(emu: &mut Emulator, reg: Option<Register>) -> Result<u32, FaultCode> {
    Ok(emu.read_register_internal(operand(reg)?))
}

fn write(emu: &mut Emulator, reg: Option<Register>, value: u32) -> Result<(), FaultCode> {
    emu.write_register_internal(operand(reg)?, value);
    Ok(())
}

/// Word-aligned `PC` value used by literal addressing.
fn literal_base(emu: &mut Emulator) -> u32 {
    emu.read_register_internal(Register::Pc) & !3
}

/// Second operand after immediate expansion or the barrel shifter, with its
/// carry-out.
fn shifter_operand(emu: &mut Emulator, instr: &Instruction) -> Result<(u32, bool), FaultCode> {
    let carry = emu.cpu.psr.c;
    if let Some(value) = instr.imm {
        return Ok((value, instr.imm_carry.unwrap_or(carry)));
    }
    let value = read(emu, instr.rm)?;
    Ok(shift_c(
        value,
        instr.shift.kind,
        u32::from(instr.shift.amount),
        carry,
    ))
}

fn commit_flags(emu: &mut Emulator, instr: &Instruction, update: FlagsUpdate) {
    if instr.setflags {
        update.apply(&mut emu.cpu.psr);
    }
}

fn execute_logical(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (op2, carry) = shifter_operand(emu, instr)?;
    let result = match instr.mnemonic {
        Mnemonic::Mov => op2,
        Mnemonic::Mvn => !op2,
        Mnemonic::And | Mnemonic::Tst => read(emu, instr.rn)? & op2,
        Mnemonic::Orr => read(emu, instr.rn)? | op2,
        Mnemonic::Orn => read(emu, instr.rn)? | !op2,
        Mnemonic::Eor | Mnemonic::Teq => read(emu, instr.rn)? ^ op2,
        _ => read(emu, instr.rn)? & !op2,
    };

    if !matches!(instr.mnemonic, Mnemonic::Tst | Mnemonic::Teq) {
        write(emu, instr.rd, result)?;
    }
    commit_flags(emu, instr, FlagsUpdate::logical(result, Some(carry)));
    Ok(())
}

fn execute_arithmetic(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (op2, _) = shifter_operand(emu, instr)?;
    let rn = read(emu, instr.rn)?;
    let carry = emu.cpu.psr.c;

    let (result, carry, overflow) = match instr.mnemonic {
        Mnemonic::Add | Mnemonic::Cmn => add_with_carry(rn, op2, false),
        Mnemonic::Adc => add_with_carry(rn, op2, carry),
        Mnemonic::Sbc => add_with_carry(rn, !op2, carry),
        Mnemonic::Rsb => add_with_carry(op2, !rn, true),
        _ => add_with_carry(rn, !op2, true),
    };

    if !matches!(instr.mnemonic, Mnemonic::Cmp | Mnemonic::Cmn) {
        write(emu, instr.rd, result)?;
    }
    commit_flags(
        emu,
        instr,
        FlagsUpdate::arithmetic(result, carry, overflow),
    );
    Ok(())
}

fn execute_shift(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let value = read(emu, instr.rm)?;
    let (kind, amount) = if instr.rn.is_some() {
        let kind = match instr.mnemonic {
            Mnemonic::Lsl => ShiftKind::Lsl,
            Mnemonic::Lsr => ShiftKind::Lsr,
            Mnemonic::Asr => ShiftKind::Asr,
            _ => ShiftKind::Ror,
        };
        (kind, read(emu, instr.rn)? & 0xFF)
    } else {
        (instr.shift.kind, u32::from(instr.shift.amount))
    };

    let (result, carry) = shift_c(value, kind, amount, emu.cpu.psr.c);
    write(emu, instr.rd, result)?;
    commit_flags(emu, instr, FlagsUpdate::logical(result, Some(carry)));
    Ok(())
}

fn execute_adr(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let base = literal_base(emu);
    let offset = imm(instr)?;
    let result = if instr.addressing.add {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    write(emu, instr.rd, result)
}

fn execute_movt(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let low = read(emu, instr.rd)? & 0xFFFF;
    write(emu, instr.rd, (imm(instr)? << 16) | low)
}

fn execute_multiply(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let product = read(emu, instr.rn)?.wrapping_mul(read(emu, instr.rm)?);
    let result = match instr.mnemonic {
        Mnemonic::Mla => read(emu, instr.ra)?.wrapping_add(product),
        Mnemonic::Mls => read(emu, instr.ra)?.wrapping_sub(product),
        _ => product,
    };
    write(emu, instr.rd, result)?;
    commit_flags(emu, instr, FlagsUpdate::logical(result, None));
    Ok(())
}

fn execute_long_multiply(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let rn = read(emu, instr.rn)?;
    let rm = read(emu, instr.rm)?;
    let product = match instr.mnemonic {
        Mnemonic::Smull | Mnemonic::Smlal => {
            (i64::from(rn as i32) * i64::from(rm as i32)) as u64
        }
        _ => u64::from(rn) * u64::from(rm),
    };
    let result = if matches!(instr.mnemonic, Mnemonic::Umlal | Mnemonic::Smlal) {
        let accumulator = (u64::from(read(emu, instr.rt2)?) << 32) | u64::from(read(emu, instr.rt)?);
        product.wrapping_add(accumulator)
    } else {
        product
    };
    write(emu, instr.rt, result as u32)?;
    write(emu, instr.rt2, (result >> 32) as u32)
}

fn execute_divide(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let dividend = read(emu, instr.rn)?;
    let divisor = read(emu, instr.rm)?;
    let result = if divisor == 0 {
        if emu.cpu.ccr & CCR_DIV_0_TRP != 0 {
            return Err(FaultCode::DivideByZero);
        }
        0
    } else if instr.mnemonic == Mnemonic::Sdiv {
        (dividend as i32).wrapping_div(divisor as i32) as u32
    } else {
        dividend / divisor
    };
    write(emu, instr.rd, result)
}

fn execute_bit_reverse(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let value = read(emu, instr.rm)?;
    let result = match instr.mnemonic {
        Mnemonic::Clz => value.leading_zeros(),
        Mnemonic::Rbit => value.reverse_bits(),
        Mnemonic::Rev => value.swap_bytes(),
        Mnemonic::Rev16 => ((value & 0x00FF_00FF) << 8) | ((value >> 8) & 0x00FF_00FF),
        _ => i32::from((value as u16).swap_bytes() as i16) as u32,
    };
    write(emu, instr.rd, result)
}

fn execute_extend(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let rotated = read(emu, instr.rm)?.rotate_right(u32::from(instr.shift.amount));
    let result = match instr.mnemonic {
        Mnemonic::Sxtb => i32::from(rotated as i8) as u32,
        Mnemonic::Sxth => i32::from(rotated as i16) as u32,
        Mnemonic::Uxtb => rotated & 0xFF,
        _ => rotated & 0xFFFF,
    };
    write(emu, instr.rd, result)
}

fn execute_bitfield(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let field = instr.bitfield.ok_or(FaultCode::UndefinedInstruction)?;
    let lsb = u32::from(field.lsb);
    let width = u32::from(field.width);
    let low_mask = u32::MAX >> (32 - width);

    let result = match instr.mnemonic {
        Mnemonic::Bfc => read(emu, instr.rd)? & !(low_mask << lsb),
        Mnemonic::Bfi => {
            let source = read(emu, instr.rn)?;
            let destination = read(emu, instr.rd)?;
            (destination & !(low_mask << lsb)) | ((source & low_mask) << lsb)
        }
        Mnemonic::Ubfx => (read(emu, instr.rn)? >> lsb) & low_mask,
        _ => {
            let source = read(emu, instr.rn)?;
            (((source << (32 - lsb - width)) as i32) >> (32 - width)) as u32
        }
    };
    write(emu, instr.rd, result)
}

/// Faults unaligned accesses that the configuration does not permit.
///
/// `strict` accesses (multiple, exclusive and dual transfers) must always be
/// aligned.
fn check_alignment(
    emu: &Emulator,
    address: u32,
    width: u8,
    strict: bool,
) -> Result<(), FaultCode> {
    if is_aligned(address, width) {
        return Ok(());
    }
    let trapped = strict
        || !emu.config.architecture.supports_unaligned()
        || emu.cpu.ccr & CCR_UNALIGN_TRP != 0;
    if trapped {
        Err(FaultCode::UnalignedAccess)
    } else {
        Ok(())
    }
}

/// Resolves `(access address, written-back base)` for single and dual
/// transfers.
fn transfer_address(emu: &mut Emulator, instr: &Instruction) -> Result<(u32, u32), FaultCode> {
    let rn = operand(instr.rn)?;
    let base = if rn == Register::Pc {
        literal_base(emu)
    } else {
        emu.read_register_internal(rn)
    };

    let offset = match instr.imm {
        Some(offset) => offset,
        None => shift(
            read(emu, instr.rm)?,
            ShiftKind::Lsl,
            u32::from(instr.shift.amount),
            false,
        ),
    };
    let offset_address = if instr.addressing.add {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    let address = if instr.addressing.index {
        offset_address
    } else {
        base
    };
    Ok((address, offset_address))
}

fn execute_single_transfer(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (address, offset_address) = transfer_address(emu, instr)?;
    let width = match instr.mnemonic {
        Mnemonic::Ldr | Mnemonic::Str => 4,
        Mnemonic::Ldrh | Mnemonic::Ldrsh | Mnemonic::Strh => 2,
        _ => 1,
    };
    let rt = operand(instr.rt)?;

    if matches!(
        instr.mnemonic,
        Mnemonic::Str | Mnemonic::Strh | Mnemonic::Strb
    ) {
        check_alignment(emu, address, width, false)?;
        let value = emu.read_register_internal(rt);
        emu.write_memory_internal(address, width, value)?;
        if instr.addressing.writeback {
            write(emu, instr.rn, offset_address)?;
        }
        return Ok(());
    }

    check_alignment(emu, address, width, rt == Register::Pc)?;
    let raw = emu.read_memory_internal(address, width)?;
    let value = match instr.mnemonic {
        Mnemonic::Ldrsb => i32::from(raw as i8) as u32,
        Mnemonic::Ldrsh => i32::from(raw as i16) as u32,
        _ => raw,
    };
    if instr.addressing.writeback {
        write(emu, instr.rn, offset_address)?;
    }
    if rt == Register::Pc {
        emu.bx_write_pc(value);
    } else {
        emu.write_register_internal(rt, value);
    }
    Ok(())
}

fn execute_dual_transfer(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (address, offset_address) = transfer_address(emu, instr)?;
    check_alignment(emu, address, 4, true)?;
    let second = address.wrapping_add(4);

    if instr.mnemonic == Mnemonic::Ldrd {
        let low = emu.read_memory_internal(address, 4)?;
        let high = emu.read_memory_internal(second, 4)?;
        if instr.addressing.writeback {
            write(emu, instr.rn, offset_address)?;
        }
        write(emu, instr.rt, low)?;
        write(emu, instr.rt2, high)
    } else {
        let low = read(emu, instr.rt)?;
        let high = read(emu, instr.rt2)?;
        emu.write_memory_internal(address, 4, low)?;
        emu.write_memory_internal(second, 4, high)?;
        if instr.addressing.writeback {
            write(emu, instr.rn, offset_address)?;
        }
        Ok(())
    }
}

/// Lowest address and written-back base of a multiple transfer.
fn multiple_span(emu: &mut Emulator, instr: &Instruction) -> Result<(u32, u32), FaultCode> {
    let base = read(emu, instr.rn)?;
    let span = 4 * instr.register_list.count_ones();
    let decrement = matches!(
        instr.mnemonic,
        Mnemonic::Ldmdb | Mnemonic::Stmdb | Mnemonic::Push
    );
    if decrement {
        let start = base.wrapping_sub(span);
        Ok((start, start))
    } else {
        Ok((base, base.wrapping_add(span)))
    }
}

fn listed(list: u16) -> impl Iterator<Item = Register> {
    (0_u8..16)
        .filter(move |&bit| list & (1_u16 << bit) != 0)
        .map(Register::from_index)
}

fn execute_load_multiple(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (start, writeback_value) = multiple_span(emu, instr)?;
    check_alignment(emu, start, 4, true)?;

    let mut address = start;
    let mut new_pc = None;
    for reg in listed(instr.register_list) {
        let value = emu.read_memory_internal(address, 4)?;
        address = address.wrapping_add(4);
        if reg == Register::Pc {
            new_pc = Some(value);
        } else {
            emu.write_register_internal(reg, value);
        }
    }
    if let Some(target) = new_pc {
        emu.bx_write_pc(target);
    }

    let rn = operand(instr.rn)?;
    if instr.addressing.writeback && instr.register_list & (1_u16 << rn.index()) == 0 {
        emu.write_register_internal(rn, writeback_value);
    }
    Ok(())
}

fn execute_store_multiple(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let (start, writeback_value) = multiple_span(emu, instr)?;
    check_alignment(emu, start, 4, true)?;

    let mut address = start;
    for reg in listed(instr.register_list) {
        let value = emu.read_register_internal(reg);
        emu.write_memory_internal(address, 4, value)?;
        address = address.wrapping_add(4);
    }

    if instr.addressing.writeback {
        write(emu, instr.rn, writeback_value)?;
    }
    Ok(())
}

const fn exclusive_width(mnemonic: Mnemonic) -> u8 {
    match mnemonic {
        Mnemonic::Ldrexb | Mnemonic::Strexb => 1,
        Mnemonic::Ldrexh | Mnemonic::Strexh => 2,
        _ => 4,
    }
}

fn execute_load_exclusive(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let width = exclusive_width(instr.mnemonic);
    let address = read(emu, instr.rn)?.wrapping_add(instr.imm.unwrap_or(0));
    check_alignment(emu, address, width, true)?;

    let value = emu.read_memory_internal(address, width)?;
    emu.set_exclusive_monitors(address, u32::from(width));
    write(emu, instr.rt, value)
}

fn execute_store_exclusive(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let width = exclusive_width(instr.mnemonic);
    let address = read(emu, instr.rn)?.wrapping_add(instr.imm.unwrap_or(0));
    check_alignment(emu, address, width, true)?;

    let status = if emu.exclusive_monitors_pass(address, u32::from(width)) {
        let value = read(emu, instr.rt)?;
        emu.write_memory_internal(address, width, value)?;
        0
    } else {
        1
    };
    emu.clear_exclusive_monitors();
    write(emu, instr.rd, status)
}

fn execute_branch(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let next = instr.address.wrapping_add(instr.size);
    match instr.mnemonic {
        Mnemonic::B => {
            let target = instr.address.wrapping_add(4).wrapping_add(imm(instr)?);
            emu.branch_write_pc(target);
        }
        Mnemonic::Bl => {
            let target = instr.address.wrapping_add(4).wrapping_add(imm(instr)?);
            emu.write_register_internal(Register::Lr, next | 1);
            emu.branch_write_pc(target);
        }
        Mnemonic::Bx => {
            let target = read(emu, instr.rm)?;
            emu.bx_write_pc(target);
        }
        _ => {
            let target = read(emu, instr.rm)?;
            emu.blx_write_pc(target, next);
        }
    }
    Ok(())
}

fn execute_compare_branch(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let is_zero = read(emu, instr.rn)? == 0;
    if is_zero == (instr.mnemonic == Mnemonic::Cbz) {
        let target = instr.address.wrapping_add(4).wrapping_add(imm(instr)?);
        emu.branch_write_pc(target);
    }
    Ok(())
}

fn execute_table_branch(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let base = read(emu, instr.rn)?;
    let index = read(emu, instr.rm)?;
    let halfwords = if instr.mnemonic == Mnemonic::Tbh {
        let address = base.wrapping_add(index << 1);
        check_alignment(emu, address, 2, false)?;
        emu.read_memory_internal(address, 2)?
    } else {
        emu.read_memory_internal(base.wrapping_add(index), 1)?
    };
    let target = instr.address.wrapping_add(4).wrapping_add(halfwords << 1);
    emu.branch_write_pc(target);
    Ok(())
}

/// `CPSIE`/`CPSID`: bit 4 disables, bit 1 selects `PRIMASK`, bit 0 `FAULTMASK`.
fn execute_cps(emu: &mut Emulator, fields: u32) {
    if !emu.in_privileged_mode() {
        return;
    }
    let disable = fields & 0x10 != 0;
    if fields & 0x2 != 0 {
        emu.cpu.primask = u8::from(disable);
    }
    if fields & 0x1 != 0 {
        if !disable {
            emu.cpu.faultmask = 0;
        } else if emu.execution_priority() > -1 {
            emu.cpu.faultmask = 1;
        }
    }
}

fn execute_mrs(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let sysm = imm(instr)? & 0xFF;
    let value = match sysm {
        // APSR, IAPSR, EAPSR, XPSR; IPSR is zero in thread mode and the
        // execution-state bits read as zero.
        0..=3 => emu.cpu.psr.apsr(),
        4..=7 => 0,
        SYSM_MSP | SYSM_PSP => emu.read_register_internal(Register::Sp),
        SYSM_PRIMASK => u32::from(emu.cpu.primask & 1),
        SYSM_BASEPRI | SYSM_BASEPRI_MAX => u32::from(emu.cpu.basepri),
        SYSM_FAULTMASK => u32::from(emu.cpu.faultmask & 1),
        SYSM_CONTROL => u32::from(emu.cpu.control & 0x3),
        _ => 0,
    };
    write(emu, instr.rd, value)
}

fn execute_msr(emu: &mut Emulator, instr: &Instruction) -> Result<(), FaultCode> {
    let fields = imm(instr)?;
    let sysm = fields & 0xFF;
    let mask = fields >> 8;
    let value = read(emu, instr.rn)?;

    if sysm <= 7 {
        if sysm & 0x4 == 0 && mask & 0x2 != 0 {
            emu.cpu.psr.set_apsr(value);
        }
        return Ok(());
    }
    if !emu.in_privileged_mode() {
        return Ok(());
    }

    match sysm {
        SYSM_MSP | SYSM_PSP => emu.write_register_internal(Register::Sp, value),
        SYSM_PRIMASK => emu.cpu.primask = (value & 1) as u8,
        SYSM_BASEPRI => emu.cpu.basepri = value as u8,
        SYSM_BASEPRI_MAX => {
            let requested = value as u8;
            if requested != 0 && (emu.cpu.basepri == 0 || requested < emu.cpu.basepri) {
                emu.cpu.basepri = requested;
            }
        }
        SYSM_FAULTMASK => {
            if value & 1 == 0 {
                emu.cpu.faultmask = 0;
            } else if emu.execution_priority() > -1 {
                emu.cpu.faultmask = 1;
            }
        }
        SYSM_CONTROL => emu.cpu.control = (value & 0x3) as u8,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::execute;
    use crate::decoder::{Addressing, Instruction, Mnemonic, Shift, ShiftKind};
    use crate::{
        Architecture, Emulator, FaultCode, Register, ReturnCode, CCR_DIV_0_TRP, CCR_UNALIGN_TRP,
        CONTROL_NPRIV,
    };

    const CODE: u32 = 0x0000_0100;
    const RAM: u32 = 0x2000_0000;

    fn emulator() -> Emulator {
        let mut emu = Emulator::new(Architecture::ArmV7M);
        emu.set_flash_region(0, 0x400).expect("flash");
        emu.set_ram_region(RAM, 0x100).expect("ram");
        emu.write_register(Register::Pc, CODE);
        emu
    }

    fn op(mnemonic: Mnemonic) -> Instruction {
        Instruction::new(mnemonic, CODE, 2, 0)
    }

    #[test]
    fn subtract_sets_borrow_as_not_carry() {
        let mut emu = emulator();
        emu.write_register(Register::R1, 3);
        let instr = op(Mnemonic::Sub)
            .with_rd(Register::R0)
            .with_rn(Register::R1)
            .with_imm(5)
            .with_setflags(true);
        execute(&mut emu, &instr).expect("executes");

        assert_eq!(emu.read_register(Register::R0), 0xFFFF_FFFE);
        let psr = emu.cpu_state().psr;
        assert!(psr.n && !psr.z && !psr.c && !psr.v);
    }

    #[test]
    fn compare_writes_only_flags() {
        let mut emu = emulator();
        emu.write_register(Register::R0, 7);
        emu.write_register(Register::R1, 7);
        let instr = op(Mnemonic::Cmp)
            .with_rn(Register::R0)
            .with_rm(Register::R1)
            .with_setflags(true);
        execute(&mut emu, &instr).expect("executes");

        let psr = emu.cpu_state().psr;
        assert!(psr.z && psr.c);
        assert_eq!(emu.read_register(Register::R0), 7);
    }

    #[test]
    fn logical_immediate_without_rotation_keeps_carry() {
        let mut emu = emulator();
        emu.cpu.psr.c = true;
        let instr = op(Mnemonic::Mov)
            .with_rd(Register::R2)
            .with_imm(0)
            .with_setflags(true);
        execute(&mut emu, &instr).expect("executes");
        assert!(emu.cpu.psr.z && emu.cpu.psr.c);
    }

    #[rstest]
    #[case(ShiftKind::Lsl, 1, 0x8000_0001, 0x0000_0002, true)]
    #[case(ShiftKind::Lsr, 32, 0x8000_0000, 0, true)]
    #[case(ShiftKind::Asr, 1, 0x8000_0000, 0xC000_0000, false)]
    fn register_controlled_shift_sets_carry(
        #[case] kind: ShiftKind,
        #[case] amount: u32,
        #[case] value: u32,
        #[case] expected: u32,
        #[case] carry: bool,
    ) {
        let mnemonic = match kind {
            ShiftKind::Lsl => Mnemonic::Lsl,
            ShiftKind::Lsr => Mnemonic::Lsr,
            _ => Mnemonic::Asr,
        };
        let mut emu = emulator();
        emu.write_register(Register::R0, value);
        emu.write_register(Register::R1, amount);
        let instr = op(mnemonic)
            .with_rd(Register::R0)
            .with_rm(Register::R0)
            .with_rn(Register::R1)
            .with_setflags(true);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::R0), expected);
        assert_eq!(emu.cpu.psr.c, carry);
    }

    #[test]
    fn divide_by_zero_returns_zero_unless_trapped() {
        let mut emu = emulator();
        emu.write_register(Register::R1, 10);
        let instr = op(Mnemonic::Udiv)
            .with_rd(Register::R0)
            .with_rn(Register::R1)
            .with_rm(Register::R2);
        emu.write_register(Register::R0, 0xFFFF);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0);

        emu.cpu.ccr |= CCR_DIV_0_TRP;
        assert_eq!(execute(&mut emu, &instr), Err(FaultCode::DivideByZero));
    }

    #[test]
    fn signed_divide_truncates_toward_zero() {
        let mut emu = emulator();
        emu.write_register(Register::R1, (-7_i32) as u32);
        emu.write_register(Register::R2, 2);
        let instr = op(Mnemonic::Sdiv)
            .with_rd(Register::R0)
            .with_rn(Register::R1)
            .with_rm(Register::R2);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::R0) as i32, -3);
    }

    #[test]
    fn long_multiply_accumulate_spans_two_registers() {
        let mut emu = emulator();
        emu.write_register(Register::R0, 1);
        emu.write_register(Register::R1, 0);
        emu.write_register(Register::R2, 0xFFFF_FFFF);
        emu.write_register(Register::R3, 0xFFFF_FFFF);
        let instr = op(Mnemonic::Umlal)
            .with_rt(Register::R0)
            .with_rt2(Register::R1)
            .with_rn(Register::R2)
            .with_rm(Register::R3);
        execute(&mut emu, &instr).expect("executes");
        // 0xFFFF_FFFE_0000_0001 + 1
        assert_eq!(emu.read_register(Register::R0), 2);
        assert_eq!(emu.read_register(Register::R1), 0xFFFF_FFFE);
    }

    #[test]
    fn bitfield_insert_and_extract() {
        let mut emu = emulator();
        emu.write_register(Register::R0, 0xFFFF_FFFF);
        emu.write_register(Register::R1, 0x5);
        let insert = op(Mnemonic::Bfi)
            .with_rd(Register::R0)
            .with_rn(Register::R1)
            .with_bitfield(4, 4);
        execute(&mut emu, &insert).expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0xFFFF_FF5F);

        let extract = op(Mnemonic::Sbfx)
            .with_rd(Register::R2)
            .with_rn(Register::R0)
            .with_bitfield(4, 4);
        execute(&mut emu, &extract).expect("executes");
        assert_eq!(emu.read_register(Register::R2), 5);
    }

    #[test]
    fn byte_reversal_family() {
        let mut emu = emulator();
        emu.write_register(Register::R1, 0x1234_5680);
        for (mnemonic, expected) in [
            (Mnemonic::Rev, 0x8056_3412),
            (Mnemonic::Rev16, 0x3412_8056),
            (Mnemonic::Revsh, 0xFFFF_8056),
            (Mnemonic::Clz, 3),
        ] {
            let instr = op(mnemonic).with_rd(Register::R0).with_rm(Register::R1);
            execute(&mut emu, &instr).expect("executes");
            assert_eq!(emu.read_register(Register::R0), expected, "{mnemonic:?}");
        }
    }

    #[test]
    fn literal_load_uses_word_aligned_pc() {
        let mut emu = emulator();
        emu.write_memory(0x108, &0xCAFE_F00D_u32.to_le_bytes()).expect("seed");
        let mut instr = op(Mnemonic::Ldr)
            .with_rt(Register::R0)
            .with_rn(Register::Pc)
            .with_imm(4);
        instr.address = 0x102;
        emu.write_register(Register::Pc, 0x102);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0xCAFE_F00D);
    }

    #[test]
    fn post_indexed_store_writes_back_base() {
        let mut emu = emulator();
        emu.write_register(Register::R0, 0xAB);
        emu.write_register(Register::R1, RAM);
        let instr = op(Mnemonic::Strb)
            .with_rt(Register::R0)
            .with_rn(Register::R1)
            .with_imm(1)
            .with_addressing(Addressing::from_puw(0b011));
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.ram()[0], 0xAB);
        assert_eq!(emu.read_register(Register::R1), RAM + 1);
    }

    #[test]
    fn unaligned_word_access_depends_on_trap_bit() {
        let mut emu = emulator();
        emu.write_register(Register::R1, RAM + 1);
        let instr = op(Mnemonic::Ldr)
            .with_rt(Register::R0)
            .with_rn(Register::R1)
            .with_imm(0);
        execute(&mut emu, &instr).expect("unaligned allowed");

        emu.cpu.ccr |= CCR_UNALIGN_TRP;
        assert_eq!(execute(&mut emu, &instr), Err(FaultCode::UnalignedAccess));
    }

    #[test]
    fn register_offset_is_shifted() {
        let mut emu = emulator();
        emu.write_register(Register::R1, RAM);
        emu.write_register(Register::R2, 3);
        emu.write_memory(RAM + 12, &[0x77]).expect("seed");
        let instr = op(Mnemonic::Ldrb)
            .with_rt(Register::R0)
            .with_rn(Register::R1)
            .with_rm(Register::R2)
            .with_shift(Shift::lsl(2));
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0x77);
    }

    #[test]
    fn push_then_pop_round_trips_through_the_stack() {
        let mut emu = emulator();
        emu.write_register(Register::Sp, RAM + 0x40);
        emu.write_register(Register::R4, 0x44);
        emu.write_register(Register::Lr, 0x201);
        let mut push = op(Mnemonic::Push)
            .with_rn(Register::Sp)
            .with_register_list((1 << 4) | (1 << 14));
        push.addressing.writeback = true;
        execute(&mut emu, &push).expect("push");
        assert_eq!(emu.read_register(Register::Sp), RAM + 0x38);

        emu.write_register(Register::R4, 0);
        let mut pop = op(Mnemonic::Pop)
            .with_rn(Register::Sp)
            .with_register_list((1 << 4) | (1 << 15));
        pop.addressing.writeback = true;
        emu.pc_written = false;
        execute(&mut emu, &pop).expect("pop");
        assert_eq!(emu.read_register(Register::R4), 0x44);
        assert_eq!(emu.read_register(Register::Pc), 0x200);
        assert_eq!(emu.read_register(Register::Sp), RAM + 0x40);
        assert!(emu.pc_written);
    }

    #[test]
    fn multiple_transfer_requires_word_alignment() {
        let mut emu = emulator();
        emu.write_register(Register::R0, RAM + 2);
        let instr = op(Mnemonic::Ldm)
            .with_rn(Register::R0)
            .with_register_list(0b110);
        assert_eq!(execute(&mut emu, &instr), Err(FaultCode::UnalignedAccess));
    }

    #[test]
    fn store_exclusive_succeeds_once_per_tag() {
        let mut emu = emulator();
        emu.write_register(Register::R0, RAM + 8);
        emu.write_register(Register::R1, 0x55);
        let load = op(Mnemonic::Ldrex)
            .with_rt(Register::R2)
            .with_rn(Register::R0)
            .with_imm(0);
        let store = op(Mnemonic::Strex)
            .with_rd(Register::R3)
            .with_rt(Register::R1)
            .with_rn(Register::R0)
            .with_imm(0);

        execute(&mut emu, &load).expect("ldrex");
        execute(&mut emu, &store).expect("strex");
        assert_eq!(emu.read_register(Register::R3), 0);
        assert_eq!(emu.ram()[8], 0x55);

        emu.write_register(Register::R1, 0x66);
        execute(&mut emu, &store).expect("strex");
        assert_eq!(emu.read_register(Register::R3), 1);
        assert_eq!(emu.ram()[8], 0x55);
    }

    #[test]
    fn branch_with_link_sets_thumb_return_address() {
        let mut emu = emulator();
        let mut instr = op(Mnemonic::Bl).with_imm(0x1000);
        instr.size = 4;
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::Lr), (CODE + 4) | 1);
        assert_eq!(emu.read_register(Register::Pc), CODE + 4 + 0x1000);
    }

    #[test]
    fn table_branch_halfword_doubles_offset() {
        let mut emu = emulator();
        emu.write_register(Register::R0, RAM);
        emu.write_register(Register::R1, 1);
        emu.write_memory(RAM + 2, &[0x10, 0x00]).expect("seed");
        let instr = op(Mnemonic::Tbh)
            .with_rn(Register::R0)
            .with_rm(Register::R1);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.read_register(Register::Pc), CODE + 4 + 0x20);
    }

    #[test]
    fn unprivileged_mask_writes_are_ignored() {
        let mut emu = emulator();
        emu.cpu.control = CONTROL_NPRIV;
        execute(&mut emu, &op(Mnemonic::Cps).with_imm(0x12)).expect("executes");
        assert_eq!(emu.cpu.primask, 0);

        emu.cpu.control = 0;
        execute(&mut emu, &op(Mnemonic::Cps).with_imm(0x12)).expect("executes");
        assert_eq!(emu.cpu.primask, 1);
    }

    #[test]
    fn basepri_max_only_raises_priority() {
        let mut emu = emulator();
        emu.cpu.basepri = 0x40;
        emu.write_register(Register::R0, 0x80);
        let instr = op(Mnemonic::Msr)
            .with_rn(Register::R0)
            .with_imm(18 | (0b10 << 8));
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.cpu.basepri, 0x40);

        emu.write_register(Register::R0, 0x20);
        execute(&mut emu, &instr).expect("executes");
        assert_eq!(emu.cpu.basepri, 0x20);
    }

    #[test]
    fn faultmask_cannot_be_set_at_priority_minus_one() {
        let mut emu = emulator();
        emu.cpu.faultmask = 1;
        execute(&mut emu, &op(Mnemonic::Cps).with_imm(0x01)).expect("executes");
        assert_eq!(emu.cpu.faultmask, 0);
        execute(&mut emu, &op(Mnemonic::Cps).with_imm(0x11)).expect("executes");
        assert_eq!(emu.cpu.faultmask, 1);
    }

    #[test]
    fn mrs_reads_flags_and_control() {
        let mut emu = emulator();
        emu.cpu.psr.n = true;
        emu.cpu.psr.c = true;
        execute(&mut emu, &op(Mnemonic::Mrs).with_rd(Register::R0).with_imm(0))
            .expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0xA000_0000);

        emu.cpu.control = 0x3;
        execute(&mut emu, &op(Mnemonic::Mrs).with_rd(Register::R0).with_imm(20))
            .expect("executes");
        assert_eq!(emu.read_register(Register::R0), 0x3);
    }

    #[test]
    fn breakpoint_requests_stop_and_svc_is_unsupported() {
        let mut emu = emulator();
        emu.running = true;
        execute(&mut emu, &op(Mnemonic::Bkpt).with_imm(0)).expect("executes");
        assert_eq!(emu.stop_reason, Some(ReturnCode::BreakpointReached));
        assert!(!emu.is_running());
        assert_eq!(
            execute(&mut emu, &op(Mnemonic::Svc).with_imm(0)),
            Err(FaultCode::UnsupportedInstruction)
        );
    }
}

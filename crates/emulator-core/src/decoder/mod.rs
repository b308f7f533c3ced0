//! Thumb instruction decoder.
//!
//! Decoding turns one or two halfwords into an immutable [`Instruction`]
//! value. The decoder validates encodings against the configured
//! [`Architecture`] and the IT-block position of the instruction, but never
//! touches CPU state: operands are extracted, not evaluated.

mod thumb16;
mod thumb32;

use crate::{Architecture, Condition, FaultCode, Register};

/// Operation performed by a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Mnemonic {
    Adc,
    Add,
    Adr,
    And,
    Asr,
    B,
    Bfc,
    Bfi,
    Bic,
    Bkpt,
    Bl,
    Blx,
    Bx,
    Cbnz,
    Cbz,
    Clrex,
    Clz,
    Cmn,
    Cmp,
    Cps,
    Dmb,
    Dsb,
    Eor,
    Isb,
    It,
    Ldm,
    Ldmdb,
    Ldr,
    Ldrb,
    Ldrd,
    Ldrex,
    Ldrexb,
    Ldrexh,
    Ldrh,
    Ldrsb,
    Ldrsh,
    Lsl,
    Lsr,
    Mla,
    Mls,
    Mov,
    Movt,
    Mrs,
    Msr,
    Mul,
    Mvn,
    Nop,
    Orn,
    Orr,
    Pop,
    Push,
    Rbit,
    Rev,
    Rev16,
    Revsh,
    Ror,
    Rsb,
    Sbc,
    Sbfx,
    Sdiv,
    Sev,
    Smlal,
    Smull,
    Stm,
    Stmdb,
    Str,
    Strb,
    Strd,
    Strex,
    Strexb,
    Strexh,
    Strh,
    Sub,
    Svc,
    Sxtb,
    Sxth,
    Tbb,
    Tbh,
    Teq,
    Tst,
    Ubfx,
    Udf,
    Udiv,
    Umlal,
    Umull,
    Uxtb,
    Uxth,
    Wfe,
    Wfi,
    Yield,
}

/// Barrel-shifter operation applied to a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ShiftKind {
    /// Logical shift left.
    #[default]
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
    /// Rotate right.
    Ror,
    /// Rotate right by one through carry.
    Rrx,
}

/// Decoded shift applied to `rm` (amount already normalized, `LSR #0` means 32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Shift {
    /// Shift operation.
    pub kind: ShiftKind,
    /// Shift distance in bits.
    pub amount: u8,
}

impl Shift {
    /// Plain left shift by `amount`.
    #[must_use]
    pub const fn lsl(amount: u8) -> Self {
        Self {
            kind: ShiftKind::Lsl,
            amount,
        }
    }
}

/// Addressing flags for loads and stores (`P`, `U` and `W` bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Addressing {
    /// Offset is applied before the access (`P`).
    pub index: bool,
    /// Offset is added rather than subtracted (`U`).
    pub add: bool,
    /// Base register is written back (`W`).
    pub writeback: bool,
}

impl Default for Addressing {
    fn default() -> Self {
        Self {
            index: true,
            add: true,
            writeback: false,
        }
    }
}

impl Addressing {
    /// Decodes the `P:U:W` triple from the low three bits of `puw`.
    #[must_use]
    pub const fn from_puw(puw: u8) -> Self {
        Self {
            index: puw & 0b100 != 0,
            add: puw & 0b010 != 0,
            writeback: puw & 0b001 != 0,
        }
    }
}

/// Bit-field position for `BFC`, `BFI`, `SBFX` and `UBFX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BitField {
    /// Least significant bit of the field.
    pub lsb: u8,
    /// Field width in bits (`1..=32`).
    pub width: u8,
}

/// Position of the instruction being decoded relative to an IT block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItContext {
    /// Instruction sits inside an IT block.
    pub in_it_block: bool,
    /// Instruction is the last one of its IT block.
    pub last_in_it_block: bool,
}

/// Decoded instruction.
///
/// Operand fields are populated per mnemonic; absent operands are `None`.
/// Shift mnemonics (`LSL`, `LSR`, `ASR`, `ROR`) carry the shifted value in
/// `rm`: an immediate distance sits in `shift` with `rn` empty, a register
/// distance sits in `rn`. Long multiplies write `rt` (low) and `rt2` (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Instruction {
    /// Operation.
    pub mnemonic: Mnemonic,
    /// Address the instruction was fetched from.
    pub address: u32,
    /// Encoding size in bytes (2 or 4).
    pub size: u32,
    /// Raw encoding; 32-bit encodings hold the first halfword in the upper half.
    pub raw: u32,
    /// Encoded condition (`AL` unless the encoding carries one).
    pub condition: Condition,
    /// Instruction updates the flags.
    pub setflags: bool,
    /// Destination register.
    pub rd: Option<Register>,
    /// First operand / base register.
    pub rn: Option<Register>,
    /// Second operand / offset register.
    pub rm: Option<Register>,
    /// Transfer register.
    pub rt: Option<Register>,
    /// Second transfer register.
    pub rt2: Option<Register>,
    /// Accumulator register.
    pub ra: Option<Register>,
    /// Immediate operand (already expanded, sign-extended for branches).
    pub imm: Option<u32>,
    /// Carry produced by immediate expansion, `None` when it leaves `C` unchanged.
    pub imm_carry: Option<bool>,
    /// Shift applied to `rm`.
    pub shift: Shift,
    /// Load/store addressing flags.
    pub addressing: Addressing,
    /// Register list for multi-register transfers.
    pub register_list: u16,
    /// Bit-field operand.
    pub bitfield: Option<BitField>,
}

impl Instruction {
    /// Creates an instruction with no operands.
    #[must_use]
    pub const fn new(mnemonic: Mnemonic, address: u32, size: u32, raw: u32) -> Self {
        Self {
            mnemonic,
            address,
            size,
            raw,
            condition: Condition::Al,
            setflags: false,
            rd: None,
            rn: None,
            rm: None,
            rt: None,
            rt2: None,
            ra: None,
            imm: None,
            imm_carry: None,
            shift: Shift {
                kind: ShiftKind::Lsl,
                amount: 0,
            },
            addressing: Addressing {
                index: true,
                add: true,
                writeback: false,
            },
            register_list: 0,
            bitfield: None,
        }
    }

    /// Returns `true` when the instruction may write the program counter.
    #[must_use]
    pub const fn writes_pc(&self) -> bool {
        match self.mnemonic {
            Mnemonic::B | Mnemonic::Bl | Mnemonic::Bx | Mnemonic::Blx => true,
            Mnemonic::Tbb | Mnemonic::Tbh => true,
            Mnemonic::Ldm | Mnemonic::Ldmdb | Mnemonic::Pop => self.register_list & 0x8000 != 0,
            Mnemonic::Ldr => matches!(self.rt, Some(Register::Pc)),
            Mnemonic::Add | Mnemonic::Mov => matches!(self.rd, Some(Register::Pc)),
            _ => false,
        }
    }

    pub(crate) const fn with_mnemonic(mut self, mnemonic: Mnemonic) -> Self {
        self.mnemonic = mnemonic;
        self
    }

    pub(crate) const fn with_rd(mut self, reg: Register) -> Self {
        self.rd = Some(reg);
        self
    }

    pub(crate) const fn with_rn(mut self, reg: Register) -> Self {
        self.rn = Some(reg);
        self
    }

    pub(crate) const fn with_rm(mut self, reg: Register) -> Self {
        self.rm = Some(reg);
        self
    }

    pub(crate) const fn with_rt(mut self, reg: Register) -> Self {
        self.rt = Some(reg);
        self
    }

    pub(crate) const fn with_rt2(mut self, reg: Register) -> Self {
        self.rt2 = Some(reg);
        self
    }

    pub(crate) const fn with_ra(mut self, reg: Register) -> Self {
        self.ra = Some(reg);
        self
    }

    pub(crate) const fn with_imm(mut self, imm: u32) -> Self {
        self.imm = Some(imm);
        self
    }

    pub(crate) const fn with_setflags(mut self, setflags: bool) -> Self {
        self.setflags = setflags;
        self
    }

    pub(crate) const fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub(crate) const fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = shift;
        self
    }

    pub(crate) const fn with_addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    pub(crate) const fn with_register_list(mut self, list: u16) -> Self {
        self.register_list = list;
        self
    }

    pub(crate) const fn with_bitfield(mut self, lsb: u8, width: u8) -> Self {
        self.bitfield = Some(BitField { lsb, width });
        self
    }
}

/// Thumb decoder bound to one architecture profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decoder {
    architecture: Architecture,
}

impl Decoder {
    /// Creates a decoder for `architecture`.
    #[must_use]
    pub const fn new(architecture: Architecture) -> Self {
        Self { architecture }
    }

    /// Architecture profile the decoder validates against.
    #[must_use]
    pub const fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Size in bytes of the instruction starting with `first_halfword`.
    #[must_use]
    pub const fn instruction_size(first_halfword: u16) -> u32 {
        match first_halfword >> 11 {
            0b11101 | 0b11110 | 0b11111 => 4,
            _ => 2,
        }
    }

    /// Decodes the instruction at `address`.
    ///
    /// `second` is ignored for 16-bit encodings.
    ///
    /// # Errors
    ///
    /// Returns [`FaultCode::UndefinedInstruction`] for encodings that are not
    /// defined for the configured architecture and
    /// [`FaultCode::UnpredictableInstruction`] for encodings whose behavior is
    /// unpredictable, including placement rules inside IT blocks.
    pub fn decode(
        &self,
        address: u32,
        first: u16,
        second: u16,
        it: ItContext,
    ) -> Result<Instruction, FaultCode> {
        let instr = if Self::instruction_size(first) == 4 {
            let instr = thumb32::decode(address, first, second)?;
            if !self.architecture.has_thumb2() && !baseline_wide(instr.mnemonic) {
                return Err(FaultCode::UndefinedInstruction);
            }
            instr
        } else {
            let instr = thumb16::decode(address, first, it)?;
            if !self.architecture.has_thumb2()
                && matches!(instr.mnemonic, Mnemonic::Cbz | Mnemonic::Cbnz | Mnemonic::It)
            {
                return Err(FaultCode::UndefinedInstruction);
            }
            instr
        };

        check_it_placement(&instr, it)?;
        Ok(instr)
    }
}

/// 32-bit encodings available on the baseline profile.
const fn baseline_wide(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Bl
            | Mnemonic::Mrs
            | Mnemonic::Msr
            | Mnemonic::Dmb
            | Mnemonic::Dsb
            | Mnemonic::Isb
            | Mnemonic::Udf
    )
}

const fn check_it_placement(instr: &Instruction, it: ItContext) -> Result<(), FaultCode> {
    if !it.in_it_block {
        return Ok(());
    }

    let never_in_block = match instr.mnemonic {
        Mnemonic::It | Mnemonic::Cbz | Mnemonic::Cbnz | Mnemonic::Cps => true,
        Mnemonic::B => !matches!(instr.condition, Condition::Al),
        _ => false,
    };
    if never_in_block || (instr.writes_pc() && !it.last_in_it_block) {
        return Err(FaultCode::UnpredictableInstruction);
    }
    Ok(())
}

/// Sign-extends the low `bits` bits of `value`.
pub(crate) const fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Decoder, ItContext, Mnemonic, Shift, ShiftKind};
    use crate::{Architecture, Condition, FaultCode, Register};

    const OUTSIDE: ItContext = ItContext {
        in_it_block: false,
        last_in_it_block: false,
    };
    const INSIDE: ItContext = ItContext {
        in_it_block: true,
        last_in_it_block: false,
    };
    const LAST: ItContext = ItContext {
        in_it_block: true,
        last_in_it_block: true,
    };

    fn decode(first: u16, second: u16) -> Result<super::Instruction, FaultCode> {
        Decoder::new(Architecture::ArmV7M).decode(0x100, first, second, OUTSIDE)
    }

    #[rstest]
    #[case(0x2001, 2)]
    #[case(0xE7FE, 2)]
    #[case(0xE850, 4)]
    #[case(0xF000, 4)]
    #[case(0xF800, 4)]
    fn size_is_derived_from_first_halfword(#[case] first: u16, #[case] size: u32) {
        assert_eq!(Decoder::instruction_size(first), size);
    }

    #[rstest]
    #[case(0x2001, 0, Mnemonic::Mov)]
    #[case(0x3001, 0, Mnemonic::Add)]
    #[case(0x2805, 0, Mnemonic::Cmp)]
    #[case(0xE7FE, 0, Mnemonic::B)]
    #[case(0xBF08, 0, Mnemonic::It)]
    #[case(0xBF00, 0, Mnemonic::Nop)]
    #[case(0xBF30, 0, Mnemonic::Wfi)]
    #[case(0x6001, 0, Mnemonic::Str)]
    #[case(0x6801, 0, Mnemonic::Ldr)]
    #[case(0x4770, 0, Mnemonic::Bx)]
    #[case(0x4788, 0, Mnemonic::Blx)]
    #[case(0xB500, 0, Mnemonic::Push)]
    #[case(0xBD00, 0, Mnemonic::Pop)]
    #[case(0xB672, 0, Mnemonic::Cps)]
    #[case(0xBE00, 0, Mnemonic::Bkpt)]
    #[case(0xDE00, 0, Mnemonic::Udf)]
    #[case(0xDF00, 0, Mnemonic::Svc)]
    #[case(0xE850, 0x1F00, Mnemonic::Ldrex)]
    #[case(0xE840, 0x1200, Mnemonic::Strex)]
    #[case(0xF3BF, 0x8F2F, Mnemonic::Clrex)]
    #[case(0xF3BF, 0x8F5F, Mnemonic::Dmb)]
    #[case(0xF000, 0xF800, Mnemonic::Bl)]
    #[case(0xF3EF, 0x8010, Mnemonic::Mrs)]
    #[case(0xF380, 0x8814, Mnemonic::Msr)]
    #[case(0xFB91, 0xF0F2, Mnemonic::Sdiv)]
    #[case(0xFBB1, 0xF0F2, Mnemonic::Udiv)]
    #[case(0xF240, 0x0001, Mnemonic::Mov)]
    #[case(0xF2C0, 0x0001, Mnemonic::Movt)]
    #[case(0xE8BD, 0x8010, Mnemonic::Pop)]
    #[case(0xE8D0, 0xF001, Mnemonic::Tbb)]
    #[case(0xE8D0, 0xF011, Mnemonic::Tbh)]
    #[case(0xFAB1, 0xF081, Mnemonic::Clz)]
    fn known_encodings_decode_to_expected_mnemonic(
        #[case] first: u16,
        #[case] second: u16,
        #[case] mnemonic: Mnemonic,
    ) {
        let instr = decode(first, second).expect("defined encoding");
        assert_eq!(instr.mnemonic, mnemonic);
        assert_eq!(instr.address, 0x100);
    }

    #[test]
    fn movs_immediate_extracts_operands_and_sets_flags_outside_it() {
        let instr = decode(0x2105, 0).expect("MOVS r1, #5");
        assert_eq!(instr.rd, Some(Register::R1));
        assert_eq!(instr.imm, Some(5));
        assert!(instr.setflags);
        assert_eq!(instr.size, 2);
        assert_eq!(instr.raw, 0x2105);

        let inside = Decoder::new(Architecture::ArmV7M)
            .decode(0x100, 0x2105, 0, LAST)
            .expect("MOV r1, #5 inside IT");
        assert!(!inside.setflags);
    }

    #[test]
    fn conditional_branch_offset_is_sign_extended() {
        // BNE -4
        let instr = decode(0xD1FE, 0).expect("BNE");
        assert_eq!(instr.condition, Condition::Ne);
        assert_eq!(instr.imm, Some((-4_i32) as u32));
    }

    #[test]
    fn bl_offset_combines_both_halves() {
        // BL +0x1000
        let instr = decode(0xF001, 0xF800).expect("BL");
        assert_eq!(instr.imm, Some(0x1000));
        assert_eq!(instr.size, 4);
        assert_eq!(instr.raw, 0xF001_F800);
    }

    #[test]
    fn shifted_register_operand_uses_normalized_amount() {
        // ADD.W r0, r1, r2, LSR #0 -> LSR #32
        let instr = decode(0xEB01, 0x0012).expect("ADD.W");
        assert_eq!(instr.mnemonic, Mnemonic::Add);
        assert_eq!(
            instr.shift,
            Shift {
                kind: ShiftKind::Lsr,
                amount: 32
            }
        );
    }

    #[test]
    fn modified_immediate_reports_rotation_carry() {
        // MOVS.W r0, #0x80000000 (rotated)
        let instr = decode(0xF05F, 0x4000).expect("MOVS.W");
        assert_eq!(instr.imm, Some(0x8000_0000));
        assert_eq!(instr.imm_carry, Some(true));

        // MOV.W r0, #0xFF (unrotated)
        let plain = decode(0xF04F, 0x00FF).expect("MOV.W");
        assert_eq!(plain.imm, Some(0xFF));
        assert_eq!(plain.imm_carry, None);
    }

    #[test]
    fn unallocated_encodings_are_undefined() {
        assert_eq!(decode(0xBA80, 0), Err(FaultCode::UndefinedInstruction));
        assert_eq!(decode(0xEE00, 0x0000), Err(FaultCode::UndefinedInstruction));
    }

    #[rstest]
    #[case(0xBF08, 0)]
    #[case(0xB100, 0)]
    #[case(0xD000, 0)]
    #[case(0xB672, 0)]
    #[case(0xE7FE, 0)]
    #[case(0x4770, 0)]
    fn it_block_placement_rules_reject_encodings(#[case] first: u16, #[case] second: u16) {
        let result = Decoder::new(Architecture::ArmV7M).decode(0x100, first, second, INSIDE);
        assert_eq!(result, Err(FaultCode::UnpredictableInstruction));
    }

    #[test]
    fn branch_is_allowed_as_last_instruction_of_it_block() {
        let decoder = Decoder::new(Architecture::ArmV7M);
        assert!(decoder.decode(0x100, 0xE7FE, 0, LAST).is_ok());
        assert!(decoder.decode(0x100, 0x4770, 0, LAST).is_ok());
    }

    #[test]
    fn baseline_profile_rejects_thumb2_only_encodings() {
        let decoder = Decoder::new(Architecture::ArmV6M);

        assert_eq!(
            decoder.decode(0x100, 0xB100, 0, OUTSIDE),
            Err(FaultCode::UndefinedInstruction)
        );
        assert_eq!(
            decoder.decode(0x100, 0xBF08, 0, OUTSIDE),
            Err(FaultCode::UndefinedInstruction)
        );
        assert_eq!(
            decoder.decode(0x100, 0xFB91, 0xF0F2, OUTSIDE),
            Err(FaultCode::UndefinedInstruction)
        );
        assert!(decoder.decode(0x100, 0xF000, 0xF800, OUTSIDE).is_ok());
        assert!(decoder.decode(0x100, 0xF3EF, 0x8010, OUTSIDE).is_ok());
        assert!(decoder.decode(0x100, 0x2001, 0, OUTSIDE).is_ok());
    }
}

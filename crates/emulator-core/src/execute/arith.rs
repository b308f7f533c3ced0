//! Arithmetic, barrel-shifter and immediate-expansion helpers.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_lossless
)]

use crate::decoder::{Shift, ShiftKind};

/// Computes `x + y + carry_in`, returning `(result, carry_out, overflow)`.
#[must_use]
pub const fn add_with_carry(x: u32, y: u32, carry_in: bool) -> (u32, bool, bool) {
    let unsigned_sum = x as u64 + y as u64 + carry_in as u64;
    let signed_sum = x as i32 as i64 + y as i32 as i64 + carry_in as i64;
    let result = unsigned_sum as u32;
    let carry = result as u64 != unsigned_sum;
    let overflow = result as i32 as i64 != signed_sum;
    (result, carry, overflow)
}

/// Applies a shift, returning `(result, carry_out)`.
///
/// A zero `amount` returns `value` and `carry_in` unchanged for every kind
/// except `RRX`. Amounts of 32 and above follow the register-controlled shift
/// rules.
#[must_use]
pub const fn shift_c(value: u32, kind: ShiftKind, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 && !matches!(kind, ShiftKind::Rrx) {
        return (value, carry_in);
    }

    match kind {
        ShiftKind::Lsl => {
            if amount > 32 {
                (0, false)
            } else if amount == 32 {
                (0, value & 1 != 0)
            } else {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            }
        }
        ShiftKind::Lsr => {
            if amount > 32 {
                (0, false)
            } else if amount == 32 {
                (0, value >> 31 != 0)
            } else {
                (value >> amount, (value >> (amount - 1)) & 1 != 0)
            }
        }
        ShiftKind::Asr => {
            if amount >= 32 {
                let fill = ((value as i32) >> 31) as u32;
                (fill, fill & 1 != 0)
            } else {
                (
                    ((value as i32) >> amount) as u32,
                    (value >> (amount - 1)) & 1 != 0,
                )
            }
        }
        ShiftKind::Ror => {
            let result = value.rotate_right(amount % 32);
            (result, result >> 31 != 0)
        }
        ShiftKind::Rrx => ((value >> 1) | ((carry_in as u32) << 31), value & 1 != 0),
    }
}

/// Applies a shift and discards the carry.
#[must_use]
pub const fn shift(value: u32, kind: ShiftKind, amount: u32, carry_in: bool) -> u32 {
    shift_c(value, kind, amount, carry_in).0
}

/// Decodes the two-bit shift `type` and five-bit immediate of an encoding.
///
/// `LSR #0` and `ASR #0` encode a distance of 32; `ROR #0` encodes `RRX`.
#[must_use]
pub const fn decode_imm_shift(shift_type: u8, imm5: u8) -> Shift {
    let (kind, amount) = match shift_type & 0x3 {
        0 => (ShiftKind::Lsl, imm5),
        1 => (ShiftKind::Lsr, if imm5 == 0 { 32 } else { imm5 }),
        2 => (ShiftKind::Asr, if imm5 == 0 { 32 } else { imm5 }),
        _ if imm5 == 0 => (ShiftKind::Rrx, 1),
        _ => (ShiftKind::Ror, imm5),
    };
    Shift { kind, amount }
}

/// Expands a Thumb-2 modified immediate.
///
/// Returns the value and the carry it produces (`None` when the carry flag
/// is left unchanged), or `None` for unpredictable encodings.
#[must_use]
pub const fn thumb_expand_imm(imm12: u32) -> Option<(u32, Option<bool>)> {
    if imm12 & 0xC00 == 0 {
        let imm8 = imm12 & 0xFF;
        let value = match (imm12 >> 8) & 0x3 {
            0 => imm8,
            1 => (imm8 << 16) | imm8,
            2 => (imm8 << 24) | (imm8 << 8),
            _ => (imm8 << 24) | (imm8 << 16) | (imm8 << 8) | imm8,
        };
        if imm12 & 0x300 != 0 && imm8 == 0 {
            return None;
        }
        Some((value, None))
    } else {
        let unrotated = 0x80 | (imm12 & 0x7F);
        let value = unrotated.rotate_right((imm12 >> 7) & 0x1F);
        Some((value, Some(value >> 31 != 0)))
    }
}

/// Expands a Thumb-2 modified immediate against the current carry flag.
#[must_use]
pub const fn thumb_expand_imm_c(imm12: u32, carry_in: bool) -> Option<(u32, bool)> {
    match thumb_expand_imm(imm12) {
        Some((value, Some(carry))) => Some((value, carry)),
        Some((value, None)) => Some((value, carry_in)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{add_with_carry, decode_imm_shift, shift_c, thumb_expand_imm, thumb_expand_imm_c};
    use crate::decoder::ShiftKind;

    #[rstest]
    #[case(1, 1, false, (2, false, false))]
    #[case(0xFFFF_FFFF, 1, false, (0, true, false))]
    #[case(0x7FFF_FFFF, 1, false, (0x8000_0000, false, true))]
    #[case(0x8000_0000, 0x8000_0000, false, (0, true, true))]
    #[case(5, !3, true, (2, true, false))]
    #[case(3, !5, true, (0xFFFF_FFFE, false, false))]
    fn add_with_carry_flags(
        #[case] x: u32,
        #[case] y: u32,
        #[case] carry_in: bool,
        #[case] expected: (u32, bool, bool),
    ) {
        assert_eq!(add_with_carry(x, y, carry_in), expected);
    }

    #[rstest]
    #[case(ShiftKind::Lsl, 0x8000_0001, 1, (0x0000_0002, true))]
    #[case(ShiftKind::Lsl, 0x0000_0001, 32, (0, true))]
    #[case(ShiftKind::Lsl, 0x0000_0001, 33, (0, false))]
    #[case(ShiftKind::Lsr, 0x0000_0003, 1, (0x0000_0001, true))]
    #[case(ShiftKind::Lsr, 0x8000_0000, 32, (0, true))]
    #[case(ShiftKind::Asr, 0x8000_0000, 4, (0xF800_0000, false))]
    #[case(ShiftKind::Asr, 0x8000_0000, 40, (0xFFFF_FFFF, true))]
    #[case(ShiftKind::Ror, 0x0000_0001, 1, (0x8000_0000, true))]
    #[case(ShiftKind::Ror, 0x8000_0000, 32, (0x8000_0000, true))]
    fn shift_c_matches_barrel_shifter(
        #[case] kind: ShiftKind,
        #[case] value: u32,
        #[case] amount: u32,
        #[case] expected: (u32, bool),
    ) {
        assert_eq!(shift_c(value, kind, amount, false), expected);
    }

    #[test]
    fn zero_shift_preserves_carry_and_rrx_uses_it() {
        assert_eq!(shift_c(0x1234, ShiftKind::Lsr, 0, true), (0x1234, true));
        assert_eq!(shift_c(0x3, ShiftKind::Rrx, 1, true), (0x8000_0001, true));
    }

    #[test]
    fn imm_shift_decoding_normalizes_zero_distances() {
        assert_eq!(decode_imm_shift(1, 0).amount, 32);
        assert_eq!(decode_imm_shift(2, 0).amount, 32);
        assert_eq!(decode_imm_shift(3, 0).kind, ShiftKind::Rrx);
        assert_eq!(decode_imm_shift(0, 0).amount, 0);
    }

    #[rstest]
    #[case(0x0AB, 0x0000_00AB)]
    #[case(0x1AB, 0x00AB_00AB)]
    #[case(0x2AB, 0xAB00_AB00)]
    #[case(0x3AB, 0xABAB_ABAB)]
    #[case(0x400, 0x8000_0000)]
    #[case(0x47F, 0xFF00_0000)]
    #[case(0x4FF, 0x7F80_0000)]
    fn modified_immediates_expand(#[case] imm12: u32, #[case] expected: u32) {
        let (value, _) = thumb_expand_imm(imm12).expect("valid immediate");
        assert_eq!(value, expected);
    }

    #[test]
    fn replicated_zero_byte_is_unpredictable() {
        assert_eq!(thumb_expand_imm(0x100), None);
        assert_eq!(thumb_expand_imm(0x000), Some((0, None)));
    }

    proptest! {
        #[test]
        fn unrotated_immediates_keep_incoming_carry(imm8 in 1u32..=0xFF, carry in any::<bool>()) {
            let (_, carry_out) = thumb_expand_imm_c(imm8, carry).expect("valid immediate");
            prop_assert_eq!(carry_out, carry);
        }

        #[test]
        fn add_with_carry_matches_wide_arithmetic(x in any::<u32>(), y in any::<u32>(), c in any::<bool>()) {
            let (result, carry, _) = add_with_carry(x, y, c);
            let wide = u64::from(x) + u64::from(y) + u64::from(c);
            prop_assert_eq!(u64::from(result), wide & 0xFFFF_FFFF);
            prop_assert_eq!(carry, wide > 0xFFFF_FFFF);
        }
    }
}

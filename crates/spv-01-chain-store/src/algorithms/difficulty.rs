//! # Difficulty
//!
//! Compact target encoding, per-header work and the interval retarget rule.

use primitive_types::{U256, U512};
use shared_types::Hash256;
use thiserror::Error;

/// Invalid compact (`bits`) encoding.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    /// Sign bit set on a non-zero mantissa.
    #[error("compact target has negative sign bit")]
    Negative,
    /// Exponent pushes the mantissa past 256 bits.
    #[error("compact target overflows 256-bit range")]
    Overflow,
}

/// Expand a compact target.
pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    if negative && word != 0 {
        return Err(CompactError::Negative);
    }

    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
        if overflow {
            return Err(CompactError::Overflow);
        }
        U256::from(word) << (8 * (size - 3))
    };

    Ok(value)
}

/// Encode a target in compact form.
pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = ((value.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        value.low_u32() << (8 * (3 - size))
    } else {
        (value >> (8 * (size - 3))).low_u32()
    };

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

/// Expected work of one header: `2^256 / (target + 1)`.
///
/// Computed as `!target / (target + 1) + 1` to stay within 256 bits.
pub fn block_proof(target: U256) -> U256 {
    if target.is_zero() {
        return U256::zero();
    }
    let one = U256::one();
    (!target / (target + one)) + one
}

/// True if the hash, read as a little-endian number, is at or below target.
pub fn hash_meets_target(hash: &Hash256, target: U256) -> bool {
    hash.to_u256() <= target
}

/// Next target at a retarget boundary.
///
/// `actual_timespan` is the time between the first and last header of the
/// closing interval; it is clamped to `[target_timespan / 4, target_timespan * 4]`
/// and the result is capped at `pow_limit`.
pub fn retarget(previous: U256, actual_timespan: u64, target_timespan: u64, pow_limit: U256) -> U256 {
    let min_span = target_timespan / 4;
    let max_span = target_timespan.saturating_mul(4);
    let span = actual_timespan.clamp(min_span.max(1), max_span.max(1));

    let scaled: U512 = previous.full_mul(U256::from(span)) / U512::from(target_timespan.max(1));
    if scaled > U512::from(pow_limit) {
        return pow_limit;
    }
    U256::try_from(scaled).unwrap_or(pow_limit)
}

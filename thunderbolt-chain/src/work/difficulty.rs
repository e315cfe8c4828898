//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target" is a 256-bit number that a block hash,
//! read as a big-endian integer, must not exceed. On the wire and in
//! headers the target travels in a 32-bit compact form: one exponent
//! byte counting the significant bytes of the target, and a three-byte
//! mantissa.

use std::{fmt, ops::Add, ops::AddAssign};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use primitive_types::U256;

use crate::{block, SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

/// The "compact bits" form of a difficulty target.
///
/// Unlike every other integer in the protocol, the compact form is
/// serialized big-endian, matching the convention used to display it.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

/// The mantissa bits of the compact encoding.
const UNSIGNED_MANTISSA_MASK: u32 = 0x007f_ffff;

/// The (historical) sign bit. A compact value with this bit set encodes
/// a negative target, which is never a valid difficulty.
const SIGN_BIT_MASK: u32 = 0x0080_0000;

impl CompactDifficulty {
    /// The exponent byte: the length in bytes of the encoded target.
    pub fn exponent(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Expand the compact form into a full 256-bit target.
    ///
    /// Returns `None` for encodings that are negative, zero, or too
    /// large to fit in 256 bits; none of them are valid targets.
    pub fn to_expanded(&self) -> Option<ExpandedDifficulty> {
        let exponent = self.exponent() as u32;
        let mantissa = self.0 & UNSIGNED_MANTISSA_MASK;

        if self.0 & SIGN_BIT_MASK != 0 || mantissa == 0 {
            return None;
        }
        // A three-byte mantissa shifted past byte 32 overflows a u256.
        if exponent > 32 {
            return None;
        }

        let result = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            U256::from(mantissa) << (8 * (exponent - 3))
        };

        if result.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(result))
        }
    }
}

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl ThunderboltSerialize for CompactDifficulty {
    fn thunderbolt_serialize<W: std::io::Write>(
        &self,
        mut target: W,
    ) -> Result<(), std::io::Error> {
        target.write_u32::<BigEndian>(self.0)
    }
}

impl ThunderboltDeserialize for CompactDifficulty {
    fn thunderbolt_deserialize<R: std::io::Read>(
        mut reader: R,
    ) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(reader.read_u32::<BigEndian>()?))
    }
}

/// A 256-bit difficulty target.
///
/// Greater values represent *less* work: comparisons between hashes and
/// targets are plain u256 integer comparisons.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExpandedDifficulty(U256);

impl ExpandedDifficulty {
    /// Wrap a raw 256-bit target. Used by the retarget arithmetic.
    pub fn from_u256(value: U256) -> Self {
        ExpandedDifficulty(value)
    }

    /// The raw 256-bit target. Used by the retarget arithmetic.
    pub fn to_u256(self) -> U256 {
        self.0
    }

    /// Compress this target into its compact form, losing precision
    /// beyond the three mantissa bytes.
    pub fn to_compact(&self) -> CompactDifficulty {
        let byte_len = (256 - self.0.leading_zeros() + 7) / 8;
        let mut exponent = byte_len;
        let mut mantissa = if byte_len <= 3 {
            (self.0 << (8 * (3 - byte_len))).low_u32()
        } else {
            (self.0 >> (8 * (byte_len - 3))).low_u32()
        };

        // If the mantissa would read as negative, shift one byte out and
        // bump the exponent instead.
        if mantissa & SIGN_BIT_MASK != 0 {
            mantissa >>= 8;
            exponent += 1;
        }

        CompactDifficulty((exponent << 24) | mantissa)
    }

    /// The work required to produce a hash at or below this target:
    /// `2^256 / (target + 1)`, computed without overflowing.
    pub fn to_work(&self) -> Option<Work> {
        // `(!target / (target + 1)) + 1` is the overflow-free equivalent.
        let incremented = self.0.checked_add(U256::one())?;
        let work = ((!self.0) / incremented).checked_add(U256::one())?;
        Some(Work(work))
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(&bytes))
            .finish()
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        self.0 == U256::from_big_endian(&other.0)
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&U256::from_big_endian(&other.0))
    }
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        other == self
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<std::cmp::Ordering> {
        U256::from_big_endian(&self.0).partial_cmp(&other.0)
    }
}

/// Accumulated proof of work: the sum of `2^256 / (target + 1)` over a
/// chain segment. The active tip is the metadata with the greatest work.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Work(U256);

impl Work {
    pub fn zero() -> Self {
        Work(U256::zero())
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Work").field(&self.0).finish()
    }
}

impl Add for Work {
    type Output = Work;

    fn add(self, rhs: Work) -> Work {
        Work(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Work {
    fn add_assign(&mut self, rhs: Work) {
        *self = *self + rhs;
    }
}

impl ThunderboltSerialize for Work {
    fn thunderbolt_serialize<W: std::io::Write>(
        &self,
        mut target: W,
    ) -> Result<(), std::io::Error> {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        target.write_all(&bytes)
    }
}

impl ThunderboltDeserialize for Work {
    fn thunderbolt_deserialize<R: std::io::Read>(
        mut reader: R,
    ) -> Result<Self, SerializationError> {
        let bytes = <[u8; 32]>::thunderbolt_deserialize(&mut reader)?;
        Ok(Work(U256::from_big_endian(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_and_compact_are_inverse_at_mantissa_precision() {
        for bits in &[0x1d00_ffffu32, 0x2007_ffff, 0x1b0404cb, 0x0401_0000] {
            let compact = CompactDifficulty(*bits);
            let expanded = compact.to_expanded().expect("valid test vectors expand");
            assert_eq!(expanded.to_compact(), compact, "bits {:#010x}", bits);
        }
    }

    #[test]
    fn negative_and_zero_encodings_are_invalid() {
        // Sign bit set
        assert!(CompactDifficulty(0x0180_0000).to_expanded().is_none());
        // Zero mantissa
        assert!(CompactDifficulty(0x1d00_0000).to_expanded().is_none());
        // Overflows 256 bits
        assert!(CompactDifficulty(0xff00_ffff).to_expanded().is_none());
    }

    #[test]
    fn small_exponents_shift_the_mantissa_down() {
        // exponent 1: only the top mantissa byte survives
        let expanded = CompactDifficulty(0x0112_3456).to_expanded().unwrap();
        assert_eq!(expanded.to_u256(), U256::from(0x12u32));
    }

    #[test]
    fn work_of_hardest_target_is_large() {
        let easy = CompactDifficulty(0x2007_ffff).to_expanded().unwrap();
        let hard = CompactDifficulty(0x1d00_ffff).to_expanded().unwrap();

        let easy_work = easy.to_work().unwrap();
        let hard_work = hard.to_work().unwrap();

        assert!(hard_work > easy_work);
        assert_eq!((hard_work + Work::zero()), hard_work);
    }

    #[test]
    fn hash_to_target_comparisons_are_big_endian() {
        let target = CompactDifficulty(0x2007_ffff).to_expanded().unwrap();

        let mut low = [0u8; 32];
        low[31] = 1;
        let low = block::Hash(low);

        let mut high = [0xffu8; 32];
        high[0] = 0x7f;
        let high = block::Hash(high);

        assert!(low < target);
        assert!(high > target);
    }
}

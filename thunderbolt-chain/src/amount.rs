//! Strongly-typed amounts of atomic currency units.
//!
//! Amounts are signed internally so that fee arithmetic can go negative
//! during validation, but the `Constraint` type parameter keeps invalid
//! values unrepresentable at rest.

use std::{
    cmp::Ordering,
    convert::TryFrom,
    marker::PhantomData,
    ops::{Add, RangeInclusive, Sub},
};

use crate::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

/// One whole coin, in atomic units.
pub const COIN: i64 = 100_000_000;

/// The total supply cap. No amount, and no sum of amounts, may exceed this.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A typed amount of atomic units, checked against the range of `C`.
#[derive(Serialize, Deserialize)]
#[serde(try_from = "i64")]
#[serde(into = "i64")]
#[serde(bound = "C: Constraint")]
pub struct Amount<C = NonNegative>(i64, PhantomData<C>);

impl<C> Amount<C> {
    /// The raw value in atomic units.
    pub fn atoms(&self) -> i64 {
        self.0
    }

    /// Convert this amount into one with a different constraint, revalidating.
    pub fn constrain<C2: Constraint>(self) -> Result<Amount<C2>, Error> {
        Amount::<C2>::try_from(self.0)
    }
}

impl<C: Constraint> Amount<C> {
    /// The zero amount, valid under every constraint.
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }
}

impl<C> Clone for Amount<C> {
    fn clone(&self) -> Self {
        Amount(self.0, PhantomData)
    }
}

impl<C> Copy for Amount<C> {}

impl<C> std::fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<C> Eq for Amount<C> {}

impl<C> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.cmp(&other.0))
    }
}

impl<C> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C> std::hash::Hash for Amount<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> i64 {
        amount.0
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if C::valid_range().contains(&value) {
            Ok(Amount(value, PhantomData))
        } else {
            Err(Error::Contains {
                range: C::valid_range(),
                value,
            })
        }
    }
}

impl<C: Constraint> TryFrom<u64> for Amount<C> {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let signed = i64::try_from(value).map_err(|_| Error::Contains {
            range: C::valid_range(),
            value: i64::MAX,
        })?;
        Amount::try_from(signed)
    }
}

impl<C: Constraint> Add<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        let value = self
            .0
            .checked_add(rhs.0)
            .ok_or_else(|| Error::Contains {
                range: C::valid_range(),
                value: i64::MAX,
            })?;
        Amount::try_from(value)
    }
}

impl<C: Constraint> Add<Amount<C>> for Result<Amount<C>, Error> {
    type Output = Result<Amount<C>, Error>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        self? + rhs
    }
}

impl<C: Constraint> Sub<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        let value = self
            .0
            .checked_sub(rhs.0)
            .ok_or_else(|| Error::Contains {
                range: C::valid_range(),
                value: i64::MIN,
            })?;
        Amount::try_from(value)
    }
}

impl<C: Constraint> Sub<Amount<C>> for Result<Amount<C>, Error> {
    type Output = Result<Amount<C>, Error>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        self? - rhs
    }
}

/// Errors that can be returned when validating `Amount`s
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// amount {value} is outside the valid range {range:?}
    #[error("amount {value} is outside the valid range {range:?}")]
    Contains {
        range: RangeInclusive<i64>,
        value: i64,
    },
}

/// Marker type for `Amount` that restricts values to `0..=MAX_MONEY`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NonNegative;

/// Marker type for `Amount` that allows negative values down to `-MAX_MONEY`.
///
/// Used for intermediate fee arithmetic, never for serialized amounts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NegativeAllowed;

/// The range of values that a particular type of amount can take.
pub trait Constraint {
    fn valid_range() -> RangeInclusive<i64>;
}

impl Constraint for NonNegative {
    fn valid_range() -> RangeInclusive<i64> {
        0..=MAX_MONEY
    }
}

impl Constraint for NegativeAllowed {
    fn valid_range() -> RangeInclusive<i64> {
        -MAX_MONEY..=MAX_MONEY
    }
}

impl ThunderboltSerialize for Amount<NonNegative> {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        (self.0 as u64).thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for Amount<NonNegative> {
    fn thunderbolt_deserialize<R: std::io::Read>(
        mut reader: R,
    ) -> Result<Self, SerializationError> {
        let value = u64::thunderbolt_deserialize(&mut reader)?;
        Amount::try_from(value).map_err(|_| SerializationError::Parse("amount out of range"))
    }
}

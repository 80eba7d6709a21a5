use crate::error::ProviderError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive amount expressed in minor currency units.
///
/// Checkout never charges zero or negative amounts, so construction rejects
/// them up front instead of leaving the check to every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(minor_units: i64) -> Result<Self, ProviderError> {
        if minor_units > 0 {
            Ok(Self(minor_units))
        } else {
            Err(ProviderError::InvalidAmount(minor_units))
        }
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Adds a non-negative surcharge (fees, transfer codes).
    pub fn plus(self, minor_units: i64) -> Self {
        Self(self.0.saturating_add(minor_units.max(0)))
    }
}

impl TryFrom<i64> for Amount {
    type Error = ProviderError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a payment method charges for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FeeRule {
    /// A constant fee in minor units.
    Fixed(i64),
    /// A fraction of the amount, e.g. `0.025` for 2.5%.
    Percentage(Decimal),
}

impl FeeRule {
    /// Fee for `amount`, rounded half away from zero to whole minor units.
    pub fn apply(&self, amount: Amount) -> i64 {
        match self {
            Self::Fixed(fee) => *fee,
            Self::Percentage(rate) => (Decimal::from(amount.minor_units()) * *rate)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for FeeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(fee) => write!(f, "{fee}"),
            Self::Percentage(rate) => write!(f, "{}%", (*rate * Decimal::ONE_HUNDRED).normalize()),
        }
    }
}

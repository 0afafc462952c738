use crate::error::EscrowError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of decimal places every monetary value is kept at.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount accepted for a single payment, refund or payout. Keeps fee and
/// wallet arithmetic far away from `Decimal` overflow.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);

/// Rounds to cents using round-half-up (away from zero on the midpoint).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A ledger-side monetary value (wallet balances, fees, signed movements).
///
/// Wraps `rust_decimal::Decimal` so balance arithmetic stays explicit in the domain.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive amount with at most two decimal places, capped at [`MAX_AMOUNT`].
///
/// Every amount entering the engine from a collaborator is validated into this type.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, EscrowError> {
        if value <= Decimal::ZERO {
            return Err(EscrowError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value > MAX_AMOUNT {
            return Err(EscrowError::ValidationError(format!(
                "Amount {value} exceeds the maximum of {MAX_AMOUNT}"
            )));
        }
        if value.normalize().scale() > MONEY_SCALE {
            return Err(EscrowError::ValidationError(format!(
                "Amount {value} has more than {MONEY_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EscrowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Subtracts `rhs`, stopping at zero instead of going negative.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - rhs.0)
        }
    }

    /// Converts back into an [`Amount`] when the value is strictly positive.
    pub fn to_amount(self) -> Option<Amount> {
        Amount::new(self.0).ok()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

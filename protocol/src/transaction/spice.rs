//! Spice: the ledger's native value unit.
//!
//! An amount is a primary `currency` count plus a `supplementary_currency`
//! count of sub-units, where one unit equals
//! [`SUPPLEMENTARY_PER_CURRENCY`] sub-units. The pair is kept normalized
//! (`supplementary_currency < SUPPLEMENTARY_PER_CURRENCY`), which makes the
//! derived lexicographic ordering the numeric ordering.
//!
//! No floating point anywhere near money: every operation is checked
//! integer arithmetic with an explicit carry/borrow.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{SUPPLEMENTARY_DECIMALS, SUPPLEMENTARY_PER_CURRENCY};

/// Errors from constructing or combining Spice amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpiceError {
    #[error("supplementary amount {0} exceeds the sub-unit scale")]
    SupplementaryOutOfRange(u64),

    #[error("spice overflow: {current} + {added}")]
    Overflow { current: Spice, added: Spice },

    #[error("insufficient spice: available {available}, requested {requested}")]
    Insufficient { available: Spice, requested: Spice },
}

/// A normalized Spice amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Spice {
    currency: u64,
    supplementary_currency: u64,
}

impl Spice {
    /// The zero amount.
    pub const ZERO: Spice = Spice {
        currency: 0,
        supplementary_currency: 0,
    };

    /// Builds an amount, rejecting a non-normalized sub-unit count.
    pub fn new(currency: u64, supplementary_currency: u64) -> Result<Self, SpiceError> {
        if supplementary_currency >= SUPPLEMENTARY_PER_CURRENCY {
            return Err(SpiceError::SupplementaryOutOfRange(supplementary_currency));
        }
        Ok(Self {
            currency,
            supplementary_currency,
        })
    }

    /// Whole units only.
    pub const fn from_currency(currency: u64) -> Self {
        Self {
            currency,
            supplementary_currency: 0,
        }
    }

    pub fn currency(&self) -> u64 {
        self.currency
    }

    pub fn supplementary_currency(&self) -> u64 {
        self.supplementary_currency
    }

    pub fn is_zero(&self) -> bool {
        self.currency == 0 && self.supplementary_currency == 0
    }

    /// Adds two amounts, carrying sub-units into the primary unit.
    pub fn checked_add(&self, other: &Spice) -> Result<Spice, SpiceError> {
        let overflow = || SpiceError::Overflow {
            current: *self,
            added: *other,
        };

        // Both operands are normalized, so the sum is below 2 * 10^18.
        let mut supplementary = self.supplementary_currency + other.supplementary_currency;
        let mut carry = 0;
        if supplementary >= SUPPLEMENTARY_PER_CURRENCY {
            supplementary -= SUPPLEMENTARY_PER_CURRENCY;
            carry = 1;
        }

        let currency = self
            .currency
            .checked_add(other.currency)
            .and_then(|c| c.checked_add(carry))
            .ok_or_else(overflow)?;

        Ok(Spice {
            currency,
            supplementary_currency: supplementary,
        })
    }

    /// Subtracts `other`, borrowing from the primary unit when needed.
    pub fn checked_sub(&self, other: &Spice) -> Result<Spice, SpiceError> {
        if self < other {
            return Err(SpiceError::Insufficient {
                available: *self,
                requested: *other,
            });
        }

        let (supplementary, borrow) = if self.supplementary_currency >= other.supplementary_currency {
            (self.supplementary_currency - other.supplementary_currency, 0)
        } else {
            (
                SUPPLEMENTARY_PER_CURRENCY - other.supplementary_currency
                    + self.supplementary_currency,
                1,
            )
        };

        Ok(Spice {
            currency: self.currency - other.currency - borrow,
            supplementary_currency: supplementary,
        })
    }

    /// Canonical little-endian encoding used in signable bytes.
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.currency.to_le_bytes());
        out[8..].copy_from_slice(&self.supplementary_currency.to_le_bytes());
        out
    }
}

impl fmt::Display for Spice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0>width$}",
            self.currency,
            self.supplementary_currency,
            width = SUPPLEMENTARY_DECIMALS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unnormalized_supplementary() {
        assert!(Spice::new(1, SUPPLEMENTARY_PER_CURRENCY).is_err());
        assert!(Spice::new(1, SUPPLEMENTARY_PER_CURRENCY - 1).is_ok());
    }

    #[test]
    fn add_carries_into_currency() {
        let a = Spice::new(1, SUPPLEMENTARY_PER_CURRENCY - 1).unwrap();
        let b = Spice::new(0, 2).unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum, Spice::new(2, 1).unwrap());
    }

    #[test]
    fn add_overflow_detected() {
        let max = Spice::from_currency(u64::MAX);
        assert!(matches!(
            max.checked_add(&Spice::from_currency(1)),
            Err(SpiceError::Overflow { .. })
        ));
        let almost = Spice::new(u64::MAX, SUPPLEMENTARY_PER_CURRENCY - 1).unwrap();
        assert!(almost.checked_add(&Spice::new(0, 1).unwrap()).is_err());
    }

    #[test]
    fn sub_borrows_from_currency() {
        let a = Spice::new(2, 1).unwrap();
        let b = Spice::new(0, 2).unwrap();
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff, Spice::new(1, SUPPLEMENTARY_PER_CURRENCY - 1).unwrap());
        assert_eq!(diff.checked_add(&b).unwrap(), a);
    }

    #[test]
    fn sub_insufficient_rejected() {
        let a = Spice::new(1, 5).unwrap();
        let b = Spice::new(1, 6).unwrap();
        assert!(matches!(
            a.checked_sub(&b),
            Err(SpiceError::Insufficient { .. })
        ));
        assert_eq!(a.checked_sub(&a).unwrap(), Spice::ZERO);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Spice::new(1, 0).unwrap() > Spice::new(0, SUPPLEMENTARY_PER_CURRENCY - 1).unwrap());
        assert!(Spice::new(3, 7).unwrap() < Spice::new(3, 8).unwrap());
    }

    #[test]
    fn display_pads_sub_units() {
        let amount = Spice::new(12, 34).unwrap();
        assert_eq!(amount.to_string(), "12.000000000000000034");
    }
}

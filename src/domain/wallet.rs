use super::ids::UserId;
use super::money::Balance;
use crate::error::{EscrowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user balance record.
///
/// `balance` is spendable, `reserved_balance` tracks in-flight escrow obligations.
/// Both stay non-negative; a payout only ever debits `balance`.
///
/// The mutators are pure and crate-private; only the wallet ledger calls them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Balance,
    pub reserved_balance: Balance,
    pub total_earned: Balance,
    pub total_withdrawn: Balance,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: Balance::ZERO,
            reserved_balance: Balance::ZERO,
            total_earned: Balance::ZERO,
            total_withdrawn: Balance::ZERO,
            updated_at: Utc::now(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            !self.balance.is_negative(),
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            !self.reserved_balance.is_negative(),
            "Invariant violated: reserved balance went negative: {}",
            self.reserved_balance
        );
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.assert_invariants();
    }

    /// Reserves `amount` against an in-flight escrow.
    pub(crate) fn hold(&mut self, amount: Balance) {
        self.reserved_balance += amount;
        self.touch();
    }

    /// Drops up to `amount` of reservation, flooring at zero.
    pub(crate) fn release_hold(&mut self, amount: Balance) {
        self.reserved_balance = self.reserved_balance.saturating_sub(amount);
        self.touch();
    }

    /// Credits earnings; consumes a matching reservation if there is one.
    pub(crate) fn credit(&mut self, amount: Balance) {
        self.balance += amount;
        self.total_earned += amount;
        self.reserved_balance = self.reserved_balance.saturating_sub(amount);
        self.touch();
    }

    /// Withdraws from the spendable balance only.
    pub(crate) fn debit(&mut self, amount: Balance) -> Result<()> {
        if self.balance < amount {
            return Err(EscrowError::InsufficientFunds {
                user: self.user_id.clone(),
                available: self.balance.value(),
                requested: amount.value(),
            });
        }
        self.balance -= amount;
        self.total_withdrawn += amount;
        self.touch();
        Ok(())
    }

    /// Compensates a debit whose payout failed after the fact.
    pub(crate) fn reverse_debit(&mut self, amount: Balance) {
        self.balance += amount;
        self.total_withdrawn = self.total_withdrawn.saturating_sub(amount);
        self.touch();
    }
}

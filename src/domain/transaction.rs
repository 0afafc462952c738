use super::ids::{Currency, PaymentId, PayoutId, TransactionId, UserId};
use super::money::Balance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Refund,
    EscrowRelease,
    Payout,
    /// Compensation for a payout that failed after the wallet was debited.
    PayoutReversal,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Held,
    Pending,
    Completed,
}

/// Immutable audit record of one money movement.
///
/// Never updated or deleted once appended. `amount` is signed from the point of view
/// of `user_id`'s position with the platform.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub payment_id: Option<PaymentId>,
    pub payout_id: Option<PayoutId>,
    pub user_id: UserId,
    pub r#type: TransactionType,
    pub amount: Balance,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub balance_before: Option<Balance>,
    pub balance_after: Option<Balance>,
    pub description: String,
    pub provider_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        r#type: TransactionType,
        user_id: UserId,
        amount: Balance,
        currency: Currency,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            payment_id: None,
            payout_id: None,
            user_id,
            r#type,
            amount,
            currency,
            status,
            balance_before: None,
            balance_after: None,
            description: description.into(),
            provider_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn for_payout(mut self, payout_id: PayoutId) -> Self {
        self.payout_id = Some(payout_id);
        self
    }

    pub fn with_balances(mut self, before: Balance, after: Balance) -> Self {
        self.balance_before = Some(before);
        self.balance_after = Some(after);
        self
    }

    pub fn with_provider_id(mut self, provider_id: Option<String>) -> Self {
        self.provider_transaction_id = provider_id;
        self
    }

    /// Whether this record moves the user's spendable wallet balance.
    pub fn affects_wallet_balance(&self) -> bool {
        matches!(
            self.r#type,
            TransactionType::EscrowRelease | TransactionType::Payout | TransactionType::PayoutReversal
        )
    }
}

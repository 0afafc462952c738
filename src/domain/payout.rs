use super::ids::{Currency, PayoutId, UserId};
use super::money::{Amount, Balance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Processing,
    Completed,
    Failed,
}

/// Outcome delivered to the asynchronous completion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Paid,
    Failed { reason: String },
}

/// A payout a caller asks for. The id is minted once and kept for retries: it keys
/// both the stored payout and the provider's idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub user_id: UserId,
    pub amount: Amount,
    pub destination: String,
}

impl PayoutRequest {
    pub fn new(user_id: UserId, amount: Amount, destination: impl Into<String>) -> Self {
        Self {
            id: PayoutId::new(),
            user_id,
            amount,
            destination: destination.into(),
        }
    }
}

/// Withdrawal request from a wallet to an external destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub user_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PayoutStatus,
    pub destination: String,
    pub fee_amount: Balance,
    pub net_amount: Balance,
    pub provider_payout_id: Option<String>,
    pub failure_reason: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payout {
    pub fn is_terminal(&self) -> bool {
        self.status != PayoutStatus::Processing
    }
}

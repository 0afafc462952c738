//! Capability interface of the external settlement system.
//!
//! The engine is agnostic to which implementation is active: a deterministic
//! simulator, or a real gateway adapter. Every call carries an [`IdempotencyKey`]
//! so a retried call never settles twice.

use super::ids::Currency;
use super::money::Amount;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by the provider. `retryable` tells the caller whether the
/// same request (with the same idempotency key) may be sent again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

/// Key identifying one logical provider operation, derived from the entity id and
/// the operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(entity: impl fmt::Display, operation: &str) -> Self {
        Self(format!("{entity}:{operation}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata attached to provider calls. The idempotency key is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub idempotency_key: IdempotencyKey,
    pub entries: BTreeMap<String, String>,
}

impl ProviderMetadata {
    pub fn new(idempotency_key: IdempotencyKey) -> Self {
        Self {
            idempotency_key,
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Succeeded,
    /// Settlement continues asynchronously; a webhook delivers the final outcome.
    Processing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub status: ConfirmationStatus,
    pub provider_txn_id: String,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRefundStatus {
    Succeeded,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub status: ProviderRefundStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPayoutStatus {
    Pending,
    InTransit,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutReceipt {
    pub payout_id: String,
    pub status: ProviderPayoutStatus,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(
        &self,
        amount: Amount,
        currency: &Currency,
        metadata: &ProviderMetadata,
    ) -> Result<PaymentIntent, ProviderError>;

    async fn confirm(
        &self,
        intent_id: &str,
        method_id: &str,
        key: &IdempotencyKey,
    ) -> Result<Confirmation, ProviderError>;

    async fn refund(
        &self,
        intent_id: &str,
        amount: Amount,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<RefundReceipt, ProviderError>;

    async fn transfer(
        &self,
        amount: Amount,
        currency: &Currency,
        destination_account: &str,
        metadata: &ProviderMetadata,
    ) -> Result<TransferReceipt, ProviderError>;

    async fn payout(
        &self,
        amount: Amount,
        currency: &Currency,
        destination: &str,
        key: &IdempotencyKey,
    ) -> Result<PayoutReceipt, ProviderError>;
}

pub type ProviderRef = Arc<dyn PaymentProvider>;

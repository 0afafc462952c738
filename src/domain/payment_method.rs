use super::ids::{PaymentMethodId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokenized card or bank reference held by the provider. Only display data lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub user_id: UserId,
    /// Provider-side token passed to `confirm`.
    pub provider_method_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub fingerprint: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Card details supplied when registering a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentMethod {
    pub provider_method_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub fingerprint: Option<String>,
}

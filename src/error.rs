use crate::domain::ids::{PaymentId, PaymentMethodId, PayoutId, UserId};
use crate::domain::payment::PaymentStatus;
use crate::domain::provider::ProviderError;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EscrowError>;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("insufficient funds for {user}: available {available}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        available: Decimal,
        requested: Decimal,
    },
    #[error("payment {0} is not held in escrow")]
    NotInEscrow(PaymentId),
    #[error("payment {payment} is not refundable in status {status}")]
    NotRefundable {
        payment: PaymentId,
        status: PaymentStatus,
    },
    #[error("payment {0} has nothing left to refund")]
    NothingToRefund(PaymentId),
    #[error("refund of {requested} exceeds remaining refundable amount {remaining}")]
    RefundExceedsRemaining {
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("reconciliation mismatch for {user}: {field} is {wallet} in wallet but {ledger} in ledger")]
    ReconciliationMismatch {
        user: UserId,
        field: &'static str,
        ledger: Decimal,
        wallet: Decimal,
    },
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("payout {0} not found")]
    PayoutNotFound(PayoutId),
    #[error("payment method {0} not found")]
    PaymentMethodNotFound(PaymentMethodId),
    #[error("payment method {method} does not belong to {user}")]
    PaymentMethodMismatch { method: String, user: UserId },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for EscrowError {
    fn from(err: rocksdb::Error) -> Self {
        EscrowError::InternalError(Box::new(err))
    }
}

impl EscrowError {
    /// Whether the caller may retry the same operation with the same inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            EscrowError::Provider(err) => err.retryable,
            EscrowError::IoError(_) | EscrowError::InternalError(_) => true,
            _ => false,
        }
    }

    /// Message safe to show an end user. Provider codes and internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            EscrowError::InvalidStateTransition { .. } => {
                "This payment cannot be updated in its current state.".to_string()
            }
            EscrowError::Provider(err) if err.retryable => {
                "The payment provider is temporarily unavailable. Please try again.".to_string()
            }
            EscrowError::Provider(_) => "The payment provider declined the request.".to_string(),
            EscrowError::InsufficientFunds { .. } => {
                "Insufficient funds for this withdrawal.".to_string()
            }
            EscrowError::NotInEscrow(_) => "This payment is not held in escrow.".to_string(),
            EscrowError::NotRefundable { .. } => "This payment cannot be refunded.".to_string(),
            EscrowError::NothingToRefund(_) => {
                "This payment has already been fully refunded.".to_string()
            }
            EscrowError::RefundExceedsRemaining { remaining, .. } => {
                format!("At most {remaining} can still be refunded.")
            }
            EscrowError::PaymentNotFound(_) => "Payment not found.".to_string(),
            EscrowError::PayoutNotFound(_) => "Payout not found.".to_string(),
            EscrowError::PaymentMethodNotFound(_) | EscrowError::PaymentMethodMismatch { .. } => {
                "The selected payment method is not available.".to_string()
            }
            EscrowError::ValidationError(msg) => msg.clone(),
            EscrowError::ReconciliationMismatch { .. }
            | EscrowError::CsvError(_)
            | EscrowError::IoError(_)
            | EscrowError::InternalError(_) => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

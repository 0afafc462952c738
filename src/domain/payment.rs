//! Payment record and its state machine.
//!
//! ```text
//! pending ──► processing ──► held ───────► released
//!    │            │           │
//!    │            ├──► succeeded
//!    │            │           │
//!    └──► failed ◄┘     {held | succeeded | partially_refunded}
//!                              └──► partially_refunded | refunded
//! ```

use super::fees::FeeBreakdown;
use super::ids::{Currency, PaymentId, UserId};
use super::money::{Amount, Balance};
use crate::error::{EscrowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Held,
    Released,
    Refunded,
    PartiallyRefunded,
    Failed,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Succeeded)
                | (Processing, Held)
                | (Processing, Failed)
                | (Held, Released)
                | (Succeeded | Held | PartiallyRefunded, Refunded | PartiallyRefunded)
        )
    }

    /// Funds have been captured by the provider.
    pub fn is_captured(self) -> bool {
        !matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Held => "held",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    None,
    Partial,
    Full,
}

/// One payer → payee transfer intent.
///
/// `platform_fee + processing_fee + net_amount == amount` is fixed at creation.
/// Mutated only through [`Payment::transition`] and the refund/release helpers below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub provider_intent_id: Option<String>,
    pub provider_txn_id: Option<String>,
    pub receipt_url: Option<String>,
    pub platform_fee: Balance,
    pub processing_fee: Balance,
    pub net_amount: Balance,
    pub is_escrow: bool,
    /// Set once the capture's payer hold and `payment` record are both written.
    #[serde(default)]
    pub capture_recorded: bool,
    pub refund_amount: Balance,
    pub refund_status: RefundStatus,
    /// Number of refunds applied; part of the refund idempotency key.
    pub refund_count: u32,
    pub escrow_released_to: Option<UserId>,
    pub escrow_released_by: Option<UserId>,
    /// Set when the payee transfer leg of a release has not settled yet.
    pub transfer_pending: bool,
    pub provider_transfer_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        payer_id: UserId,
        payee_id: UserId,
        amount: Amount,
        currency: Currency,
        fees: FeeBreakdown,
        is_escrow: bool,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            payer_id,
            payee_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            provider_intent_id: None,
            provider_txn_id: None,
            receipt_url: None,
            platform_fee: fees.platform_fee,
            processing_fee: fees.processing_fee,
            net_amount: fees.net_amount,
            is_escrow,
            capture_recorded: false,
            refund_amount: Balance::ZERO,
            refund_status: RefundStatus::None,
            refund_count: 0,
            escrow_released_to: None,
            escrow_released_by: None,
            transfer_pending: false,
            provider_transfer_id: None,
            description: None,
            created_at: Utc::now(),
            paid_at: None,
            escrow_released_at: None,
            refunded_at: None,
        }
    }

    /// Captured, but the ledger side of the capture has not been fully written yet.
    pub fn needs_capture_record(&self) -> bool {
        self.status == self.captured_status() && !self.capture_recorded
    }

    /// Moves to `next` if the transition table allows it. On error the payment is untouched.
    pub fn transition(&mut self, next: PaymentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EscrowError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            PaymentStatus::Held | PaymentStatus::Succeeded => self.paid_at = Some(now),
            PaymentStatus::Released => self.escrow_released_at = Some(now),
            PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => {
                self.refunded_at = Some(now)
            }
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Status a successful capture lands in.
    pub fn captured_status(&self) -> PaymentStatus {
        if self.is_escrow {
            PaymentStatus::Held
        } else {
            PaymentStatus::Succeeded
        }
    }

    pub fn refundable_remaining(&self) -> Balance {
        Balance(self.amount.value()) - self.refund_amount
    }

    /// Records a provider-confirmed refund of `amount`.
    pub fn apply_refund(&mut self, amount: Amount) -> Result<()> {
        let remaining = self.refundable_remaining();
        if Balance::from(amount) > remaining {
            return Err(EscrowError::RefundExceedsRemaining {
                requested: amount.value(),
                remaining: remaining.value(),
            });
        }
        let total = self.refund_amount + amount.into();
        let next = if total.value() == self.amount.value() {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        self.transition(next)?;
        self.refund_amount = total;
        self.refund_count += 1;
        self.refund_status = if next == PaymentStatus::Refunded {
            RefundStatus::Full
        } else {
            RefundStatus::Partial
        };
        Ok(())
    }

    /// Marks the escrow as released to the payee.
    pub fn release(&mut self, released_by: UserId, transfer_pending: bool) -> Result<()> {
        self.transition(PaymentStatus::Released)?;
        self.escrow_released_to = Some(self.payee_id.clone());
        self.escrow_released_by = Some(released_by);
        self.transfer_pending = transfer_pending;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::FeeCalculator;
    use rust_decimal_macros::dec;

    fn payment(escrow: bool) -> Payment {
        let amount = Amount::new(dec!(100.00)).unwrap();
        Payment::new(
            UserId::from("p"),
            UserId::from("q"),
            amount,
            Currency::usd(),
            FeeCalculator::default().compute(amount),
            escrow,
        )
    }

    #[test]
    fn test_fees_fixed_at_creation() {
        let p = payment(true);
        assert_eq!(
            p.platform_fee + p.processing_fee + p.net_amount,
            Balance(dec!(100.00))
        );
        assert_eq!(p.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_escrow_path() {
        let mut p = payment(true);
        p.transition(PaymentStatus::Processing).unwrap();
        p.transition(p.captured_status()).unwrap();
        assert_eq!(p.status, PaymentStatus::Held);
        assert!(p.paid_at.is_some());
        p.release(UserId::from("admin"), false).unwrap();
        assert_eq!(p.status, PaymentStatus::Released);
        assert_eq!(p.escrow_released_to, Some(UserId::from("q")));
        assert!(p.escrow_released_at.is_some());
    }

    #[test]
    fn test_invalid_transition_leaves_payment_untouched() {
        let mut p = payment(true);
        let before = p.clone();
        let err = p.transition(PaymentStatus::Released).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InvalidStateTransition {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Released
            }
        ));
        assert_eq!(p, before);
    }

    #[test]
    fn test_terminal_states() {
        use PaymentStatus::*;
        for next in [Pending, Processing, Held, Succeeded, Released, Refunded] {
            assert!(!Failed.can_transition_to(next));
            assert!(!Refunded.can_transition_to(next));
        }
        assert!(!Released.can_transition_to(Released));
        assert!(!Succeeded.can_transition_to(Released));
    }

    #[test]
    fn test_partial_then_full_refund() {
        let mut p = payment(false);
        p.transition(PaymentStatus::Processing).unwrap();
        p.transition(PaymentStatus::Succeeded).unwrap();

        p.apply_refund(Amount::new(dec!(40.00)).unwrap()).unwrap();
        assert_eq!(p.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(p.refund_status, RefundStatus::Partial);
        assert_eq!(p.refundable_remaining(), Balance(dec!(60.00)));

        let err = p.apply_refund(Amount::new(dec!(60.01)).unwrap()).unwrap_err();
        assert!(matches!(err, EscrowError::RefundExceedsRemaining { .. }));
        assert_eq!(p.refund_amount, Balance(dec!(40.00)));

        p.apply_refund(Amount::new(dec!(60.00)).unwrap()).unwrap();
        assert_eq!(p.status, PaymentStatus::Refunded);
        assert_eq!(p.refund_status, RefundStatus::Full);
        assert_eq!(p.refund_count, 2);
    }
}

//! Refund processor: returns all or part of a captured payment to the payer.

use super::engine::EscrowEngine;
use crate::domain::ids::PaymentId;
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::provider::{IdempotencyKey, ProviderRefundStatus};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::error::{EscrowError, Result};
use tracing::info;

impl EscrowEngine {
    /// Refunds `amount`, or everything not yet refunded when `None`.
    ///
    /// A held payment has its payer reservation reversed; it can no longer be released
    /// afterwards. Provider failures leave the payment untouched.
    pub async fn refund(
        &self,
        payment_id: PaymentId,
        amount: Option<Amount>,
        reason: &str,
    ) -> Result<Payment> {
        let _guard = self.payment_locks.lock(&payment_id).await;
        let mut payment = self.load_payment(payment_id).await?;

        match payment.status {
            PaymentStatus::Succeeded | PaymentStatus::Held | PaymentStatus::PartiallyRefunded => {}
            PaymentStatus::Refunded => return Err(EscrowError::NothingToRefund(payment_id)),
            status => {
                return Err(EscrowError::NotRefundable {
                    payment: payment_id,
                    status,
                });
            }
        }

        if payment.needs_capture_record() {
            self.record_capture(&mut payment).await?;
        }

        let remaining = payment.refundable_remaining();
        let amount = match amount {
            Some(amount) => amount,
            None => remaining
                .to_amount()
                .ok_or(EscrowError::NothingToRefund(payment_id))?,
        };
        if Balance::from(amount) > remaining {
            return Err(EscrowError::RefundExceedsRemaining {
                requested: amount.value(),
                remaining: remaining.value(),
            });
        }

        let intent_id = payment.provider_intent_id.clone().ok_or_else(|| {
            EscrowError::ValidationError(format!("payment {} has no provider intent", payment.id))
        })?;
        let key = IdempotencyKey::derive(payment.id, &format!("refund:{}", payment.refund_count));
        let receipt = self
            .provider
            .refund(&intent_id, amount, reason, &key)
            .await?;

        let was_held = payment.status == PaymentStatus::Held;
        payment.apply_refund(amount)?;
        self.stores.payments.store(payment.clone()).await?;

        if was_held {
            self.ledger
                .release_hold(&payment.payer_id, Balance::from(payment.amount))
                .await?;
        }

        let status = match receipt.status {
            ProviderRefundStatus::Succeeded => TransactionStatus::Completed,
            ProviderRefundStatus::Pending => TransactionStatus::Pending,
        };
        self.ledger
            .record(
                Transaction::new(
                    TransactionType::Refund,
                    payment.payer_id.clone(),
                    Balance::ZERO - Balance::from(amount),
                    payment.currency.clone(),
                    status,
                    format!("Refund: {reason}"),
                )
                .for_payment(payment.id)
                .with_provider_id(Some(receipt.refund_id)),
            )
            .await?;

        info!(
            payment_id = %payment.id,
            refunded = %amount,
            total_refunded = %payment.refund_amount,
            status = %payment.status,
            "payment refunded"
        );
        self.emit(&payment).await;
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::PaymentRequest;
    use crate::config::EngineConfig;
    use crate::domain::ids::UserId;
    use crate::domain::payment::RefundStatus;
    use crate::domain::provider::ProviderError;
    use crate::infrastructure::in_memory::in_memory_stores;
    use crate::infrastructure::simulated_provider::{ProviderOperation, SimulatedProvider};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    async fn captured(escrow: bool) -> (EscrowEngine, SimulatedProvider, Payment) {
        let provider = SimulatedProvider::new();
        let engine = EscrowEngine::new(
            in_memory_stores(),
            Arc::new(provider.clone()),
            EngineConfig::default(),
        );
        let payment = engine
            .create_payment(PaymentRequest {
                payer_id: UserId::from("p"),
                payee_id: UserId::from("q"),
                amount: amount(dec!(100.00)),
                currency: None,
                escrow,
                description: None,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        let payment = engine.confirm(payment.id, "pm_card_visa").await.unwrap();
        (engine, provider, payment)
    }

    #[tokio::test]
    async fn test_partial_then_full_refund() {
        let (engine, _, payment) = captured(false).await;

        let payment = engine
            .refund(payment.id, Some(amount(dec!(40.00))), "partial")
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(payment.refund_amount, Balance(dec!(40.00)));

        let payment = engine
            .refund(payment.id, Some(amount(dec!(60.00))), "rest")
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refund_status, RefundStatus::Full);

        let err = engine.refund(payment.id, None, "again").await.unwrap_err();
        assert!(matches!(err, EscrowError::NothingToRefund(_)));

        let refunds: Vec<_> = engine
            .transactions_for_payment(payment.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|tx| tx.r#type == TransactionType::Refund)
            .collect();
        assert_eq!(refunds.len(), 2);
        assert_eq!(refunds[0].amount, Balance(dec!(-40.00)));
    }

    #[tokio::test]
    async fn test_default_refunds_remaining() {
        let (engine, _, payment) = captured(false).await;
        engine
            .refund(payment.id, Some(amount(dec!(25.00))), "partial")
            .await
            .unwrap();
        let payment = engine.refund(payment.id, None, "rest").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refund_amount, Balance(dec!(100.00)));
    }

    #[tokio::test]
    async fn test_over_refund_rejected_before_provider() {
        let (engine, provider, payment) = captured(false).await;
        let err = engine
            .refund(payment.id, Some(amount(dec!(100.01))), "too much")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::RefundExceedsRemaining { .. }));
        assert_eq!(provider.calls(ProviderOperation::Refund).await, 0);
    }

    #[tokio::test]
    async fn test_refund_of_held_payment_reverses_hold() {
        let (engine, _, payment) = captured(true).await;
        let payment = engine.refund(payment.id, None, "cancelled").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);

        let payer = engine.wallet(&UserId::from("p")).await.unwrap();
        assert_eq!(payer.reserved_balance, Balance::ZERO);
        let err = engine
            .release(payment.id, UserId::from("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotInEscrow(_)));
        let payee = engine.wallet(&UserId::from("q")).await.unwrap();
        assert_eq!(payee.balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_pending_payment_not_refundable() {
        let (engine, _, _) = captured(false).await;
        let pending = engine
            .create_payment(PaymentRequest {
                payer_id: UserId::from("p"),
                payee_id: UserId::from("q"),
                amount: amount(dec!(10.00)),
                currency: None,
                escrow: false,
                description: None,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        let err = engine.refund(pending.id, None, "x").await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::NotRefundable {
                status: PaymentStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_payment_untouched() {
        let (engine, provider, payment) = captured(false).await;
        provider
            .fail_next(
                ProviderOperation::Refund,
                ProviderError::transient("timeout", "gateway timeout"),
            )
            .await;

        let err = engine
            .refund(payment.id, Some(amount(dec!(10.00))), "x")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.payment(payment.id).await.unwrap(), payment);

        // the retry reuses the same idempotency key and goes through
        let payment = engine
            .refund(payment.id, Some(amount(dec!(10.00))), "x")
            .await
            .unwrap();
        assert_eq!(payment.refund_amount, Balance(dec!(10.00)));
    }
}

//! Payout processor: withdraws spendable wallet balance to an external destination.
//!
//! The wallet is debited as soon as the provider accepts the request; settlement is
//! confirmed later by [`EscrowEngine::complete_payout`]. A failed settlement credits
//! the debit back with a `payout_reversal` record.

use super::engine::EscrowEngine;
use crate::domain::fees::FeeCalculator;
use crate::domain::ids::{PayoutId, UserId};
use crate::domain::money::{Amount, Balance};
use crate::domain::payout::{Payout, PayoutOutcome, PayoutRequest, PayoutStatus};
use crate::domain::provider::{IdempotencyKey, ProviderPayoutStatus};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::error::{EscrowError, Result};
use chrono::Utc;
use tracing::{error, info, warn};

impl EscrowEngine {
    /// Requests a payout of `amount` from the user's spendable balance.
    ///
    /// Every call is a new payout. Callers that may retry after an error should keep a
    /// [`PayoutRequest`] and go through [`submit_payout`](Self::submit_payout).
    pub async fn payout(
        &self,
        user_id: &UserId,
        amount: Amount,
        destination: &str,
    ) -> Result<Payout> {
        self.submit_payout(PayoutRequest::new(user_id.clone(), amount, destination))
            .await
    }

    /// Processes a payout request. Resubmitting a request whose payout already exists
    /// returns that payout; a retry after a failed provider call reuses its key.
    ///
    /// Nothing is written when the balance is short or the provider rejects the request.
    pub async fn submit_payout(&self, request: PayoutRequest) -> Result<Payout> {
        let PayoutRequest {
            id,
            user_id,
            amount,
            destination,
        } = request;
        let user_id = &user_id;
        let destination = destination.as_str();
        if destination.trim().is_empty() {
            return Err(EscrowError::ValidationError(
                "Payout destination must not be empty".to_string(),
            ));
        }
        let _guard = self.payout_locks.lock(user_id).await;

        if let Some(existing) = self.stores.payouts.get(id).await? {
            if &existing.user_id != user_id || existing.amount != amount {
                return Err(EscrowError::ValidationError(format!(
                    "payout {id} was already requested with different details"
                )));
            }
            info!(payout_id = %id, status = ?existing.status, "payout already submitted");
            return Ok(existing);
        }

        let wallet = self.ledger.wallet(user_id).await?;
        if wallet.balance < Balance::from(amount) {
            return Err(EscrowError::InsufficientFunds {
                user: user_id.clone(),
                available: wallet.balance.value(),
                requested: amount.value(),
            });
        }

        let fee = FeeCalculator::payout_fee(amount, self.config.payout_fee_rate);
        let net = (Balance::from(amount) - fee).to_amount().ok_or_else(|| {
            EscrowError::ValidationError(format!("Payout of {amount} does not cover the payout fee"))
        })?;

        let currency = self.config.default_currency.clone();
        let receipt = self
            .provider
            .payout(net, &currency, destination, &IdempotencyKey::derive(id, "payout"))
            .await?;

        let mut payout = Payout {
            id,
            user_id: user_id.clone(),
            amount,
            currency,
            status: PayoutStatus::Processing,
            destination: destination.to_string(),
            fee_amount: fee,
            net_amount: Balance::from(net),
            provider_payout_id: Some(receipt.payout_id.clone()),
            failure_reason: None,
            initiated_at: Utc::now(),
            completed_at: None,
        };
        self.stores.payouts.store(payout.clone()).await?;

        let change = match self.ledger.debit(user_id, Balance::from(amount)).await {
            Ok(change) => change,
            Err(err) => {
                payout.status = PayoutStatus::Failed;
                payout.failure_reason = Some(err.to_string());
                payout.completed_at = Some(Utc::now());
                self.stores.payouts.store(payout).await?;
                return Err(err);
            }
        };
        self.ledger
            .record(
                Transaction::new(
                    TransactionType::Payout,
                    user_id.clone(),
                    Balance::ZERO - Balance::from(amount),
                    payout.currency.clone(),
                    TransactionStatus::Completed,
                    format!("Payout to {destination}"),
                )
                .for_payout(payout.id)
                .with_balances(change.before.balance, change.after.balance)
                .with_provider_id(payout.provider_payout_id.clone()),
            )
            .await?;

        info!(
            payout_id = %payout.id,
            user_id = %user_id,
            amount = %amount,
            fee = %fee,
            provider_status = ?receipt.status,
            "payout initiated"
        );
        if receipt.status == ProviderPayoutStatus::Paid {
            payout.status = PayoutStatus::Completed;
            payout.completed_at = Some(Utc::now());
            self.stores.payouts.store(payout.clone()).await?;
        } else {
            self.schedule_settlement(payout.id).await;
        }
        Ok(payout)
    }

    /// Applies the final settlement outcome of a payout. Terminal payouts are returned
    /// unchanged.
    pub async fn complete_payout(&self, payout_id: PayoutId, outcome: PayoutOutcome) -> Result<Payout> {
        let user_id = self.get_payout(payout_id).await?.user_id;
        let _guard = self.payout_locks.lock(&user_id).await;
        let mut payout = self.get_payout(payout_id).await?;
        if payout.is_terminal() {
            return Ok(payout);
        }

        match outcome {
            PayoutOutcome::Paid => {
                payout.status = PayoutStatus::Completed;
                payout.completed_at = Some(Utc::now());
                self.stores.payouts.store(payout.clone()).await?;
                info!(payout_id = %payout.id, "payout completed");
            }
            PayoutOutcome::Failed { reason } => {
                let amount = Balance::from(payout.amount);
                let change = self.ledger.reverse_debit(&payout.user_id, amount).await?;
                self.ledger
                    .record(
                        Transaction::new(
                            TransactionType::PayoutReversal,
                            payout.user_id.clone(),
                            amount,
                            payout.currency.clone(),
                            TransactionStatus::Completed,
                            format!("Reversal of failed payout {}", payout.id),
                        )
                        .for_payout(payout.id)
                        .with_balances(change.before.balance, change.after.balance),
                    )
                    .await?;

                payout.status = PayoutStatus::Failed;
                payout.failure_reason = Some(reason);
                payout.completed_at = Some(Utc::now());
                self.stores.payouts.store(payout.clone()).await?;
                warn!(
                    payout_id = %payout.id,
                    reason = payout.failure_reason.as_deref().unwrap_or_default(),
                    "payout failed; wallet credited back"
                );
            }
        }
        Ok(payout)
    }

    /// Waits for every scheduled payout settlement to finish.
    pub async fn wait_for_settlements(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.settlements.lock().await);
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "payout settlement task panicked");
                }
            }
        }
    }

    async fn schedule_settlement(&self, payout_id: PayoutId) {
        let engine = self.clone();
        let delay = self.config.payout_settlement_delay;
        let mut settlements = self.settlements.lock().await;
        // reap finished settlements so a long-running engine does not accumulate them
        while let Some(joined) = settlements.try_join_next() {
            if let Err(err) = joined {
                error!(error = %err, "payout settlement task panicked");
            }
        }
        settlements.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = engine.complete_payout(payout_id, PayoutOutcome::Paid).await {
                error!(payout_id = %payout_id, error = %err, "payout settlement failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::PaymentRequest;
    use crate::config::EngineConfig;
    use crate::domain::provider::ProviderError;
    use crate::infrastructure::in_memory::in_memory_stores;
    use crate::infrastructure::simulated_provider::{ProviderOperation, SimulatedProvider};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    /// Engine where payee `q` holds 86.80 from one released escrow payment.
    async fn funded(config: EngineConfig) -> (EscrowEngine, SimulatedProvider) {
        let provider = SimulatedProvider::new();
        let engine = EscrowEngine::new(in_memory_stores(), Arc::new(provider.clone()), config);
        let payment = engine
            .create_payment(PaymentRequest {
                payer_id: UserId::from("p"),
                payee_id: UserId::from("q"),
                amount: amount(dec!(100.00)),
                currency: None,
                escrow: true,
                description: None,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        engine.confirm(payment.id, "pm_card_visa").await.unwrap();
        engine.release(payment.id, UserId::from("p")).await.unwrap();
        (engine, provider)
    }

    fn slow_settlement() -> EngineConfig {
        EngineConfig {
            payout_settlement_delay: Duration::from_secs(3600),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_payout_debits_and_settles() {
        let (engine, _) = funded(EngineConfig::default()).await;
        let q = UserId::from("q");

        let payout = engine.payout(&q, amount(dec!(50.00)), "ba_123").await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Processing);
        assert_eq!(payout.fee_amount, Balance(dec!(0.50)));
        assert_eq!(payout.net_amount, Balance(dec!(49.50)));

        let wallet = engine.wallet(&q).await.unwrap();
        assert_eq!(wallet.balance, Balance(dec!(36.80)));
        assert_eq!(wallet.total_withdrawn, Balance(dec!(50.00)));

        engine.wait_for_settlements().await;
        let settled = engine.get_payout(payout.id).await.unwrap();
        assert_eq!(settled.status, PayoutStatus::Completed);
        assert!(settled.completed_at.is_some());

        let txs = engine.transactions_for_user(&q).await.unwrap();
        let record = txs
            .iter()
            .find(|tx| tx.r#type == TransactionType::Payout)
            .unwrap();
        assert_eq!(record.amount, Balance(dec!(-50.00)));
        assert_eq!(record.payout_id, Some(payout.id));
        assert_eq!(record.balance_before, Some(Balance(dec!(86.80))));
        assert_eq!(record.balance_after, Some(Balance(dec!(36.80))));
    }

    #[tokio::test]
    async fn test_insufficient_funds_writes_nothing() {
        let (engine, provider) = funded(EngineConfig::default()).await;
        let q = UserId::from("q");

        let err = engine
            .payout(&q, amount(dec!(86.81)), "ba_123")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
        assert!(engine.payouts_for(&q).await.unwrap().is_empty());
        assert_eq!(provider.calls(ProviderOperation::Payout).await, 0);
        assert!(
            engine
                .transactions_for_user(&q)
                .await
                .unwrap()
                .iter()
                .all(|tx| tx.r#type != TransactionType::Payout)
        );
    }

    #[tokio::test]
    async fn test_reserved_balance_is_not_spendable() {
        let (engine, _) = funded(EngineConfig::default()).await;
        // paying into escrow never makes the payer's balance spendable
        let err = engine
            .payout(&UserId::from("p"), amount(dec!(1.00)), "ba_p")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_provider_rejection_skips_debit() {
        let (engine, provider) = funded(EngineConfig::default()).await;
        let q = UserId::from("q");
        provider
            .fail_next(
                ProviderOperation::Payout,
                ProviderError::permanent("account_closed", "destination closed"),
            )
            .await;

        let err = engine.payout(&q, amount(dec!(10.00)), "ba_123").await.unwrap_err();
        assert!(matches!(err, EscrowError::Provider(_)));
        assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(86.80)));
        assert!(engine.payouts_for(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_settlement_credits_back() {
        let (engine, _) = funded(slow_settlement()).await;
        let q = UserId::from("q");
        let payout = engine.payout(&q, amount(dec!(80.00)), "ba_123").await.unwrap();
        assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(6.80)));

        let failed = engine
            .complete_payout(
                payout.id,
                PayoutOutcome::Failed {
                    reason: "bank rejected".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.status, PayoutStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("bank rejected"));

        let wallet = engine.wallet(&q).await.unwrap();
        assert_eq!(wallet.balance, Balance(dec!(86.80)));
        assert_eq!(wallet.total_withdrawn, Balance::ZERO);

        // a late success report does not override the terminal state
        let again = engine
            .complete_payout(payout.id, PayoutOutcome::Paid)
            .await
            .unwrap();
        assert_eq!(again.status, PayoutStatus::Failed);

        let reversals = engine
            .transactions_for_user(&q)
            .await
            .unwrap()
            .into_iter()
            .filter(|tx| tx.r#type == TransactionType::PayoutReversal)
            .count();
        assert_eq!(reversals, 1);
    }

    #[tokio::test]
    async fn test_provider_paid_synchronously_completes_at_once() {
        let (engine, provider) = funded(slow_settlement()).await;
        provider.set_payout_status(ProviderPayoutStatus::Paid).await;

        let payout = engine
            .payout(&UserId::from("q"), amount(dec!(10.00)), "ba_123")
            .await
            .unwrap();
        assert_eq!(payout.status, PayoutStatus::Completed);
        assert!(engine.settlements.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_lost_response_reuses_key() {
        let (engine, provider) = funded(slow_settlement()).await;
        let q = UserId::from("q");
        provider
            .lose_next_response(
                ProviderOperation::Payout,
                ProviderError::transient("timeout", "connection reset after send"),
            )
            .await;

        let request = PayoutRequest::new(q.clone(), amount(dec!(20.00)), "ba_123");
        let err = engine.submit_payout(request.clone()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(86.80)));

        let payout = engine.submit_payout(request.clone()).await.unwrap();
        assert_eq!(payout.id, request.id);
        assert_eq!(provider.calls(ProviderOperation::Payout).await, 2);
        assert_eq!(provider.distinct_keys(ProviderOperation::Payout).await, 1);
        assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(66.80)));

        // resubmitting a processed request neither calls the provider nor debits again
        let again = engine.submit_payout(request).await.unwrap();
        assert_eq!(again, payout);
        assert_eq!(provider.calls(ProviderOperation::Payout).await, 2);
        assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(66.80)));
        assert_eq!(engine.payouts_for(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_settlements_are_reaped() {
        let (engine, _) = funded(EngineConfig::default()).await;
        let q = UserId::from("q");
        for _ in 0..50 {
            engine.payout(&q, amount(dec!(1.00)), "ba_123").await.unwrap();
        }
        // zero-delay settlements finish once they get scheduled
        for _ in 0..100 {
            let completed = engine
                .payouts_for(&q)
                .await
                .unwrap()
                .iter()
                .all(|payout| payout.status == PayoutStatus::Completed);
            if completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::task::yield_now().await;

        engine.payout(&q, amount(dec!(1.00)), "ba_123").await.unwrap();
        assert!(engine.settlements.lock().await.len() <= 2);
        assert!(engine.payout_locks.is_empty());
        engine.wait_for_settlements().await;
    }

    #[tokio::test]
    async fn test_empty_destination_rejected() {
        let (engine, _) = funded(EngineConfig::default()).await;
        let err = engine
            .payout(&UserId::from("q"), amount(dec!(1.00)), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::ValidationError(_)));
    }
}

//! Escrow coordinator: releases held funds to the payee.
//!
//! The ledger advances first and the provider transfer settles eventually. A failed
//! transfer never blocks the release; the payment keeps `transfer_pending` and the
//! retry job finishes the provider leg with the same idempotency key.

use super::engine::EscrowEngine;
use crate::domain::ids::{PaymentId, UserId};
use crate::domain::money::Balance;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::provider::{IdempotencyKey, ProviderError, ProviderMetadata, TransferReceipt};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::error::{EscrowError, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub payment: Payment,
    /// The payment had been released by an earlier call; nothing was credited.
    pub already_released: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferRetrySummary {
    pub attempted: usize,
    pub settled: usize,
    pub still_pending: usize,
}

impl EscrowEngine {
    /// Releases a held escrow payment to its payee.
    ///
    /// Releasing an already released payment succeeds without crediting again; the
    /// check is on the payment status.
    pub async fn release(&self, payment_id: PaymentId, released_by: UserId) -> Result<ReleaseOutcome> {
        let _guard = self.payment_locks.lock(&payment_id).await;
        let mut payment = self.load_payment(payment_id).await?;

        if payment.status == PaymentStatus::Released {
            info!(payment_id = %payment.id, "payment already released");
            return Ok(ReleaseOutcome {
                payment,
                already_released: true,
            });
        }
        if payment.status != PaymentStatus::Held || !payment.is_escrow {
            return Err(EscrowError::NotInEscrow(payment_id));
        }
        if payment.needs_capture_record() {
            self.record_capture(&mut payment).await?;
        }

        let payee = payment.payee_id.clone();
        let mut transfer_pending = false;
        if let Some(account) = self.stores.payees.payout_account(&payee).await? {
            match self.transfer_to_payee(&payment, &account).await {
                Ok(receipt) => payment.provider_transfer_id = Some(receipt.transfer_id),
                Err(err) => {
                    warn!(
                        payment_id = %payment.id,
                        code = %err.code,
                        retryable = err.retryable,
                        "payee transfer failed; release continues with transfer pending"
                    );
                    transfer_pending = true;
                }
            }
        }

        payment.release(released_by, transfer_pending)?;
        self.stores.payments.store(payment.clone()).await?;

        self.ledger
            .release_hold(&payment.payer_id, Balance::from(payment.amount))
            .await?;
        let change = self.ledger.credit(&payee, payment.net_amount).await?;

        self.ledger
            .record(
                Transaction::new(
                    TransactionType::EscrowRelease,
                    payee,
                    payment.net_amount,
                    payment.currency.clone(),
                    TransactionStatus::Completed,
                    format!("Escrow release for payment {}", payment.id),
                )
                .for_payment(payment.id)
                .with_balances(change.before.balance, change.after.balance)
                .with_provider_id(payment.provider_transfer_id.clone()),
            )
            .await?;

        info!(
            payment_id = %payment.id,
            net = %payment.net_amount,
            transfer_pending,
            "escrow released"
        );
        self.emit(&payment).await;
        Ok(ReleaseOutcome {
            payment,
            already_released: false,
        })
    }

    /// Completes the provider transfer of every released payment still marked pending.
    pub async fn retry_pending_transfers(&self) -> Result<TransferRetrySummary> {
        let mut summary = TransferRetrySummary::default();
        for candidate in self.stores.payments.pending_transfers().await? {
            let _guard = self.payment_locks.lock(&candidate.id).await;
            let mut payment = self.load_payment(candidate.id).await?;
            if !payment.transfer_pending {
                continue;
            }
            summary.attempted += 1;

            let Some(account) = self.stores.payees.payout_account(&payment.payee_id).await? else {
                warn!(payment_id = %payment.id, "payee has no linked payout account");
                summary.still_pending += 1;
                continue;
            };
            match self.transfer_to_payee(&payment, &account).await {
                Ok(receipt) => {
                    payment.transfer_pending = false;
                    payment.provider_transfer_id = Some(receipt.transfer_id);
                    self.stores.payments.store(payment.clone()).await?;
                    info!(payment_id = %payment.id, "pending transfer settled");
                    summary.settled += 1;
                }
                Err(err) => {
                    warn!(
                        payment_id = %payment.id,
                        code = %err.code,
                        retryable = err.retryable,
                        "transfer retry failed"
                    );
                    summary.still_pending += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Runs [`retry_pending_transfers`](Self::retry_pending_transfers) on the configured interval.
    pub fn spawn_transfer_retry(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self
            .config
            .transfer_retry_interval
            .max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = engine.retry_pending_transfers().await {
                    error!(error = %err, "transfer retry job failed");
                }
            }
        })
    }

    async fn transfer_to_payee(
        &self,
        payment: &Payment,
        account: &str,
    ) -> std::result::Result<TransferReceipt, ProviderError> {
        let amount = payment.net_amount.to_amount().ok_or_else(|| {
            ProviderError::permanent("invalid_amount", "net amount is not positive")
        })?;
        let metadata = ProviderMetadata::new(IdempotencyKey::derive(payment.id, "transfer"))
            .with("payment_id", payment.id)
            .with("payee_id", &payment.payee_id);
        self.provider
            .transfer(amount, &payment.currency, account, &metadata)
            .await
    }
}

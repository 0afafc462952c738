use super::ledger::WalletLedger;
use super::locks::KeyedLocks;
use crate::config::EngineConfig;
use crate::domain::events::{NotifierRef, PaymentEvent};
use crate::domain::fees::FeeCalculator;
use crate::domain::ids::{Currency, PaymentId, PaymentMethodId, PayoutId, UserId};
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::payment_method::{NewPaymentMethod, PaymentMethod};
use crate::domain::payout::Payout;
use crate::domain::ports::Stores;
use crate::domain::provider::{ConfirmationStatus, IdempotencyKey, ProviderMetadata, ProviderRef};
use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::domain::wallet::Wallet;
use crate::error::{EscrowError, Result};
use crate::infrastructure::notifier::TracingNotifier;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// What a collaborator supplies to open a payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub amount: Amount,
    /// Falls back to the configured default currency.
    pub currency: Option<Currency>,
    pub escrow: bool,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Final provider verdict for a payment left in `processing`, delivered by webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Succeeded { provider_txn_id: Option<String> },
    Failed { reason: String },
}

/// The payment escrow engine.
///
/// Owns the payment state machine and coordinates the provider, the wallet ledger and
/// the notification sink. Cheap to clone; clones share all state.
///
/// Operations on the same payment are serialized through a per-payment lock held
/// for the whole operation, provider call included. Wallet mutations are serialized
/// separately by the ledger.
#[derive(Clone)]
pub struct EscrowEngine {
    pub(crate) stores: Stores,
    pub(crate) provider: ProviderRef,
    pub(crate) notifier: NotifierRef,
    pub(crate) ledger: WalletLedger,
    pub(crate) fees: FeeCalculator,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) payment_locks: KeyedLocks<PaymentId>,
    pub(crate) payout_locks: KeyedLocks<UserId>,
    method_locks: KeyedLocks<UserId>,
    pub(crate) settlements: Arc<Mutex<JoinSet<()>>>,
}

impl EscrowEngine {
    /// Creates an engine over the given stores and provider. The provider is injected so
    /// tests and the CLI can substitute the simulator.
    pub fn new(stores: Stores, provider: ProviderRef, config: EngineConfig) -> Self {
        let ledger = WalletLedger::new(stores.wallets.clone(), stores.transactions.clone());
        Self {
            stores,
            provider,
            notifier: Arc::new(TracingNotifier),
            ledger,
            fees: FeeCalculator::new(config.fees),
            config: Arc::new(config),
            payment_locks: KeyedLocks::new(),
            payout_locks: KeyedLocks::new(),
            method_locks: KeyedLocks::new(),
            settlements: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn with_notifier(mut self, notifier: NotifierRef) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens an escrow payment: the funds are held after capture until [`release`](Self::release).
    pub async fn create_escrow_payment(
        &self,
        payer_id: UserId,
        payee_id: UserId,
        amount: Amount,
        currency: Currency,
        metadata: BTreeMap<String, String>,
    ) -> Result<Payment> {
        self.create_payment(PaymentRequest {
            payer_id,
            payee_id,
            amount,
            currency: Some(currency),
            escrow: true,
            description: None,
            metadata,
        })
        .await
    }

    /// Computes fees and requests a provider intent. Nothing is persisted if the
    /// provider call fails. Only the configured default currency is accepted.
    pub async fn create_payment(&self, request: PaymentRequest) -> Result<Payment> {
        if request.payer_id == request.payee_id {
            return Err(EscrowError::ValidationError(
                "Payer and payee must be different users".to_string(),
            ));
        }
        // wallets hold a single currency, so every payment settles in the default one
        let currency = request
            .currency
            .unwrap_or_else(|| self.config.default_currency.clone());
        if currency != self.config.default_currency {
            return Err(EscrowError::ValidationError(format!(
                "Currency {currency} is not supported; payments settle in {}",
                self.config.default_currency
            )));
        }
        let fees = self.fees.compute(request.amount);
        if fees.net_amount <= Balance::ZERO {
            return Err(EscrowError::ValidationError(format!(
                "Amount {} does not cover processing and platform fees",
                request.amount
            )));
        }

        let mut payment = Payment::new(
            request.payer_id,
            request.payee_id,
            request.amount,
            currency,
            fees,
            request.escrow,
        );
        payment.description = request.description;

        let mut metadata =
            ProviderMetadata::new(IdempotencyKey::derive(payment.id, "create_intent"))
                .with("payment_id", payment.id)
                .with("payer_id", &payment.payer_id)
                .with("payee_id", &payment.payee_id)
                .with("escrow", payment.is_escrow);
        metadata.entries.extend(request.metadata);

        let intent = self
            .provider
            .create_intent(payment.amount, &payment.currency, &metadata)
            .await?;
        payment.provider_intent_id = Some(intent.intent_id);
        self.stores.payments.store(payment.clone()).await?;

        info!(
            payment_id = %payment.id,
            amount = %payment.amount,
            net = %payment.net_amount,
            escrow = payment.is_escrow,
            "payment created"
        );
        Ok(payment)
    }

    /// Confirms a pending payment with the provider.
    ///
    /// A payment already captured is returned unchanged. A provider error leaves the
    /// payment untouched; a provider that declines moves it to `failed`.
    pub async fn confirm(&self, payment_id: PaymentId, method_id: &str) -> Result<Payment> {
        let _guard = self.payment_locks.lock(&payment_id).await;
        let mut payment = self.load_payment(payment_id).await?;

        match payment.status {
            PaymentStatus::Pending => {}
            status if status.is_captured() => {
                if payment.needs_capture_record() {
                    self.record_capture(&mut payment).await?;
                }
                return Ok(payment);
            }
            status => {
                return Err(EscrowError::InvalidStateTransition {
                    from: status,
                    to: PaymentStatus::Processing,
                });
            }
        }
        self.check_method_owner(&payment.payer_id, method_id).await?;

        let intent_id = payment.provider_intent_id.clone().ok_or_else(|| {
            EscrowError::ValidationError(format!("payment {} has no provider intent", payment.id))
        })?;
        let confirmation = self
            .provider
            .confirm(
                &intent_id,
                method_id,
                &IdempotencyKey::derive(payment.id, "confirm"),
            )
            .await?;

        payment.transition(PaymentStatus::Processing)?;
        payment.provider_txn_id = Some(confirmation.provider_txn_id);
        payment.receipt_url = confirmation.receipt_url;

        match confirmation.status {
            ConfirmationStatus::Succeeded => self.capture(&mut payment).await?,
            ConfirmationStatus::Processing => {
                self.stores.payments.store(payment.clone()).await?;
                info!(payment_id = %payment.id, "payment awaiting provider settlement");
            }
            ConfirmationStatus::Failed => self.fail(&mut payment, "declined by provider").await?,
        }
        Ok(payment)
    }

    /// Applies the provider's final verdict to a payment left in `processing`.
    pub async fn complete_confirmation(
        &self,
        payment_id: PaymentId,
        outcome: ConfirmationOutcome,
    ) -> Result<Payment> {
        let _guard = self.payment_locks.lock(&payment_id).await;
        let mut payment = self.load_payment(payment_id).await?;

        let target = match &outcome {
            ConfirmationOutcome::Succeeded { .. } => payment.captured_status(),
            ConfirmationOutcome::Failed { .. } => PaymentStatus::Failed,
        };
        if payment.status == target {
            if payment.needs_capture_record() {
                self.record_capture(&mut payment).await?;
            }
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Processing {
            return Err(EscrowError::InvalidStateTransition {
                from: payment.status,
                to: target,
            });
        }

        match outcome {
            ConfirmationOutcome::Succeeded { provider_txn_id } => {
                if provider_txn_id.is_some() {
                    payment.provider_txn_id = provider_txn_id;
                }
                self.capture(&mut payment).await?;
            }
            ConfirmationOutcome::Failed { reason } => self.fail(&mut payment, &reason).await?,
        }
        Ok(payment)
    }

    /// Moves a confirmed payment to `held` or `succeeded` and records the capture.
    async fn capture(&self, payment: &mut Payment) -> Result<()> {
        payment.transition(payment.captured_status())?;
        payment.capture_recorded = false;
        self.stores.payments.store(payment.clone()).await?;
        self.record_capture(payment).await?;

        info!(payment_id = %payment.id, status = %payment.status, "payment captured");
        self.emit(payment).await;
        Ok(())
    }

    /// Writes the payer hold and the `payment` record for a captured payment, then
    /// marks it recorded. Safe to rerun: a logged capture is not written twice, and a
    /// hold whose record could not be appended is undone before returning the error.
    pub(crate) async fn record_capture(&self, payment: &mut Payment) -> Result<()> {
        let logged = self
            .stores
            .transactions
            .list_for_payment(payment.id)
            .await?
            .iter()
            .any(|tx| tx.r#type == TransactionType::Payment);

        if !logged {
            let amount = Balance::from(payment.amount);
            let status = if payment.is_escrow {
                self.ledger.hold(&payment.payer_id, amount).await?;
                TransactionStatus::Held
            } else {
                TransactionStatus::Completed
            };
            let recorded = self
                .ledger
                .record(
                    Transaction::new(
                        TransactionType::Payment,
                        payment.payer_id.clone(),
                        amount,
                        payment.currency.clone(),
                        status,
                        format!("Payment from {} to {}", payment.payer_id, payment.payee_id),
                    )
                    .for_payment(payment.id)
                    .with_provider_id(payment.provider_txn_id.clone()),
                )
                .await;
            if let Err(err) = recorded {
                if payment.is_escrow
                    && let Err(undo) = self.ledger.release_hold(&payment.payer_id, amount).await
                {
                    error!(payment_id = %payment.id, error = %undo, "could not undo payer hold");
                }
                return Err(err);
            }
        }

        payment.capture_recorded = true;
        self.stores.payments.store(payment.clone()).await
    }

    async fn fail(&self, payment: &mut Payment, reason: &str) -> Result<()> {
        payment.transition(PaymentStatus::Failed)?;
        self.stores.payments.store(payment.clone()).await?;
        warn!(payment_id = %payment.id, reason, "payment failed");
        self.emit(payment).await;
        Ok(())
    }

    /// Rejects a locally registered method that belongs to someone else. Unknown
    /// provider tokens are left for the provider to validate.
    async fn check_method_owner(&self, payer_id: &UserId, method_id: &str) -> Result<()> {
        if let Some(method) = self
            .stores
            .payment_methods
            .find_by_provider_id(method_id)
            .await?
            && &method.user_id != payer_id
        {
            return Err(EscrowError::PaymentMethodMismatch {
                method: method_id.to_string(),
                user: payer_id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.stores
            .payments
            .get(payment_id)
            .await?
            .ok_or(EscrowError::PaymentNotFound(payment_id))
    }

    pub(crate) async fn emit(&self, payment: &Payment) {
        self.notifier
            .notify(PaymentEvent {
                payment_id: payment.id,
                status: payment.status,
                payee_id: payment.payee_id.clone(),
            })
            .await;
    }

    /// Registers a payment method. The user's first method always becomes the default.
    pub async fn add_payment_method(
        &self,
        user_id: UserId,
        details: NewPaymentMethod,
        make_default: bool,
    ) -> Result<PaymentMethod> {
        let _guard = self.method_locks.lock(&user_id).await;
        let existing = self.stores.payment_methods.list_for_user(&user_id).await?;
        let is_default = make_default || existing.is_empty();

        let method = PaymentMethod {
            id: PaymentMethodId::new(),
            user_id,
            provider_method_id: details.provider_method_id,
            brand: details.brand,
            last4: details.last4,
            exp_month: details.exp_month,
            exp_year: details.exp_year,
            fingerprint: details.fingerprint,
            is_default,
            created_at: Utc::now(),
        };
        if is_default {
            self.clear_defaults(existing).await?;
        }
        self.stores.payment_methods.store(method.clone()).await?;
        Ok(method)
    }

    /// Makes `method_id` the user's only default method.
    pub async fn set_default_payment_method(
        &self,
        user_id: &UserId,
        method_id: PaymentMethodId,
    ) -> Result<PaymentMethod> {
        let _guard = self.method_locks.lock(user_id).await;
        let methods = self.stores.payment_methods.list_for_user(user_id).await?;
        let mut chosen = methods
            .iter()
            .find(|m| m.id == method_id)
            .cloned()
            .ok_or(EscrowError::PaymentMethodNotFound(method_id))?;

        self.clear_defaults(methods.into_iter().filter(|m| m.id != method_id).collect())
            .await?;
        chosen.is_default = true;
        self.stores.payment_methods.store(chosen.clone()).await?;
        Ok(chosen)
    }

    async fn clear_defaults(&self, methods: Vec<PaymentMethod>) -> Result<()> {
        for mut method in methods.into_iter().filter(|m| m.is_default) {
            method.is_default = false;
            self.stores.payment_methods.store(method).await?;
        }
        Ok(())
    }

    pub async fn payment_methods(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        self.stores.payment_methods.list_for_user(user_id).await
    }

    /// Links a payout-capable account so releases transfer to it.
    pub async fn link_payout_account(&self, user_id: &UserId, account: String) -> Result<()> {
        if account.trim().is_empty() {
            return Err(EscrowError::ValidationError(
                "Payout account must not be empty".to_string(),
            ));
        }
        self.stores.payees.link(user_id, account).await
    }

    pub async fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.load_payment(payment_id).await
    }

    pub async fn wallet(&self, user_id: &UserId) -> Result<Wallet> {
        self.ledger.wallet(user_id).await
    }

    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.ledger.wallets().await
    }

    pub async fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.ledger.transactions_for(user_id).await
    }

    pub async fn transactions_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Transaction>> {
        self.stores.transactions.list_for_payment(payment_id).await
    }

    pub async fn get_payout(&self, payout_id: PayoutId) -> Result<Payout> {
        self.stores
            .payouts
            .get(payout_id)
            .await?
            .ok_or(EscrowError::PayoutNotFound(payout_id))
    }

    pub async fn payouts_for(&self, user_id: &UserId) -> Result<Vec<Payout>> {
        self.stores.payouts.list_for_user(user_id).await
    }
}

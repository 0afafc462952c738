use crate::domain::ids::Currency;
use crate::domain::money::Amount;
use crate::domain::provider::{
    Confirmation, ConfirmationStatus, IdempotencyKey, PaymentIntent, PaymentProvider,
    PayoutReceipt, ProviderError, ProviderMetadata, ProviderPayoutStatus, ProviderRefundStatus,
    RefundReceipt, TransferReceipt,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    CreateIntent,
    Confirm,
    Refund,
    Transfer,
    Payout,
}

#[derive(Debug, Clone)]
enum Cached {
    Intent(PaymentIntent),
    Confirmation(Confirmation),
    Refund(RefundReceipt),
    Transfer(TransferReceipt),
    Payout(PayoutReceipt),
}

struct SimulatorState {
    sequence: u64,
    responses: HashMap<(ProviderOperation, IdempotencyKey), Cached>,
    intents: HashMap<String, Decimal>,
    refunded: HashMap<String, Decimal>,
    injected: HashMap<ProviderOperation, VecDeque<ProviderError>>,
    lost: HashMap<ProviderOperation, VecDeque<ProviderError>>,
    fail_transfers: bool,
    confirm_status: ConfirmationStatus,
    payout_status: ProviderPayoutStatus,
    calls: HashMap<ProviderOperation, usize>,
}

/// Deterministic in-process stand-in for a payment gateway.
///
/// Identifiers come from a counter, responses are cached per idempotency key and
/// failures can be injected per operation. Failed calls are not cached, so a retry
/// with the same key can succeed.
#[derive(Clone)]
pub struct SimulatedProvider {
    state: Arc<Mutex<SimulatorState>>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatorState {
                sequence: 0,
                responses: HashMap::new(),
                intents: HashMap::new(),
                refunded: HashMap::new(),
                injected: HashMap::new(),
                lost: HashMap::new(),
                fail_transfers: false,
                confirm_status: ConfirmationStatus::Succeeded,
                payout_status: ProviderPayoutStatus::Pending,
                calls: HashMap::new(),
            })),
        }
    }

    /// Makes the next call of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: ProviderOperation, error: ProviderError) {
        let mut state = self.state.lock().await;
        state.injected.entry(operation).or_default().push_back(error);
    }

    /// Processes the next call of `operation` but answers it with `error`, as when
    /// the response is lost on the way back. A retry with the same key gets the
    /// cached result.
    pub async fn lose_next_response(&self, operation: ProviderOperation, error: ProviderError) {
        let mut state = self.state.lock().await;
        state.lost.entry(operation).or_default().push_back(error);
    }

    /// Makes every transfer fail until switched off again.
    pub async fn set_fail_transfers(&self, fail: bool) {
        self.state.lock().await.fail_transfers = fail;
    }

    /// Status returned by subsequent `confirm` calls.
    pub async fn set_confirm_status(&self, status: ConfirmationStatus) {
        self.state.lock().await.confirm_status = status;
    }

    pub async fn set_payout_status(&self, status: ProviderPayoutStatus) {
        self.state.lock().await.payout_status = status;
    }

    /// Number of calls received for `operation`, including failed and replayed ones.
    pub async fn calls(&self, operation: ProviderOperation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct idempotency keys that produced a result for `operation`.
    pub async fn distinct_keys(&self, operation: ProviderOperation) -> usize {
        self.state
            .lock()
            .await
            .responses
            .keys()
            .filter(|(op, _)| *op == operation)
            .count()
    }
}

impl SimulatorState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}_sim_{:06}", self.sequence)
    }

    /// Counts the call, replays a cached response or pops an injected failure.
    fn begin(
        &mut self,
        operation: ProviderOperation,
        key: &IdempotencyKey,
    ) -> Result<Option<Cached>, ProviderError> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(cached) = self.responses.get(&(operation, key.clone())) {
            return Ok(Some(cached.clone()));
        }
        if let Some(error) = self
            .injected
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        if operation == ProviderOperation::Transfer && self.fail_transfers {
            return Err(ProviderError::transient(
                "transfer_unavailable",
                "destination account temporarily unreachable",
            ));
        }
        Ok(None)
    }

    /// Caches the response, then drops it on the floor if a lost response was injected.
    fn remember(
        &mut self,
        operation: ProviderOperation,
        key: &IdempotencyKey,
        response: Cached,
    ) -> Result<(), ProviderError> {
        self.responses.insert((operation, key.clone()), response);
        match self
            .lost
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn mismatched(operation: ProviderOperation) -> ProviderError {
    ProviderError::permanent(
        "idempotency_mismatch",
        format!("cached response does not match {operation:?}"),
    )
}

#[async_trait]
impl PaymentProvider for SimulatedProvider {
    async fn create_intent(
        &self,
        amount: Amount,
        _currency: &Currency,
        metadata: &ProviderMetadata,
    ) -> Result<PaymentIntent, ProviderError> {
        let op = ProviderOperation::CreateIntent;
        let key = &metadata.idempotency_key;
        let mut state = self.state.lock().await;
        match state.begin(op, key)? {
            Some(Cached::Intent(intent)) => return Ok(intent),
            Some(_) => return Err(mismatched(op)),
            None => {}
        }
        let intent_id = state.next_id("pi");
        let intent = PaymentIntent {
            client_secret: format!("{intent_id}_secret"),
            intent_id,
        };
        state.intents.insert(intent.intent_id.clone(), amount.value());
        state.remember(op, key, Cached::Intent(intent.clone()))?;
        Ok(intent)
    }

    async fn confirm(
        &self,
        intent_id: &str,
        _method_id: &str,
        key: &IdempotencyKey,
    ) -> Result<Confirmation, ProviderError> {
        let op = ProviderOperation::Confirm;
        let mut state = self.state.lock().await;
        match state.begin(op, key)? {
            Some(Cached::Confirmation(confirmation)) => return Ok(confirmation),
            Some(_) => return Err(mismatched(op)),
            None => {}
        }
        if !state.intents.contains_key(intent_id) {
            return Err(ProviderError::permanent(
                "resource_missing",
                format!("no such payment intent: {intent_id}"),
            ));
        }
        let provider_txn_id = state.next_id("ch");
        let confirmation = Confirmation {
            status: state.confirm_status,
            receipt_url: Some(format!("https://receipts.invalid/{provider_txn_id}")),
            provider_txn_id,
        };
        state.remember(op, key, Cached::Confirmation(confirmation.clone()))?;
        Ok(confirmation)
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount: Amount,
        _reason: &str,
        key: &IdempotencyKey,
    ) -> Result<RefundReceipt, ProviderError> {
        let op = ProviderOperation::Refund;
        let mut state = self.state.lock().await;
        match state.begin(op, key)? {
            Some(Cached::Refund(receipt)) => return Ok(receipt),
            Some(_) => return Err(mismatched(op)),
            None => {}
        }
        let captured = state.intents.get(intent_id).copied().ok_or_else(|| {
            ProviderError::permanent(
                "resource_missing",
                format!("no such payment intent: {intent_id}"),
            )
        })?;
        let already = state.refunded.get(intent_id).copied().unwrap_or_default();
        if already + amount.value() > captured {
            return Err(ProviderError::permanent(
                "amount_too_large",
                format!("refund exceeds captured amount {captured}"),
            ));
        }
        state
            .refunded
            .insert(intent_id.to_string(), already + amount.value());
        let receipt = RefundReceipt {
            refund_id: state.next_id("re"),
            status: ProviderRefundStatus::Succeeded,
        };
        state.remember(op, key, Cached::Refund(receipt.clone()))?;
        Ok(receipt)
    }

    async fn transfer(
        &self,
        _amount: Amount,
        _currency: &Currency,
        _destination_account: &str,
        metadata: &ProviderMetadata,
    ) -> Result<TransferReceipt, ProviderError> {
        let op = ProviderOperation::Transfer;
        let key = &metadata.idempotency_key;
        let mut state = self.state.lock().await;
        match state.begin(op, key)? {
            Some(Cached::Transfer(receipt)) => return Ok(receipt),
            Some(_) => return Err(mismatched(op)),
            None => {}
        }
        let receipt = TransferReceipt {
            transfer_id: state.next_id("tr"),
        };
        state.remember(op, key, Cached::Transfer(receipt.clone()))?;
        Ok(receipt)
    }

    async fn payout(
        &self,
        _amount: Amount,
        _currency: &Currency,
        _destination: &str,
        key: &IdempotencyKey,
    ) -> Result<PayoutReceipt, ProviderError> {
        let op = ProviderOperation::Payout;
        let mut state = self.state.lock().await;
        match state.begin(op, key)? {
            Some(Cached::Payout(receipt)) => return Ok(receipt),
            Some(_) => return Err(mismatched(op)),
            None => {}
        }
        let receipt = PayoutReceipt {
            payout_id: state.next_id("po"),
            status: state.payout_status,
        };
        state.remember(op, key, Cached::Payout(receipt.clone()))?;
        Ok(receipt)
    }
}

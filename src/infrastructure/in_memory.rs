use crate::domain::ids::{PaymentId, PaymentMethodId, PayoutId, TransactionId, UserId};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::payment_method::PaymentMethod;
use crate::domain::payout::Payout;
use crate::domain::ports::{
    PayeeDirectory, PaymentMethodStore, PaymentStore, PayoutStore, Stores, TransactionStore,
    WalletStore,
};
use crate::domain::transaction::Transaction;
use crate::domain::wallet::Wallet;
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builds a [`Stores`] bundle backed entirely by memory.
pub fn in_memory_stores() -> Stores {
    Stores {
        payments: Arc::new(InMemoryPaymentStore::new()),
        wallets: Arc::new(InMemoryWalletStore::new()),
        transactions: Arc::new(InMemoryTransactionStore::new()),
        payouts: Arc::new(InMemoryPayoutStore::new()),
        payment_methods: Arc::new(InMemoryPaymentMethodStore::new()),
        payees: Arc::new(InMemoryPayeeDirectory::new()),
    }
}

/// A thread-safe in-memory store for payments.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn pending_transfers(&self) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.status == PaymentStatus::Released && p.transfer_pending)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory store for wallets.
///
/// Uses `Arc<RwLock<HashMap<..>>>`; serialization of read-modify-write cycles is the
/// ledger's job, not the store's.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    wallets: Arc<RwLock<HashMap<UserId, Wallet>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn store(&self, wallet: Wallet) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        wallets.insert(wallet.user_id.clone(), wallet);
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(user_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        let mut all: Vec<Wallet> = wallets.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }
}

#[derive(Default)]
struct TransactionLog {
    entries: Vec<Transaction>,
    ids: HashSet<TransactionId>,
}

/// A thread-safe, append-only in-memory transaction log.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    log: Arc<RwLock<TransactionLog>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let mut log = self.log.write().await;
        if !log.ids.insert(tx.id) {
            return Err(EscrowError::ValidationError(format!(
                "transaction {} already recorded",
                tx.id
            )));
        }
        log.entries.push(tx);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let log = self.log.read().await;
        Ok(log
            .entries
            .iter()
            .filter(|tx| &tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Transaction>> {
        let log = self.log.read().await;
        Ok(log
            .entries
            .iter()
            .filter(|tx| tx.payment_id == Some(payment_id))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let log = self.log.read().await;
        Ok(log.entries.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPayoutStore {
    payouts: Arc<RwLock<HashMap<PayoutId, Payout>>>,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn store(&self, payout: Payout) -> Result<()> {
        let mut payouts = self.payouts.write().await;
        payouts.insert(payout.id, payout);
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>> {
        let payouts = self.payouts.read().await;
        let mut listed: Vec<Payout> = payouts
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        listed.sort_by_key(|p| p.initiated_at);
        Ok(listed)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentMethodStore {
    methods: Arc<RwLock<HashMap<PaymentMethodId, PaymentMethod>>>,
}

impl InMemoryPaymentMethodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentMethodStore for InMemoryPaymentMethodStore {
    async fn store(&self, method: PaymentMethod) -> Result<()> {
        let mut methods = self.methods.write().await;
        methods.insert(method.id, method);
        Ok(())
    }

    async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let methods = self.methods.read().await;
        Ok(methods.get(&id).cloned())
    }

    async fn find_by_provider_id(&self, provider_method_id: &str) -> Result<Option<PaymentMethod>> {
        let methods = self.methods.read().await;
        Ok(methods
            .values()
            .find(|m| m.provider_method_id == provider_method_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        let methods = self.methods.read().await;
        let mut listed: Vec<PaymentMethod> = methods
            .values()
            .filter(|m| &m.user_id == user_id)
            .cloned()
            .collect();
        listed.sort_by_key(|m| m.created_at);
        Ok(listed)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPayeeDirectory {
    accounts: Arc<RwLock<HashMap<UserId, String>>>,
}

impl InMemoryPayeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayeeDirectory for InMemoryPayeeDirectory {
    async fn link(&self, user_id: &UserId, account: String) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(user_id.clone(), account);
        Ok(())
    }

    async fn payout_account(&self, user_id: &UserId) -> Result<Option<String>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(user_id).cloned())
    }
}

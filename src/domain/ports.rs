use super::ids::{PaymentId, PaymentMethodId, PayoutId, UserId};
use super::payment::Payment;
use super::payment_method::PaymentMethod;
use super::payout::Payout;
use super::transaction::Transaction;
use super::wallet::Wallet;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn store(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    /// Released payments whose payee transfer has not settled yet.
    async fn pending_transfers(&self) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn store(&self, wallet: Wallet) -> Result<()>;
    async fn get(&self, user_id: &UserId) -> Result<Option<Wallet>>;
    async fn get_all(&self) -> Result<Vec<Wallet>>;
}

/// Insert-only audit log.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails if a transaction with the same id already exists.
    async fn append(&self, tx: Transaction) -> Result<()>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Transaction>>;
    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Transaction>>;
    async fn all(&self) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn store(&self, payout: Payout) -> Result<()>;
    async fn get(&self, id: PayoutId) -> Result<Option<Payout>>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>>;
}

#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    async fn store(&self, method: PaymentMethod) -> Result<()>;
    async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>>;
    async fn find_by_provider_id(&self, provider_method_id: &str) -> Result<Option<PaymentMethod>>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>>;
}

/// Payout-capable accounts linked by payees (e.g. a connected account at the provider).
#[async_trait]
pub trait PayeeDirectory: Send + Sync {
    async fn link(&self, user_id: &UserId, account: String) -> Result<()>;
    async fn payout_account(&self, user_id: &UserId) -> Result<Option<String>>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type WalletStoreRef = Arc<dyn WalletStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type PayoutStoreRef = Arc<dyn PayoutStore>;
pub type PaymentMethodStoreRef = Arc<dyn PaymentMethodStore>;
pub type PayeeDirectoryRef = Arc<dyn PayeeDirectory>;

/// The full set of persistence adapters the engine runs on.
#[derive(Clone)]
pub struct Stores {
    pub payments: PaymentStoreRef,
    pub wallets: WalletStoreRef,
    pub transactions: TransactionStoreRef,
    pub payouts: PayoutStoreRef,
    pub payment_methods: PaymentMethodStoreRef,
    pub payees: PayeeDirectoryRef,
}

use crate::domain::ids::{PaymentId, PaymentMethodId, PayoutId, UserId};
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
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

pub const CF_PAYMENTS: &str = "payments";
pub const CF_WALLETS: &str = "wallets";
/// Insert-only audit log.
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_PAYOUTS: &str = "payouts";
pub const CF_PAYMENT_METHODS: &str = "payment_methods";
pub const CF_PAYEE_ACCOUNTS: &str = "payee_accounts";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_PAYMENTS,
    CF_WALLETS,
    CF_TRANSACTIONS,
    CF_PAYOUTS,
    CF_PAYMENT_METHODS,
    CF_PAYEE_ACCOUNTS,
];

/// A persistent store implementation using RocksDB.
///
/// Every entity lives in its own column family as a JSON document. `Clone` shares
/// the underlying `Arc<DB>`, so one instance backs all the store ports.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Uses this database for every store port.
    pub fn stores(&self) -> Stores {
        Stores {
            payments: Arc::new(self.clone()),
            wallets: Arc::new(self.clone()),
            transactions: Arc::new(self.clone()),
            payouts: Arc::new(self.clone()),
            payment_methods: Arc::new(self.clone()),
            payees: Arc::new(self.clone()),
        }
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EscrowError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            EscrowError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        EscrowError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        self.put_json(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn pending_transfers(&self) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan_json(CF_PAYMENTS)?;
        Ok(payments
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Released && p.transfer_pending)
            .collect())
    }
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn store(&self, wallet: Wallet) -> Result<()> {
        self.put_json(CF_WALLETS, wallet.user_id.as_str().as_bytes(), &wallet)
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, user_id.as_str().as_bytes())
    }

    async fn get_all(&self) -> Result<Vec<Wallet>> {
        // keys are user ids, so iteration order is already sorted
        self.scan_json(CF_WALLETS)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let key = tx.id.0.as_bytes();
        if self.db.get_pinned_cf(cf, key)?.is_some() {
            return Err(EscrowError::ValidationError(format!(
                "transaction {} already recorded",
                tx.id
            )));
        }
        self.put_json(CF_TRANSACTIONS, key, &tx)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let mut all = TransactionStore::all(self).await?;
        all.retain(|tx| &tx.user_id == user_id);
        Ok(all)
    }

    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Transaction>> {
        let mut all = TransactionStore::all(self).await?;
        all.retain(|tx| tx.payment_id == Some(payment_id));
        Ok(all)
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let mut all: Vec<Transaction> = self.scan_json(CF_TRANSACTIONS)?;
        all.sort_by_key(|tx| tx.created_at);
        Ok(all)
    }
}

#[async_trait]
impl PayoutStore for RocksDBStore {
    async fn store(&self, payout: Payout) -> Result<()> {
        self.put_json(CF_PAYOUTS, payout.id.0.as_bytes(), &payout)
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        self.get_json(CF_PAYOUTS, id.0.as_bytes())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>> {
        let mut payouts: Vec<Payout> = self.scan_json(CF_PAYOUTS)?;
        payouts.retain(|p| &p.user_id == user_id);
        payouts.sort_by_key(|p| p.initiated_at);
        Ok(payouts)
    }
}

#[async_trait]
impl PaymentMethodStore for RocksDBStore {
    async fn store(&self, method: PaymentMethod) -> Result<()> {
        self.put_json(CF_PAYMENT_METHODS, method.id.0.as_bytes(), &method)
    }

    async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        self.get_json(CF_PAYMENT_METHODS, id.0.as_bytes())
    }

    async fn find_by_provider_id(&self, provider_method_id: &str) -> Result<Option<PaymentMethod>> {
        let methods: Vec<PaymentMethod> = self.scan_json(CF_PAYMENT_METHODS)?;
        Ok(methods
            .into_iter()
            .find(|m| m.provider_method_id == provider_method_id))
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        let mut methods: Vec<PaymentMethod> = self.scan_json(CF_PAYMENT_METHODS)?;
        methods.retain(|m| &m.user_id == user_id);
        methods.sort_by_key(|m| m.created_at);
        Ok(methods)
    }
}

#[async_trait]
impl PayeeDirectory for RocksDBStore {
    async fn link(&self, user_id: &UserId, account: String) -> Result<()> {
        self.put_json(CF_PAYEE_ACCOUNTS, user_id.as_str().as_bytes(), &account)
    }

    async fn payout_account(&self, user_id: &UserId) -> Result<Option<String>> {
        self.get_json(CF_PAYEE_ACCOUNTS, user_id.as_str().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::Currency;
    use crate::domain::money::Balance;
    use crate::domain::transaction::{TransactionStatus, TransactionType};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_wallet_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut wallet = Wallet::new(UserId::from("q"));
        wallet.credit(Balance::new(dec!(100.0)));

        WalletStore::store(&store, wallet.clone()).await.unwrap();

        let retrieved = WalletStore::get(&store, &UserId::from("q"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, wallet);

        let all = WalletStore::get_all(&store).await.unwrap();
        assert_eq!(all, vec![wallet]);

        assert!(
            WalletStore::get(&store, &UserId::from("p"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_rocksdb_transaction_log_insert_only() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let tx = Transaction::new(
            TransactionType::Payout,
            UserId::from("q"),
            Balance::new(dec!(-10)),
            Currency::usd(),
            TransactionStatus::Completed,
            "payout",
        );

        TransactionStore::append(&store, tx.clone()).await.unwrap();
        assert!(TransactionStore::append(&store, tx.clone()).await.is_err());

        let listed = TransactionStore::list_for_user(&store, &UserId::from("q"))
            .await
            .unwrap();
        assert_eq!(listed, vec![tx]);
    }
}

//! Wallet ledger: wallet rows plus the append-only transaction log.
//!
//! Every wallet mutation is a fetch → compute → write cycle performed while holding
//! that user's lock, so concurrent credits and debits cannot lose updates. Wallet rows
//! are created lazily on first mutation.

use super::locks::KeyedLocks;
use crate::domain::ids::UserId;
use crate::domain::money::Balance;
use crate::domain::ports::{TransactionStoreRef, WalletStoreRef};
use crate::domain::transaction::Transaction;
use crate::domain::wallet::Wallet;
use crate::error::Result;
use tracing::debug;

/// Wallet state on both sides of one atomic update.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletChange {
    pub before: Wallet,
    pub after: Wallet,
}

#[derive(Clone)]
pub struct WalletLedger {
    wallets: WalletStoreRef,
    transactions: TransactionStoreRef,
    locks: KeyedLocks<UserId>,
}

impl WalletLedger {
    pub fn new(wallets: WalletStoreRef, transactions: TransactionStoreRef) -> Self {
        Self {
            wallets,
            transactions,
            locks: KeyedLocks::new(),
        }
    }

    /// Current wallet, or an empty one if the user has never been credited or debited.
    pub async fn wallet(&self, user_id: &UserId) -> Result<Wallet> {
        Ok(self
            .wallets
            .get(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id.clone())))
    }

    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.wallets.get_all().await
    }

    pub async fn hold(&self, user_id: &UserId, amount: Balance) -> Result<WalletChange> {
        self.update(user_id, "hold", |wallet| {
            wallet.hold(amount);
            Ok(())
        })
        .await
    }

    pub async fn release_hold(&self, user_id: &UserId, amount: Balance) -> Result<WalletChange> {
        self.update(user_id, "release_hold", |wallet| {
            wallet.release_hold(amount);
            Ok(())
        })
        .await
    }

    pub async fn credit(&self, user_id: &UserId, amount: Balance) -> Result<WalletChange> {
        self.update(user_id, "credit", |wallet| {
            wallet.credit(amount);
            Ok(())
        })
        .await
    }

    /// Fails with `InsufficientFunds` and writes nothing when `balance < amount`.
    pub async fn debit(&self, user_id: &UserId, amount: Balance) -> Result<WalletChange> {
        self.update(user_id, "debit", |wallet| wallet.debit(amount))
            .await
    }

    pub async fn reverse_debit(&self, user_id: &UserId, amount: Balance) -> Result<WalletChange> {
        self.update(user_id, "reverse_debit", |wallet| {
            wallet.reverse_debit(amount);
            Ok(())
        })
        .await
    }

    /// Appends to the audit log. Records are never modified afterwards.
    pub async fn record(&self, tx: Transaction) -> Result<()> {
        self.transactions.append(tx).await
    }

    pub async fn transactions_for(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.transactions.list_for_user(user_id).await
    }

    pub async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.transactions.all().await
    }

    async fn update<F>(&self, user_id: &UserId, op: &'static str, apply: F) -> Result<WalletChange>
    where
        F: FnOnce(&mut Wallet) -> Result<()>,
    {
        let _guard = self.locks.lock(user_id).await;
        let before = self.wallet(user_id).await?;
        let mut after = before.clone();
        apply(&mut after)?;
        self.wallets.store(after.clone()).await?;
        debug!(
            user_id = %user_id,
            op,
            balance = %after.balance,
            reserved = %after.reserved_balance,
            "wallet updated"
        );
        Ok(WalletChange { before, after })
    }
}

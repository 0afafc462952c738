//! Checks wallet rows against the transaction log they were derived from.

use super::engine::EscrowEngine;
use crate::domain::ids::UserId;
use crate::domain::money::Balance;
use crate::domain::transaction::{Transaction, TransactionType};
use crate::error::{EscrowError, Result};
use tracing::{error, info};

/// Wallet figures recomputed from the transaction log.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    pub user_id: UserId,
    pub balance: Balance,
    pub total_earned: Balance,
    pub total_withdrawn: Balance,
    pub transactions: usize,
}

impl ReconciliationReport {
    fn from_log(user_id: UserId, log: &[Transaction]) -> Self {
        let mut report = Self {
            user_id,
            balance: Balance::ZERO,
            total_earned: Balance::ZERO,
            total_withdrawn: Balance::ZERO,
            transactions: log.len(),
        };
        for tx in log.iter().filter(|tx| tx.affects_wallet_balance()) {
            report.balance += tx.amount;
            match tx.r#type {
                TransactionType::EscrowRelease => report.total_earned += tx.amount,
                // payouts are negative, reversals positive
                TransactionType::Payout | TransactionType::PayoutReversal => {
                    report.total_withdrawn -= tx.amount
                }
                _ => {}
            }
        }
        report
    }
}

impl EscrowEngine {
    /// Recomputes one user's wallet from the log and fails on the first field that
    /// disagrees with the stored wallet.
    pub async fn reconcile(&self, user_id: &UserId) -> Result<ReconciliationReport> {
        let wallet = self.ledger.wallet(user_id).await?;
        let log = self.ledger.transactions_for(user_id).await?;
        let report = ReconciliationReport::from_log(user_id.clone(), &log);

        let fields = [
            ("balance", report.balance, wallet.balance),
            ("total_earned", report.total_earned, wallet.total_earned),
            ("total_withdrawn", report.total_withdrawn, wallet.total_withdrawn),
        ];
        for (field, ledger, stored) in fields {
            if ledger != stored {
                error!(
                    user_id = %user_id,
                    field,
                    ledger = %ledger,
                    wallet = %stored,
                    "wallet does not match transaction log"
                );
                return Err(EscrowError::ReconciliationMismatch {
                    user: user_id.clone(),
                    field,
                    ledger: ledger.value(),
                    wallet: stored.value(),
                });
            }
        }
        Ok(report)
    }

    /// Reconciles every wallet. All wallets are checked; the first mismatch is returned.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>> {
        let mut reports = Vec::new();
        let mut first_mismatch = None;
        for wallet in self.ledger.wallets().await? {
            match self.reconcile(&wallet.user_id).await {
                Ok(report) => reports.push(report),
                Err(err @ EscrowError::ReconciliationMismatch { .. }) => {
                    first_mismatch.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(err) = first_mismatch {
            return Err(err);
        }
        info!(wallets = reports.len(), "ledger reconciled");
        Ok(reports)
    }
}

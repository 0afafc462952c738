mod common;

use common::{amount, engine, engine_with, held_payment};
use escrow_engine::config::EngineConfig;
use escrow_engine::domain::ids::UserId;
use escrow_engine::domain::money::Balance;
use escrow_engine::domain::payout::{PayoutOutcome, PayoutStatus};
use escrow_engine::domain::transaction::TransactionType;
use escrow_engine::error::EscrowError;
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test]
async fn test_payout_exceeding_balance_creates_nothing() {
    let (engine, _) = engine();
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    engine.release(payment.id, UserId::from("p")).await.unwrap();
    let q = UserId::from("q");
    let before = engine.transactions_for_user(&q).await.unwrap();

    let err = engine
        .payout(&q, amount(dec!(100.00)), "ba_q")
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
    assert_eq!(err.user_message(), "Insufficient funds for this withdrawal.");

    assert!(engine.payouts_for(&q).await.unwrap().is_empty());
    assert_eq!(engine.transactions_for_user(&q).await.unwrap(), before);
    assert_eq!(engine.wallet(&q).await.unwrap().balance, Balance(dec!(86.80)));
}

#[tokio::test]
async fn test_payout_completes_after_settlement() {
    let (engine, _) = engine_with(EngineConfig {
        payout_settlement_delay: Duration::from_millis(20),
        ..EngineConfig::default()
    });
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    engine.release(payment.id, UserId::from("p")).await.unwrap();
    let q = UserId::from("q");

    let payout = engine.payout(&q, amount(dec!(86.80)), "ba_q").await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Processing);
    assert_eq!(payout.fee_amount, Balance(dec!(0.87)));
    assert_eq!(payout.net_amount, Balance(dec!(85.93)));

    let wallet = engine.wallet(&q).await.unwrap();
    assert_eq!(wallet.balance, Balance(dec!(0.00)));
    assert_eq!(wallet.total_withdrawn, Balance(dec!(86.80)));

    engine.wait_for_settlements().await;
    let settled = engine.get_payout(payout.id).await.unwrap();
    assert_eq!(settled.status, PayoutStatus::Completed);
    assert_eq!(engine.payouts_for(&q).await.unwrap(), vec![settled]);
}

#[tokio::test]
async fn test_failed_settlement_is_compensated() {
    let (engine, _) = engine_with(EngineConfig {
        payout_settlement_delay: Duration::from_secs(3600),
        ..EngineConfig::default()
    });
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    engine.release(payment.id, UserId::from("p")).await.unwrap();
    let q = UserId::from("q");

    let payout = engine.payout(&q, amount(dec!(50.00)), "ba_q").await.unwrap();
    engine
        .complete_payout(
            payout.id,
            PayoutOutcome::Failed {
                reason: "account closed".to_string(),
            },
        )
        .await
        .unwrap();

    let wallet = engine.wallet(&q).await.unwrap();
    assert_eq!(wallet.balance, Balance(dec!(86.80)));
    assert_eq!(wallet.total_withdrawn, Balance::ZERO);

    let kinds: Vec<_> = engine
        .transactions_for_user(&q)
        .await
        .unwrap()
        .into_iter()
        .map(|tx| tx.r#type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TransactionType::EscrowRelease,
            TransactionType::Payout,
            TransactionType::PayoutReversal,
        ]
    );
    engine.reconcile(&q).await.unwrap();
}

mod common;

use common::{amount, engine, held_payment, request};
use escrow_engine::domain::ids::UserId;
use escrow_engine::domain::money::Balance;
use escrow_engine::domain::payment::{PaymentStatus, RefundStatus};
use escrow_engine::error::EscrowError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_partial_refunds_until_nothing_remains() {
    let (engine, _) = engine();
    let payment = engine
        .create_payment(request("p", "q", dec!(100.00), false))
        .await
        .unwrap();
    let payment = engine.confirm(payment.id, "pm_card_visa").await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);

    let payment = engine
        .refund(payment.id, Some(amount(dec!(40.00))), "partial")
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(payment.refund_amount, Balance(dec!(40.00)));
    assert_eq!(payment.refund_status, RefundStatus::Partial);

    let payment = engine
        .refund(payment.id, Some(amount(dec!(60.00))), "rest")
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refund_amount, Balance(dec!(100.00)));
    assert!(payment.refunded_at.is_some());

    let err = engine
        .refund(payment.id, Some(amount(dec!(1.00))), "again")
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::NothingToRefund(_)));
    assert_eq!(
        err.user_message(),
        "This payment has already been fully refunded."
    );
}

#[tokio::test]
async fn test_refund_never_exceeds_amount() {
    let (engine, _) = engine();
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    engine
        .refund(payment.id, Some(amount(dec!(70.00))), "partial")
        .await
        .unwrap();

    let err = engine
        .refund(payment.id, Some(amount(dec!(30.01))), "too much")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EscrowError::RefundExceedsRemaining { remaining, .. } if remaining == dec!(30.00)
    ));
    let payment = engine.payment(payment.id).await.unwrap();
    assert_eq!(payment.refund_amount, Balance(dec!(70.00)));
}

#[tokio::test]
async fn test_refunded_escrow_frees_payer_reservation() {
    let (engine, _) = engine();
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    assert_eq!(
        engine.wallet(&UserId::from("p")).await.unwrap().reserved_balance,
        Balance(dec!(100.00))
    );

    engine
        .refund(payment.id, Some(amount(dec!(25.00))), "partial")
        .await
        .unwrap();
    let payer = engine.wallet(&UserId::from("p")).await.unwrap();
    assert_eq!(payer.reserved_balance, Balance::ZERO);
    assert_eq!(engine.wallet(&UserId::from("q")).await.unwrap().balance, Balance::ZERO);
}

#[tokio::test]
async fn test_released_payment_is_not_refundable() {
    let (engine, _) = engine();
    let payment = held_payment(&engine, "p", "q", dec!(100.00)).await;
    engine.release(payment.id, UserId::from("p")).await.unwrap();

    let err = engine.refund(payment.id, None, "late").await.unwrap_err();
    assert!(matches!(
        err,
        EscrowError::NotRefundable {
            status: PaymentStatus::Released,
            ..
        }
    ));
}

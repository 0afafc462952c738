#![allow(dead_code)]

use escrow_engine::application::engine::{EscrowEngine, PaymentRequest};
use escrow_engine::config::EngineConfig;
use escrow_engine::domain::ids::UserId;
use escrow_engine::domain::money::Amount;
use escrow_engine::domain::payment::Payment;
use escrow_engine::infrastructure::in_memory::in_memory_stores;
use escrow_engine::infrastructure::simulated_provider::SimulatedProvider;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const COMMANDS_HEADER: &str = "command, reference, user, counterparty, amount, detail";

pub fn engine() -> (EscrowEngine, SimulatedProvider) {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> (EscrowEngine, SimulatedProvider) {
    let provider = SimulatedProvider::new();
    let engine = EscrowEngine::new(in_memory_stores(), Arc::new(provider.clone()), config);
    (engine, provider)
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn request(payer: &str, payee: &str, value: Decimal, escrow: bool) -> PaymentRequest {
    PaymentRequest {
        payer_id: UserId::from(payer),
        payee_id: UserId::from(payee),
        amount: amount(value),
        currency: None,
        escrow,
        description: None,
        metadata: BTreeMap::new(),
    }
}

/// Creates and confirms an escrow payment from `payer` to `payee`.
pub async fn held_payment(engine: &EscrowEngine, payer: &str, payee: &str, value: Decimal) -> Payment {
    let payment = engine
        .create_payment(request(payer, payee, value, true))
        .await
        .unwrap();
    engine.confirm(payment.id, "pm_card_visa").await.unwrap()
}

/// Writes a commands CSV with the standard header followed by `rows`.
pub fn commands_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{COMMANDS_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

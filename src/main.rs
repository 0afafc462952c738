use clap::Parser;
use escrow_engine::application::engine::{EscrowEngine, PaymentRequest};
use escrow_engine::config::EngineConfig;
use escrow_engine::domain::ids::{Currency, PaymentId, UserId};
use escrow_engine::domain::money::Amount;
use escrow_engine::domain::ports::Stores;
use escrow_engine::error::EscrowError;
use escrow_engine::infrastructure::simulated_provider::SimulatedProvider;
use escrow_engine::interfaces::csv::command_reader::{Command, CommandKind, CommandReader};
use escrow_engine::interfaces::csv::wallet_writer::WalletWriter;
use miette::{IntoDiagnostic, Result, miette};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// ISO 4217 currency for new payments and payouts
    #[arg(long)]
    currency: Option<String>,

    /// Make every simulated payee transfer fail
    #[arg(long)]
    fail_transfers: bool,

    /// Retry pending payee transfers once all commands have run
    #[arg(long)]
    retry_transfers: bool,

    /// Check every wallet against the transaction log before exiting
    #[arg(long)]
    reconcile: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(code) = &cli.currency {
        config.default_currency =
            Currency::new(code).ok_or_else(|| miette!("invalid currency code: {code}"))?;
    }

    let provider = SimulatedProvider::new();
    if cli.fail_transfers {
        provider.set_fail_transfers(true).await;
    }
    let stores = open_stores(cli.db_path.as_deref())?;
    let engine = EscrowEngine::new(stores, Arc::new(provider), config);

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut payments = HashMap::new();
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                let kind = command.command;
                if let Err(e) = run(&engine, command, &mut payments).await {
                    debug!(error = %e, "command failed");
                    eprintln!("Error processing {kind:?} command: {}", e.user_message());
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    engine.wait_for_settlements().await;
    if cli.retry_transfers {
        let summary = engine.retry_pending_transfers().await.into_diagnostic()?;
        info!(
            attempted = summary.attempted,
            settled = summary.settled,
            "pending transfers retried"
        );
    }

    let wallets = engine.wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(wallets).into_diagnostic()?;

    if cli.reconcile {
        engine.reconcile_all().await.into_diagnostic()?;
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    use escrow_engine::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(RocksDBStore::open(path).into_diagnostic()?.stores()),
        None => Ok(escrow_engine::infrastructure::in_memory::in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(escrow_engine::infrastructure::in_memory::in_memory_stores())
}

/// Runs one command row. `payments` maps the CSV references of this run to payment ids.
async fn run(
    engine: &EscrowEngine,
    command: Command,
    payments: &mut HashMap<String, PaymentId>,
) -> escrow_engine::Result<()> {
    match command.command {
        CommandKind::Link => {
            engine
                .link_payout_account(&UserId::from(command.user()?), command.detail()?.to_string())
                .await
        }
        CommandKind::Create => {
            let reference = command.reference()?.to_string();
            if payments.contains_key(&reference) {
                return Err(EscrowError::ValidationError(format!(
                    "payment reference {reference} is already in use"
                )));
            }
            let payment = engine
                .create_payment(PaymentRequest {
                    payer_id: UserId::from(command.user()?),
                    payee_id: UserId::from(command.counterparty()?),
                    amount: Amount::new(command.amount()?)?,
                    currency: None,
                    escrow: command.detail.as_deref() != Some("direct"),
                    description: None,
                    metadata: BTreeMap::from([("reference".to_string(), reference.clone())]),
                })
                .await?;
            payments.insert(reference, payment.id);
            Ok(())
        }
        CommandKind::Confirm => {
            let payment_id = lookup(payments, &command)?;
            let method = command.detail.as_deref().unwrap_or("pm_card_visa");
            engine.confirm(payment_id, method).await.map(drop)
        }
        CommandKind::Release => {
            let payment_id = lookup(payments, &command)?;
            engine
                .release(payment_id, UserId::from(command.user()?))
                .await
                .map(drop)
        }
        CommandKind::Refund => {
            let payment_id = lookup(payments, &command)?;
            let amount = command.amount.map(Amount::new).transpose()?;
            let reason = command.detail.as_deref().unwrap_or("requested_by_customer");
            engine.refund(payment_id, amount, reason).await.map(drop)
        }
        CommandKind::Payout => engine
            .payout(
                &UserId::from(command.user()?),
                Amount::new(command.amount()?)?,
                command.detail()?,
            )
            .await
            .map(drop),
    }
}

fn lookup(payments: &HashMap<String, PaymentId>, command: &Command) -> escrow_engine::Result<PaymentId> {
    let reference = command.reference()?;
    payments
        .get(reference)
        .copied()
        .ok_or_else(|| EscrowError::ValidationError(format!("unknown payment reference {reference}")))
}

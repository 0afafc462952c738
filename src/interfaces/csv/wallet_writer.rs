use crate::domain::money::Balance;
use crate::domain::wallet::Wallet;
use crate::error::Result;
use std::io::Write;

/// Writes wallet balances as CSV, amounts at cent precision.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: impl IntoIterator<Item = Wallet>) -> Result<()> {
        self.writer.write_record([
            "user",
            "balance",
            "reserved",
            "total_earned",
            "total_withdrawn",
        ])?;
        for wallet in wallets {
            self.writer.write_record([
                wallet.user_id.to_string(),
                cents(wallet.balance),
                cents(wallet.reserved_balance),
                cents(wallet.total_earned),
                cents(wallet.total_withdrawn),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn cents(value: Balance) -> String {
    format!("{:.2}", value.value())
}

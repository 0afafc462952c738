use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Links `user` to the payout account in `detail`.
    Link,
    /// Opens payment `reference` from `user` to `counterparty`; `detail` = `direct` skips escrow.
    Create,
    /// Confirms `reference` with the payment method token in `detail`.
    Confirm,
    /// Releases `reference`; `user` is recorded as the releaser.
    Release,
    /// Refunds `amount` of `reference`, or the remainder when empty; `detail` is the reason.
    Refund,
    /// Pays `amount` out of `user`'s wallet to the destination in `detail`.
    Payout,
}

/// One row of the commands CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    pub command: CommandKind,
    pub reference: Option<String>,
    pub user: Option<String>,
    pub counterparty: Option<String>,
    pub amount: Option<Decimal>,
    pub detail: Option<String>,
}

impl Command {
    pub fn reference(&self) -> Result<&str> {
        required(self.reference.as_deref(), "reference")
    }

    pub fn user(&self) -> Result<&str> {
        required(self.user.as_deref(), "user")
    }

    pub fn counterparty(&self) -> Result<&str> {
        required(self.counterparty.as_deref(), "counterparty")
    }

    pub fn detail(&self) -> Result<&str> {
        required(self.detail.as_deref(), "detail")
    }

    pub fn amount(&self) -> Result<Decimal> {
        self.amount
            .ok_or_else(|| EscrowError::ValidationError("amount is required".to_string()))
    }
}

fn required<'a>(value: Option<&'a str>, column: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EscrowError::ValidationError(format!("{column} is required")))
}

/// Reads engine commands from a CSV source.
///
/// Whitespace around fields is trimmed and rows may omit trailing columns.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error and reading continues.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EscrowError::from))
    }
}

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;

pub use application::engine::{ConfirmationOutcome, EscrowEngine, PaymentRequest};
pub use config::EngineConfig;
pub use domain::payout::PayoutRequest;
pub use error::{EscrowError, Result};

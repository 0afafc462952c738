//! Application layer: orchestrates the payment state machine, the provider and the
//! wallet ledger.
//!
//! [`engine::EscrowEngine`] is the entry point. Its operations are split by concern
//! across the sibling modules; each one serializes work per payment or per wallet
//! through [`locks::KeyedLocks`].

pub mod engine;
pub mod escrow;
pub mod ledger;
pub mod locks;
pub mod payout;
pub mod reconciliation;
pub mod refund;

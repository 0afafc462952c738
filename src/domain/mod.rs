//! Domain layer: value objects, records, the payment state machine and the ports the
//! application layer drives.

pub mod events;
pub mod fees;
pub mod ids;
pub mod money;
pub mod payment;
pub mod payment_method;
pub mod payout;
pub mod ports;
pub mod provider;
pub mod transaction;
pub mod wallet;

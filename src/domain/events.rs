use super::ids::{PaymentId, UserId};
use super::payment::PaymentStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status change handed to the notification subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub payee_id: UserId,
}

/// Receives payment status changes. Delivery failures are the sink's concern and
/// never fail the engine operation that emitted the event.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: PaymentEvent);
}

pub type NotifierRef = Arc<dyn NotificationSink>;

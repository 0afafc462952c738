use crate::domain::events::{NotificationSink, PaymentEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Writes every event to the tracing log. Used when no collaborator is attached.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, event: PaymentEvent) {
        info!(
            payment_id = %event.payment_id,
            status = %event.status,
            payee_id = %event.payee_id,
            "payment status changed"
        );
    }
}

/// Forwards events into a tokio channel consumed by the notification subsystem.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<PaymentEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PaymentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn notify(&self, event: PaymentEvent) {
        if self.sender.send(event).is_err() {
            warn!("notification receiver dropped; event discarded");
        }
    }
}

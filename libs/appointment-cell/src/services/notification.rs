// libs/appointment-cell/src/services/notification.rs
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::{RecvError, TryRecvError}};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::AppointmentDetails;

pub const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

/// Appointment-changed event as it travels over the bus.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentChanged {
    pub appointment: AppointmentDetails,
    pub changed_at: DateTime<Utc>,
}

/// In-process broadcast of appointment changes.
///
/// Every publish reaches every live subscription; each subscription drops
/// events for other appointments on its own side. Nothing is replayed to
/// late subscribers and nothing crosses process boundaries.
#[derive(Clone)]
pub struct AppointmentNotificationBus {
    sender: broadcast::Sender<AppointmentChanged>,
}

impl AppointmentNotificationBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Returns how many subscriptions the event was handed to.
    pub fn publish(&self, appointment: AppointmentDetails) -> usize {
        let appointment_id = appointment.id();
        let status = appointment.status();
        let event = AppointmentChanged {
            appointment,
            changed_at: Utc::now(),
        };

        match self.sender.send(event) {
            Ok(delivered) => {
                debug!("Published {} ({}) to {} subscriptions", appointment_id, status, delivered);
                delivered
            }
            Err(_) => {
                debug!("No live subscriptions for change to {}", appointment_id);
                0
            }
        }
    }

    pub fn subscribe(&self, appointment_id: Uuid) -> AppointmentSubscription {
        debug!("Subscribing to changes of appointment {}", appointment_id);
        AppointmentSubscription {
            appointment_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AppointmentNotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_BUFFER)
    }
}

/// A live registration on the bus. Dropping or cancelling it unregisters it
/// before the call returns.
pub struct AppointmentSubscription {
    appointment_id: Uuid,
    receiver: broadcast::Receiver<AppointmentChanged>,
}

impl AppointmentSubscription {
    pub fn appointment_id(&self) -> Uuid {
        self.appointment_id
    }

    /// Waits for the next change to this appointment. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<AppointmentDetails> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.appointment.id() == self.appointment_id => {
                    return Some(event.appointment);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription to {} lagged, {} events dropped", self.appointment_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drains already-published events without waiting.
    pub fn try_next(&mut self) -> Option<AppointmentDetails> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.appointment.id() == self.appointment_id => {
                    return Some(event.appointment);
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Subscription to {} lagged, {} events dropped", self.appointment_id, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(self) {
        debug!("Cancelled subscription to appointment {}", self.appointment_id);
    }

    pub fn into_stream(self) -> impl Stream<Item = AppointmentDetails> {
        stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|appointment| (appointment, subscription))
        })
    }
}

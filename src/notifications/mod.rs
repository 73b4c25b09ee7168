use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{format_amount, Booking, Payment, User};
use crate::error::Result;

pub mod fcm;
pub mod inbox;
pub mod sms;

pub use fcm::FcmChannel;
pub use inbox::InboxChannel;
pub use sms::SmsChannel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewBooking,
    BookingConfirmed,
    BookingCancelled,
    BookingCompleted,
    ReviewRequested,
    ReviewReceived,
    MeetingCreated,
    PaymentSucceeded,
    PaymentFailed,
    RefundProcessed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewBooking => "new_booking",
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::BookingCompleted => "booking_completed",
            NotificationKind::ReviewRequested => "review_requested",
            NotificationKind::ReviewReceived => "review_received",
            NotificationKind::MeetingCreated => "meeting_created",
            NotificationKind::PaymentSucceeded => "payment_succeeded",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::RefundProcessed => "refund_processed",
        }
    }

    /// Worth a text message, not just a push.
    pub fn is_urgent(&self) -> bool {
        matches!(
            self,
            NotificationKind::BookingConfirmed
                | NotificationKind::BookingCancelled
                | NotificationKind::PaymentSucceeded
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub user_id: Uuid,
    pub device_token: Option<String>,
    pub phone: Option<String>,
}

impl Recipient {
    pub fn bare(user_id: Uuid) -> Self {
        Self {
            user_id,
            device_token: None,
            phone: None,
        }
    }
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            device_token: user.device_token.clone().filter(|t| !t.is_empty()),
            phone: Some(user.phone.clone()).filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl Notification {
    /// Message about `booking` for one of its participants.
    pub fn for_booking(kind: NotificationKind, booking: &Booking, recipient: Recipient) -> Self {
        let amount = format!("{} {}", booking.currency, format_amount(booking.total_amount_cents));
        let (title, body) = match kind {
            NotificationKind::NewBooking => (
                "New booking request",
                format!("A student wants to book a {} session", booking.subject),
            ),
            NotificationKind::BookingConfirmed => (
                "Booking confirmed",
                format!("Your {} session has been confirmed", booking.subject),
            ),
            NotificationKind::BookingCancelled => (
                "Booking cancelled",
                format!("The {} session has been cancelled", booking.subject),
            ),
            NotificationKind::BookingCompleted => (
                "Session completed",
                format!("The {} session was marked as complete", booking.subject),
            ),
            NotificationKind::ReviewRequested => (
                "Rate your session",
                format!("How was your {} session?", booking.subject),
            ),
            NotificationKind::ReviewReceived => (
                "New review",
                format!("Your student reviewed the {} session", booking.subject),
            ),
            NotificationKind::MeetingCreated => (
                "Video session ready",
                format!("The meeting link for your {} session is ready", booking.subject),
            ),
            NotificationKind::PaymentSucceeded => (
                "Payment received",
                format!("Payment of {} for {} received", amount, booking.subject),
            ),
            NotificationKind::PaymentFailed => (
                "Payment failed",
                format!("Payment for your {} session did not go through", booking.subject),
            ),
            NotificationKind::RefundProcessed => (
                "Refund processed",
                format!("Your refund for the {} session has been issued", booking.subject),
            ),
        };

        Self {
            recipient,
            kind,
            title: title.to_string(),
            body,
            data: json!({
                "type": kind.as_str(),
                "booking_id": booking.id,
                "subject": booking.subject,
                "status": booking.status.as_str(),
            }),
        }
    }

    pub fn with_payment(mut self, payment: &Payment) -> Self {
        if let Value::Object(ref mut map) = self.data {
            map.insert("payment_id".to_string(), json!(payment.id));
            map.insert("amount_cents".to_string(), json!(payment.amount_cents));
            if let Some(reason) = &payment.failure_reason {
                map.insert("reason".to_string(), json!(reason));
            }
        }
        self
    }
}

/// Fire-and-forget delivery. Implementations log failures instead of returning them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn health_check(&self) -> Result<()>;
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub struct NotificationDispatcher {
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, channel: Arc<dyn NotificationChannel>) {
        if channel.is_enabled() {
            tracing::info!("Registered notification channel: {}", channel.name());
            self.channels.write().await.push(channel);
        }
    }

    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let channels = self.channels.read().await;
        let mut results = Vec::new();

        for channel in channels.iter() {
            let name = channel.name().to_string();
            let result = channel.health_check().await;
            results.push((name, result));
        }

        results
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, notification: Notification) {
        let channels = self.channels.read().await;

        for channel in channels.iter() {
            match channel.deliver(&notification).await {
                Ok(_) => {
                    tracing::debug!(
                        "Channel {} delivered {} to {}",
                        channel.name(),
                        notification.kind.as_str(),
                        notification.recipient.user_id
                    );
                }
                Err(e) => {
                    // One broken channel must not stop the rest.
                    tracing::error!(
                        "Channel {} failed to deliver {}: {:?}",
                        channel.name(),
                        notification.kind.as_str(),
                        e
                    );
                }
            }
        }
    }
}

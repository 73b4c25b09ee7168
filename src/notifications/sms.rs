use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::{
    config::SmsConfig,
    error::{AppError, Result},
    notifications::{Notification, NotificationChannel},
};

const AFRICAS_TALKING_URL: &str = "https://api.africastalking.com/version1/messaging";

/// Text messages through Africa's Talking, for urgent notifications only.
pub struct SmsChannel {
    client: Client,
    config: SmsConfig,
    endpoint: String,
}

impl SmsChannel {
    pub fn new(config: Option<SmsConfig>) -> Option<Self> {
        let config = config.filter(|cfg| cfg.enabled)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        Some(Self {
            client,
            config,
            endpoint: AFRICAS_TALKING_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.api_key.is_empty() || self.config.username.is_empty() {
            return Err(AppError::Delivery("SMS credentials not configured".to_string()));
        }
        Ok(())
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        if !notification.kind.is_urgent() {
            return Ok(());
        }
        let Some(phone) = notification.recipient.phone.as_deref() else {
            return Ok(());
        };

        let message = format!("{}: {}", notification.title, notification.body);
        let form = [
            ("username", self.config.username.as_str()),
            ("to", phone),
            ("message", message.as_str()),
            ("from", self.config.sender_id.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .header("apiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("SMS request failed: {}", e)))?;

        if response.status() != StatusCode::CREATED {
            return Err(AppError::Delivery(format!(
                "SMS gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationKind, Recipient};
    use mockito::Matcher;
    use serde_json::json;
    use uuid::Uuid;

    fn channel(endpoint: String) -> SmsChannel {
        SmsChannel::new(Some(SmsConfig {
            enabled: true,
            api_key: "at-key".to_string(),
            username: "sandbox".to_string(),
            sender_id: "TUTORBOOK".to_string(),
        }))
        .unwrap()
        .with_endpoint(endpoint)
    }

    fn notification(kind: NotificationKind) -> Notification {
        Notification {
            recipient: Recipient {
                user_id: Uuid::new_v4(),
                device_token: None,
                phone: Some("254712345678".to_string()),
            },
            kind,
            title: "Booking confirmed".to_string(),
            body: "Your Physics session has been confirmed".to_string(),
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn test_urgent_notification_is_texted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/version1/messaging")
            .match_header("apikey", "at-key")
            .match_body(Matcher::UrlEncoded("to".into(), "254712345678".into()))
            .with_status(201)
            .create_async()
            .await;

        channel(format!("{}/version1/messaging", server.url()))
            .deliver(&notification(NotificationKind::BookingConfirmed))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_routine_notification_is_not_texted() {
        let channel = channel("http://127.0.0.1:1/version1/messaging".to_string());
        assert!(channel
            .deliver(&notification(NotificationKind::ReviewRequested))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_non_created_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/version1/messaging")
            .with_status(401)
            .create_async()
            .await;

        let result = channel(format!("{}/version1/messaging", server.url()))
            .deliver(&notification(NotificationKind::PaymentSucceeded))
            .await;
        assert!(matches!(result, Err(AppError::Delivery(_))));
    }
}

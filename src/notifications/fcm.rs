use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::{
    config::FcmConfig,
    error::{AppError, Result},
    notifications::{Notification, NotificationChannel},
};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Push notifications through Firebase Cloud Messaging.
pub struct FcmChannel {
    client: Client,
    config: FcmConfig,
    endpoint: String,
}

impl FcmChannel {
    pub fn new(config: Option<FcmConfig>) -> Option<Self> {
        let config = config.filter(|cfg| cfg.enabled)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        Some(Self {
            client,
            config,
            endpoint: FCM_SEND_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl NotificationChannel for FcmChannel {
    fn name(&self) -> &str {
        "fcm"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.server_key.is_empty() {
            return Err(AppError::Delivery("FCM server key not configured".to_string()));
        }
        Ok(())
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let Some(token) = notification.recipient.device_token.as_deref() else {
            tracing::debug!(
                "No device token for user {}, skipping push",
                notification.recipient.user_id
            );
            return Ok(());
        };

        let payload = json!({
            "to": token,
            "notification": {
                "title": notification.title,
                "body": notification.body,
                "sound": "default",
            },
            "data": notification.data,
            "priority": "high",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("FCM request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Delivery(format!(
                "FCM returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

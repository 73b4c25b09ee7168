use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

pub mod jitsi;

pub use jitsi::JitsiProvider;

/// What the platform asks a meeting provider to set up for a session.
#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub booking_id: Uuid,
    pub topic: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// A room handed back by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingRoom {
    pub meeting_id: String,
    pub join_url: String,
    /// Host link for providers that distinguish one.
    pub host_url: Option<String>,
    pub password: Option<String>,
}

#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Stored on each meeting.
    fn name(&self) -> &str;
    async fn create(&self, request: &MeetingRequest) -> Result<MeetingRoom>;
}

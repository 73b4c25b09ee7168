use async_trait::async_trait;

use crate::{
    config::MeetingConfig,
    error::Result,
    meetings::{MeetingProvider, MeetingRequest, MeetingRoom},
};

/// Jitsi rooms exist as soon as someone opens the URL, so nothing is called remotely.
pub struct JitsiProvider {
    config: MeetingConfig,
}

impl JitsiProvider {
    pub fn new(config: MeetingConfig) -> Self {
        Self { config }
    }

    fn room_name(&self, request: &MeetingRequest) -> String {
        format!("{}-{}", self.config.room_prefix, request.booking_id.simple())
    }
}

#[async_trait]
impl MeetingProvider for JitsiProvider {
    fn name(&self) -> &str {
        "jitsi"
    }

    async fn create(&self, request: &MeetingRequest) -> Result<MeetingRoom> {
        let room = self.room_name(request);
        let domain = self.config.jitsi_domain.trim_end_matches('/');

        tracing::debug!(
            "Jitsi room {} for booking {} ({} minutes)",
            room,
            request.booking_id,
            request.duration_minutes
        );

        Ok(MeetingRoom {
            join_url: format!("https://{}/{}", domain, room),
            meeting_id: room,
            host_url: None,
            password: None,
        })
    }
}

use chrono::{Duration, FixedOffset, Offset, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub meetings: MeetingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// How long a revoked token stays on the denylist.
    pub token_ttl_hours: i64,
    /// Reject actor requests that carry no bearer token, so logout cannot be sidestepped.
    pub require_bearer: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub cancellation_cutoff_hours: i64,
    pub min_notice_hours: i64,
    pub payout_delay_hours: i64,
    pub platform_fee_percent: i64,
    pub utc_offset_minutes: i32,
    pub currency: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            cancellation_cutoff_hours: 24,
            min_notice_hours: 0,
            payout_delay_hours: 24,
            platform_fee_percent: 15,
            utc_offset_minutes: 0,
            currency: "KES".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub gateway_timeout_secs: u64,
    pub status_check_after_minutes: i64,
    pub pending_expiry_minutes: i64,
    pub mpesa: Option<MpesaConfig>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            gateway_timeout_secs: 30,
            status_check_after_minutes: 2,
            pending_expiry_minutes: 60,
            mpesa: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MpesaConfig {
    pub enabled: bool,
    #[serde(default = "default_mpesa_environment")]
    pub environment: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

fn default_mpesa_environment() -> String {
    "sandbox".to_string()
}

impl MpesaConfig {
    pub fn base_url(&self) -> &'static str {
        if self.environment == "production" {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub fcm: Option<FcmConfig>,
    pub sms: Option<SmsConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FcmConfig {
    pub enabled: bool,
    pub server_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    pub enabled: bool,
    pub api_key: String,
    pub username: String,
    #[serde(default = "default_sender_id")]
    pub sender_id: String,
}

fn default_sender_id() -> String {
    "TUTORBOOK".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeetingConfig {
    pub jitsi_domain: String,
    pub room_prefix: String,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            jitsi_domain: "meet.jit.si".to_string(),
            room_prefix: "TutorBook".to_string(),
        }
    }
}

/// Business rules the booking lifecycle enforces, resolved from settings.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub cancellation_cutoff: Duration,
    pub min_notice: Duration,
    pub payout_delay: Duration,
    pub platform_fee_percent: i64,
    pub session_offset: FixedOffset,
    pub currency: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        BookingConfig::default().into()
    }
}

impl From<BookingConfig> for BookingPolicy {
    fn from(cfg: BookingConfig) -> Self {
        Self {
            cancellation_cutoff: Duration::hours(cfg.cancellation_cutoff_hours),
            min_notice: Duration::hours(cfg.min_notice_hours),
            payout_delay: Duration::hours(cfg.payout_delay_hours),
            platform_fee_percent: cfg.platform_fee_percent.clamp(0, 100),
            session_offset: FixedOffset::east_opt(cfg.utc_offset_minutes * 60)
                .unwrap_or_else(|| Utc.fix()),
            currency: cfg.currency,
        }
    }
}

/// Retry and expiry windows for charges still waiting on the gateway.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub status_check_after: Duration,
    pub pending_expiry: Duration,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        (&PaymentsConfig::default()).into()
    }
}

impl From<&PaymentsConfig> for PaymentPolicy {
    fn from(cfg: &PaymentsConfig) -> Self {
        Self {
            status_check_after: Duration::minutes(cfg.status_check_after_minutes),
            pending_expiry: Duration::minutes(cfg.pending_expiry_minutes),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://tutorbook.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.token_ttl_hours", 24)?
            .set_default("auth.require_bearer", true)?
            .set_default("booking.cancellation_cutoff_hours", 24)?
            .set_default("booking.min_notice_hours", 0)?
            .set_default("booking.payout_delay_hours", 24)?
            .set_default("booking.platform_fee_percent", 15)?
            .set_default("booking.utc_offset_minutes", 0)?
            .set_default("booking.currency", "KES")?
            .set_default("payments.gateway_timeout_secs", 30)?
            .set_default("payments.status_check_after_minutes", 2)?
            .set_default("payments.pending_expiry_minutes", 60)?
            .set_default("meetings.jitsi_domain", "meet.jit.si")?
            .set_default("meetings.room_prefix", "TutorBook")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with TUTORBOOK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("TUTORBOOK").separator("__"))

            .build()?;

        config.try_deserialize()
    }

    pub fn booking_policy(&self) -> BookingPolicy {
        self.booking.clone().into()
    }

    pub fn payment_policy(&self) -> PaymentPolicy {
        (&self.payments).into()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://tutorbook.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                token_ttl_hours: 24,
                require_bearer: true,
            },
            booking: BookingConfig::default(),
            payments: PaymentsConfig::default(),
            notifications: NotificationConfig::default(),
            meetings: MeetingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_booking_policy() {
        let policy = Settings::default().booking_policy();
        assert_eq!(policy.cancellation_cutoff, Duration::hours(24));
        assert_eq!(policy.payout_delay, Duration::hours(24));
        assert_eq!(policy.platform_fee_percent, 15);
        assert_eq!(policy.session_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_fee_percent_is_clamped() {
        let policy: BookingPolicy = BookingConfig {
            platform_fee_percent: 250,
            ..Default::default()
        }
        .into();
        assert_eq!(policy.platform_fee_percent, 100);
    }

    #[test]
    fn test_mpesa_base_url() {
        let mut cfg = MpesaConfig {
            enabled: true,
            environment: "sandbox".to_string(),
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            shortcode: "174379".to_string(),
            passkey: "pass".to_string(),
            callback_url: "https://example.com".to_string(),
        };
        assert_eq!(cfg.base_url(), "https://sandbox.safaricom.co.ke");
        cfg.environment = "production".to_string();
        assert_eq!(cfg.base_url(), "https://api.safaricom.co.ke");
    }
}

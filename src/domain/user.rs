use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub location: Option<String>,
    pub role: UserRole,
    pub device_token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Tutor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "Student",
            UserRole::Tutor => "Tutor",
            UserRole::Admin => "Admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Student" => Some(UserRole::Student),
            "Tutor" => Some(UserRole::Tutor),
            "Admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tutor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub subjects: String,
    pub level: String,
    pub bio: String,
    pub hourly_rate_cents: i64,
    pub rating: f64,
    pub total_ratings: i64,
    pub completed_sessions: i64,
    pub is_available: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tutor {
    /// Only verified tutors who are currently accepting students can be booked.
    pub fn is_bookable(&self) -> bool {
        self.is_available && self.is_verified
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub location: Option<String>,
    pub role: UserRole,
    pub device_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTutorRequest {
    pub user_id: Uuid,
    pub full_name: String,
    pub subjects: String,
    pub level: String,
    pub bio: String,
    pub hourly_rate_cents: i64,
}

/// Directory filters. Text filters match case-insensitively anywhere in the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TutorSearch {
    /// Matches name, subjects or bio.
    pub q: Option<String>,
    pub subject: Option<String>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub min_rate_cents: Option<i64>,
    pub max_rate_cents: Option<i64>,
    pub min_rating: Option<f64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod user_repository;
pub mod tutor_repository;
pub mod booking_repository;
pub mod payment_repository;
pub mod review_repository;

pub use user_repository::SqliteUserRepository;
pub use tutor_repository::SqliteTutorRepository;
pub use booking_repository::SqliteBookingRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use review_repository::SqliteReviewRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, request: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<User>;
}

#[async_trait]
pub trait TutorRepository: Send + Sync {
    async fn create(&self, request: CreateTutorRequest) -> Result<Tutor>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tutor>>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Tutor>>;
    /// Verified tutors currently accepting bookings.
    async fn list_bookable(&self) -> Result<Vec<Tutor>>;
    async fn set_availability(&self, id: Uuid, available: bool) -> Result<Tutor>;
    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<Tutor>;
    /// Bookable tutors matching `filters`, best rated first, plus the total match count.
    async fn search(&self, filters: &TutorSearch, limit: i64, offset: i64) -> Result<(Vec<Tutor>, i64)>;
}

/// Details recorded when a booking is cancelled.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub by: Party,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Booking persistence. Transition methods are compare-and-set: they return
/// `Ok(None)` when the booking was no longer in an allowed predecessor state
/// at write time, and perform every dependent write in the same transaction.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: NewBooking) -> Result<Booking>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Booking>>;
    async fn find_by_student(&self, student_id: Uuid) -> Result<Vec<Booking>>;
    async fn confirm(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>>;
    /// Also flags a refund when a completed charge exists for the booking.
    async fn cancel(&self, id: Uuid, cancellation: Cancellation) -> Result<Option<Booking>>;
    /// Also bumps the tutor's completed-session counter.
    async fn complete(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        payout_at: DateTime<Utc>,
    ) -> Result<Option<Booking>>;
    /// Whether the tutor already holds a pending or confirmed booking for this slot.
    async fn has_open_booking_at(
        &self,
        tutor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool>;
    /// Returns `Ok(None)` when the booking already has a meeting.
    async fn save_meeting(&self, meeting: Meeting) -> Result<Option<Meeting>>;
    async fn find_meeting(&self, booking_id: Uuid) -> Result<Option<Meeting>>;
}

/// Review persistence.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Marks the booking reviewed, stores the review and folds its rating into the
    /// tutor's running average in one transaction. Returns `Ok(None)` when the booking
    /// is not completed or was already reviewed.
    async fn create(&self, review: NewReview) -> Result<Option<Review>>;
    /// Newest first.
    async fn list_for_tutor(&self, tutor_id: Uuid, limit: i64) -> Result<Vec<Review>>;
}

/// Payment persistence. Settlement methods only act on unsettled rows and
/// return `Ok(None)` when the payment had already been settled.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>>;
    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>>;
    async fn find_pending_charge(&self, booking_id: Uuid) -> Result<Option<Payment>>;
    async fn list_pending_charges_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;
    /// Completes a pending or locally expired charge and reconciles its booking to paid
    /// (and confirmed when pending). Flags a refund when the booking was cancelled or
    /// another charge had already completed.
    async fn settle_success(
        &self,
        id: Uuid,
        receipt: Receipt,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;
    async fn settle_failure(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;
    /// Inserts `refund` and marks the original charge refunded in one transaction.
    async fn record_refund(&self, original_id: Uuid, refund: Payment) -> Result<Option<Payment>>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}

pub(crate) fn parse_column<T>(value: &str, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| AppError::Database(format!("Invalid {}: {}", column, value)))
}

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::payment::{Payment, PaymentKind, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    /// User account behind `tutor_id`; fixed at creation like the other participants.
    pub tutor_user_id: Uuid,
    pub subject: String,
    pub hours: i64,
    pub hourly_rate_cents: i64,
    pub total_amount_cents: i64,
    pub platform_fee_cents: i64,
    pub tutor_payout_cents: i64,
    pub currency: String,
    pub schedule_date: NaiveDate,
    pub schedule_time: NaiveTime,
    pub scheduled_start: DateTime<Utc>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Party>,
    pub cancellation_reason: Option<String>,
    pub refund_status: Option<RefundStatus>,
    pub refund_amount_cents: Option<i64>,
    pub payout_scheduled_at: Option<DateTime<Utc>>,
    pub payout_released: bool,
    pub is_reviewed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Video room attached to a confirmed booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub booking_id: Uuid,
    pub provider: String,
    pub meeting_id: String,
    pub join_url: String,
    /// Host link; only shown to the tutor.
    pub host_url: Option<String>,
    pub password: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(BookingStatus::Pending),
            "Confirmed" => Some(BookingStatus::Confirmed),
            "Completed" => Some(BookingStatus::Completed),
            "Cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The only edges of the booking state machine.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }

    /// States from which `next` is reachable, used as the guard of conditional writes.
    pub fn predecessors_of(next: BookingStatus) -> Vec<BookingStatus> {
        [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(next))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingPaymentStatus {
    Pending,
    Paid,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Pending => "Pending",
            BookingPaymentStatus::Paid => "Paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(BookingPaymentStatus::Pending),
            "Paid" => Some(BookingPaymentStatus::Paid),
            _ => None,
        }
    }
}

/// Which side of a booking an actor is on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Student,
    Tutor,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Student => "Student",
            Party::Tutor => "Tutor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Student" => Some(Party::Student),
            "Tutor" => Some(Party::Tutor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "Pending",
            RefundStatus::Processed => "Processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RefundStatus::Pending),
            "Processed" => Some(RefundStatus::Processed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Pay,
    Confirm,
    Cancel,
    Complete,
    Review,
    RequestPayout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Amounts fixed when a booking is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub total_cents: i64,
    pub platform_fee_cents: i64,
    pub tutor_payout_cents: i64,
}

impl Pricing {
    pub fn compute(hourly_rate_cents: i64, hours: i64, platform_fee_percent: i64) -> Self {
        let total_cents = hourly_rate_cents * hours;
        let platform_fee_cents = total_cents * platform_fee_percent / 100;
        Self {
            total_cents,
            platform_fee_cents,
            tutor_payout_cents: total_cents - platform_fee_cents,
        }
    }
}

/// Combine the wall-clock date and time a session was booked for into a UTC instant.
pub fn session_start(date: NaiveDate, time: NaiveTime, offset: &FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(time);
    match offset.from_local_datetime(&local).single() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local),
    }
}

impl Booking {
    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if user_id == self.student_id {
            Some(Party::Student)
        } else if user_id == self.tutor_user_id {
            Some(Party::Tutor)
        } else {
            None
        }
    }

    /// The participant on the other side from `party`.
    pub fn counterpart_of(&self, party: Party) -> Uuid {
        match party {
            Party::Student => self.tutor_user_id,
            Party::Tutor => self.student_id,
        }
    }

    pub fn available_actions(&self, party: Party, now: DateTime<Utc>) -> Vec<BookingAction> {
        let mut actions = Vec::new();
        let started = now >= self.scheduled_start;

        match party {
            Party::Student => {
                if self.status == BookingStatus::Pending
                    && self.payment_status == BookingPaymentStatus::Pending
                {
                    actions.push(BookingAction::Pay);
                }
                if !self.status.is_terminal() {
                    actions.push(BookingAction::Cancel);
                }
                if self.status == BookingStatus::Confirmed && started {
                    actions.push(BookingAction::Complete);
                }
                if self.status == BookingStatus::Completed && !self.is_reviewed {
                    actions.push(BookingAction::Review);
                }
            }
            Party::Tutor => {
                if self.status == BookingStatus::Pending {
                    actions.push(BookingAction::Confirm);
                }
                if !self.status.is_terminal() {
                    actions.push(BookingAction::Cancel);
                }
                if self.status == BookingStatus::Confirmed && started {
                    actions.push(BookingAction::Complete);
                }
                if self.status == BookingStatus::Completed && !self.payout_released {
                    actions.push(BookingAction::RequestPayout);
                }
            }
        }

        actions
    }

    /// Lifecycle events of this booking and its payments, oldest first.
    pub fn timeline(&self, payments: &[Payment]) -> Vec<TimelineEntry> {
        let mut timeline = vec![TimelineEntry {
            event: "booking_created".to_string(),
            timestamp: self.created_at,
            description: "Booking request sent".to_string(),
        }];

        if let Some(at) = self.confirmed_at {
            timeline.push(TimelineEntry {
                event: "booking_confirmed".to_string(),
                timestamp: at,
                description: "Booking confirmed".to_string(),
            });
        }

        for payment in payments.iter().filter(|p| p.booking_id == self.id) {
            let Some(at) = payment.completed_at else { continue };
            let entry = match payment.kind {
                PaymentKind::Charge => TimelineEntry {
                    event: "payment_completed".to_string(),
                    timestamp: at,
                    description: format!(
                        "Payment of {} {} completed",
                        payment.currency,
                        format_amount(payment.amount_cents)
                    ),
                },
                PaymentKind::Refund if payment.status == PaymentStatus::Completed => TimelineEntry {
                    event: "payment_refunded".to_string(),
                    timestamp: at,
                    description: format!(
                        "Refund of {} {} issued",
                        payment.currency,
                        format_amount(-payment.amount_cents)
                    ),
                },
                PaymentKind::Refund => continue,
            };
            timeline.push(entry);
        }

        if let Some(at) = self.completed_at {
            timeline.push(TimelineEntry {
                event: "booking_completed".to_string(),
                timestamp: at,
                description: "Session marked as completed".to_string(),
            });
        }

        if let Some(at) = self.cancelled_at {
            let by = self.cancelled_by.map(|p| p.as_str().to_lowercase()).unwrap_or_default();
            timeline.push(TimelineEntry {
                event: "booking_cancelled".to_string(),
                timestamp: at,
                description: format!("Booking cancelled by {}", by),
            });
        }

        timeline.sort_by_key(|entry| entry.timestamp);
        timeline
    }
}

pub fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub tutor_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Subject must be between 1 and 100 characters"))]
    pub subject: String,
    #[validate(range(min = 1, max = 8, message = "Duration must be between 1 and 8 hours"))]
    pub hours: i64,
    pub schedule_date: NaiveDate,
    pub schedule_time: NaiveTime,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: String,
}

/// Everything the store needs to persist a new booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    pub tutor_user_id: Uuid,
    pub subject: String,
    pub hours: i64,
    pub hourly_rate_cents: i64,
    pub pricing: Pricing,
    pub currency: String,
    pub schedule_date: NaiveDate,
    pub schedule_time: NaiveTime,
    pub scheduled_start: DateTime<Utc>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    fn booking(status: BookingStatus, start: DateTime<Utc>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            tutor_id: Uuid::new_v4(),
            tutor_user_id: Uuid::new_v4(),
            subject: "Mathematics".to_string(),
            hours: 2,
            hourly_rate_cents: 50_000,
            total_amount_cents: 100_000,
            platform_fee_cents: 15_000,
            tutor_payout_cents: 85_000,
            currency: "KES".to_string(),
            schedule_date: start.date_naive(),
            schedule_time: start.time(),
            scheduled_start: start,
            notes: None,
            status,
            payment_status: BookingPaymentStatus::Pending,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            refund_status: None,
            refund_amount_cents: None,
            payout_scheduled_at: None,
            payout_released: false,
            is_reviewed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_only_lifecycle_edges_are_allowed() {
        let allowed = [
            (BookingStatus::Pending, BookingStatus::Confirmed),
            (BookingStatus::Pending, BookingStatus::Cancelled),
            (BookingStatus::Confirmed, BookingStatus::Cancelled),
            (BookingStatus::Confirmed, BookingStatus::Completed),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [BookingStatus::Completed, BookingStatus::Cancelled] {
            assert!(from.is_terminal());
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(
            BookingStatus::predecessors_of(BookingStatus::Cancelled),
            vec![BookingStatus::Pending, BookingStatus::Confirmed]
        );
        assert_eq!(
            BookingStatus::predecessors_of(BookingStatus::Completed),
            vec![BookingStatus::Confirmed]
        );
        assert!(BookingStatus::predecessors_of(BookingStatus::Pending).is_empty());
    }

    #[test]
    fn test_status_round_trips_through_storage_names() {
        for status in ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("pending"), None);
    }

    #[test]
    fn test_pricing() {
        let pricing = Pricing::compute(500, 2, 15);
        assert_eq!(pricing.total_cents, 1000);
        assert_eq!(pricing.platform_fee_cents, 150);
        assert_eq!(pricing.tutor_payout_cents, 850);
    }

    #[test]
    fn test_session_start_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        let time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        let nairobi = FixedOffset::east_opt(3 * 3600).unwrap();
        let start = session_start(date, time, &nairobi);
        assert_eq!(start.to_rfc3339(), "2030-05-01T11:00:00+00:00");
    }

    #[test]
    fn test_party_of() {
        let b = booking(BookingStatus::Pending, Utc::now());
        assert_eq!(b.party_of(b.student_id), Some(Party::Student));
        assert_eq!(b.party_of(b.tutor_user_id), Some(Party::Tutor));
        assert_eq!(b.party_of(b.tutor_id), None);
        assert_eq!(b.counterpart_of(Party::Student), b.tutor_user_id);
    }

    #[test]
    fn test_available_actions() {
        let now = Utc::now();
        let future = booking(BookingStatus::Pending, now + Duration::days(2));
        assert_eq!(
            future.available_actions(Party::Student, now),
            vec![BookingAction::Pay, BookingAction::Cancel]
        );
        assert_eq!(
            future.available_actions(Party::Tutor, now),
            vec![BookingAction::Confirm, BookingAction::Cancel]
        );

        let started = booking(BookingStatus::Confirmed, now - Duration::hours(1));
        assert!(started
            .available_actions(Party::Tutor, now)
            .contains(&BookingAction::Complete));

        let mut done = booking(BookingStatus::Completed, now - Duration::hours(3));
        assert_eq!(done.available_actions(Party::Student, now), vec![BookingAction::Review]);
        assert_eq!(
            done.available_actions(Party::Tutor, now),
            vec![BookingAction::RequestPayout]
        );

        done.is_reviewed = true;
        assert!(done.available_actions(Party::Student, now).is_empty());
    }

    #[test]
    fn test_timeline_is_ordered() {
        let now = Utc::now();
        let mut b = booking(BookingStatus::Cancelled, now + Duration::days(3));
        b.created_at = now - Duration::hours(2);
        b.confirmed_at = Some(now - Duration::hours(1));
        b.cancelled_at = Some(now);
        b.cancelled_by = Some(Party::Tutor);

        let events: Vec<String> = b.timeline(&[]).into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec!["booking_created", "booking_confirmed", "booking_cancelled"]
        );
    }

    #[test]
    fn test_create_request_validation() {
        let mut request = CreateBookingRequest {
            tutor_id: Uuid::new_v4(),
            subject: "Physics".to_string(),
            hours: 2,
            schedule_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            schedule_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            notes: None,
        };
        assert!(request.validate().is_ok());

        request.hours = 0;
        assert!(request.validate().is_err());

        request.hours = 9;
        assert!(request.validate().is_err());

        request.hours = 1;
        request.subject = String::new();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(100_050), "1000.50");
        assert_eq!(format_amount(7), "0.07");
    }
}

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::BookingPolicy,
    domain::*,
    error::{AppError, Result},
    meetings::{MeetingProvider, MeetingRequest},
    notifications::{Notification, NotificationKind, Notifier, Recipient},
    repository::{
        BookingRepository, Cancellation, PaymentRepository, ReviewRepository, TutorRepository,
        UserRepository,
    },
};

const MAX_PAGE_SIZE: i64 = 100;

/// A booking as seen by one viewer: its payments, history and what the viewer may do next.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub payments: Vec<Payment>,
    pub timeline: Vec<TimelineEntry>,
    pub available_actions: Vec<BookingAction>,
    pub meeting: Option<Meeting>,
}

pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    tutors: Arc<dyn TutorRepository>,
    users: Arc<dyn UserRepository>,
    reviews: Arc<dyn ReviewRepository>,
    meetings: Arc<dyn MeetingProvider>,
    notifier: Arc<dyn Notifier>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        tutors: Arc<dyn TutorRepository>,
        users: Arc<dyn UserRepository>,
        reviews: Arc<dyn ReviewRepository>,
        meetings: Arc<dyn MeetingProvider>,
        notifier: Arc<dyn Notifier>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            bookings,
            payments,
            tutors,
            users,
            reviews,
            meetings,
            notifier,
            policy,
        }
    }

    pub async fn create(&self, actor: &User, request: CreateBookingRequest) -> Result<Booking> {
        if actor.role != UserRole::Student {
            return Err(AppError::Authorization("Only students can book sessions".to_string()));
        }
        request.validate()?;

        let tutor = self
            .tutors
            .find_by_id(request.tutor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))?;

        if !tutor.is_bookable() {
            let reason = if tutor.is_verified {
                "Tutor is not currently accepting bookings"
            } else {
                "Tutor is not verified"
            };
            return Err(AppError::Validation(reason.to_string()));
        }
        if tutor.user_id == actor.id {
            return Err(AppError::Validation("You cannot book yourself".to_string()));
        }

        let scheduled_start = session_start(
            request.schedule_date,
            request.schedule_time,
            &self.policy.session_offset,
        );
        if scheduled_start <= Utc::now() + self.policy.min_notice {
            return Err(AppError::Validation(
                "Session must be scheduled in the future".to_string(),
            ));
        }

        let booking = self
            .bookings
            .create(NewBooking {
                student_id: actor.id,
                tutor_id: tutor.id,
                tutor_user_id: tutor.user_id,
                subject: request.subject.trim().to_string(),
                hours: request.hours,
                hourly_rate_cents: tutor.hourly_rate_cents,
                pricing: Pricing::compute(
                    tutor.hourly_rate_cents,
                    request.hours,
                    self.policy.platform_fee_percent,
                ),
                currency: self.policy.currency.clone(),
                schedule_date: request.schedule_date,
                schedule_time: request.schedule_time,
                scheduled_start,
                notes: request.notes.filter(|n| !n.trim().is_empty()),
            })
            .await?;

        tracing::info!(
            "Booking {} created by student {} with tutor {}",
            booking.id,
            actor.id,
            tutor.id
        );
        self.notify(NotificationKind::NewBooking, &booking, booking.tutor_user_id)
            .await;

        Ok(booking)
    }

    pub async fn confirm(&self, actor: &User, id: Uuid) -> Result<Booking> {
        let booking = self.load(id).await?;
        if booking.party_of(actor.id) != Some(Party::Tutor) {
            return Err(AppError::Authorization(
                "Only the assigned tutor can confirm this booking".to_string(),
            ));
        }
        Self::ensure_transition(&booking, BookingStatus::Confirmed)?;

        let confirmed = self
            .bookings
            .confirm(id, Utc::now())
            .await?
            .ok_or_else(|| Self::lost_race(BookingStatus::Confirmed))?;

        tracing::info!("Booking {} confirmed by tutor {}", id, actor.id);
        self.notify(NotificationKind::BookingConfirmed, &confirmed, confirmed.student_id)
            .await;

        Ok(confirmed)
    }

    pub async fn cancel(&self, actor: &User, id: Uuid, request: CancelBookingRequest) -> Result<Booking> {
        let booking = self.load(id).await?;
        let party = booking.party_of(actor.id).ok_or_else(|| {
            AppError::Authorization("Only the student or tutor can cancel this booking".to_string())
        })?;
        Self::ensure_transition(&booking, BookingStatus::Cancelled)?;

        let now = Utc::now();
        if party == Party::Student && booking.scheduled_start - now < self.policy.cancellation_cutoff {
            return Err(AppError::Policy(format!(
                "Bookings can only be cancelled at least {} hours before the session",
                self.policy.cancellation_cutoff.num_hours()
            )));
        }

        let cancelled = self
            .bookings
            .cancel(
                id,
                Cancellation {
                    by: party,
                    reason: request.reason.trim().to_string(),
                    at: now,
                },
            )
            .await?
            .ok_or_else(|| Self::lost_race(BookingStatus::Cancelled))?;

        if let Some(amount) = cancelled.refund_amount_cents {
            tracing::info!("Booking {} cancelled with {} owed back to the student", id, amount);
        } else {
            tracing::info!("Booking {} cancelled by {}", id, party.as_str());
        }
        self.notify(
            NotificationKind::BookingCancelled,
            &cancelled,
            cancelled.counterpart_of(party),
        )
        .await;

        Ok(cancelled)
    }

    pub async fn complete(&self, actor: &User, id: Uuid) -> Result<Booking> {
        let booking = self.load(id).await?;
        let party = booking.party_of(actor.id).ok_or_else(|| {
            AppError::Authorization(
                "Only the student or tutor can complete this booking".to_string(),
            )
        })?;
        Self::ensure_transition(&booking, BookingStatus::Completed)?;

        let now = Utc::now();
        if now < booking.scheduled_start {
            return Err(AppError::Policy(
                "A session cannot be completed before it starts".to_string(),
            ));
        }

        let completed = self
            .bookings
            .complete(id, now, now + self.policy.payout_delay)
            .await?
            .ok_or_else(|| Self::lost_race(BookingStatus::Completed))?;

        tracing::info!("Booking {} completed by {}", id, party.as_str());
        self.notify(
            NotificationKind::BookingCompleted,
            &completed,
            completed.counterpart_of(party),
        )
        .await;
        if party == Party::Tutor {
            self.notify(NotificationKind::ReviewRequested, &completed, completed.student_id)
                .await;
        }

        Ok(completed)
    }

    /// One review per completed booking, by its student. The tutor's rating moves with it.
    pub async fn review(&self, actor: &User, id: Uuid, request: CreateReviewRequest) -> Result<Review> {
        request.validate()?;
        let booking = self.load(id).await?;
        if booking.party_of(actor.id) != Some(Party::Student) {
            return Err(AppError::Authorization(
                "Only the student can review this booking".to_string(),
            ));
        }
        if booking.status != BookingStatus::Completed {
            return Err(AppError::InvalidState(
                "Only completed sessions can be reviewed".to_string(),
            ));
        }
        if booking.is_reviewed {
            return Err(AppError::InvalidState("Booking already reviewed".to_string()));
        }

        let review = self
            .reviews
            .create(NewReview {
                booking_id: booking.id,
                tutor_id: booking.tutor_id,
                author_id: actor.id,
                rating: request.rating,
                comment: request.comment.trim().to_string(),
            })
            .await?
            .ok_or_else(|| AppError::InvalidState("Booking already reviewed".to_string()))?;

        tracing::info!(
            "Booking {} reviewed by student {} with rating {}",
            id,
            actor.id,
            review.rating
        );
        self.notify(NotificationKind::ReviewReceived, &booking, booking.tutor_user_id)
            .await;

        Ok(review)
    }

    /// Opens a video room for a confirmed booking. Only its tutor may do this, once.
    pub async fn create_meeting(&self, actor: &User, id: Uuid) -> Result<Meeting> {
        let booking = self.load(id).await?;
        if booking.party_of(actor.id) != Some(Party::Tutor) {
            return Err(AppError::Authorization(
                "Only the assigned tutor can create a meeting".to_string(),
            ));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::InvalidState(
                "Meetings can only be created for confirmed bookings".to_string(),
            ));
        }
        if self.bookings.find_meeting(id).await?.is_some() {
            return Err(AppError::InvalidState(
                "Meeting already exists for this booking".to_string(),
            ));
        }

        let student = self.users.find_by_id(booking.student_id).await?;
        let tutor = self.tutors.find_by_id(booking.tutor_id).await?;
        let topic = format!(
            "{} - {} & {}",
            booking.subject,
            student.map(|s| s.username).unwrap_or_else(|| "student".to_string()),
            tutor.map(|t| t.full_name).unwrap_or_else(|| "tutor".to_string())
        );

        let room = self
            .meetings
            .create(&MeetingRequest {
                booking_id: booking.id,
                topic,
                starts_at: booking.scheduled_start,
                duration_minutes: booking.hours * 60,
            })
            .await?;

        let meeting = self
            .bookings
            .save_meeting(Meeting {
                booking_id: booking.id,
                provider: self.meetings.name().to_string(),
                meeting_id: room.meeting_id,
                join_url: room.join_url,
                host_url: room.host_url,
                password: room.password,
                starts_at: booking.scheduled_start,
                created_at: Utc::now(),
            })
            .await?
            .ok_or_else(|| {
                AppError::InvalidState("Meeting already exists for this booking".to_string())
            })?;

        tracing::info!(
            "Meeting {} created on {} for booking {}",
            meeting.meeting_id,
            meeting.provider,
            id
        );
        self.notify(NotificationKind::MeetingCreated, &booking, booking.student_id)
            .await;

        Ok(meeting)
    }

    /// Bookings the actor takes part in, soonest session last.
    pub async fn list_for(&self, actor: &User, limit: i64, offset: i64) -> Result<Vec<Booking>> {
        self.bookings
            .list_for_user(actor.id, limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
            .await
    }

    pub async fn get_for(&self, actor: &User, id: Uuid) -> Result<BookingDetails> {
        let booking = self.load(id).await?;
        let party = booking.party_of(actor.id);
        if party.is_none() && actor.role != UserRole::Admin {
            return Err(AppError::Authorization(
                "You are not a participant in this booking".to_string(),
            ));
        }

        let payments = self.payments.find_by_booking(id).await?;
        let timeline = booking.timeline(&payments);
        let available_actions = party
            .map(|p| booking.available_actions(p, Utc::now()))
            .unwrap_or_default();
        let meeting = self.bookings.find_meeting(id).await?.map(|mut meeting| {
            if party != Some(Party::Tutor) {
                meeting.host_url = None;
            }
            meeting
        });

        Ok(BookingDetails {
            booking,
            payments,
            timeline,
            available_actions,
            meeting,
        })
    }

    async fn load(&self, id: Uuid) -> Result<Booking> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    fn ensure_transition(booking: &Booking, next: BookingStatus) -> Result<()> {
        if booking.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "Cannot move a {} booking to {}",
                booking.status.as_str().to_lowercase(),
                next.as_str().to_lowercase()
            )))
        }
    }

    fn lost_race(next: BookingStatus) -> AppError {
        AppError::InvalidState(format!(
            "Booking changed before it could be moved to {}",
            next.as_str().to_lowercase()
        ))
    }

    async fn notify(&self, kind: NotificationKind, booking: &Booking, user_id: Uuid) {
        let recipient = resolve_recipient(self.users.as_ref(), user_id).await;
        self.notifier
            .notify(Notification::for_booking(kind, booking, recipient))
            .await;
    }
}

/// Contact details for `user_id`; falls back to inbox-only delivery when the lookup fails.
pub(crate) async fn resolve_recipient(users: &dyn UserRepository, user_id: Uuid) -> Recipient {
    match users.find_by_id(user_id).await {
        Ok(Some(user)) => Recipient::from(&user),
        Ok(None) => Recipient::bare(user_id),
        Err(e) => {
            tracing::warn!("Could not load contact details for {}: {}", user_id, e);
            Recipient::bare(user_id)
        }
    }
}

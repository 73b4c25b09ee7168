use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{Review, Tutor, TutorSearch},
    error::{AppError, Result},
    repository::{BookingRepository, ReviewRepository, TutorRepository, UserRepository},
};

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 50;
const RECENT_REVIEWS: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct TutorPage {
    pub tutors: Vec<Tutor>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Public profile: the tutor, where they teach and what students said recently.
#[derive(Debug, Clone, Serialize)]
pub struct TutorProfile {
    pub tutor: Tutor,
    pub location: Option<String>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Read side of the tutor directory.
pub struct TutorService {
    tutors: Arc<dyn TutorRepository>,
    bookings: Arc<dyn BookingRepository>,
    reviews: Arc<dyn ReviewRepository>,
    users: Arc<dyn UserRepository>,
}

impl TutorService {
    pub fn new(
        tutors: Arc<dyn TutorRepository>,
        bookings: Arc<dyn BookingRepository>,
        reviews: Arc<dyn ReviewRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            tutors,
            bookings,
            reviews,
            users,
        }
    }

    pub async fn search(&self, filters: &TutorSearch) -> Result<TutorPage> {
        let per_page = filters
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = filters.page.unwrap_or(1).max(1);

        let (tutors, total) = self
            .tutors
            .search(filters, per_page, (page - 1) * per_page)
            .await?;

        Ok(TutorPage {
            tutors,
            page,
            per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        })
    }

    pub async fn profile(&self, id: Uuid) -> Result<TutorProfile> {
        let tutor = self.load(id).await?;
        let location = self
            .users
            .find_by_id(tutor.user_id)
            .await?
            .and_then(|u| u.location);
        let reviews = self.reviews.list_for_tutor(id, RECENT_REVIEWS).await?;

        Ok(TutorProfile {
            tutor,
            location,
            reviews,
        })
    }

    /// Whether a session could be booked with the tutor at this slot right now.
    pub async fn availability(&self, id: Uuid, date: NaiveDate, time: NaiveTime) -> Result<Availability> {
        let tutor = self.load(id).await?;
        if !tutor.is_bookable() {
            return Ok(Availability {
                available: false,
                reason: Some("Tutor is not currently accepting bookings".to_string()),
            });
        }

        if self.bookings.has_open_booking_at(id, date, time).await? {
            return Ok(Availability {
                available: false,
                reason: Some("Tutor already has a booking at this time".to_string()),
            });
        }

        Ok(Availability {
            available: true,
            reason: None,
        })
    }

    async fn load(&self, id: Uuid) -> Result<Tutor> {
        self.tutors
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))
    }
}

pub mod booking_service;
pub mod payment_service;
pub mod recommendation_service;
pub mod tutor_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::auth::TokenDenylist;
use crate::config::Settings;
use crate::meetings::{JitsiProvider, MeetingProvider};
use crate::notifications::Notifier;
use crate::payments::PaymentGateway;
use crate::repository::*;
use booking_service::BookingService;
use payment_service::PaymentService;
use recommendation_service::RecommendationService;
use tutor_service::TutorService;

pub use booking_service::BookingDetails;
pub use payment_service::StaleSweep;
pub use recommendation_service::RecommendedTutor;
pub use tutor_service::{Availability, TutorPage, TutorProfile};

pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub tutor_repo: Arc<dyn TutorRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub review_repo: Arc<dyn ReviewRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub denylist: Arc<dyn TokenDenylist>,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub recommendation_service: Arc<RecommendationService>,
    pub tutor_service: Arc<TutorService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        settings: &Settings,
        db_pool: SqlitePool,
        gateways: Vec<Arc<dyn PaymentGateway>>,
        notifier: Arc<dyn Notifier>,
        denylist: Arc<dyn TokenDenylist>,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let tutor_repo: Arc<dyn TutorRepository> = Arc::new(SqliteTutorRepository::new(db_pool.clone()));
        let booking_repo: Arc<dyn BookingRepository> = Arc::new(SqliteBookingRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let review_repo: Arc<dyn ReviewRepository> = Arc::new(SqliteReviewRepository::new(db_pool.clone()));
        let meetings: Arc<dyn MeetingProvider> = Arc::new(JitsiProvider::new(settings.meetings.clone()));

        let booking_service = Arc::new(BookingService::new(
            booking_repo.clone(),
            payment_repo.clone(),
            tutor_repo.clone(),
            user_repo.clone(),
            review_repo.clone(),
            meetings,
            notifier.clone(),
            settings.booking_policy(),
        ));
        let payment_service = Arc::new(PaymentService::new(
            booking_repo.clone(),
            payment_repo.clone(),
            user_repo.clone(),
            gateways,
            notifier.clone(),
            settings.payment_policy(),
        ));
        let recommendation_service = Arc::new(RecommendationService::new(
            tutor_repo.clone(),
            booking_repo.clone(),
            user_repo.clone(),
        ));
        let tutor_service = Arc::new(TutorService::new(
            tutor_repo.clone(),
            booking_repo.clone(),
            review_repo.clone(),
            user_repo.clone(),
        ));

        Self {
            user_repo,
            tutor_repo,
            booking_repo,
            payment_repo,
            review_repo,
            notifier,
            denylist,
            booking_service,
            payment_service,
            recommendation_service,
            tutor_service,
            db_pool,
        }
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use uuid::Uuid;

use tutorbook::{
    auth::SqliteTokenDenylist,
    config::Settings,
    domain::*,
    error::{AppError, Result},
    notifications::{Notification, NotificationKind, Notifier},
    payments::{ChargeAccepted, ChargeRequest, GatewayOutcome, PaymentGateway},
    repository::{TutorRepository, UserRepository},
    service::ServiceContext,
};

/// Single-connection in-memory database with the schema applied.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Gateway double whose answers are set by the test.
pub struct FakeGateway {
    issued: AtomicUsize,
    unavailable: Mutex<bool>,
    status: Mutex<GatewayOutcome>,
    pub charges: Mutex<Vec<ChargeRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            unavailable: Mutex::new(false),
            status: Mutex::new(GatewayOutcome::Pending),
            charges: Mutex::new(Vec::new()),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn set_status(&self, outcome: GatewayOutcome) {
        *self.status.lock().unwrap() = outcome;
    }

    pub fn last_checkout_id(&self) -> String {
        format!("ws_CO_{}", self.issued.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports(&self, method: PaymentMethod) -> bool {
        method == PaymentMethod::MobileMoney
    }

    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeAccepted> {
        if *self.unavailable.lock().unwrap() {
            return Err(AppError::GatewayUnavailable("connection refused".to_string()));
        }
        self.charges.lock().unwrap().push(request.clone());
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(ChargeAccepted {
            checkout_request_id: format!("ws_CO_{}", n),
            merchant_request_id: Some(format!("mr-{}", n)),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }

    async fn query_status(&self, _checkout_request_id: &str) -> Result<GatewayOutcome> {
        if *self.unavailable.lock().unwrap() {
            return Err(AppError::GatewayUnavailable("connection refused".to_string()));
        }
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Keeps every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds_for(&self, user_id: Uuid) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient.user_id == user_id)
            .map(|n| n.kind)
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub settings: Settings,
    pub ctx: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        let pool = test_pool().await?;
        let settings = Settings::default();
        let gateway = Arc::new(FakeGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = Arc::new(ServiceContext::new(
            &settings,
            pool.clone(),
            vec![gateway.clone() as Arc<dyn PaymentGateway>],
            notifier.clone(),
            Arc::new(SqliteTokenDenylist::new(pool.clone())),
        ));

        Ok(Self {
            pool,
            settings,
            ctx,
            gateway,
            notifier,
        })
    }

    pub async fn user(&self, username: &str, role: UserRole) -> anyhow::Result<User> {
        let user = self
            .ctx
            .user_repo
            .create(CreateUserRequest {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                phone: "254712345678".to_string(),
                location: Some("Nairobi".to_string()),
                role,
                device_token: None,
            })
            .await?;
        Ok(user)
    }

    /// A verified, available tutor charging `hourly_rate_cents`.
    pub async fn tutor(&self, username: &str, subjects: &str, hourly_rate_cents: i64) -> anyhow::Result<(User, Tutor)> {
        let user = self.user(username, UserRole::Tutor).await?;
        let tutor = self
            .ctx
            .tutor_repo
            .create(CreateTutorRequest {
                user_id: user.id,
                full_name: format!("{} Tutor", username),
                subjects: subjects.to_string(),
                level: "secondary".to_string(),
                bio: "Experienced tutor".to_string(),
                hourly_rate_cents,
            })
            .await?;
        let tutor = self.ctx.tutor_repo.set_verified(tutor.id, true).await?;
        Ok((user, tutor))
    }

    /// Booking request `days` ahead at 10:00.
    pub fn request_for(&self, tutor: &Tutor, hours: i64, days: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            tutor_id: tutor.id,
            subject: "mathematics".to_string(),
            hours,
            schedule_date: (Utc::now() + Duration::days(days)).date_naive(),
            schedule_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            notes: None,
        }
    }

    /// Insert a booking starting at `start`, bypassing the booking-time checks.
    pub async fn booking_at(
        &self,
        student: &User,
        tutor: &Tutor,
        start: DateTime<Utc>,
    ) -> anyhow::Result<Booking> {
        let booking = self
            .ctx
            .booking_repo
            .create(NewBooking {
                student_id: student.id,
                tutor_id: tutor.id,
                tutor_user_id: tutor.user_id,
                subject: "physics".to_string(),
                hours: 1,
                hourly_rate_cents: tutor.hourly_rate_cents,
                pricing: Pricing::compute(tutor.hourly_rate_cents, 1, 15),
                currency: "KES".to_string(),
                schedule_date: start.date_naive(),
                schedule_time: start.time(),
                scheduled_start: start,
                notes: None,
            })
            .await?;
        Ok(booking)
    }

    /// A session that started two hours ago and has been marked complete.
    pub async fn completed_booking(&self, student: &User, tutor: &Tutor) -> anyhow::Result<Booking> {
        let booking = self
            .booking_at(student, tutor, Utc::now() - Duration::hours(2))
            .await?;
        let now = Utc::now();
        self.ctx.booking_repo.confirm(booking.id, now).await?;
        let completed = self
            .ctx
            .booking_repo
            .complete(booking.id, now, now + Duration::hours(24))
            .await?
            .ok_or_else(|| anyhow::anyhow!("booking was not completed"))?;
        Ok(completed)
    }

    pub fn mobile_money() -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            phone: "0712345678".to_string(),
            method: PaymentMethod::MobileMoney,
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        Booking, BookingPaymentStatus, BookingStatus, Meeting, NewBooking, Party, RefundStatus,
    },
    error::{AppError, Result},
    repository::{parse_column, parse_uuid, utc, BookingRepository, Cancellation},
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    student_id: String,
    tutor_id: String,
    tutor_user_id: String,
    subject: String,
    hours: i64,
    hourly_rate_cents: i64,
    total_amount_cents: i64,
    platform_fee_cents: i64,
    tutor_payout_cents: i64,
    currency: String,
    schedule_date: NaiveDate,
    schedule_time: NaiveTime,
    scheduled_start: NaiveDateTime,
    notes: Option<String>,
    status: String,
    payment_status: String,
    confirmed_at: Option<NaiveDateTime>,
    completed_at: Option<NaiveDateTime>,
    cancelled_at: Option<NaiveDateTime>,
    cancelled_by: Option<String>,
    cancellation_reason: Option<String>,
    refund_status: Option<String>,
    refund_amount_cents: Option<i64>,
    payout_scheduled_at: Option<NaiveDateTime>,
    payout_released: bool,
    is_reviewed: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct MeetingRow {
    booking_id: String,
    provider: String,
    meeting_id: String,
    join_url: String,
    host_url: Option<String>,
    password: Option<String>,
    starts_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    id, student_id, tutor_id, tutor_user_id, subject, hours, hourly_rate_cents,
    total_amount_cents, platform_fee_cents, tutor_payout_cents, currency,
    schedule_date, schedule_time, scheduled_start, notes, status, payment_status,
    confirmed_at, completed_at, cancelled_at, cancelled_by, cancellation_reason,
    refund_status, refund_amount_cents, payout_scheduled_at, payout_released,
    is_reviewed, created_at, updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        Ok(Booking {
            id: parse_uuid(&row.id)?,
            student_id: parse_uuid(&row.student_id)?,
            tutor_id: parse_uuid(&row.tutor_id)?,
            tutor_user_id: parse_uuid(&row.tutor_user_id)?,
            subject: row.subject,
            hours: row.hours,
            hourly_rate_cents: row.hourly_rate_cents,
            total_amount_cents: row.total_amount_cents,
            platform_fee_cents: row.platform_fee_cents,
            tutor_payout_cents: row.tutor_payout_cents,
            currency: row.currency,
            schedule_date: row.schedule_date,
            schedule_time: row.schedule_time,
            scheduled_start: utc(row.scheduled_start),
            notes: row.notes,
            status: parse_column(&row.status, "booking status", BookingStatus::parse)?,
            payment_status: parse_column(
                &row.payment_status,
                "booking payment status",
                BookingPaymentStatus::parse,
            )?,
            confirmed_at: row.confirmed_at.map(utc),
            completed_at: row.completed_at.map(utc),
            cancelled_at: row.cancelled_at.map(utc),
            cancelled_by: row
                .cancelled_by
                .as_deref()
                .map(|s| parse_column(s, "cancelling party", Party::parse))
                .transpose()?,
            cancellation_reason: row.cancellation_reason,
            refund_status: row
                .refund_status
                .as_deref()
                .map(|s| parse_column(s, "refund status", RefundStatus::parse))
                .transpose()?,
            refund_amount_cents: row.refund_amount_cents,
            payout_scheduled_at: row.payout_scheduled_at.map(utc),
            payout_released: row.payout_released,
            is_reviewed: row.is_reviewed,
            created_at: utc(row.created_at),
            updated_at: utc(row.updated_at),
        })
    }

    fn row_to_meeting(row: MeetingRow) -> Result<Meeting> {
        Ok(Meeting {
            booking_id: parse_uuid(&row.booking_id)?,
            provider: row.provider,
            meeting_id: row.meeting_id,
            join_url: row.join_url,
            host_url: row.host_url,
            password: row.password,
            starts_at: utc(row.starts_at),
            created_at: utc(row.created_at),
        })
    }

    /// `status IN (...)` guard listing every state `next` may be entered from.
    fn guard_for(next: BookingStatus) -> String {
        let allowed: Vec<String> = BookingStatus::predecessors_of(next)
            .into_iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        format!("status IN ({})", allowed.join(", "))
    }

    async fn reload(&self, id: Uuid) -> Result<Booking> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated booking".to_string())
        })
    }
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create(&self, booking: NewBooking) -> Result<Booking> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, student_id, tutor_id, tutor_user_id, subject, hours,
                hourly_rate_cents, total_amount_cents, platform_fee_cents,
                tutor_payout_cents, currency, schedule_date, schedule_time,
                scheduled_start, notes, status, payment_status, payout_released,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(booking.student_id.to_string())
        .bind(booking.tutor_id.to_string())
        .bind(booking.tutor_user_id.to_string())
        .bind(&booking.subject)
        .bind(booking.hours)
        .bind(booking.hourly_rate_cents)
        .bind(booking.pricing.total_cents)
        .bind(booking.pricing.platform_fee_cents)
        .bind(booking.pricing.tutor_payout_cents)
        .bind(&booking.currency)
        .bind(booking.schedule_date)
        .bind(booking.schedule_time)
        .bind(booking.scheduled_start.naive_utc())
        .bind(&booking.notes)
        .bind(BookingStatus::Pending.as_str())
        .bind(BookingPaymentStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created booking".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = ?",
            BOOKING_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Booking>> {
        let user_id_str = user_id.to_string();
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE student_id = ? OR tutor_user_id = ?
            ORDER BY scheduled_start DESC
            LIMIT ? OFFSET ?
            "#,
            BOOKING_COLUMNS
        ))
        .bind(&user_id_str)
        .bind(&user_id_str)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn find_by_student(&self, student_id: Uuid) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE student_id = ? ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(student_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn confirm(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>> {
        let at = at.naive_utc();
        let result = sqlx::query(&format!(
            r#"
            UPDATE bookings
            SET status = ?, confirmed_at = ?, updated_at = ?
            WHERE id = ? AND {}
            "#,
            Self::guard_for(BookingStatus::Confirmed)
        ))
        .bind(BookingStatus::Confirmed.as_str())
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.reload(id).await.map(Some)
    }

    async fn cancel(&self, id: Uuid, cancellation: Cancellation) -> Result<Option<Booking>> {
        let id_str = id.to_string();
        let at = cancellation.at.naive_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE bookings
            SET status = ?, cancelled_at = ?, cancelled_by = ?,
                cancellation_reason = ?, updated_at = ?
            WHERE id = ? AND {}
            "#,
            Self::guard_for(BookingStatus::Cancelled)
        ))
        .bind(BookingStatus::Cancelled.as_str())
        .bind(at)
        .bind(cancellation.by.as_str())
        .bind(&cancellation.reason)
        .bind(at)
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        // A settled charge makes the booking refundable.
        let paid: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT amount_cents FROM payments
            WHERE booking_id = ? AND kind = 'Charge' AND status = 'Completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&id_str)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(amount) = paid {
            sqlx::query(
                "UPDATE bookings SET refund_status = ?, refund_amount_cents = ? WHERE id = ?",
            )
            .bind(RefundStatus::Pending.as_str())
            .bind(amount)
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.reload(id).await.map(Some)
    }

    async fn complete(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        payout_at: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let id_str = id.to_string();
        let at = at.naive_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE bookings
            SET status = ?, completed_at = ?, payout_scheduled_at = ?,
                payout_released = 0, updated_at = ?
            WHERE id = ? AND {}
            "#,
            Self::guard_for(BookingStatus::Completed)
        ))
        .bind(BookingStatus::Completed.as_str())
        .bind(at)
        .bind(payout_at.naive_utc())
        .bind(at)
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE tutors
            SET completed_sessions = completed_sessions + 1, updated_at = ?
            WHERE id = (SELECT tutor_id FROM bookings WHERE id = ?)
            "#,
        )
        .bind(at)
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.reload(id).await.map(Some)
    }

    async fn has_open_booking_at(
        &self,
        tutor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE tutor_id = ? AND schedule_date = ? AND schedule_time = ?
              AND status IN (?, ?)
            "#,
        )
        .bind(tutor_id.to_string())
        .bind(date)
        .bind(time)
        .bind(BookingStatus::Pending.as_str())
        .bind(BookingStatus::Confirmed.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn save_meeting(&self, meeting: Meeting) -> Result<Option<Meeting>> {
        let result = sqlx::query(
            r#"
            INSERT INTO meetings (
                booking_id, provider, meeting_id, join_url, host_url, password,
                starts_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(booking_id) DO NOTHING
            "#,
        )
        .bind(meeting.booking_id.to_string())
        .bind(&meeting.provider)
        .bind(&meeting.meeting_id)
        .bind(&meeting.join_url)
        .bind(&meeting.host_url)
        .bind(&meeting.password)
        .bind(meeting.starts_at.naive_utc())
        .bind(meeting.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_meeting(meeting.booking_id).await
    }

    async fn find_meeting(&self, booking_id: Uuid) -> Result<Option<Meeting>> {
        let row = sqlx::query_as::<_, MeetingRow>(
            r#"
            SELECT booking_id, provider, meeting_id, join_url, host_url, password,
                   starts_at, created_at
            FROM meetings WHERE booking_id = ?
            "#,
        )
        .bind(booking_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_meeting).transpose()
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        BookingPaymentStatus, BookingStatus, Payment, PaymentKind, PaymentMethod, PaymentStatus,
        Receipt, RefundStatus, EXPIRY_REASON,
    },
    error::{AppError, Result},
    repository::{parse_column, parse_uuid, utc, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    booking_id: String,
    parent_payment_id: Option<String>,
    kind: String,
    amount_cents: i64,
    currency: String,
    method: String,
    gateway: String,
    status: String,
    payer: Option<String>,
    reference: String,
    checkout_request_id: Option<String>,
    merchant_request_id: Option<String>,
    receipt_number: Option<String>,
    transaction_date: Option<NaiveDateTime>,
    failure_reason: Option<String>,
    description: String,
    completed_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"
    id, booking_id, parent_payment_id, kind, amount_cents, currency, method,
    gateway, status, payer, reference, checkout_request_id, merchant_request_id,
    receipt_number, transaction_date, failure_reason, description,
    completed_at, created_at, updated_at
"#;

// Booking paid iff one of its charges is currently completed.
const DERIVE_BOOKING_PAYMENT_STATUS: &str = r#"
    UPDATE bookings
    SET payment_status = CASE WHEN EXISTS (
            SELECT 1 FROM payments
            WHERE booking_id = bookings.id AND kind = 'Charge' AND status = 'Completed'
        ) THEN 'Paid' ELSE 'Pending' END,
        updated_at = ?
    WHERE id = ?
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            parent_payment_id: row.parent_payment_id.as_deref().map(parse_uuid).transpose()?,
            kind: parse_column(&row.kind, "payment kind", PaymentKind::parse)?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            method: parse_column(&row.method, "payment method", PaymentMethod::parse)?,
            gateway: row.gateway,
            status: parse_column(&row.status, "payment status", PaymentStatus::parse)?,
            payer: row.payer,
            reference: row.reference,
            checkout_request_id: row.checkout_request_id,
            merchant_request_id: row.merchant_request_id,
            receipt_number: row.receipt_number,
            transaction_date: row.transaction_date,
            failure_reason: row.failure_reason,
            description: row.description,
            completed_at: row.completed_at.map(utc),
            created_at: utc(row.created_at),
            updated_at: utc(row.updated_at),
        })
    }

    async fn reload(&self, id: Uuid) -> Result<Payment> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated payment".to_string())
        })
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, booking_id, parent_payment_id, kind, amount_cents, currency,
                method, gateway, status, payer, reference, checkout_request_id,
                merchant_request_id, receipt_number, transaction_date,
                failure_reason, description, completed_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(payment.booking_id.to_string())
        .bind(payment.parent_payment_id.map(|id| id.to_string()))
        .bind(payment.kind.as_str())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(&payment.gateway)
        .bind(payment.status.as_str())
        .bind(&payment.payer)
        .bind(&payment.reference)
        .bind(&payment.checkout_request_id)
        .bind(&payment.merchant_request_id)
        .bind(&payment.receipt_number)
        .bind(payment.transaction_date)
        .bind(&payment.failure_reason)
        .bind(&payment.description)
        .bind(payment.completed_at.map(|dt| dt.naive_utc()))
        .bind(payment.created_at.naive_utc())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                AppError::Validation(
                    "A payment for this booking is already in progress".to_string(),
                )
            } else {
                AppError::from(e)
            }
        })?;

        self.reload(payment.id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE checkout_request_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = ? ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn find_pending_charge(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE booking_id = ? AND kind = 'Charge' AND status = 'Pending'
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(booking_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_pending_charges_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE kind = 'Charge' AND status = 'Pending' AND created_at <= ?
            ORDER BY created_at ASC
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(cutoff.naive_utc())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn settle_success(
        &self,
        id: Uuid,
        receipt: Receipt,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let id_str = id.to_string();
        let at = at.naive_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, receipt_number = ?, transaction_date = ?,
                payer = COALESCE(?, payer), failure_reason = NULL,
                completed_at = ?, updated_at = ?
            WHERE id = ? AND kind = 'Charge'
              AND (status = ? OR (status = ? AND failure_reason = ?))
            "#,
        )
        .bind(PaymentStatus::Completed.as_str())
        .bind(&receipt.receipt_number)
        .bind(receipt.transaction_date)
        .bind(&receipt.payer)
        .bind(at)
        .bind(at)
        .bind(&id_str)
        .bind(PaymentStatus::Pending.as_str())
        .bind(PaymentStatus::Failed.as_str())
        .bind(EXPIRY_REASON)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let (booking_id, amount): (String, i64) =
            sqlx::query_as("SELECT booking_id, amount_cents FROM payments WHERE id = ?")
                .bind(&id_str)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(DERIVE_BOOKING_PAYMENT_STATUS)
            .bind(at)
            .bind(&booking_id)
            .execute(&mut *tx)
            .await?;

        // Payment settles a booking that is still awaiting confirmation.
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, confirmed_at = ?
            WHERE id = ? AND status = ? AND payment_status = ?
            "#,
        )
        .bind(BookingStatus::Confirmed.as_str())
        .bind(at)
        .bind(&booking_id)
        .bind(BookingStatus::Pending.as_str())
        .bind(BookingPaymentStatus::Paid.as_str())
        .execute(&mut *tx)
        .await?;

        // Money that lands after a cancellation, or on top of another completed charge, is owed back.
        sqlx::query(
            r#"
            UPDATE bookings
            SET refund_status = ?, refund_amount_cents = ?
            WHERE id = ? AND refund_status IS NULL
              AND (status = ? OR EXISTS (
                  SELECT 1 FROM payments
                  WHERE booking_id = bookings.id AND kind = 'Charge'
                    AND status = 'Completed' AND id != ?
              ))
            "#,
        )
        .bind(RefundStatus::Pending.as_str())
        .bind(amount)
        .bind(&booking_id)
        .bind(BookingStatus::Cancelled.as_str())
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.reload(id).await.map(Some)
    }

    async fn settle_failure(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let at = at.naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, failure_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(PaymentStatus::Failed.as_str())
        .bind(reason)
        .bind(at)
        .bind(id.to_string())
        .bind(PaymentStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.reload(id).await.map(Some)
    }

    async fn record_refund(&self, original_id: Uuid, refund: Payment) -> Result<Option<Payment>> {
        let original_str = original_id.to_string();
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments SET status = ?, updated_at = ?
            WHERE id = ? AND status = ? AND kind = 'Charge'
            "#,
        )
        .bind(PaymentStatus::Refunded.as_str())
        .bind(now)
        .bind(&original_str)
        .bind(PaymentStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, booking_id, parent_payment_id, kind, amount_cents, currency,
                method, gateway, status, payer, reference, description,
                completed_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(refund.id.to_string())
        .bind(refund.booking_id.to_string())
        .bind(original_str.as_str())
        .bind(PaymentKind::Refund.as_str())
        .bind(refund.amount_cents)
        .bind(&refund.currency)
        .bind(refund.method.as_str())
        .bind(&refund.gateway)
        .bind(refund.status.as_str())
        .bind(&refund.payer)
        .bind(&refund.reference)
        .bind(&refund.description)
        .bind(refund.completed_at.map(|dt| dt.naive_utc()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let booking_id = refund.booking_id.to_string();
        sqlx::query(DERIVE_BOOKING_PAYMENT_STATUS)
            .bind(now)
            .bind(&booking_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE bookings SET refund_status = ? WHERE id = ? AND refund_status = ?")
            .bind(RefundStatus::Processed.as_str())
            .bind(&booking_id)
            .bind(RefundStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.reload(refund.id).await.map(Some)
    }
}

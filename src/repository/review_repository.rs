use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{BookingStatus, NewReview, Review},
    error::{AppError, Result},
    repository::{parse_uuid, utc, ReviewRepository},
};

#[derive(FromRow)]
struct ReviewRow {
    id: String,
    booking_id: String,
    tutor_id: String,
    author_id: String,
    rating: i64,
    comment: String,
    created_at: NaiveDateTime,
}

const REVIEW_COLUMNS: &str = "id, booking_id, tutor_id, author_id, rating, comment, created_at";

pub struct SqliteReviewRepository {
    pool: SqlitePool,
}

impl SqliteReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_review(row: ReviewRow) -> Result<Review> {
        Ok(Review {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            tutor_id: parse_uuid(&row.tutor_id)?,
            author_id: parse_uuid(&row.author_id)?,
            rating: row.rating,
            comment: row.comment,
            created_at: utc(row.created_at),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {} FROM reviews WHERE id = ?",
            REVIEW_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_review).transpose()
    }
}

#[async_trait]
impl ReviewRepository for SqliteReviewRepository {
    async fn create(&self, review: NewReview) -> Result<Option<Review>> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let booking_id = review.booking_id.to_string();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bookings SET is_reviewed = 1, updated_at = ?
            WHERE id = ? AND status = ? AND is_reviewed = 0
            "#,
        )
        .bind(now)
        .bind(&booking_id)
        .bind(BookingStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(&format!(
            "INSERT INTO reviews ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            REVIEW_COLUMNS
        ))
        .bind(id.to_string())
        .bind(&booking_id)
        .bind(review.tutor_id.to_string())
        .bind(review.author_id.to_string())
        .bind(review.rating)
        .bind(&review.comment)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Running average; both sides of the assignment read the pre-update row.
        sqlx::query(
            r#"
            UPDATE tutors
            SET rating = (rating * total_ratings + ?) / (total_ratings + 1),
                total_ratings = total_ratings + 1,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(review.rating as f64)
        .bind(now)
        .bind(review.tutor_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by_id(id).await?.map(Some).ok_or_else(|| {
            AppError::Database("Failed to retrieve created review".to_string())
        })
    }

    async fn list_for_tutor(&self, tutor_id: Uuid, limit: i64) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {} FROM reviews WHERE tutor_id = ? ORDER BY created_at DESC LIMIT ?",
            REVIEW_COLUMNS
        ))
        .bind(tutor_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_review).collect()
    }
}

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateTutorRequest, Tutor, TutorSearch},
    error::{AppError, Result},
    repository::{parse_uuid, utc, TutorRepository},
};

#[derive(FromRow)]
struct TutorRow {
    id: String,
    user_id: String,
    full_name: String,
    subjects: String,
    level: String,
    bio: String,
    hourly_rate_cents: i64,
    rating: f64,
    total_ratings: i64,
    completed_sessions: i64,
    is_available: bool,
    is_verified: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const TUTOR_COLUMNS: &str = r#"
    id, user_id, full_name, subjects, level, bio, hourly_rate_cents,
    rating, total_ratings, completed_sessions, is_available, is_verified,
    created_at, updated_at
"#;

enum FilterValue {
    Text(String),
    Int(i64),
    Real(f64),
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards in the input escaped by `!`.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .trim()
        .to_lowercase()
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{}%", escaped)
}

fn build_search_conditions(filters: &TutorSearch) -> (String, Vec<FilterValue>) {
    let mut conditions = vec!["is_verified = 1".to_string(), "is_available = 1".to_string()];
    let mut params = Vec::new();

    if let Some(q) = filters.q.as_deref().filter(|q| !q.trim().is_empty()) {
        conditions.push(
            "(LOWER(full_name) LIKE ? ESCAPE '!' OR LOWER(subjects) LIKE ? ESCAPE '!' OR LOWER(bio) LIKE ? ESCAPE '!')"
                .to_string(),
        );
        let pattern = like_pattern(q);
        for _ in 0..3 {
            params.push(FilterValue::Text(pattern.clone()));
        }
    }

    if let Some(subject) = filters.subject.as_deref().filter(|s| !s.trim().is_empty()) {
        conditions.push("LOWER(subjects) LIKE ? ESCAPE '!'".to_string());
        params.push(FilterValue::Text(like_pattern(subject)));
    }

    if let Some(level) = filters.level.as_deref().filter(|l| !l.trim().is_empty()) {
        conditions.push("LOWER(level) LIKE ? ESCAPE '!'".to_string());
        params.push(FilterValue::Text(like_pattern(level)));
    }

    if let Some(location) = filters.location.as_deref().filter(|l| !l.trim().is_empty()) {
        conditions.push(
            "user_id IN (SELECT id FROM users WHERE LOWER(location) LIKE ? ESCAPE '!')".to_string(),
        );
        params.push(FilterValue::Text(like_pattern(location)));
    }

    if let Some(min) = filters.min_rate_cents {
        conditions.push("hourly_rate_cents >= ?".to_string());
        params.push(FilterValue::Int(min));
    }

    if let Some(max) = filters.max_rate_cents {
        conditions.push("hourly_rate_cents <= ?".to_string());
        params.push(FilterValue::Int(max));
    }

    if let Some(min_rating) = filters.min_rating {
        conditions.push("rating >= ?".to_string());
        params.push(FilterValue::Real(min_rating));
    }

    (format!("WHERE {}", conditions.join(" AND ")), params)
}

pub struct SqliteTutorRepository {
    pool: SqlitePool,
}

impl SqliteTutorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_tutor(row: TutorRow) -> Result<Tutor> {
        Ok(Tutor {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            full_name: row.full_name,
            subjects: row.subjects,
            level: row.level,
            bio: row.bio,
            hourly_rate_cents: row.hourly_rate_cents,
            rating: row.rating,
            total_ratings: row.total_ratings,
            completed_sessions: row.completed_sessions,
            is_available: row.is_available,
            is_verified: row.is_verified,
            created_at: utc(row.created_at),
            updated_at: utc(row.updated_at),
        })
    }

    async fn set_flag(&self, id: Uuid, column: &'static str, value: bool) -> Result<Tutor> {
        let result = sqlx::query(&format!(
            "UPDATE tutors SET {} = ?, updated_at = ? WHERE id = ?",
            column
        ))
        .bind(value)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Tutor not found".to_string()));
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated tutor".to_string())
        })
    }
}

#[async_trait]
impl TutorRepository for SqliteTutorRepository {
    async fn create(&self, request: CreateTutorRequest) -> Result<Tutor> {
        if request.hourly_rate_cents <= 0 {
            return Err(AppError::Validation("Hourly rate must be positive".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO tutors (
                id, user_id, full_name, subjects, level, bio, hourly_rate_cents,
                rating, total_ratings, completed_sessions, is_available, is_verified,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 1, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(request.user_id.to_string())
        .bind(&request.full_name)
        .bind(&request.subjects)
        .bind(&request.level)
        .bind(&request.bio)
        .bind(request.hourly_rate_cents)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created tutor".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tutor>> {
        let row = sqlx::query_as::<_, TutorRow>(&format!(
            "SELECT {} FROM tutors WHERE id = ?",
            TUTOR_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_tutor).transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Tutor>> {
        let row = sqlx::query_as::<_, TutorRow>(&format!(
            "SELECT {} FROM tutors WHERE user_id = ?",
            TUTOR_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_tutor).transpose()
    }

    async fn list_bookable(&self) -> Result<Vec<Tutor>> {
        let rows = sqlx::query_as::<_, TutorRow>(&format!(
            r#"
            SELECT {} FROM tutors
            WHERE is_verified = 1 AND is_available = 1
            ORDER BY rating DESC, created_at ASC
            "#,
            TUTOR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_tutor).collect()
    }

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<Tutor> {
        self.set_flag(id, "is_available", available).await
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<Tutor> {
        self.set_flag(id, "is_verified", verified).await
    }

    async fn search(
        &self,
        filters: &TutorSearch,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Tutor>, i64)> {
        let (where_clause, params) = build_search_conditions(filters);

        let count_sql = format!("SELECT COUNT(*) FROM tutors {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = match param {
                FilterValue::Text(s) => count_query.bind(s.clone()),
                FilterValue::Int(n) => count_query.bind(*n),
                FilterValue::Real(r) => count_query.bind(*r),
            };
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT {} FROM tutors {} ORDER BY rating DESC, created_at ASC LIMIT ? OFFSET ?",
            TUTOR_COLUMNS, where_clause
        );
        let mut select_query = sqlx::query_as::<_, TutorRow>(&select_sql);
        for param in params {
            select_query = match param {
                FilterValue::Text(s) => select_query.bind(s),
                FilterValue::Int(n) => select_query.bind(n),
                FilterValue::Real(r) => select_query.bind(r),
            };
        }
        let rows = select_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let tutors = rows
            .into_iter()
            .map(Self::row_to_tutor)
            .collect::<Result<Vec<_>>>()?;
        Ok((tutors, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" Physics "), "%physics%");
        assert_eq!(like_pattern("100%_done!"), "%100!%!_done!!%");
    }

    #[test]
    fn test_search_conditions_only_cover_given_filters() {
        let (clause, params) = build_search_conditions(&TutorSearch::default());
        assert_eq!(clause, "WHERE is_verified = 1 AND is_available = 1");
        assert!(params.is_empty());

        let (clause, params) = build_search_conditions(&TutorSearch {
            q: Some("calc".to_string()),
            max_rate_cents: Some(90_000),
            subject: Some("   ".to_string()),
            ..TutorSearch::default()
        });
        assert!(clause.contains("LOWER(full_name) LIKE ?"));
        assert!(clause.contains("hourly_rate_cents <= ?"));
        assert!(!clause.contains("LOWER(subjects) LIKE ? ESCAPE '!' AND"));
        assert_eq!(params.len(), 4);
    }
}

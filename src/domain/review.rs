use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub tutor_id: Uuid,
    pub author_id: Uuid,
    pub rating: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i64,
    #[validate(length(min = 1, max = 2000, message = "Comment must be between 1 and 2000 characters"))]
    pub comment: String,
}

/// Review as handed to the store.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub booking_id: Uuid,
    pub tutor_id: Uuid,
    pub author_id: Uuid,
    pub rating: i64,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_request_validation() {
        let mut request = CreateReviewRequest {
            rating: 5,
            comment: "Explained vectors clearly".to_string(),
        };
        assert!(request.validate().is_ok());

        request.rating = 0;
        assert!(request.validate().is_err());

        request.rating = 6;
        assert!(request.validate().is_err());

        request.rating = 3;
        request.comment = String::new();
        assert!(request.validate().is_err());
    }
}

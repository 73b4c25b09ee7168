mod common;

use chrono::{Duration, Utc};
use tutorbook::{
    auth::{SqliteTokenDenylist, TokenDenylist},
    domain::*,
    repository::{
        SqliteTutorRepository, SqliteUserRepository, TutorRepository, UserRepository,
    },
};

#[tokio::test]
async fn test_user_and_tutor_crud() -> anyhow::Result<()> {
    let pool = common::test_pool().await?;
    let users = SqliteUserRepository::new(pool.clone());
    let tutors = SqliteTutorRepository::new(pool.clone());

    let user = users
        .create(CreateUserRequest {
            username: "wanjiru".to_string(),
            email: "wanjiru@example.com".to_string(),
            phone: "254712345678".to_string(),
            location: Some("Nakuru".to_string()),
            role: UserRole::Tutor,
            device_token: Some("device-1".to_string()),
        })
        .await?;
    assert_eq!(user.role, UserRole::Tutor);
    assert!(user.is_active);

    let found = users.find_by_username("wanjiru").await?;
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(users.find_by_username("nobody").await?.is_none());

    let tutor = tutors
        .create(CreateTutorRequest {
            user_id: user.id,
            full_name: "Wanjiru Kamau".to_string(),
            subjects: "chemistry, biology".to_string(),
            level: "secondary".to_string(),
            bio: "Lab sessions on weekends".to_string(),
            hourly_rate_cents: 120_000,
        })
        .await?;
    assert!(!tutor.is_verified);
    assert!(!tutor.is_bookable());
    assert!(tutors.list_bookable().await?.is_empty());

    let tutor = tutors.set_verified(tutor.id, true).await?;
    assert!(tutor.is_bookable());
    assert_eq!(tutors.list_bookable().await?.len(), 1);

    let by_user = tutors.find_by_user(user.id).await?;
    assert_eq!(by_user.map(|t| t.id), Some(tutor.id));

    let paused = tutors.set_availability(tutor.id, false).await?;
    assert!(!paused.is_bookable());
    assert!(tutors.list_bookable().await?.is_empty());

    let deactivated = users.set_active(user.id, false).await?;
    assert!(!deactivated.is_active);

    Ok(())
}

#[tokio::test]
async fn test_tutor_rate_must_be_positive() -> anyhow::Result<()> {
    let pool = common::test_pool().await?;
    let users = SqliteUserRepository::new(pool.clone());
    let tutors = SqliteTutorRepository::new(pool);

    let user = users
        .create(CreateUserRequest {
            username: "otieno".to_string(),
            email: "otieno@example.com".to_string(),
            phone: "254722000111".to_string(),
            location: None,
            role: UserRole::Tutor,
            device_token: None,
        })
        .await?;

    let result = tutors
        .create(CreateTutorRequest {
            user_id: user.id,
            full_name: "Otieno".to_string(),
            subjects: "physics".to_string(),
            level: "university".to_string(),
            bio: String::new(),
            hourly_rate_cents: 0,
        })
        .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_denylist_expiry_and_purge() -> anyhow::Result<()> {
    let pool = common::test_pool().await?;
    let denylist = SqliteTokenDenylist::new(pool);

    denylist.revoke("live-token", Utc::now() + Duration::hours(1)).await?;
    denylist.revoke("stale-token", Utc::now() - Duration::minutes(1)).await?;

    assert!(denylist.is_revoked("live-token").await?);
    assert!(!denylist.is_revoked("stale-token").await?);

    assert_eq!(denylist.purge_expired().await?, 1);
    assert!(denylist.is_revoked("live-token").await?);

    // Revoking again extends the entry instead of failing
    denylist.revoke("live-token", Utc::now() + Duration::hours(2)).await?;
    assert!(denylist.is_revoked("live-token").await?);

    Ok(())
}

mod common;

use chrono::{Duration, NaiveTime, Utc};
use common::TestApp;
use tutorbook::{
    domain::*,
    error::AppError,
    notifications::NotificationKind,
    repository::{ReviewRepository, TutorRepository, UserRepository},
};

fn review(rating: i64, comment: &str) -> CreateReviewRequest {
    CreateReviewRequest {
        rating,
        comment: comment.to_string(),
    }
}

#[tokio::test]
async fn test_reviews_keep_running_average() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let amina = app.user("amina", UserRole::Student).await?;
    let juma = app.user("juma", UserRole::Student).await?;
    let (tutor_user, tutor) = app.tutor("brian", "physics", 80_000).await?;

    let first = app.completed_booking(&amina, &tutor).await?;
    let second = app.completed_booking(&juma, &tutor).await?;

    let written = app
        .ctx
        .booking_service
        .review(&amina, first.id, review(5, "  Made optics click  "))
        .await?;
    assert_eq!(written.rating, 5);
    assert_eq!(written.comment, "Made optics click");
    assert_eq!(written.tutor_id, tutor.id);

    app.ctx
        .booking_service
        .review(&juma, second.id, review(4, "Good pace"))
        .await?;

    let tutor = app.ctx.tutor_repo.find_by_id(tutor.id).await?.expect("tutor");
    assert_eq!(tutor.total_ratings, 2);
    assert!((tutor.rating - 4.5).abs() < f64::EPSILON);

    let booking = app.ctx.booking_repo.find_by_id(first.id).await?.expect("booking");
    assert!(booking.is_reviewed);
    assert!(booking.available_actions(Party::Student, Utc::now()).is_empty());

    assert_eq!(app.notifier.count(NotificationKind::ReviewReceived), 2);
    assert!(app
        .notifier
        .kinds_for(tutor_user.id)
        .contains(&NotificationKind::ReviewReceived));

    let listed = app.ctx.review_repo.list_for_tutor(tutor.id, 10).await?;
    assert_eq!(listed.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_review_rules() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let outsider = app.user("juma", UserRole::Student).await?;
    let (tutor_user, tutor) = app.tutor("brian", "chemistry", 60_000).await?;

    let upcoming = app
        .ctx
        .booking_service
        .create(&student, app.request_for(&tutor, 1, 3))
        .await?;
    let err = app
        .ctx
        .booking_service
        .review(&student, upcoming.id, review(5, "Too early"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let done = app.completed_booking(&student, &tutor).await?;

    let err = app
        .ctx
        .booking_service
        .review(&tutor_user, done.id, review(5, "I was great"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = app
        .ctx
        .booking_service
        .review(&outsider, done.id, review(1, "Never met them"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = app
        .ctx
        .booking_service
        .review(&student, done.id, review(6, "Off the scale"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    app.ctx
        .booking_service
        .review(&student, done.id, review(3, "Fine"))
        .await?;
    let err = app
        .ctx
        .booking_service
        .review(&student, done.id, review(5, "Changed my mind"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // Rejected attempts leave the rating alone
    let tutor = app.ctx.tutor_repo.find_by_id(tutor.id).await?.expect("tutor");
    assert_eq!(tutor.total_ratings, 1);
    assert!((tutor.rating - 3.0).abs() < f64::EPSILON);

    Ok(())
}

#[tokio::test]
async fn test_review_store_refuses_second_write() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let (_, tutor) = app.tutor("brian", "history", 50_000).await?;
    let done = app.completed_booking(&student, &tutor).await?;

    let new_review = NewReview {
        booking_id: done.id,
        tutor_id: tutor.id,
        author_id: student.id,
        rating: 4,
        comment: "Solid".to_string(),
    };
    assert!(app.ctx.review_repo.create(new_review.clone()).await?.is_some());
    assert!(app.ctx.review_repo.create(new_review).await?.is_none());

    let tutor = app.ctx.tutor_repo.find_by_id(tutor.id).await?.expect("tutor");
    assert_eq!(tutor.total_ratings, 1);

    Ok(())
}

#[tokio::test]
async fn test_directory_search_filters_and_pages() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let (_, brian) = app.tutor("brian", "physics, mathematics", 80_000).await?;

    let carol_user = app
        .ctx
        .user_repo
        .create(CreateUserRequest {
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            phone: "254733000111".to_string(),
            location: Some("Mombasa".to_string()),
            role: UserRole::Tutor,
            device_token: None,
        })
        .await?;
    let carol = app
        .ctx
        .tutor_repo
        .create(CreateTutorRequest {
            user_id: carol_user.id,
            full_name: "Carol Achieng".to_string(),
            subjects: "history, literature".to_string(),
            level: "university".to_string(),
            bio: "Essay coaching".to_string(),
            hourly_rate_cents: 50_000,
        })
        .await?;
    let carol = app.ctx.tutor_repo.set_verified(carol.id, true).await?;

    // Not verified, never listed
    let (_, dan) = app.tutor("dan", "physics", 120_000).await?;
    app.ctx.tutor_repo.set_verified(dan.id, false).await?;

    let done = app.completed_booking(&student, &brian).await?;
    app.ctx
        .booking_service
        .review(&student, done.id, review(5, "Excellent"))
        .await?;

    let page = app.ctx.tutor_service.search(&TutorSearch::default()).await?;
    assert_eq!(page.total, 2);
    assert_eq!(page.per_page, 20);
    assert_eq!(page.tutors[0].id, brian.id);

    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            subject: Some("PHYSICS".to_string()),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.tutors.iter().map(|t| t.id).collect::<Vec<_>>(), vec![brian.id]);

    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            location: Some("mombasa".to_string()),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.tutors.iter().map(|t| t.id).collect::<Vec<_>>(), vec![carol.id]);

    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            q: Some("essay".to_string()),
            max_rate_cents: Some(60_000),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.total, 1);

    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            min_rating: Some(4.0),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.tutors.iter().map(|t| t.id).collect::<Vec<_>>(), vec![brian.id]);

    // Wildcards in the query are literal
    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            q: Some("%".to_string()),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.total, 0);

    let page = app
        .ctx
        .tutor_service
        .search(&TutorSearch {
            page: Some(2),
            per_page: Some(1),
            ..TutorSearch::default()
        })
        .await?;
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.tutors.iter().map(|t| t.id).collect::<Vec<_>>(), vec![carol.id]);

    Ok(())
}

#[tokio::test]
async fn test_profile_shows_location_and_recent_reviews() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let (_, tutor) = app.tutor("brian", "physics", 80_000).await?;

    let done = app.completed_booking(&student, &tutor).await?;
    app.ctx
        .booking_service
        .review(&student, done.id, review(4, "Clear explanations"))
        .await?;

    let profile = app.ctx.tutor_service.profile(tutor.id).await?;
    assert_eq!(profile.tutor.id, tutor.id);
    assert_eq!(profile.location.as_deref(), Some("Nairobi"));
    assert_eq!(profile.reviews.len(), 1);
    assert_eq!(profile.reviews[0].author_id, student.id);

    let err = app
        .ctx
        .tutor_service
        .profile(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_availability_reports_conflicts() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let (tutor_user, tutor) = app.tutor("brian", "physics", 80_000).await?;

    let request = app.request_for(&tutor, 1, 3);
    let (date, ten) = (request.schedule_date, request.schedule_time);
    let eleven = NaiveTime::from_hms_opt(11, 0, 0).expect("time");

    let open = app.ctx.tutor_service.availability(tutor.id, date, ten).await?;
    assert!(open.available);
    assert!(open.reason.is_none());

    let booking = app.ctx.booking_service.create(&student, request).await?;
    let taken = app.ctx.tutor_service.availability(tutor.id, date, ten).await?;
    assert!(!taken.available);
    assert!(taken.reason.is_some());
    assert!(app.ctx.tutor_service.availability(tutor.id, date, eleven).await?.available);

    // A cancelled booking frees the slot
    app.ctx
        .booking_service
        .cancel(
            &tutor_user,
            booking.id,
            CancelBookingRequest {
                reason: "Exams".to_string(),
            },
        )
        .await?;
    assert!(app.ctx.tutor_service.availability(tutor.id, date, ten).await?.available);

    app.ctx.tutor_repo.set_availability(tutor.id, false).await?;
    let paused = app.ctx.tutor_service.availability(tutor.id, date, ten).await?;
    assert!(!paused.available);
    assert_eq!(
        paused.reason.as_deref(),
        Some("Tutor is not currently accepting bookings")
    );

    Ok(())
}

#[tokio::test]
async fn test_meeting_created_once_by_tutor_of_confirmed_booking() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let student = app.user("amina", UserRole::Student).await?;
    let (tutor_user, tutor) = app.tutor("brian", "physics", 80_000).await?;

    let booking = app
        .booking_at(&student, &tutor, Utc::now() + Duration::days(2))
        .await?;

    let err = app
        .ctx
        .booking_service
        .create_meeting(&tutor_user, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    app.ctx.booking_service.confirm(&tutor_user, booking.id).await?;

    let err = app
        .ctx
        .booking_service
        .create_meeting(&student, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let meeting = app
        .ctx
        .booking_service
        .create_meeting(&tutor_user, booking.id)
        .await?;
    assert_eq!(meeting.provider, "jitsi");
    assert_eq!(
        meeting.join_url,
        format!("https://meet.jit.si/TutorBook-{}", booking.id.simple())
    );
    assert_eq!(meeting.starts_at, booking.scheduled_start);
    assert!(app
        .notifier
        .kinds_for(student.id)
        .contains(&NotificationKind::MeetingCreated));

    let err = app
        .ctx
        .booking_service
        .create_meeting(&tutor_user, booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let details = app.ctx.booking_service.get_for(&student, booking.id).await?;
    let shown = details.meeting.expect("meeting");
    assert_eq!(shown.join_url, meeting.join_url);
    assert!(shown.host_url.is_none());

    Ok(())
}

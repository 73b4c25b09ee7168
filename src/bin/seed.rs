use tutorbook::{
    config::Settings,
    domain::{
        session_start, CreateTutorRequest, CreateUserRequest, NewBooking, Pricing, User, UserRole,
    },
    repository::{
        BookingRepository, SqliteBookingRepository, SqliteTutorRepository, SqliteUserRepository,
        TutorRepository, UserRepository,
    },
};
use chrono::{Duration, NaiveTime, Utc};
use clap::Parser;
use fake::{
    faker::{
        lorem::en::Sentence,
        name::en::{FirstName, Name},
    },
    Fake,
};
use sqlx::sqlite::SqlitePoolOptions;

const SUBJECTS: &[&str] = &[
    "mathematics",
    "physics",
    "chemistry",
    "biology",
    "english",
    "kiswahili",
    "history",
    "computer science",
];

const LOCATIONS: &[&str] = &["Nairobi", "Mombasa", "Kisumu", "Nakuru", "Eldoret"];

const LEVELS: &[&str] = &["primary", "secondary", "university"];

/// Populate a development database with tutors, students and bookings.
#[derive(Parser, Debug)]
#[command(name = "seed")]
struct Args {
    /// Database URL; defaults to the configured one
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, default_value_t = 8)]
    tutors: usize,

    #[arg(long, default_value_t = 20)]
    students: usize,
}

fn pick<'a>(items: &[&'a str], seed: usize) -> &'a str {
    items[seed % items.len()]
}

fn phone() -> String {
    let subscriber: u32 = (10_000_000..99_999_999).fake();
    format!("2547{:08}", subscriber)
}

async fn create_user(
    users: &SqliteUserRepository,
    role: UserRole,
    index: usize,
) -> anyhow::Result<User> {
    let first: String = FirstName().fake();
    let username = format!(
        "{}.{}{}",
        first.to_lowercase(),
        role.as_str().to_lowercase(),
        index
    );
    let user = users
        .create(CreateUserRequest {
            email: format!("{}@example.com", username),
            username,
            phone: phone(),
            location: Some(pick(LOCATIONS, index).to_string()),
            role,
            device_token: None,
        })
        .await?;
    Ok(user)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let settings = Settings::new().unwrap_or_default();
    let database_url = args.database_url.unwrap_or(settings.database.url.clone());
    let policy = settings.booking_policy();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let users = SqliteUserRepository::new(db_pool.clone());
    let tutors = SqliteTutorRepository::new(db_pool.clone());
    let bookings = SqliteBookingRepository::new(db_pool.clone());

    let admin = users
        .create(CreateUserRequest {
            username: "admin".to_string(),
            email: "admin@tutorbook.local".to_string(),
            phone: "254700000000".to_string(),
            location: Some("Nairobi".to_string()),
            role: UserRole::Admin,
            device_token: None,
        })
        .await?;
    println!("  ✅ Created admin (X-User-Id: {})", admin.id);

    println!("🎓 Creating {} tutors...", args.tutors);
    let mut tutor_profiles = Vec::new();
    for i in 0..args.tutors {
        let user = create_user(&users, UserRole::Tutor, i).await?;
        let subjects = format!("{}, {}", pick(SUBJECTS, i), pick(SUBJECTS, i + 3));
        let rate_shillings: i64 = (5..20).fake::<i64>() * 100;

        let tutor = tutors
            .create(CreateTutorRequest {
                user_id: user.id,
                full_name: Name().fake(),
                subjects,
                level: pick(LEVELS, i).to_string(),
                bio: Sentence(8..16).fake(),
                hourly_rate_cents: rate_shillings * 100,
            })
            .await?;

        // Leave the last tutor unverified so the directory has something to moderate
        let tutor = if i + 1 < args.tutors {
            tutors.set_verified(tutor.id, true).await?
        } else {
            tutor
        };
        tutor_profiles.push(tutor);
    }

    println!("👥 Creating {} students...", args.students);
    let bookable: Vec<_> = tutor_profiles.iter().filter(|t| t.is_verified).collect();
    let mut booked = 0;
    for i in 0..args.students {
        let student = create_user(&users, UserRole::Student, i).await?;
        if bookable.is_empty() {
            continue;
        }
        let tutor = bookable[i % bookable.len()];

        let hours: i64 = (1..4).fake();
        let date = (Utc::now() + Duration::days(2 + (i % 10) as i64)).date_naive();
        let time = NaiveTime::from_hms_opt(9 + (i % 8) as u32, 0, 0).unwrap_or_default();

        bookings
            .create(NewBooking {
                student_id: student.id,
                tutor_id: tutor.id,
                tutor_user_id: tutor.user_id,
                subject: pick(SUBJECTS, i).to_string(),
                hours,
                hourly_rate_cents: tutor.hourly_rate_cents,
                pricing: Pricing::compute(tutor.hourly_rate_cents, hours, policy.platform_fee_percent),
                currency: policy.currency.clone(),
                schedule_date: date,
                schedule_time: time,
                scheduled_start: session_start(date, time, &policy.session_offset),
                notes: None,
            })
            .await?;
        booked += 1;
    }

    println!("  ✅ Created {} pending bookings", booked);
    println!("🎉 Seeding complete!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_fall_back_to_environment() {
        Args::command().debug_assert();

        std::env::set_var("DATABASE_URL", "sqlite://seed-test.db");
        let args = Args::try_parse_from(["seed", "--tutors", "3"]).unwrap();
        assert_eq!(args.database_url.as_deref(), Some("sqlite://seed-test.db"));
        assert_eq!(args.tutors, 3);
        assert_eq!(args.students, 20);

        let args = Args::try_parse_from(["seed", "--database-url", "sqlite::memory:"]).unwrap();
        assert_eq!(args.database_url.as_deref(), Some("sqlite::memory:"));
        std::env::remove_var("DATABASE_URL");
    }
}

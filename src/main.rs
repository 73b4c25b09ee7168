use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorbook::{
    api,
    auth::{SqliteTokenDenylist, TokenDenylist},
    config::Settings,
    notifications::{FcmChannel, InboxChannel, NotificationDispatcher, SmsChannel},
    payments::{MpesaGateway, PaymentGateway},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorbook=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Tutorbook server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Notification channels
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(Arc::new(InboxChannel::new(db_pool.clone()))).await;

    if let Some(fcm) = FcmChannel::new(settings.notifications.fcm.clone()) {
        dispatcher.register(Arc::new(fcm)).await;
    }

    if let Some(sms) = SmsChannel::new(settings.notifications.sms.clone()) {
        dispatcher.register(Arc::new(sms)).await;
    }

    for (name, result) in dispatcher.health_check_all().await {
        match result {
            Ok(_) => tracing::info!("Notification channel {} is healthy", name),
            Err(e) => tracing::warn!("Notification channel {} health check failed: {:?}", name, e),
        }
    }

    // Payment gateways
    let mut gateways: Vec<Arc<dyn PaymentGateway>> = Vec::new();
    match settings.payments.mpesa.clone() {
        Some(mpesa) if mpesa.enabled => {
            let timeout = Duration::from_secs(settings.payments.gateway_timeout_secs);
            gateways.push(Arc::new(MpesaGateway::new(mpesa, timeout)?));
            tracing::info!("M-Pesa payments enabled");
        }
        _ => tracing::warn!("No payment gateway configured; payment initiation will be rejected"),
    }

    let denylist = Arc::new(SqliteTokenDenylist::new(db_pool.clone()));

    // Revoked tokens only need to outlive the tokens themselves
    let purger = denylist.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match purger.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired revoked tokens", n),
                Err(e) => tracing::warn!("Failed to purge revoked tokens: {}", e),
            }
        }
    });

    // Create service context
    let service_context = Arc::new(ServiceContext::new(
        &settings,
        db_pool,
        gateways,
        dispatcher,
        denylist,
    ));

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

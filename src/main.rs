use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clubpay::{
    api::{self, state::AppState},
    auth::AuthService,
    config::Settings,
    domain::PaymentProvider,
    payments::{ProviderRegistry, Reconciler},
    repository::{SqliteAuditLogRepository, SqliteRegistrationRepository},
    service::PaymentService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubpay=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting clubpay server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Repositories
    let registration_repo = Arc::new(SqliteRegistrationRepository::new(db_pool.clone()));
    let audit_repo = Arc::new(SqliteAuditLogRepository::new(db_pool.clone()));

    // Provider adapters, built only for the providers configured and enabled
    let providers = Arc::new(ProviderRegistry::from_config(&settings.providers)?);
    for provider in [
        PaymentProvider::Mollie,
        PaymentProvider::Stripe,
        PaymentProvider::Paypal,
    ] {
        if providers.is_configured(provider) {
            tracing::info!("Payment provider {} enabled", provider);
        } else {
            tracing::info!("Payment provider {} disabled", provider);
        }
    }

    let reconciler = Arc::new(Reconciler::new(registration_repo.clone(), audit_repo));
    let payment_service = Arc::new(PaymentService::new(
        registration_repo,
        providers,
        reconciler,
        settings.server.base_url.clone(),
    ));
    let auth_service = Arc::new(AuthService::new(
        db_pool.clone(),
        settings.auth.session_duration_hours,
    ));

    let app_state = AppState::new(payment_service, auth_service, Arc::new(settings.clone()));
    let app = api::create_app(app_state);

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

use chrono::{Local, Utc};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use yasasuma::{
    config::{database, load_default_config},
    core::{entitlement::OfflineBilling, review::NoPresenter, services::AppServices},
    errors::Result,
    storage::SqliteStore,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal
    dotenv().ok();

    // 3. Load the application configuration
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Open the database and make sure the table exists
    let database_url = database::get_database_url(config.database_url.as_deref());
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    // 5. Wire the services and record this launch
    let store = Arc::new(SqliteStore::new(db));
    let mut services = AppServices::load(
        store,
        OfflineBilling,
        &config,
        Local,
        Box::new(NoPresenter),
        Utc::now(),
    )
    .await?;
    services.notify_app_launched().await;

    // 6. Entitlements come from the billing service, not the cached flags
    match services.refresh_entitlements().await {
        Ok(state) => info!(
            "Entitlement: unlocked={} plan={:?}",
            state.is_unlocked(),
            state.active_plan()
        ),
        Err(e) => warn!("Could not refresh entitlements: {}", e),
    }

    let review = services.review().state();
    info!(
        "Launch {} since {}; {} events, {} favorite contacts, {} destinations",
        review.launch_count,
        review.first_launch_date,
        services.events().len(),
        services.contacts().len(),
        services.destinations().len()
    );
    info!(
        "Home apps: {:?}",
        services.home_apps().visible()
    );
    Ok(())
}

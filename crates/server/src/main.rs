use campus_sso::AppResources;
use campus_sso::api::start_webserver;
use campus_sso::config::load_config_or_panic;
use migration::{Migrator, MigratorTrait};
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "campus_sso=info,tower_http=info,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    let ring_provider = crypto::ring::default_provider();
    if CryptoProvider::install_default(ring_provider).is_err() {
        tracing::warn!("A rustls crypto provider was already installed");
    }

    // Set up SeaORM database connection
    let db = Arc::new(Database::connect(&config.database_url).await?);
    if config.run_migrations {
        Migrator::up(db.as_ref(), None).await?;
        tracing::info!("database migrations applied");
    }

    let resources = AppResources::initialize(config, db).await?;

    start_webserver(resources).await?;
    Ok(())
}

use config::{Config, File};
use sea_orm_migration::prelude::*;
use std::env;

/// `database_url` from the campus-sso config file (`$CONFIG_PATH` or `config.yaml`).
fn database_url_from_config() -> Option<String> {
    let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let settings = Config::builder()
        .add_source(File::with_name(&path).required(false))
        .build()
        .ok()?;
    settings.get_string("database_url").ok()
}

#[tokio::main]
async fn main() {
    // An explicit DATABASE_URL (or -u) wins over the config file.
    if env::var("DATABASE_URL").is_err() {
        if let Some(url) = database_url_from_config() {
            env::set_var("DATABASE_URL", url);
        }
    }
    cli::run_cli(migration::Migrator).await;
}

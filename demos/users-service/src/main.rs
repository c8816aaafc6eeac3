//! Users service entry point.
//!
//! Configuration comes from `users-service.toml` (optional), `.env` and
//! `SLUICE__*` environment variables, on top of the production preset, or
//! the development preset when `SLUICE_ENV=development`.

use anyhow::Context;
use sluice::config::ConfigLoader;
use sluice::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = ConfigLoader::new().with_dotenv()?;
    let loader = match std::env::var("SLUICE_ENV").as_deref() {
        Ok("development") => loader.with_development(),
        _ => loader.with_production(),
    };
    let config = loader
        .with_optional_file("users-service.toml")?
        .load()
        .context("loading configuration")?;

    init_telemetry(&config.telemetry_config()).context("initializing telemetry")?;
    tracing::info!(
        service = %config.service.name,
        version = %config.service.version,
        addr = %config.server.http_addr,
        "starting"
    );

    let server = sluice_users_service::server(&config).context("compiling routes")?;
    server.run().await?;
    Ok(())
}

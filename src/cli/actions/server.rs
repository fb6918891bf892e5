use crate::{cli::telemetry, config::Configuration, mfa};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// Load the configuration, set up telemetry and run the server until shutdown.
/// # Errors
/// Returns an error if the configuration cannot be loaded, telemetry cannot be
/// initialized, or the server fails to start.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = Configuration::load(config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config_path.display()
        )
    })?;

    telemetry::init(&config)?;

    info!(
        "{} {} ({}) starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
    debug!("configuration: {:?}", config);

    let result = mfa::new(config).await;

    telemetry::shutdown_tracer();

    result
}

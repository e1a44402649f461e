//! tracescope server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - TRACESCOPE_HOST: Bind address (default: 0.0.0.0)
//! - TRACESCOPE_PORT: Port number (default: 8080)
//! - TRACESCOPE_API_KEY: Backend API key (required)
//! - TRACESCOPE_SPACE_ID: Backend space identifier (required)
//! - TRACESCOPE_REST_URL / TRACESCOPE_GRAPHQL_URL / TRACESCOPE_EXPORT_URL: Backend endpoints
//! - TRACESCOPE_SOURCE_TIMEOUT_SECS: Per-source timeout (default: 30)
//! - TRACESCOPE_USAGE_FIELDS: Comma-separated token usage columns
//! - RUST_LOG: Log level (default: info)

use tracescope::api::run_server;
use tracescope::config::ServiceConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracescope=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("tracescope configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Space: {}", config.space_id);
    tracing::info!("  Source timeout: {} seconds", config.source_timeout.as_secs());
    tracing::info!("  Usage fields: {}", config.usage_fields.join(", "));

    println!(
        r#"
  _
 | |_ _ __ __ _  ___ ___  ___  ___ ___  _ __   ___
 | __| '__/ _` |/ __/ _ \/ __|/ __/ _ \| '_ \ / _ \
 | |_| | | (_| | (_|  __/\__ \ (_| (_) | |_) |  __/
  \__|_|  \__,_|\___\___||___/\___\___/| .__/ \___|
                                       |_|

 Trace query and analysis tools
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}

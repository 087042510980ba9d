//! `neural-tracker` -- follow a neural forecasting job from the terminal.
//!
//! Creates a training job (or attaches to an existing one), polls its
//! status until it finishes and logs every update. Exits `0` only when
//! the job completes.
//!
//! # Environment variables
//!
//! See [`ClientConfig::from_env`] for the full table; `RUST_LOG`
//! overrides the default log filter.

use std::sync::Arc;

use clap::Parser;
use neural_client::api::HttpJobApi;
use neural_client::config::ClientConfig;
use neural_client::controller::LifecycleController;
use neural_tracker::cli::Cli;
use neural_tracker::follow;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neural_tracker=info,neural_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        api_url = %config.api_url,
        interval_ms = config.poll.interval.as_millis() as u64,
        "Starting neural-tracker",
    );

    let api = Arc::new(HttpJobApi::new(
        config.api_url.clone(),
        config.poll.request_timeout,
    ));
    let controller = LifecycleController::new(api, config.poll);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let code = match follow::run(&controller, &cli.command, shutdown).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = %e, "Tracking failed");
            1
        }
    };

    controller.stop();
    std::process::exit(code);
}

pub mod utils;

use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service::{http, Config, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Initialize logging, panic handler, and build info reporting.
/// The returned guard must be kept alive for the duration of the program.
pub fn init_logging(log_level: tracing::Level) -> tracing_appender::non_blocking::WorkerGuard {
    let (stdout_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();

    utils::register_panic_logger();
    utils::report_build_info();

    guard
}

/// Build the service state and serve the API until SIGINT or SIGTERM
pub async fn spawn_service(config: &Config) -> anyhow::Result<()> {
    let (graceful_waiter, _shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;

    let state = match ServiceState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    };

    let api_config = http::Config::try_from(config)?;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = http::run_api(api_config, state, shutdown_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(
        addr = %config.listen_addr,
        gateway = %config.public_gateway_url,
        "pinpay gateway running"
    );

    let _ = graceful_waiter.await;
    if timeout(FINAL_SHUTDOWN_TIMEOUT, api_handle).await.is_err() {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }

    tracing::info!("shutdown complete");
    Ok(())
}

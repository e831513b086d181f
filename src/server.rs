//! Startup and shutdown logic for the bridgewatch binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bridgewatch_config::{ConfigError, ConfigLoader, ConfigValidator, MonitorConfig};
use bridgewatch_monitor::{
    AlertLevel, LogListener, MonitoringService, RpcProbe, WebhookListener, endpoints,
};

/// Initialize tracing with console output, plus daily-rotated files when
/// `log_dir` is given.
pub(crate) fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("bridgewatch")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    match ConfigLoader::load(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(ConfigError::NotFound(_)) => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(MonitorConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("cannot load {}", path.display())),
    }
}

/// Validate the config file and report every finding.
pub(crate) fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        tracing::error!("{}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        anyhow::bail!("configuration has {} error(s)", result.errors.len());
    }
    info!(
        networks = config.networks.len(),
        warnings = result.warnings.len(),
        "Configuration is valid"
    );
    Ok(())
}

/// Run the monitor until Ctrl-C.
pub(crate) async fn run(config_path: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(listen) = listen {
        config.server.enabled = true;
        config.server.listen = listen;
    }

    for warning in ConfigValidator::validate(&config).warnings {
        warn!("{}: {}", warning.path, warning.message);
    }

    info!("Starting bridgewatch v{}", env!("CARGO_PKG_VERSION"));
    let service = Arc::new(MonitoringService::new(config.clone())?);

    service.subscribe(Arc::new(LogListener));
    if let Some(url) = &config.alerts.webhook_url {
        let min_level: AlertLevel = config.alerts.min_level.parse()?;
        service.subscribe(Arc::new(WebhookListener::new(url.clone(), min_level)));
        info!(min_level = %min_level, "Webhook alerts enabled");
    }

    for network in &config.networks {
        service.add_network(
            network.chain_id,
            RpcProbe::new(network.chain_id, network.rpc_url.clone()),
        );
        info!(chain_id = network.chain_id, name = %network.label(), "Registered chain");
    }

    service.start_monitoring()?;

    if config.server.enabled {
        let listener = tokio::net::TcpListener::bind(&config.server.listen)
            .await
            .with_context(|| format!("cannot bind {}", config.server.listen))?;
        info!("Status endpoints listening on http://{}", config.server.listen);

        axum::serve(listener, endpoints::router(service.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down");
    service.stop_monitoring();
    service.remove_all_listeners();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

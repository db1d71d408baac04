// # monsyncd - Convergence Driver
//
// A thin integration layer over monsync-core:
// 1. Read configuration from environment variables
// 2. Load the declaration file
// 3. Register the transport and build collaborators through the registry
// 4. Run one convergence pass and report the result through the exit code
//
// No reconciliation logic lives here. Retrying is left to whatever runs the
// binary again (cron, a systemd timer, CI).
//
// ## Configuration
//
// ### Transport
// - `MONSYNC_API_KEY`: Hyperping API key (required)
// - `MONSYNC_BASE_URL`: API base URL (default `https://api.hyperping.io`)
// - `MONSYNC_TIMEOUT_SECS`: per-request timeout (default 30)
//
// ### Declarations
// - `MONSYNC_DECLARATIONS`: path to the declaration JSON file (required)
//
// ### State Store
// - `MONSYNC_STATE_STORE_TYPE`: file or memory (default file)
// - `MONSYNC_STATE_STORE_PATH`: path to the snapshot file (for file)
//
// ### Engine
// - `MONSYNC_MAX_CONCURRENCY`: resources converged at once, 1..=32 (default 4)
// - `MONSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export MONSYNC_API_KEY=sk_...
// export MONSYNC_DECLARATIONS=/etc/monsync/resources.json
// export MONSYNC_STATE_STORE_PATH=/var/lib/monsync/state.json
//
// monsyncd
// ```

use anyhow::{Context, Result};
use monsync_core::config::{MAX_CONCURRENCY_LIMIT, default_base_url};
use monsync_core::{
    DeclarationSet, EngineConfig, EngineEvent, MonsyncConfig, PassReport, ProviderRegistry, Secret,
    StateStoreConfig, TransportConfig,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for the outcomes of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonsyncExitCode {
    /// Every declared resource converged
    Converged = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (the pass could not run)
    RuntimeError = 2,
    /// The pass ran but some addresses failed
    PassFailed = 3,
    /// Stopped by a signal before every address was visited
    Interrupted = 130,
}

impl From<MonsyncExitCode> for ExitCode {
    fn from(code: MonsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    api_key: String,
    base_url: Option<String>,
    timeout_secs: u64,
    declarations_path: String,
    state_store_type: String,
    state_store_path: Option<String>,
    max_concurrency: usize,
    log_level: String,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is not valid ({}): {:?}", name, e, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env::var("MONSYNC_API_KEY").context(
                "MONSYNC_API_KEY is required. Set it via: export MONSYNC_API_KEY=sk_...",
            )?,
            base_url: env::var("MONSYNC_BASE_URL").ok(),
            timeout_secs: parse_var("MONSYNC_TIMEOUT_SECS", 30)?,
            declarations_path: env::var("MONSYNC_DECLARATIONS").context(
                "MONSYNC_DECLARATIONS is required. \
                Set it via: export MONSYNC_DECLARATIONS=/etc/monsync/resources.json",
            )?,
            state_store_type: env::var("MONSYNC_STATE_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            state_store_path: env::var("MONSYNC_STATE_STORE_PATH").ok(),
            max_concurrency: parse_var("MONSYNC_MAX_CONCURRENCY", EngineConfig::default().max_concurrency)?,
            log_level: env::var("MONSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the environment and build the core configuration
    fn to_monsync_config(&self) -> Result<MonsyncConfig> {
        let transport = TransportConfig::Hyperping {
            api_key: Secret::new(self.api_key.clone()),
            base_url: self.base_url.clone().unwrap_or_else(default_base_url),
            timeout_secs: self.timeout_secs,
        };

        let state_store = match self.state_store_type.as_str() {
            "memory" => {
                eprintln!(
                    "WARNING: MONSYNC_STATE_STORE_TYPE=memory keeps no snapshots between runs. \
                    Every run will create its resources again."
                );
                StateStoreConfig::Memory
            }
            "file" => match self.state_store_path.as_deref() {
                Some(path) if !path.trim().is_empty() => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "MONSYNC_STATE_STORE_PATH parent directory does not exist: {}. \
                            Create it first: mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                    StateStoreConfig::File { path: path.to_string() }
                }
                _ => anyhow::bail!(
                    "MONSYNC_STATE_STORE_PATH is required when MONSYNC_STATE_STORE_TYPE=file. \
                    Set it via: export MONSYNC_STATE_STORE_PATH=/var/lib/monsync/state.json"
                ),
            },
            other => anyhow::bail!(
                "MONSYNC_STATE_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        };

        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            anyhow::bail!(
                "MONSYNC_MAX_CONCURRENCY must be between 1 and {}. Got: {}",
                MAX_CONCURRENCY_LIMIT,
                self.max_concurrency
            );
        }

        let config = MonsyncConfig {
            transport,
            state_store,
            engine: EngineConfig {
                max_concurrency: self.max_concurrency,
                ..EngineConfig::default()
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "MONSYNC_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return MonsyncExitCode::ConfigError.into();
        }
    };

    let (monsync_config, log_level) = match config.to_monsync_config().and_then(|c| Ok((c, config.log_level()?))) {
        Ok(validated) => validated,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return MonsyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MonsyncExitCode::ConfigError.into();
    }

    info!("Starting monsyncd");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MonsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(monsync_config, &config.declarations_path).await {
            Ok(report) => exit_code_for(&report),
            Err(e) => {
                error!("Run failed: {:#}", e);
                MonsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn exit_code_for(report: &PassReport) -> MonsyncExitCode {
    if report.cancelled {
        MonsyncExitCode::Interrupted
    } else if report.failed > 0 {
        MonsyncExitCode::PassFailed
    } else {
        MonsyncExitCode::Converged
    }
}

/// Run one convergence pass
async fn run(config: MonsyncConfig, declarations_path: &str) -> Result<PassReport> {
    let raw = tokio::fs::read_to_string(declarations_path)
        .await
        .with_context(|| format!("failed to read declarations from {}", declarations_path))?;
    let declarations = DeclarationSet::from_json(&raw)
        .with_context(|| format!("invalid declarations in {}", declarations_path))?;
    info!("Loaded {} declaration(s) from {}", declarations.len(), declarations_path);

    let registry = ProviderRegistry::with_builtin_stores()?;

    #[cfg(feature = "hyperping")]
    {
        monsync_provider_hyperping::register(&registry)?;
    }

    let transport = registry
        .create_transport(&config.transport)
        .context("failed to create transport")?;
    info!("Transport: {}", transport.transport_name());
    let store = registry
        .create_state_store(&config.state_store)
        .await
        .context("failed to open snapshot store")?;

    let (engine, events) =
        monsync_core::ConvergenceEngine::new(Arc::from(transport), Arc::from(store), &config.engine)?;

    let log_events = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            log_event(event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                warn!("Received {}; finishing in-flight resources", signal);
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("Signal handling unavailable: {}", e),
        }
    });

    let report = engine.run_pass_with_shutdown(&declarations, Some(shutdown_rx)).await;
    signals.abort();

    // Closing the channel ends the event stream
    drop(engine);
    let _ = log_events.await;

    let report = report?;
    info!(
        "Pass finished: {} created, {} updated, {} unchanged, {} replaced, {} deleted, {} detached, {} failed, {} skipped",
        report.created,
        report.updated,
        report.unchanged,
        report.replaced,
        report.deleted,
        report.detached,
        report.failed,
        report.skipped
    );
    for failure in &report.failures {
        let hint = if failure.transient { " (will retry next run)" } else { "" };
        error!("{}: {}{}", failure.address, failure.error, hint);
    }
    Ok(report)
}

fn log_event(event: EngineEvent) {
    match event {
        EngineEvent::PassStarted { addresses } => info!("Converging {} address(es)", addresses),
        EngineEvent::ResourceStarted { address, kind } => tracing::debug!("{} ({}) started", address, kind),
        EngineEvent::ResourceConverged { address, kind, action } => {
            info!("{} ({}): {:?}", address, kind, action)
        }
        EngineEvent::ResourceFailed { address, kind, error } => {
            error!("{} ({}) failed: {}", address, kind, error)
        }
        EngineEvent::WarningRaised { address, warning } => warn!("{}: {}", address, warning),
        EngineEvent::PassFinished { failed, cancelled } => {
            tracing::debug!("pass finished (failed={}, cancelled={})", failed, cancelled)
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Fallback for non-Unix platforms (CTRL-C only)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api_key: "sk_test_123".to_string(),
            base_url: None,
            timeout_secs: 30,
            declarations_path: "resources.json".to_string(),
            state_store_type: "memory".to_string(),
            state_store_path: None,
            max_concurrency: 4,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn defaults_build_a_valid_config() {
        let built = config().to_monsync_config().unwrap();
        assert!(matches!(built.state_store, StateStoreConfig::Memory));
        match built.transport {
            TransportConfig::Hyperping { base_url, timeout_secs, .. } => {
                assert_eq!(base_url, "https://api.hyperping.io");
                assert_eq!(timeout_secs, 30);
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn file_store_needs_a_path() {
        let mut cfg = config();
        cfg.state_store_type = "file".to_string();
        let err = cfg.to_monsync_config().unwrap_err();
        assert!(err.to_string().contains("MONSYNC_STATE_STORE_PATH"));

        let dir = std::env::temp_dir();
        cfg.state_store_path = Some(dir.join("state.json").display().to_string());
        assert!(cfg.to_monsync_config().is_ok());
    }

    #[test]
    fn out_of_range_concurrency_is_rejected() {
        let mut cfg = config();
        cfg.max_concurrency = 0;
        assert!(cfg.to_monsync_config().is_err());
        cfg.max_concurrency = MAX_CONCURRENCY_LIMIT + 1;
        assert!(cfg.to_monsync_config().is_err());
    }

    #[test]
    fn unknown_store_and_level_are_rejected() {
        let mut cfg = config();
        cfg.state_store_type = "redis".to_string();
        assert!(cfg.to_monsync_config().is_err());

        let mut cfg = config();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.log_level().is_err());
    }

    #[test]
    fn exit_codes_follow_the_report() {
        let mut report = PassReport::default();
        assert_eq!(exit_code_for(&report), MonsyncExitCode::Converged);
        report.failed = 1;
        assert_eq!(exit_code_for(&report), MonsyncExitCode::PassFailed);
        report.cancelled = true;
        assert_eq!(exit_code_for(&report), MonsyncExitCode::Interrupted);
    }
}

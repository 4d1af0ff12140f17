// # setwatchd - settings watcher daemon
//
// A thin integration layer over setwatch-core. It watches one settings
// object in a JSON settings file and logs every change it observes.
// All watching logic lives in setwatch-core; this binary only reads
// configuration, initializes the runtime and supervises the watcher.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `SETWATCH_SETTINGS_FILE`: Path to the JSON settings file (required)
// - `SETWATCH_SETTINGS_ID`: Id of the settings object to watch (required)
// - `SETWATCH_POLL_INTERVAL_MS`: Poll interval in milliseconds (default 500)
// - `SETWATCH_STARTUP_TIMEOUT_MS`: How long to wait for the first cycle (default 5000)
// - `SETWATCH_HEALTH_CHECK_SECS`: Restart check period in seconds (default 30)
// - `SETWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export SETWATCH_SETTINGS_FILE=/etc/myapp/settings.json
// export SETWATCH_SETTINGS_ID=myapp
// export SETWATCH_POLL_INTERVAL_MS=1000
//
// setwatchd
// ```

use anyhow::{Context, Result};
use setwatch_core::{
    FileSettingsStore, JsonSettings, SettingsWatcher, WatchOptions, WatcherConfig,
};
use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum SetwatchExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<SetwatchExitCode> for ExitCode {
    fn from(code: SetwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    settings_file: PathBuf,
    settings_id: String,
    poll_interval_ms: u64,
    startup_timeout_ms: u64,
    health_check_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            settings_file: env::var("SETWATCH_SETTINGS_FILE")
                .context("SETWATCH_SETTINGS_FILE is required")?
                .into(),
            settings_id: env::var("SETWATCH_SETTINGS_ID")
                .context("SETWATCH_SETTINGS_ID is required")?,
            poll_interval_ms: parse_var("SETWATCH_POLL_INTERVAL_MS", 500)?,
            startup_timeout_ms: parse_var("SETWATCH_STARTUP_TIMEOUT_MS", 5000)?,
            health_check_secs: parse_var("SETWATCH_HEALTH_CHECK_SECS", 30)?,
            log_level: env::var("SETWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.settings_id.trim().is_empty() {
            anyhow::bail!("SETWATCH_SETTINGS_ID cannot be empty");
        }

        if self.settings_file.as_os_str().is_empty() {
            anyhow::bail!("SETWATCH_SETTINGS_FILE cannot be empty");
        }

        // The file itself may appear later; its directory must exist now
        if let Some(parent) = self.settings_file.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "SETWATCH_SETTINGS_FILE parent directory does not exist: {}",
                parent.display()
            );
        }

        if !(10..=3_600_000).contains(&self.poll_interval_ms) {
            anyhow::bail!(
                "SETWATCH_POLL_INTERVAL_MS must be between 10 and 3600000. Got: {}",
                self.poll_interval_ms
            );
        }

        if self.startup_timeout_ms == 0 {
            anyhow::bail!("SETWATCH_STARTUP_TIMEOUT_MS must be at least 1");
        }

        if self.health_check_secs == 0 {
            anyhow::bail!("SETWATCH_HEALTH_CHECK_SECS must be at least 1");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SETWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::new().with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer. Got: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SetwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SetwatchExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SetwatchExitCode::ConfigError.into();
    }

    info!(
        settings_file = %config.settings_file.display(),
        settings_id = %config.settings_id,
        "Starting setwatchd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SetwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => SetwatchExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SetwatchExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    // Handlers go in before any wait so a signal is never left to the default action
    let shutdown = shutdown_signal()?;

    let store = Arc::new(FileSettingsStore::<JsonSettings>::new(&config.settings_file));

    let watcher = SettingsWatcher::with_options(
        store,
        config.settings_id.clone(),
        log_change,
        WatchOptions::new().with_config(config.watcher_config()),
    )?;

    let outcome = supervise(
        &watcher,
        Duration::from_millis(config.startup_timeout_ms),
        Duration::from_secs(config.health_check_secs),
        shutdown,
    )
    .await;

    watcher.dispose().await;

    let signal = outcome?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");
    Ok(())
}

/// Wait for startup, then restart the watcher whenever a health check finds
/// it faulted, until `shutdown` resolves
///
/// Every wait races `shutdown`, so a watcher that never starts cannot hold
/// the daemon past a signal.
async fn supervise<F>(
    watcher: &SettingsWatcher<JsonSettings>,
    startup_timeout: Duration,
    health_period: Duration,
    shutdown: F,
) -> Result<&'static str>
where
    F: Future<Output = Result<&'static str>>,
{
    tokio::pin!(shutdown);

    tokio::select! {
        signal = &mut shutdown => return signal,
        started = watcher.wait_for_startup(startup_timeout) => {
            if started? {
                info!("Watcher started");
            } else {
                warn!(
                    timeout = ?startup_timeout,
                    "Watcher did not complete its first cycle in time, continuing in the background"
                );
            }
        }
    }

    let mut health = tokio::time::interval(health_period);
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    health.tick().await;

    loop {
        tokio::select! {
            signal = &mut shutdown => return signal,
            _ = health.tick() => {}
        }

        if !watcher.is_faulted() {
            continue;
        }

        warn!(state = %watcher.state(), "Watcher is not running, restarting");
        tokio::select! {
            signal = &mut shutdown => return signal,
            restarted = watcher.restart(startup_timeout) => match restarted? {
                true => info!("Watcher restarted"),
                false => warn!("Watcher restart did not complete in time"),
            },
        }
    }
}

fn log_change(settings: Arc<JsonSettings>) -> Result<()> {
    let rendered = serde_json::to_string(&*settings)?;
    info!(settings_id = %settings.id, settings = %rendered, "Settings changed");
    Ok(())
}

/// Install SIGTERM and SIGINT handlers and wait for either
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = Result<&'static str>>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        Ok::<_, anyhow::Error>(name)
    })
}

/// Wait for SIGINT
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = Result<&'static str>>> {
    Ok(async {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
        Ok::<_, anyhow::Error>("SIGINT")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            settings_file: dir.join("settings.json"),
            settings_id: "app".to_string(),
            poll_interval_ms: 500,
            startup_timeout_ms: 5000,
            health_check_secs: 30,
            log_level: "info".to_string(),
        }
    }

    fn corrupt_file_watcher(dir: &std::path::Path) -> SettingsWatcher<JsonSettings> {
        let path = dir.join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let options = WatchOptions::new().with_config(
            WatcherConfig::new()
                .with_poll_interval(Duration::from_millis(20))
                .with_startup_poll_interval(Duration::from_millis(2)),
        );
        SettingsWatcher::with_options(
            Arc::new(FileSettingsStore::<JsonSettings>::new(&path)),
            "app",
            log_change,
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unbounded_startup_wait() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.startup_timeout_ms = 0;

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("SETWATCH_STARTUP_TIMEOUT_MS"));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_startup_wait() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = corrupt_file_watcher(dir.path());

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, anyhow::Error>("SIGTERM")
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            supervise(&watcher, Duration::from_secs(3600), Duration::from_secs(30), shutdown),
        )
        .await
        .expect("shutdown must not wait for startup");

        assert_eq!(outcome.unwrap(), "SIGTERM");
        watcher.dispose().await;
    }

    #[tokio::test]
    async fn test_shutdown_ends_restart_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = corrupt_file_watcher(dir.path());

        // Startup gives up quickly, then every health check restarts a watcher
        // that can never start
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, anyhow::Error>("SIGINT")
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            supervise(&watcher, Duration::from_millis(50), Duration::from_millis(20), shutdown),
        )
        .await
        .expect("shutdown must end the restart cycle");

        assert_eq!(outcome.unwrap(), "SIGINT");
        watcher.dispose().await;
    }
}

// Tracing setup: console output plus daily rolling log files per target
use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Client-side user actions posted to `/log_event`
pub const USER_LOG_TARGET: &str = "user_interactions";
/// Client-side script traces posted to `/log_event`
pub const SCRIPT_LOG_TARGET: &str = "script_exec";

const USER_LOG_FILE: &str = "user_interactions.log";
const SCRIPT_LOG_FILE: &str = "script_execution.log";
const SERVICE_LOG_FILE: &str = "service.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writers alive. Dropping it flushes them.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn only(target: &str) -> Targets {
    Targets::new().with_target(target, Level::INFO)
}

/// Everything at info and above except the client event targets
fn service_filter() -> Targets {
    Targets::new()
        .with_default(Level::INFO)
        .with_target(USER_LOG_TARGET, LevelFilter::OFF)
        .with_target(SCRIPT_LOG_TARGET, LevelFilter::OFF)
}

fn file_layer(dir: &Path, file: &str, filter: Targets) -> (BoxedLayer, WorkerGuard) {
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, file));
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter)
        .boxed();
    (layer, guard)
}

fn file_layers(dir: &Path) -> (Vec<BoxedLayer>, Vec<WorkerGuard>) {
    [
        (SERVICE_LOG_FILE, service_filter()),
        (USER_LOG_FILE, only(USER_LOG_TARGET)),
        (SCRIPT_LOG_FILE, only(SCRIPT_LOG_TARGET)),
    ]
    .into_iter()
    .map(|(file, filter)| file_layer(dir, file, filter))
    .unzip()
}

/// Console output filtered by `RUST_LOG` (default `info`), plus one daily
/// rolling file each for the service log, user interactions and script
/// traces under `log_dir`.
pub fn init_logging(log_dir: &Path) -> Result<LogGuards> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create {}", log_dir.display()))?;

    let (mut layers, guards) = file_layers(log_dir);
    let console = fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .boxed();
    layers.push(console);

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(LogGuards { _guards: guards })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_log(dir: &Path, prefix: &str) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
            .map(|entry| std::fs::read_to_string(entry.path()).unwrap())
            .collect()
    }

    #[test]
    fn test_events_land_in_their_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let (layers, guards) = file_layers(dir.path());
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: USER_LOG_TARGET, "clicked graph");
            tracing::info!(target: SCRIPT_LOG_TARGET, "auto refresh tick");
            tracing::info!("service started");
            tracing::debug!("too chatty for the file");
        });
        drop(guards);

        let user = read_log(dir.path(), USER_LOG_FILE);
        assert!(user.contains("clicked graph"));
        assert!(!user.contains("service started"));

        let script = read_log(dir.path(), SCRIPT_LOG_FILE);
        assert!(script.contains("auto refresh tick"));
        assert!(!script.contains("clicked graph"));

        let service = read_log(dir.path(), SERVICE_LOG_FILE);
        assert!(service.contains("service started"));
        assert!(!service.contains("clicked graph"));
        assert!(!service.contains("auto refresh tick"));
        assert!(!service.contains("too chatty"));
    }
}

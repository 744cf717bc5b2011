//! Log sink setup
//!
//! The library itself only emits `tracing` events under the `pool`,
//! `buffer`, and `emitter` targets; it never installs a subscriber on its
//! own. Hosts that want persistent output call [`init_logging`], which
//! stacks three sinks over one registry: a JSON activity file and a
//! plain-text warnings file (both daily-rolling, non-blocking) plus an
//! optional stderr mirror for interactive runs.
//!
//! The returned guards flush the non-blocking writers on drop; hold them
//! for the lifetime of the process or buffered lines are lost.

use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Where and how log output lands
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory receiving the rolling files
    pub dir: PathBuf,
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Mirror events to stderr
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            default_filter: "info".into(),
            console: true,
        }
    }
}

impl LogOptions {
    /// File sinks under `dir`, no stderr mirror
    pub fn quiet(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            console: false,
            ..Self::default()
        }
    }
}

/// Install the process-wide subscriber and return the writer guards
///
/// A subscriber installed earlier in the process wins; in that case the
/// sinks built here are discarded and the existing one keeps running.
pub fn init_logging(options: &LogOptions) -> io::Result<Vec<WorkerGuard>> {
    std::fs::create_dir_all(&options.dir)?;

    let (activity_writer, activity_guard) =
        tracing_appender::non_blocking(rolling::daily(&options.dir, "activity.log"));
    let (warnings_writer, warnings_guard) =
        tracing_appender::non_blocking(rolling::daily(&options.dir, "warnings.log"));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let activity_layer = tracing_subscriber::fmt::layer()
        .with_writer(activity_writer)
        .with_ansi(false)
        .with_target(true)
        .json();
    let warnings_layer = tracing_subscriber::fmt::layer()
        .with_writer(warnings_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(activity_layer)
        .with(warnings_layer);

    let installed = if options.console {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true);
        registry.with(console_layer).try_init().is_ok()
    } else {
        registry.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            target: "main",
            dir = %options.dir.display(),
            "log sinks ready"
        );
    }
    Ok(vec![activity_guard, warnings_guard])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_options() {
        let options = LogOptions::quiet("target/test-logs");
        assert!(!options.console);
        assert_eq!(options.dir, PathBuf::from("target/test-logs"));
        assert_eq!(options.default_filter, "info");
    }

    #[test]
    fn test_init_creates_sink_directory() {
        let dir = std::env::temp_dir().join("sim-core-log-init");
        let _ = std::fs::remove_dir_all(&dir);

        let guards = init_logging(&LogOptions::quiet(&dir)).unwrap();
        assert_eq!(guards.len(), 2);
        assert!(dir.exists());

        drop(guards);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Logging setup.
//!
//! Console output goes through an `EnvFilter` (`RUST_LOG`, default `info`).
//! ERROR events are also written to a daily rolling file under the
//! configured error-log directory, whatever `RUST_LOG` says.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix of the rolling error log.
pub const ERROR_LOG_PREFIX: &str = "error.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "info,orderbridge=debug" } else { "info" }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and closes the error file.
pub fn init_logging(
    format: LogFormat,
    error_log_dir: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let console: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer().json().with_target(false).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    let (error_file, guard) = match error_log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create error log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, ERROR_LOG_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::ERROR);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console.with_filter(env_filter))
        .with(error_file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

/// Names of the rolling error log files in `dir`, oldest first.
pub fn error_log_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read error log directory {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(ERROR_LOG_PREFIX) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_crate_level_only() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "info,orderbridge=debug");
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
    }

    #[test]
    fn error_log_files_lists_rolled_files_only() {
        let dir = tempfile::tempdir().unwrap();
        assert!(error_log_files(&dir.path().join("missing")).unwrap().is_empty());

        for name in ["error.log.2024-05-13", "error.log.2024-05-12", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            error_log_files(dir.path()).unwrap(),
            vec!["error.log.2024-05-12", "error.log.2024-05-13"]
        );
    }

    #[test]
    fn second_install_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let _first = init_logging(LogFormat::Json, Some(dir.path()), false);
        assert!(init_logging(LogFormat::Pretty, None, false).is_err());
    }
}

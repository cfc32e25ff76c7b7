//! Tracing setup: compact stdout output plus a daily-rolling file in the
//! data directory's `logs/` folder.
//!
//! The filter comes from `DOCSAGE_LOG` (or `RUST_LOG`). Noisy dependencies
//! are held back unless the filter names them itself.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::AppPaths;

const LOG_FILE_PREFIX: &str = "docsage.log";
const FILTER_ENV: &str = "DOCSAGE_LOG";
const DEFAULT_LEVEL: &str = "info";
const QUIET_DEPENDENCIES: &[(&str, &str)] = &[
    ("sqlx", "warn"),
    ("hyper", "info"),
    ("reqwest", "info"),
    ("h2", "info"),
];

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(paths: &AppPaths) {
    let requested = std::env::var(FILTER_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok();
    let directives = filter_directives(requested.as_deref());
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter '{}': {}", directives, err);
        EnvFilter::new(DEFAULT_LEVEL)
    });

    // Without a writable log dir the server still runs, logging to stdout.
    let file_layer = match std::fs::create_dir_all(&paths.log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&paths.log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        Err(err) => {
            eprintln!(
                "File logging disabled, cannot create {}: {}",
                paths.log_dir.display(),
                err
            );
            None
        }
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    tracing::debug!("Log filter: {}", directives);
}

/// The requested filter with quiet defaults appended for every dependency it
/// does not mention.
fn filter_directives(requested: Option<&str>) -> String {
    let base = requested
        .map(str::trim)
        .filter(|filter| !filter.is_empty())
        .unwrap_or(DEFAULT_LEVEL);

    let mentioned: Vec<&str> = base
        .split(',')
        .filter_map(|directive| directive.split('=').next())
        .map(str::trim)
        .collect();

    let mut directives = vec![base.to_string()];
    directives.extend(
        QUIET_DEPENDENCIES
            .iter()
            .filter(|(target, _)| !mentioned.contains(target))
            .map(|(target, level)| format!("{}={}", target, level)),
    );
    directives.join(",")
}

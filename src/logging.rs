use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env_bool;

/// Per-statement sqlx logging drowns out pulse and completion events at `info`.
const QUIET_TARGETS: &[(&str, &str)] = &[("sqlx", "warn"), ("hyper", "warn")];

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileLogSettings {
    dir: PathBuf,
    prefix: String,
}

impl FileLogSettings {
    fn from_env() -> Option<Self> {
        if !env_bool("ENABLE_FILE_LOGS").unwrap_or(false) {
            return None;
        }
        let dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let prefix = std::env::var("LOG_FILE_PREFIX")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "lms-backend.log".to_string());
        Some(Self {
            dir: PathBuf::from(dir),
            prefix,
        })
    }
}

/// Caller's directives plus quiet defaults for noisy dependencies, unless the
/// caller already mentions that target.
fn filter_directives(log_level: &str) -> String {
    let base = if log_level.trim().is_empty() { "info" } else { log_level.trim() };
    let mut directives = vec![base.to_string()];
    for (target, level) in QUIET_TARGETS {
        if !base.contains(target) {
            directives.push(format!("{target}={level}"));
        }
    }
    directives.join(",")
}

/// Installs the global subscriber. Keep the returned guard alive for the whole
/// process or buffered file lines are lost.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let directives = filter_directives(log_level);
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let file = FileLogSettings::from_env().and_then(|settings| {
        if let Err(err) = std::fs::create_dir_all(&settings.dir) {
            eprintln!("failed to create log directory {}: {err}", settings.dir.display());
            return None;
        }
        let appender = RollingFileAppender::new(Rotation::DAILY, &settings.dir, &settings.prefix);
        Some((settings, tracing_appender::non_blocking(appender)))
    });

    match file {
        Some((settings, (writer, guard))) => {
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            tracing::info!(
                dir = %settings.dir.display(),
                prefix = %settings.prefix,
                filter = %directives,
                "file logging enabled"
            );
            Some(FileLogGuard { _guard: guard })
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            tracing::debug!(filter = %directives, "stdout logging initialised");
            None
        }
    }
}

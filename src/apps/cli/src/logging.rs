//! Logging Configuration

use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "CHATLOOM_LOG_LEVEL";
const SESSION_DIR_PATTERN: &str = r"^\d{8}T\d{6}$";
const SESSION_DIR_FORMAT: &str = "%Y%m%dT%H%M%S";
const MAX_LOG_SESSIONS: usize = 50;
const LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: log::LevelFilter,
    pub is_debug: bool,
    pub session_log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(is_debug: bool) -> Self {
        let level = resolve_default_level(std::env::var(LOG_LEVEL_ENV).ok(), is_debug);

        Self {
            level,
            is_debug,
            session_log_dir: logs_root().and_then(|root| create_session_log_dir(&root)),
        }
    }
}

fn resolve_default_level(env_value: Option<String>, is_debug: bool) -> log::LevelFilter {
    let fallback = if is_debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    match env_value {
        Some(val) => parse_log_level(&val).unwrap_or_else(|| {
            eprintln!(
                "Warning: Invalid {} '{}', falling back to default",
                LOG_LEVEL_ENV, val
            );
            fallback
        }),
        None => fallback,
    }
}

pub fn parse_log_level(value: &str) -> Option<log::LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(log::LevelFilter::Trace),
        "debug" => Some(log::LevelFilter::Debug),
        "info" => Some(log::LevelFilter::Info),
        "warn" => Some(log::LevelFilter::Warn),
        "error" => Some(log::LevelFilter::Error),
        "off" => Some(log::LevelFilter::Off),
        _ => None,
    }
}

pub fn level_to_str(level: log::LevelFilter) -> &'static str {
    match level {
        log::LevelFilter::Trace => "trace",
        log::LevelFilter::Debug => "debug",
        log::LevelFilter::Info => "info",
        log::LevelFilter::Warn => "warn",
        log::LevelFilter::Error => "error",
        log::LevelFilter::Off => "off",
    }
}

pub fn logs_root() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("chatloom").join("logs"))
}

pub fn create_session_log_dir(logs_root: &Path) -> Option<PathBuf> {
    let timestamp = Local::now().format(SESSION_DIR_FORMAT).to_string();
    let session_dir = logs_root.join(&timestamp);

    if let Err(e) = std::fs::create_dir_all(&session_dir) {
        eprintln!("Warning: Failed to create log session directory: {}", e);
        return None;
    }

    Some(session_dir)
}

/// Installs the global subscriber. `log` records from the library crates are
/// bridged into it. The console only gets output with `--debug`; the session
/// log file gets everything at the configured level.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let level = level_to_str(config.level);
    let filter = EnvFilter::new(format!("{},hyper=warn,hyper_util=warn,reqwest=warn", level));

    let console_layer = config.is_debug.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_target(true)
    });

    let file_layer = match config.session_log_dir.as_ref() {
        Some(dir) => {
            let file = File::create(dir.join("app.log"))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn parse_session_timestamp(name: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(name, SESSION_DIR_FORMAT).ok()
}

pub async fn cleanup_old_log_sessions() {
    let Some(logs_root) = logs_root() else {
        return;
    };
    let now = Local::now().naive_local();

    if let Err(e) = do_cleanup_log_sessions(&logs_root, MAX_LOG_SESSIONS, now).await {
        log::warn!("Failed to cleanup old log sessions: {}", e);
    }
}

/// Removes the oldest session directories beyond `max_sessions`, but only
/// those older than the retention window.
async fn do_cleanup_log_sessions(
    logs_root: &Path,
    max_sessions: usize,
    now: chrono::NaiveDateTime,
) -> Result<usize, std::io::Error> {
    let regex = regex::Regex::new(SESSION_DIR_PATTERN).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid session dir pattern: {}", e),
        )
    })?;
    let mut entries = tokio::fs::read_dir(logs_root).await?;
    let mut session_dirs: Vec<String> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if regex.is_match(&name) {
            session_dirs.push(name);
        }
    }

    session_dirs.sort();

    if session_dirs.len() <= max_sessions {
        return Ok(0);
    }

    let retention_threshold = now - chrono::Duration::days(LOG_RETENTION_DAYS);
    let excess_count = session_dirs.len() - max_sessions;
    let to_delete: Vec<_> = session_dirs
        .into_iter()
        .take(excess_count)
        .filter(|name| {
            parse_session_timestamp(name)
                .map(|ts| ts < retention_threshold)
                .unwrap_or(false)
        })
        .collect();

    if to_delete.is_empty() {
        return Ok(0);
    }

    log::info!(
        "Cleaning up {} old log session(s) older than {} days",
        to_delete.len(),
        LOG_RETENTION_DAYS
    );

    let mut removed = 0;
    for session_name in to_delete {
        let session_path = logs_root.join(&session_name);
        match tokio::fs::remove_dir_all(&session_path).await {
            Ok(_) => {
                log::debug!("Removed old log session: {}", session_name);
                removed += 1;
            }
            Err(e) => {
                log::warn!("Failed to remove log session {}: {}", session_name, e);
            }
        }
    }

    Ok(removed)
}

pub fn spawn_log_cleanup_task() -> tokio::task::JoinHandle<()> {
    tokio::spawn(cleanup_old_log_sessions())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> chrono::NaiveDateTime {
        parse_session_timestamp(value).expect("valid timestamp")
    }

    #[test]
    fn parses_known_levels_case_insensitively() {
        assert_eq!(parse_log_level(" WARN "), Some(log::LevelFilter::Warn));
        assert_eq!(parse_log_level("off"), Some(log::LevelFilter::Off));
        assert_eq!(parse_log_level("verbose"), None);
        assert_eq!(level_to_str(log::LevelFilter::Trace), "trace");
    }

    #[test]
    fn invalid_env_level_falls_back() {
        assert_eq!(
            resolve_default_level(Some("loud".to_string()), true),
            log::LevelFilter::Debug
        );
        assert_eq!(resolve_default_level(None, false), log::LevelFilter::Info);
        assert_eq!(
            resolve_default_level(Some("error".to_string()), true),
            log::LevelFilter::Error
        );
    }

    #[tokio::test]
    async fn cleanup_keeps_recent_and_limits_old_sessions() {
        let root = tempfile::tempdir().expect("tempdir");
        for name in [
            "20260101T000000",
            "20260102T000000",
            "20260103T000000",
            "20261018T000000",
        ] {
            std::fs::create_dir(root.path().join(name)).expect("create session dir");
        }
        std::fs::create_dir(root.path().join("not-a-session")).expect("create dir");

        let removed = do_cleanup_log_sessions(root.path(), 2, at("20261019T000000"))
            .await
            .expect("cleanup");

        assert_eq!(removed, 2);
        assert!(!root.path().join("20260101T000000").exists());
        assert!(!root.path().join("20260102T000000").exists());
        assert!(root.path().join("20260103T000000").exists());
        assert!(root.path().join("not-a-session").exists());
    }

    #[tokio::test]
    async fn cleanup_never_removes_sessions_inside_retention() {
        let root = tempfile::tempdir().expect("tempdir");
        for name in ["20261015T000000", "20261016T000000", "20261017T000000"] {
            std::fs::create_dir(root.path().join(name)).expect("create session dir");
        }

        let removed = do_cleanup_log_sessions(root.path(), 1, at("20261019T000000"))
            .await
            .expect("cleanup");

        assert_eq!(removed, 0);
    }
}

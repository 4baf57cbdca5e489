//! Engine logging bootstrap.
//!
//! # Responsibility
//! - Start the `flexi_logger` file backend from the `[logging]` section of
//!   [`EngineConfig`].
//! - Record one `engine_start` event carrying the crate version, schema
//!   version and the configured patch limits.
//!
//! # Invariants
//! - The backend starts at most once per process. Repeating the call with
//!   the same level and directory is a no-op; anything else is rejected.
//! - Events are metadata only. Panic payloads are cut to their first line
//!   before they reach the log, since they may quote block text.

use crate::config::{EngineConfig, LoggingConfig};
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, LogSpecification, Logger, LoggerHandle,
    Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "pagetree";
const PANIC_SUMMARY_CHARS: usize = 120;

static ACTIVE: OnceCell<(ActiveLogging, LoggerHandle)> = OnceCell::new();

/// Settings the running file logger was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLogging {
    pub level: LevelFilter,
    pub dir: PathBuf,
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    RelativeDir(PathBuf),
    CreateDir { dir: PathBuf, source: std::io::Error },
    Backend(FlexiLoggerError),
    /// A logger is already running with different settings.
    AlreadyStarted {
        active: ActiveLogging,
        requested: ActiveLogging,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected off|error|warn|info|debug|trace"
            ),
            Self::RelativeDir(dir) => {
                write!(f, "log directory must be absolute, got `{}`", dir.display())
            }
            Self::CreateDir { dir, source } => {
                write!(f, "failed to create log directory `{}`: {source}", dir.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyStarted { active, requested } => write!(
                f,
                "logging already runs at level {} in `{}`; refusing level {} in `{}`",
                active.level,
                active.dir.display(),
                requested.level,
                requested.dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

/// Default level for the current build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Starts file logging described by `config.logging`.
///
/// Returns `Ok(None)` when no log directory is configured.
pub fn init_logging(config: &EngineConfig) -> Result<Option<ActiveLogging>, LoggingError> {
    let Some(requested) = resolve_settings(&config.logging)? else {
        return Ok(None);
    };

    if let Some((active, _)) = ACTIVE.get() {
        return reuse_active(active, requested);
    }

    let (active, _) = ACTIVE.get_or_try_init(|| start_backend(config, &requested))?;
    reuse_active(active, requested)
}

/// Settings of the running file logger, if any.
pub fn active_logging() -> Option<ActiveLogging> {
    ACTIVE.get().map(|(active, _)| active.clone())
}

fn resolve_settings(config: &LoggingConfig) -> Result<Option<ActiveLogging>, LoggingError> {
    let level = config
        .level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggingError::UnsupportedLevel(config.level.clone()))?;
    let Some(dir) = config.dir.clone() else {
        return Ok(None);
    };
    if !dir.is_absolute() {
        return Err(LoggingError::RelativeDir(dir));
    }
    Ok(Some(ActiveLogging { level, dir }))
}

fn reuse_active(
    active: &ActiveLogging,
    requested: ActiveLogging,
) -> Result<Option<ActiveLogging>, LoggingError> {
    if *active == requested {
        return Ok(Some(requested));
    }
    Err(LoggingError::AlreadyStarted {
        active: active.clone(),
        requested,
    })
}

fn start_backend(
    config: &EngineConfig,
    settings: &ActiveLogging,
) -> Result<(ActiveLogging, LoggerHandle), LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateDir {
        dir: settings.dir.clone(),
        source,
    })?;

    let handle = Logger::with(LogSpecification::builder().default(settings.level).build())
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(config.logging.max_file_size_mb * 1024 * 1024),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.logging.keep_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    log_panics();
    info!(
        "event=engine_start module=logging status=ok version={} schema_version={} level={} log_dir={} max_ops_per_patch={} idempotency_ttl_secs={}",
        env!("CARGO_PKG_VERSION"),
        crate::db::migrations::latest_version(),
        settings.level,
        settings.dir.display(),
        config.max_ops_per_patch,
        config.idempotency_ttl_secs
    );

    Ok((settings.clone(), handle))
}

/// Chains a hook that logs where a panic happened before the previous hook
/// runs. Called once, from the backend start.
fn log_panics() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let location = panic
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string payload");
        error!(
            "event=panic module=logging status=error location={} summary={}",
            location,
            panic_summary(payload)
        );
        previous(panic);
    }));
}

fn panic_summary(payload: &str) -> String {
    let first_line = payload.lines().next().unwrap_or_default();
    let mut summary: String = first_line.chars().take(PANIC_SUMMARY_CHARS).collect();
    if summary.len() < payload.len() {
        summary.push_str("...");
    }
    summary
}

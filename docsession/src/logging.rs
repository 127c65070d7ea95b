//! Process-wide log subscriber setup.
//!
//! Output goes to exactly one place:
//! - `<LogPath>/<ProjectName>_stdout.log` as JSON lines when `LogPath` is set
//! - stdout as plain text when `IsStdOut` is set
//! - stderr as JSON otherwise
//!
//! `RUST_LOG` takes precedence over `LogLevel` when it is set.

use std::path::Path;

use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{ConfigError, ConfigResult, LogSettings};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Parses a level name. Empty means "keep the default".
///
/// Besides the `tracing` names, `warning` is WARN and `fatal`/`panic` are ERROR.
pub fn parse_level(name: &str) -> ConfigResult<Option<Level>> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "fatal" | "panic" => Level::ERROR,
        _ => return Err(ConfigError::InvalidLogLevel(name.to_string())),
    };

    Ok(Some(level))
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()))
}

fn file_appender(directory: &Path, project_name: &str) -> ConfigResult<RollingFileAppender> {
    std::fs::create_dir_all(directory).map_err(|source| ConfigError::Io {
        path: directory.to_path_buf(),
        source,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(format!("{project_name}_stdout.log"))
        .build(directory)
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process. It is `None` for console output.
pub fn init(settings: &LogSettings, project_name: &str) -> ConfigResult<Option<WorkerGuard>> {
    let level = parse_level(&settings.log_level)?.unwrap_or(Level::INFO);
    let filter = env_filter(level);

    let (layer, guard): (BoxedLayer, Option<WorkerGuard>) = if !settings.log_path.is_empty() {
        let appender = file_appender(Path::new(&settings.log_path), project_name)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed();

        (layer, Some(guard))
    } else if settings.is_std_out {
        let layer = fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stdout)
            .with_filter(filter)
            .boxed();

        (layer, None)
    } else {
        let layer = fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed();

        (layer, None)
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::info!(
        project = project_name,
        %level,
        file = !settings.log_path.is_empty(),
        "logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_and_legacy_names() {
        assert_eq!(parse_level("debug").unwrap(), Some(Level::DEBUG));
        assert_eq!(parse_level("INFO").unwrap(), Some(Level::INFO));
        assert_eq!(parse_level("warning").unwrap(), Some(Level::WARN));
        assert_eq!(parse_level("fatal").unwrap(), Some(Level::ERROR));
        assert_eq!(parse_level("panic").unwrap(), Some(Level::ERROR));
    }

    #[test]
    fn empty_level_keeps_the_default() {
        assert_eq!(parse_level("").unwrap(), None);
        assert_eq!(parse_level("  ").unwrap(), None);
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(matches!(parse_level("verbose"), Err(ConfigError::InvalidLogLevel(name)) if name == "verbose"));
    }

    #[test]
    fn invalid_level_fails_before_installing_anything() {
        let settings = LogSettings {
            log_level: "loud".into(),
            ..Default::default()
        };

        assert!(matches!(init(&settings, "svc"), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn file_output_creates_the_project_log() {
        let directory = std::env::temp_dir().join(format!("docsession-logging-{}", std::process::id()));
        let settings = LogSettings {
            log_path: directory.to_string_lossy().into_owned(),
            log_level: "debug".into(),
            ..Default::default()
        };

        let guard = init(&settings, "svc").unwrap();
        assert!(guard.is_some());
        assert!(directory.join("svc_stdout.log").exists());

        drop(guard);
        let _ = std::fs::remove_dir_all(&directory);
    }
}

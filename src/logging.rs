use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{fmt::time::UtcTime, prelude::*, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogRotation, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging: stdout plus an optional rolling file appender.
///
/// Filter precedence is `logging.level` from config, then `RUST_LOG`, then
/// `info`. The returned guard flushes the file writer on drop and must be held
/// for as long as the process logs. Initializing twice is a no-op.
#[must_use]
pub fn init_with_config(cfg: &LoggingConfig) -> Option<WorkerGuard> {
    let mut layers: Vec<BoxedLayer> = vec![console_layer(cfg.format)];

    let guard = if cfg.enable_file_logging {
        match file_writer(cfg) {
            Some((writer, guard)) => {
                layers.push(file_layer(cfg.format, writer));
                Some(guard)
            }
            None => None,
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(cfg))
        .try_init();

    guard
}

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    match &cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stdout);
    match format {
        LogFormat::Json => base.json().with_ansi(false).boxed(),
        LogFormat::Text => base.with_ansi(true).boxed(),
    }
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Text => base.boxed(),
    }
}

fn file_writer(
    cfg: &LoggingConfig,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let rotation = match cfg.rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    if let Err(e) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "Failed to create log directory '{}' ({e}), continuing with stdout logs",
            cfg.dir
        );
        return None;
    }

    let appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, &cfg.dir, &cfg.filename);
    Some(tracing_appender::non_blocking(appender))
}

//! Console output plus a daily-rotated NDJSON file, with `RUST_LOG`
//! overriding the configured level.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::event_logger::EVENT_TARGET;

/// File name prefix of the rolling log, e.g. `logs/convoforge.log.2026-10-18`.
pub const LOG_FILE_PREFIX: &str = "convoforge.log";

/// Install the global subscriber.
///
/// Pipeline events go to the file only; the console gets everything else.
/// Later calls are ignored.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = log_dir.as_ref();
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("cannot create log dir {}: {e}", log_dir.display());
    }
    let file_layer = fmt::layer()
        .json()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX))
        .with_ansi(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() != EVENT_TARGET));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

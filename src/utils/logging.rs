use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    EnvFilter,
};

pub const CLI_PREFIX: &str = "cli";
pub const DAEMON_PREFIX: &str = "daemon";

const KEPT_LOG_FILES: usize = 5;
const DEFAULT_LEVEL: &str = "debug";
/// Log targets of the library and of both binaries.
const TARGETS: [&str; 2] = ["habitrack", "habitrack_daemon"];

/// Builds the filter directives. An explicit level applies to habitrack's own targets. Otherwise
/// a bare level in `RUST_LOG` does the same, while a full directive list such as
/// `habitrack::daemon=trace,warn` is used as written.
pub fn filter_directives(log_level: Option<LevelFilter>, rust_log: Option<&str>) -> String {
    let level = match (log_level, rust_log.map(str::trim)) {
        (Some(level), _) => level.to_string(),
        (None, Some(env)) if env.contains('=') || env.contains(',') => return env.to_string(),
        (None, Some(env)) if !env.is_empty() => env.to_string(),
        (None, _) => DEFAULT_LEVEL.to_string(),
    };
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. Logs go to daily files named `<prefix>.<date>` under
/// `<application_data_path>/logs`, and also to stdout when `show_std` is set.
pub fn enable_logging(
    prefix: &str,
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(KEPT_LOG_FILES)
        .filename_prefix(prefix)
        .build(application_data_path.join("logs"))?;

    let stdout = std::io::stdout.with_filter(move |_| show_std);

    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = EnvFilter::try_new(filter_directives(log_level, rust_log.as_deref()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stdout.and(appender))
        .pretty()
        .init();
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});

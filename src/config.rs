//! Process configuration: environment, logging and the AWS SDK.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use aws_config::BehaviorVersion;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter for stderr logs when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn,ssm=info";

/// Filter for the JSON log file when `RUST_LOG_JSON` is unset.
pub const DEFAULT_JSON_LOG_FILTER: &str = "debug";

/// Settings resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Shared-config profile; `None` lets the SDK pick (`AWS_PROFILE`, default).
    pub profile: Option<String>,
    /// When set, logs are also written as JSON to a daily-rolling file here.
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Builds settings from the CLI profile flag and the environment.
    ///
    /// Reads `.env` first so its variables count as environment.
    pub fn load(profile: Option<String>) -> Self {
        dotenvy::dotenv().ok();
        Self::from_env(profile, |key| std::env::var(key).ok())
    }

    fn from_env(profile: Option<String>, var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            profile: profile.filter(|p| !p.is_empty()),
            log_file: var("SSM_LOG_FILE")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Loads the AWS SDK configuration for the selected profile.
    pub async fn sdk_config(&self) -> aws_config::SdkConfig {
        let loader = aws_config::defaults(BehaviorVersion::latest());
        match &self.profile {
            Some(profile) => loader.profile_name(profile).load().await,
            None => loader.load().await,
        }
    }
}

/// Installs the global subscriber: colored stderr, plus a JSON file when
/// configured. Keep the returned guard alive until exit so the file is
/// flushed.
pub fn init_logging(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let stderr_filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (json_layer, guard) = match &settings.log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            let file_appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            let json_filter = EnvFilter::try_from_env("RUST_LOG_JSON")
                .or_else(|_| EnvFilter::try_new(DEFAULT_JSON_LOG_FILTER))?;
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(non_blocking_file)
                .with_filter(json_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path.file_name().unwrap_or(OsStr::new("ssm.log"));
    (dir, file_name)
}

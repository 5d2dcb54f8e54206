//! Tracing subscriber setup driven by `COINWATCH_LOG_*` variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_bool, AppConfig};

pub const LOG_LEVEL_VAR: &str = "COINWATCH_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "COINWATCH_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "COINWATCH_LOG_TARGET";

const FALLBACK_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else if raw.trim().eq_ignore_ascii_case("pretty") {
            Some(Self::Pretty)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Filter directives plus output shape for the process-wide subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: FALLBACK_DIRECTIVE.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Directives that do not parse fall back to `info` rather than failing startup.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

/// Unset, blank or unrecognized values keep the default for that field.
pub fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    LoggingConfig {
        level: get(LOG_LEVEL_VAR).unwrap_or(defaults.level),
        format: get(LOG_FORMAT_VAR)
            .and_then(|raw| LogFormat::parse(&raw))
            .unwrap_or(defaults.format),
        include_target: get(LOG_TARGET_VAR)
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

pub fn log_app_start(logging: &LoggingConfig, app: &AppConfig) {
    info!(
        component = "server",
        event = "app.start",
        log_level = %logging.level,
        log_format = logging.format.as_str(),
        include_target = logging.include_target,
        db_path = %app.db_path.display(),
        provider = %app.provider.base_url,
        market_limit = app.provider.market_limit,
        cache_ttl_secs = app.cache_ttl.as_secs()
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "server",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = "/api"
    );
}

pub fn log_scheduler_start(every: Duration) {
    info!(
        component = "scheduler",
        event = "scheduler.start",
        interval_secs = every.as_secs()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> LoggingConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        logging_config_from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn no_coinwatch_variables_gives_pretty_info_with_targets() {
        let cfg = config_from(&[
            ("RUST_LOG", "trace"),
            ("PMM_LOG_FORMAT", "json"),
            ("COINWATCH_DB_PATH", "/tmp/coinwatch.sqlite"),
        ]);

        assert_eq!(cfg, LoggingConfig::default());
        assert_eq!(cfg.format.as_str(), "pretty");
    }

    #[test]
    fn multi_directive_level_is_trimmed_and_kept_whole() {
        let cfg = config_from(&[(
            LOG_LEVEL_VAR,
            "  warn,coinwatch::reconciler=debug,tower_http=info \n",
        )]);

        assert_eq!(cfg.level, "warn,coinwatch::reconciler=debug,tower_http=info");
        assert!(cfg.env_filter().to_string().contains("coinwatch::reconciler=debug"));
    }

    #[test]
    fn format_is_case_insensitive() {
        assert_eq!(config_from(&[(LOG_FORMAT_VAR, " Json ")]).format, LogFormat::Json);
        assert_eq!(config_from(&[(LOG_FORMAT_VAR, "PRETTY")]).format, LogFormat::Pretty);
        assert_eq!(config_from(&[(LOG_FORMAT_VAR, "ndjson")]).format, LogFormat::Pretty);
    }

    #[test]
    fn target_flag_accepts_the_shared_boolean_spellings() {
        for (raw, expected) in [("no", false), ("OFF", false), ("0", false), ("yes", true)] {
            assert_eq!(
                config_from(&[(LOG_TARGET_VAR, raw)]).include_target,
                expected,
                "{raw}"
            );
        }
        assert!(config_from(&[(LOG_TARGET_VAR, "sometimes")]).include_target);
    }

    #[test]
    fn blank_level_and_unparseable_directives_fall_back_to_info() {
        assert_eq!(config_from(&[(LOG_LEVEL_VAR, "   ")]).level, "info");

        let cfg = config_from(&[(LOG_LEVEL_VAR, "coinwatch=loud")]);
        assert_eq!(cfg.level, "coinwatch=loud");
        assert_eq!(cfg.env_filter().to_string(), "info");
    }
}

//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use telestory_core::{AdmissionPolicy, EngineConfig, Environment};
use telestory_fetch::{CatalogConfig, MediaFetcherConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for telestory-server.
///
/// The four credentials have no defaults; everything else does.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    /// Bot API root, overridable for tests (default: `"https://api.telegram.org"`).
    pub telegram_api_url: String,
    pub api_key: String,
    pub api_url: String,
    pub archive_channel_id: i64,

    pub environment: Environment,
    /// Cooldown override; the environment preset applies when unset.
    pub cooldown_secs: Option<u64>,
    /// Daily limit override; the environment preset applies when unset.
    pub daily_limit: Option<u32>,

    /// SQLite database URL (default: `"sqlite://telestory.db"`).
    pub database_url: String,
    /// TCP address for the health endpoint (default: `"0.0.0.0:8080"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,hyper=warn"`.
    pub log_level: String,
    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    pub max_parallel_downloads: usize,
    pub call_timeout: Duration,
    pub request_deadline: Duration,
    pub scratch_dir: PathBuf,
    pub count_empty_results: bool,
}

impl Config {
    /// Build [`Config`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let archive_raw = env.required("ARCHIVE_CHANNEL_ID")?;
        let archive_channel_id = archive_raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: "ARCHIVE_CHANNEL_ID",
            value: archive_raw.clone(),
        })?;

        let port = env.or("PORT", "8080");
        let bind_address = env.or("TELESTORY_BIND", &format!("0.0.0.0:{port}"));

        Ok(Self {
            bot_token: env.required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: env.or("TELEGRAM_API_URL", "https://api.telegram.org"),
            api_key: env.required("TELESTORY_API_KEY")?,
            api_url: env.required("TELESTORY_API_URL")?,
            archive_channel_id,
            environment: Environment::parse_lenient(&env.or("APP_ENV", "development")),
            cooldown_secs: env.parse_opt("TELESTORY_COOLDOWN_SECS"),
            daily_limit: env.parse_opt("TELESTORY_DAILY_LIMIT"),
            database_url: env.or("TELESTORY_DATABASE_URL", "sqlite://telestory.db"),
            bind_address,
            log_level: env.or("TELESTORY_LOG", "info"),
            log_json: env.flag("TELESTORY_LOG_JSON", false),
            max_parallel_downloads: env.parse("TELESTORY_MAX_PARALLEL_DOWNLOADS", 4usize).max(1),
            call_timeout: Duration::from_secs(env.parse("TELESTORY_CALL_TIMEOUT_SECS", 30)),
            request_deadline: Duration::from_secs(env.parse("TELESTORY_REQUEST_DEADLINE_SECS", 300)),
            scratch_dir: env
                .get("TELESTORY_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            count_empty_results: env.flag("TELESTORY_COUNT_EMPTY_RESULTS", true),
        })
    }

    pub fn policy(&self) -> AdmissionPolicy {
        let preset = AdmissionPolicy::for_environment(self.environment);
        AdmissionPolicy {
            cooldown: self.cooldown_secs.map(Duration::from_secs).unwrap_or(preset.cooldown),
            daily_limit: self.daily_limit.unwrap_or(preset.daily_limit),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            policy: self.policy(),
            archive_channel_id: self.archive_channel_id,
            call_timeout: self.call_timeout,
            request_deadline: self.request_deadline,
            count_empty_results: self.count_empty_results,
        }
    }

    pub fn catalog(&self) -> CatalogConfig {
        CatalogConfig {
            endpoint: self.api_url.clone(),
            api_key: self.api_key.clone(),
            timeout: self.call_timeout,
        }
    }

    pub fn fetcher(&self) -> MediaFetcherConfig {
        MediaFetcherConfig {
            scratch_dir: self.scratch_dir.clone(),
            max_parallel: self.max_parallel_downloads,
            timeout: self.call_timeout,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Unset and blank values are treated alike.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.parse_opt(key).unwrap_or(default)
    }

    fn parse_opt<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

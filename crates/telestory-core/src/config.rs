//! Engine settings, resolved by the server from its environment and passed in
//! at construction.

use std::str::FromStr;
use std::time::Duration;

use strum::{AsRefStr, Display, EnumString};

use crate::admission::AdmissionPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse `APP_ENV`-style values; anything unrecognized is development.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "prod" => Environment::Production,
            other => Environment::from_str(other).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: AdmissionPolicy,
    /// Numeric id of the archive channel.
    pub archive_channel_id: i64,
    /// Upper bound for any single network call.
    pub call_timeout: Duration,
    /// Upper bound for a whole request, admission to ledger.
    pub request_deadline: Duration,
    /// Whether a lookup that found nothing still uses up quota.
    pub count_empty_results: bool,
}

impl EngineConfig {
    pub fn new(environment: Environment, archive_channel_id: i64) -> Self {
        Self {
            policy: AdmissionPolicy::for_environment(environment),
            archive_channel_id,
            call_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(300),
            count_empty_results: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(Environment::parse_lenient("production"), Environment::Production);
        assert_eq!(Environment::parse_lenient("Production"), Environment::Production);
        assert_eq!(Environment::parse_lenient("prod"), Environment::Production);
        assert_eq!(Environment::parse_lenient("staging"), Environment::Development);
        assert_eq!(Environment::parse_lenient(""), Environment::Development);
    }

    #[test]
    fn presets_follow_environment() {
        let cfg = EngineConfig::new(Environment::Production, -100);
        assert_eq!(cfg.policy.cooldown, Duration::from_secs(60));
        assert_eq!(cfg.policy.daily_limit, 3);
        assert!(cfg.count_empty_results);
    }
}

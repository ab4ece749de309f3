use std::str::FromStr;

use crate::digest::DigestSettings;
use crate::errors::ConfigError;
use crate::provider::{ProviderConfig, RetryPolicy};
use crate::redact;

/// How delivered digests are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMode {
    /// One line per event.
    Events,
    /// One grouped recap message per run.
    Recap,
}

impl FromStr for DigestMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" | "" => Ok(DigestMode::Events),
            "recap" | "daily" => Ok(DigestMode::Recap),
            other => Err(ConfigError::Invalid(format!("DIGEST_MODE={}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" | "" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid(format!("DIGEST_STORE={}", other))),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub store: StoreBackend,
    /// 64 hex chars. Mandatory for runs, checked when a run starts.
    pub encryption_key: Option<String>,
    /// Mandatory for runs, checked when a run starts.
    pub sink_url: Option<String>,
    pub concurrency: usize,
    pub lookback_hours: i64,
    pub warning_days: i64,
    pub mode: DigestMode,
    /// Periodic runs inside `serve`; off when unset.
    pub interval_minutes: Option<u64>,
    pub provider: ProviderConfig,
    pub source_label: String,
    pub json_logs: bool,
}

impl Config {
    pub fn digest_settings(&self) -> DigestSettings {
        DigestSettings {
            concurrency: self.concurrency.max(1),
            lookback: chrono::Duration::hours(self.lookback_hours),
            mode: self.mode,
            retry: RetryPolicy::default(),
            warning_days: self.warning_days,
        }
    }
}

// Hand-written so the key and sink URL never reach a log line.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("store", &self.store)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| redact::REDACTED))
            .field("sink_url", &self.sink_url.as_ref().map(|_| redact::REDACTED))
            .field("concurrency", &self.concurrency)
            .field("lookback_hours", &self.lookback_hours)
            .field("warning_days", &self.warning_days)
            .field("mode", &self.mode)
            .field("interval_minutes", &self.interval_minutes)
            .field("provider", &self.provider)
            .field("source_label", &self.source_label)
            .finish()
    }
}

pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    from_lookup(|name| std::env::var(name).ok())
}

/// Build a config from any variable source; `load` uses the process
/// environment.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let defaults = ProviderConfig::default();

    let encryption_key = var("DIGEST_ENCRYPTION_KEY");
    let sink_url = var("DIGEST_SINK_URL");
    let redis_url = var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into());
    for secret in encryption_key.iter().chain(sink_url.iter()) {
        redact::register_literal(secret);
    }
    if redis_url.contains('@') {
        redact::register_literal(&redis_url);
    }

    Ok(Config {
        port: parse_or(var("DIGEST_PORT"), "DIGEST_PORT", 8480)?,
        redis_url,
        store: var("DIGEST_STORE").unwrap_or_default().parse()?,
        encryption_key,
        sink_url,
        concurrency: parse_or(var("DIGEST_CONCURRENCY"), "DIGEST_CONCURRENCY", 3)?,
        lookback_hours: parse_or(var("DIGEST_LOOKBACK_HOURS"), "DIGEST_LOOKBACK_HOURS", 24)?,
        warning_days: parse_or(var("DIGEST_WARNING_DAYS"), "DIGEST_WARNING_DAYS", 3)?,
        mode: var("DIGEST_MODE").unwrap_or_default().parse()?,
        interval_minutes: var("DIGEST_INTERVAL_MINUTES")
            .map(|v| parse_or(Some(v), "DIGEST_INTERVAL_MINUTES", 0))
            .transpose()?
            .filter(|m| *m > 0),
        provider: ProviderConfig {
            api_base: var("PROVIDER_API_BASE").unwrap_or(defaults.api_base),
            token_header: var("PROVIDER_TOKEN_HEADER").unwrap_or(defaults.token_header),
            link_base: var("PROVIDER_LINK_BASE").unwrap_or(defaults.link_base),
        },
        source_label: var("DIGEST_SOURCE_LABEL").unwrap_or_else(|| "FIGMA".into()),
        json_logs: var("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
    })
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{}={}", name, v))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load_from(&[]).unwrap();
        assert_eq!(cfg.port, 8480);
        assert_eq!(cfg.store, StoreBackend::Redis);
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.lookback_hours, 24);
        assert_eq!(cfg.warning_days, 3);
        assert_eq!(cfg.mode, DigestMode::Events);
        assert!(cfg.interval_minutes.is_none());
        assert!(cfg.encryption_key.is_none());
        assert_eq!(cfg.provider.token_header, "X-Figma-Token");
        assert_eq!(cfg.source_label, "FIGMA");
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let cfg = load_from(&[
            ("DIGEST_MODE", "recap"),
            ("DIGEST_STORE", "memory"),
            ("DIGEST_CONCURRENCY", "5"),
            ("DIGEST_INTERVAL_MINUTES", "30"),
            ("DIGEST_SINK_URL", "   "),
            ("PROVIDER_API_BASE", "http://localhost:9000/v1"),
        ])
        .unwrap();
        assert_eq!(cfg.mode, DigestMode::Recap);
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.interval_minutes, Some(30));
        assert!(cfg.sink_url.is_none());
        assert_eq!(cfg.provider.api_base, "http://localhost:9000/v1");
        assert_eq!(cfg.digest_settings().concurrency, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            load_from(&[("DIGEST_PORT", "eighty")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_from(&[("DIGEST_MODE", "hourly")]),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let key = "ab".repeat(32);
        let cfg = load_from(&[
            ("DIGEST_SINK_URL", "https://hooks.example.com/services/T1/B2/abcdef123456"),
            ("DIGEST_ENCRYPTION_KEY", key.as_str()),
        ])
        .unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("abcdef123456"));
        assert!(!dbg.contains(&key));
    }
}

use anyhow::{Result, anyhow};
use config::{Config, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub http: Http,
    pub identity: Identity,
    pub record_store: RecordStore,
    pub credential_store: CredentialSettings,
    #[serde(default)]
    pub resilience: Resilience,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub aggregate_cache: AggregateCache,
    #[serde(default)]
    pub visits: Visits,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct Identity {
    pub backend: String, // "fake" or "real"
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Accounts the fake backend accepts.
    #[serde(default)]
    pub fake_accounts: Vec<FakeAccount>,
}

#[derive(Debug, Deserialize)]
pub struct FakeAccount {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordStore {
    pub backend: String, // "fake" or "real"
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialSettings {
    pub backend: String, // "memory" or "redis"
    #[serde(default)]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_token_store_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Resilience {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub token_ttl_secs: u64,
}

impl Default for Resilience {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_retries: 2,
            backoff_base_ms: 1_000,
            failure_threshold: 5,
            cooldown_secs: 30,
            token_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub check_interval_secs: u64,
    pub refresh_threshold_secs: u64,
    pub sign_in_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            refresh_threshold_secs: 300,
            sign_in_path: "/sign-in".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AggregateCache {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub public_page_size: u16,
}

impl Default for AggregateCache {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
            public_page_size: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Visits {
    pub initial_load_retry_delay_ms: u64,
    pub refocus_retry_delay_ms: u64,
}

impl Default for Visits {
    fn default() -> Self {
        Self {
            initial_load_retry_delay_ms: 1_000,
            refocus_retry_delay_ms: 500,
        }
    }
}

fn default_key_prefix() -> String {
    "bitebook".to_string()
}

fn default_token_store_ttl_secs() -> u64 {
    60 * 60
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

impl Settings {
    /// Rejects values the timers and the breaker cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("resilience.request_timeout_ms", self.resilience.request_timeout_ms),
            ("resilience.failure_threshold", self.resilience.failure_threshold as u64),
            ("resilience.cooldown_secs", self.resilience.cooldown_secs),
            ("resilience.token_ttl_secs", self.resilience.token_ttl_secs),
            ("session.check_interval_secs", self.session.check_interval_secs),
            ("aggregate_cache.ttl_secs", self.aggregate_cache.ttl_secs),
            ("aggregate_cache.sweep_interval_secs", self.aggregate_cache.sweep_interval_secs),
            ("aggregate_cache.public_page_size", self.aggregate_cache.public_page_size as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(anyhow!("{} must be greater than zero", key));
            }
        }
        Ok(())
    }
}

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

pub fn parse_settings_str(toml: &str) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [log]
        filter = "info"
        [http]
        address = "127.0.0.1:3030"
        [identity]
        backend = "fake"
        [record_store]
        backend = "fake"
        [credential_store]
        backend = "memory"
    "#;

    #[test]
    fn omitted_sections_take_the_documented_defaults() {
        let settings = parse_settings_str(MINIMAL).unwrap();
        assert_eq!(settings.resilience.failure_threshold, 5);
        assert_eq!(settings.resilience.cooldown_secs, 30);
        assert_eq!(settings.session.refresh_threshold_secs, 300);
        assert_eq!(settings.aggregate_cache.public_page_size, 10);
        assert_eq!(settings.visits.refocus_retry_delay_ms, 500);
        assert_eq!(settings.credential_store.key_prefix, "bitebook");
    }

    #[test]
    fn partial_sections_keep_the_other_defaults() {
        let toml = format!("{}\n[resilience]\nmax_retries = 4\n", MINIMAL);
        let settings = parse_settings_str(&toml).unwrap();
        assert_eq!(settings.resilience.max_retries, 4);
        assert_eq!(settings.resilience.request_timeout_ms, 10_000);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let toml = format!("{}\n[session]\ncheck_interval_secs = 0\n", MINIMAL);
        let err = parse_settings_str(&toml).unwrap_err();
        assert!(err.to_string().contains("session.check_interval_secs"));

        let toml = format!("{}\n[aggregate_cache]\nsweep_interval_secs = 0\n", MINIMAL);
        let err = parse_settings_str(&toml).unwrap_err();
        assert!(err.to_string().contains("aggregate_cache.sweep_interval_secs"));
    }
}

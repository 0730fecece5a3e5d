//! Configuration module for the elecfee application.
//!
//! Values come from `elecfee.toml` in the working directory (optional), then
//! from the process environment, with the environment taking precedence.
//! Duration fields accept humanized strings (`100ms`, `30s`, `1h`) or a bare
//! integer number of seconds.

use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};

use crate::portal::PortalSettings;

/// Optional config file read before the environment.
pub const CONFIG_FILE: &str = "elecfee.toml";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base level for this crate's logs (`RUST_LOG` overrides the whole filter).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port the web API listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root of the billing portal; `default.aspx` and `usedRecord.aspx` live under it.
    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,
    /// Location of the single-slot cache file.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// How long a cached scrape is served before scraping again.
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub cache_ttl: Duration,
    /// Politeness delay before each portal request.
    #[serde(
        default = "default_request_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub request_delay: Duration,
    /// Network timeout for each portal request.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    /// Attempts for idempotent portal page loads.
    #[serde(default = "default_entry_retries")]
    pub entry_retries: u32,
    /// Upper bound on a single API request, scrape included.
    #[serde(default = "default_api_timeout", deserialize_with = "deserialize_duration")]
    pub api_timeout: Duration,
    /// Grace period for in-flight requests on shutdown.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_portal_base_url() -> String {
    "https://electricfee.vip.cpolar.cn".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("electricity_data_single_room.json")
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_request_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_entry_retries() -> u32 {
    3
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

impl Config {
    /// Load from `elecfee.toml` (if present) and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            base_url: self.portal_base_url.clone(),
            request_delay: self.request_delay,
            request_timeout: self.request_timeout,
            entry_retries: self.entry_retries,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Parse a duration from a humanized string or an integer number of seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_all_time_units();
    let parsed = parser
        .parse(text.trim())
        .map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{text}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

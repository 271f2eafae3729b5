//! Process configuration, read once at startup.
//!
//! - `GOOGLE_MAPS_APIKEY` - routing provider credential (optional at startup)
//! - `CENTERS_PATH` - registry file (default: `EmergencyCenters.json`)
//! - `HOST` / `PORT` - bind address (default: `0.0.0.0:5000`)
//! - `PROVIDER_TIMEOUT_SECS` - timeout per provider call (default: 10)
//! - `DISTANCE_MATRIX_URL` - provider endpoint override
//! - `AGGREGATION_POLICY` - `all-or-nothing` (default) or `partial`

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::aggregate::FailurePolicy;
use crate::provider::DISTANCE_MATRIX_URL;

#[derive(Clone)]
pub struct Config {
    pub maps_api_key: Option<String>,
    pub centers_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub provider_timeout: Duration,
    pub distance_matrix_url: String,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maps_api_key: None,
            centers_path: PathBuf::from("EmergencyCenters.json"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            provider_timeout: Duration::from_secs(10),
            distance_matrix_url: DISTANCE_MATRIX_URL.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unparsable values
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let maps_api_key = lookup("GOOGLE_MAPS_APIKEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let failure_policy = match lookup("AGGREGATION_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default aggregation policy");
                defaults.failure_policy
            }),
            None => defaults.failure_policy,
        };

        Self {
            maps_api_key,
            centers_path: lookup("CENTERS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.centers_path),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            provider_timeout: lookup("PROVIDER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            distance_matrix_url: lookup("DISTANCE_MATRIX_URL")
                .unwrap_or(defaults.distance_matrix_url),
            failure_policy,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.maps_api_key.is_some()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Hand-written so the credential never reaches a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("maps_api_key", &self.maps_api_key.as_ref().map(|_| "<redacted>"))
            .field("centers_path", &self.centers_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("provider_timeout", &self.provider_timeout)
            .field("distance_matrix_url", &self.distance_matrix_url)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

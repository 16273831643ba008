//! Stop watcher configuration

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::IdfmError;

/// Where realtime API keys are issued
pub const PRIM_SIGNUP_URL: &str = "https://prim.iledefrance-mobilites.fr/";

/// Configuration for [`StopWatcher`](crate::StopWatcher) and its clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopWatcherConfig {
    /// Realtime (PRIM) API key, sent as the `apiKey` header
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Locale used to render relative departure times
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Return departures as absolute instants instead of relative phrases
    #[serde(default)]
    pub as_date: bool,

    /// Match the stop name exactly instead of running a free-text query
    #[serde(default)]
    pub exact_match: bool,

    /// Municipality the stop search is restricted to
    #[serde(default = "default_municipality_name")]
    pub municipality_name: String,

    /// Forwarded to the catalog search as `omitModeLimit` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit_mode_limit: Option<u32>,

    /// Base URL of the open-data catalog
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,

    /// Base URL of the realtime monitoring service
    #[serde(default = "default_monitoring_base_url")]
    pub monitoring_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Catalog page size (`rows`)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_locale() -> String {
    "fr".to_string()
}

fn default_municipality_name() -> String {
    "Paris".to_string()
}

fn default_catalog_base_url() -> String {
    "https://data.iledefrance-mobilites.fr".to_string()
}

fn default_monitoring_base_url() -> String {
    "https://prim.iledefrance-mobilites.fr".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_page_size() -> u32 {
    1000
}

impl StopWatcherConfig {
    /// Create a configuration with defaults for everything but the API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            locale: default_locale(),
            as_date: false,
            exact_match: false,
            municipality_name: default_municipality_name(),
            omit_mode_limit: None,
            catalog_base_url: default_catalog_base_url(),
            monitoring_base_url: default_monitoring_base_url(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }

    /// Create a configuration suitable for testing against mock servers
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            catalog_base_url: base_url.to_string(),
            monitoring_base_url: base_url.to_string(),
            timeout_secs: 5,
            ..Self::new("test-api-key")
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`IdfmError::Configuration`] if the configuration is unusable.
    pub fn validate(&self) -> Result<(), IdfmError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(IdfmError::Configuration(format!(
                "api_key is mandatory, generate one by signing up at {PRIM_SIGNUP_URL}"
            )));
        }

        if self.catalog_base_url.is_empty() || self.monitoring_base_url.is_empty() {
            return Err(IdfmError::Configuration(
                "base URLs must not be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(IdfmError::Configuration(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(IdfmError::Configuration(
                "page_size must be greater than 0".to_string(),
            ));
        }

        if self.locale.trim().is_empty() {
            return Err(IdfmError::Configuration(
                "locale must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

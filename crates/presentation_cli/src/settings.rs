//! Configuration loading for the CLI
//!
//! Layers, lowest precedence first: built-in defaults, `stopwatcher.toml`
//! (or the file given with `--config`), `STOPWATCHER_*` environment
//! variables, command-line flags.

use std::path::Path;

use integration_idfm::StopWatcherConfig;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "stopwatcher";

/// Environment variable prefix (e.g. `STOPWATCHER_LOCALE`)
pub const ENV_PREFIX: &str = "STOPWATCHER";

/// Load file and environment layers
///
/// A missing API key is not an error here; it may still come from the
/// command line and is checked when the watcher is built.
pub fn load(path: Option<&Path>) -> Result<StopWatcherConfig, config::ConfigError> {
    let file = path.map_or_else(
        || config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        |path| config::File::from(path).required(true),
    );

    config::Config::builder()
        .set_default("api_key", "")?
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?
        .try_deserialize()
}

/// Command-line values that take precedence over file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub locale: Option<String>,
    pub municipality: Option<String>,
    pub exact: bool,
    pub as_date: bool,
}

impl Overrides {
    /// Apply the flags that were given
    pub fn apply(self, mut config: StopWatcherConfig) -> StopWatcherConfig {
        if let Some(api_key) = self.api_key.filter(|k| !k.is_empty()) {
            config.api_key = api_key.into();
        }
        if let Some(locale) = self.locale {
            config.locale = locale;
        }
        if let Some(municipality) = self.municipality {
            config.municipality_name = municipality;
        }
        config.exact_match |= self.exact;
        config.as_date |= self.as_date;
        config
    }
}

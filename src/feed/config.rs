use {
    super::{
        services,
        state,
    },
    anyhow::Result,
    config as config_rs,
    config_rs::{
        Environment,
        File,
    },
    serde::Deserialize,
    std::path::Path,
};

/// Configuration for all components of the feed.
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub state:         state::Config,
    /// Opt-in orphan reaping. Absent means abandoned active batches are left
    /// alone, which is the default behavior.
    pub orphan_reaper: Option<services::reaper::Config>,
}

impl Config {
    pub fn new(config_file: impl AsRef<Path>) -> Result<Self> {
        // Build a new configuration object, allowing the default values to
        // be overridden by those in the config_file or "PRICEFEED_"-prefixed
        // environment variables.
        config_rs::Config::builder()
            .add_source(File::from(config_file.as_ref()))
            .add_source(Environment::with_prefix("pricefeed"))
            .build()?
            .try_deserialize()
            .map_err(|e| e.into())
    }
}

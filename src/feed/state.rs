use {
    super::metrics::PROMETHEUS_REGISTRY,
    serde::{
        Deserialize,
        Serialize,
    },
};

pub mod batch;
pub mod prices;
pub mod record;

pub use prices::Prices;

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// Keep completed and cancelled batches registered so repeated lifecycle
    /// calls report the terminal state instead of an unknown batch. Disable
    /// to evict batches at their terminal transition.
    pub retain_terminal_batches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retain_terminal_batches: true,
        }
    }
}

/// State contains all relevant shared application state.
pub struct State {
    /// Store for the batch lifecycle and the latest-price table.
    prices: prices::Store,
}

impl State {
    pub async fn new(config: Config) -> Self {
        let registry = &mut *PROMETHEUS_REGISTRY.lock().await;
        State {
            prices: prices::Store::new(config, registry),
        }
    }

    #[cfg(test)]
    pub async fn new_tests(config: Config) -> Self {
        let registry = &mut *PROMETHEUS_REGISTRY.lock().await;
        State {
            prices: prices::Store::new(config, registry),
        }
    }
}

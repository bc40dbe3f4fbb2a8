//! Orphan batch reaper
//!
//! A producer that crashes mid-batch leaves an active batch nobody will ever
//! complete or cancel. When enabled, the reaper sweeps on an interval and
//! cancels active batches that have outlived the configured age. Never
//! spawned unless configured.

use {
    crate::feed::state::Prices,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        sync::Arc,
        time::Duration,
    },
    tracing::instrument,
};

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Config {
    /// Interval between sweeps.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Active batches older than this are cancelled.
    #[serde(with = "humantime_serde")]
    pub max_batch_age: Duration,
}

#[instrument(skip(state))]
pub async fn reaper<S>(config: Config, state: Arc<S>)
where
    S: Prices,
{
    let mut interval = tokio::time::interval(config.poll_interval);
    let mut exit = crate::feed::EXIT.subscribe();
    loop {
        tokio::select! {
            _ = exit.changed() => {
                tracing::info!("Shutdown signal received.");
                return;
            }
            _ = interval.tick() => {
                let cancelled = state.cancel_expired_batches(config.max_batch_age).await;
                if !cancelled.is_empty() {
                    tracing::info!(count = cancelled.len(), "Reaper cancelled orphan batches.");
                }
            }
        }
    }
}

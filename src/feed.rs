/* ############################### System Architecture ###############################

            start_batch / upload_price(s)                  get_latest_price(s)
            complete_batch / cancel_batch                  get_all_latest_prices
 +-----------+        |                                          |        +-----------+
 | Producers |--------+             +--------------+             +--------| Consumers |
 +-----------+        +------------>|              |<------------+        +-----------+
                                    | Price Store  |
                                    |              |
                  +---------------->+--------------+<----------------+
                  |                  |           |                   |
           +-------------+   staged batches   latest table   +--------------+
           |   Reaper    |   (per-batch        (committed    |   Metrics    |
           | (optional)  |    concurrent       prices only)  |  (registry)  |
           +-------------+    staging maps)                  +--------------+

Write path:
- A producer opens a batch and uploads prices into it. Staged prices live in a
  per-batch concurrent map and are invisible to every consumer.
- Completing the batch merges its staged prices into the latest-price table in
  one exclusive critical section; all of them become visible at once. Merging
  keeps whichever price carries the strictly later as-of time. Cancelling
  discards the staged map without touching the table.

Read path:
- Consumers query the latest table under the shared side of the coordinator
  lock. They observe either none or all of a batch's committed prices, never a
  half-committed batch.

The optional reaper cancels abandoned active batches on an interval. Metrics
for every transition are registered against the shared Prometheus registry.

#################################################################################### */
use {
    config::Config,
    lazy_static::lazy_static,
    std::sync::Arc,
    tokio::{
        sync::watch,
        task::JoinHandle,
    },
};

pub mod config;
pub mod error;
pub mod metrics;
pub mod services;
pub mod state;

lazy_static! {
    /// A static exit flag to indicate to running threads that we're shutting
    /// down. This is used to gracefully shut down background services.
    ///
    /// We make this global based on the fact that:
    /// - The `Sender` side does not rely on any async runtime.
    /// - Exit logic doesn't really require carefully threading this value
    ///   through the app.
    /// - The `Receiver` side of a watch channel performs the detection based
    ///   on if the change happened after the subscribe, so it means all
    ///   listeners should always be notified correctly.
    pub static ref EXIT: watch::Sender<bool> = watch::channel(false).0;
}

/// Owns the feed's configuration and lifecycle: builds the shared state and
/// spawns whatever background services the configuration asks for.
pub struct Service {
    config: Config,
}

impl Service {
    pub fn new(config: Config) -> Self {
        Service { config }
    }

    /// Builds the application state and spawns the configured background
    /// services. The returned state handle is the entire API surface; the
    /// join handles resolve once `EXIT` fires.
    pub async fn spawn(&self) -> (Arc<state::State>, Vec<JoinHandle<()>>) {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            "Starting {}.",
            env!("CARGO_PKG_NAME"),
        );

        let state = Arc::new(state::State::new(self.config.state.clone()).await);

        let mut jhs = vec![];
        if let Some(reaper_config) = &self.config.orphan_reaper {
            jhs.push(tokio::spawn(services::reaper(
                reaper_config.clone(),
                state.clone(),
            )));
        }

        (state, jhs)
    }
}

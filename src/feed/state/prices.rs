// The price store is the coordinator for the whole feed: it owns the set of
// known batches and the latest-price table, and it is the only component
// that moves data between them.
//
// Concurrency discipline: both maps sit behind one reader-writer lock.
// Lifecycle transitions (start/complete/cancel/reset) take the exclusive
// side; uploads and queries take the shared side. Staging from many
// producers under the shared lock is safe because each batch's staged map is
// concurrent and the latest-as-of-wins update is a single atomic entry
// operation. A commit therefore runs against a quiescent batch set and is
// published to readers as one event.
use {
    super::{
        super::{
            error::{
                FeedError,
                Result,
            },
            metrics::PriceFeedMetrics,
        },
        batch::{
            Batch,
            BatchId,
            BatchState,
        },
        record::{
            InstrumentId,
            PriceRecord,
        },
        Config,
        State,
    },
    prometheus_client::registry::Registry,
    std::{
        collections::{
            hash_map,
            HashMap,
        },
        time::Duration,
    },
    tokio::sync::RwLock,
};

#[derive(Default)]
struct Shared {
    /// Every batch the service knows about, keyed by its issued id.
    batches: HashMap<BatchId, Batch>,
    /// Latest committed price per instrument. Only ever written during a
    /// commit, under the exclusive lock.
    latest:  HashMap<InstrumentId, PriceRecord>,
}

pub struct Store {
    shared:                  RwLock<Shared>,
    metrics:                 PriceFeedMetrics,
    retain_terminal_batches: bool,
}

impl Store {
    pub fn new(config: Config, registry: &mut Registry) -> Self {
        Store {
            shared:                  Default::default(),
            metrics:                 PriceFeedMetrics::new(registry),
            retain_terminal_batches: config.retain_terminal_batches,
        }
    }
}

/// The feed's public operation set.
#[async_trait::async_trait]
pub trait Prices {
    /// Opens a new batch and returns its handle. Arbitrarily many batches
    /// may be open at once.
    async fn start_batch(&self) -> Result<BatchId>;

    /// Stages one price into an active batch. Within the batch the staged
    /// price for an instrument is the one with the latest as-of; ties keep
    /// the record staged first.
    async fn upload_price(&self, batch_id: &BatchId, price: PriceRecord) -> Result<()>;

    /// Stages prices in order, stopping at the first failure. Not atomic
    /// across the list: prices staged before the failure stay staged, and
    /// recovery is cancelling the batch and starting over.
    async fn upload_prices(&self, batch_id: &BatchId, prices: Vec<PriceRecord>) -> Result<()>;

    /// Atomically publishes a batch: merges its staged prices into the
    /// latest-price table (strictly-later as-of wins, ties keep the table's
    /// entry) and transitions the batch to completed. Readers see either
    /// none or all of the batch's effects.
    async fn complete_batch(&self, batch_id: &BatchId) -> Result<()>;

    /// Discards a batch's staged prices without touching the latest-price
    /// table.
    async fn cancel_batch(&self, batch_id: &BatchId) -> Result<()>;

    /// Cancels every active batch older than `max_age` and reports the
    /// cancelled ids. Only invoked by the opt-in orphan reaper.
    async fn cancel_expired_batches(&self, max_age: Duration) -> Vec<BatchId>;

    /// Latest committed price for an instrument, if any. The empty string
    /// names no instrument and yields `None`.
    async fn get_latest_price(&self, instrument_id: &str) -> Option<PriceRecord>;

    /// Latest committed prices for the requested instruments. Empty ids are
    /// skipped and absent instruments are omitted; the returned map is a
    /// snapshot decoupled from the feed.
    async fn get_latest_prices(
        &self,
        instrument_ids: &[String],
    ) -> HashMap<InstrumentId, PriceRecord>;

    /// Snapshot of the entire latest-price table.
    async fn get_all_latest_prices(&self) -> HashMap<InstrumentId, PriceRecord>;

    /// Drops all batches and the latest-price table. Testing only.
    async fn reset(&self);
}

// Allow downcasting State into Store for functions that depend on the
// `Prices` service.
impl<'a> From<&'a State> for &'a Store {
    fn from(state: &'a State) -> &'a Store {
        &state.prices
    }
}

#[async_trait::async_trait]
impl<T> Prices for T
where
    for<'a> &'a T: Into<&'a Store>,
    T: Sync,
{
    async fn start_batch(&self) -> Result<BatchId> {
        let store: &Store = self.into();
        let mut shared = store.shared.write().await;

        let batch_id = BatchId::generate();

        // The generator makes collisions practically impossible; reject one
        // anyway rather than silently merging two producers' batches.
        if shared.batches.contains_key(&batch_id) {
            return Err(FeedError::illegal_state(format!(
                "batch id collision on {batch_id}"
            )));
        }

        shared
            .batches
            .insert(batch_id.clone(), Batch::new(batch_id.clone()));
        store.metrics.batch_started();

        tracing::debug!(batch = %batch_id, "Started batch.");
        Ok(batch_id)
    }

    async fn upload_price(&self, batch_id: &BatchId, price: PriceRecord) -> Result<()> {
        let store: &Store = self.into();
        let shared = store.shared.read().await;

        let batch = shared.batches.get(batch_id).ok_or_else(|| {
            FeedError::illegal_state(format!(
                "batch {batch_id} does not exist; call start_batch first"
            ))
        })?;

        tracing::debug!(
            batch = %batch_id,
            instrument = %price.instrument_id(),
            as_of = %price.as_of(),
            "Staging price."
        );

        batch.stage(price)?;
        store.metrics.price_staged();
        Ok(())
    }

    async fn upload_prices(&self, batch_id: &BatchId, prices: Vec<PriceRecord>) -> Result<()> {
        for price in prices {
            self.upload_price(batch_id, price).await?;
        }
        Ok(())
    }

    async fn complete_batch(&self, batch_id: &BatchId) -> Result<()> {
        let store: &Store = self.into();
        let shared = &mut *store.shared.write().await;

        let staged = {
            let batch = shared.batches.get_mut(batch_id).ok_or_else(|| {
                FeedError::illegal_state(format!("batch {batch_id} does not exist"))
            })?;

            if batch.state() != BatchState::Active {
                return Err(FeedError::illegal_state(format!(
                    "batch {} is not active (state: {})",
                    batch_id,
                    batch.state()
                )));
            }

            // Validate-and-snapshot before any mutation so a broken staging
            // invariant surfaces as an error with nothing committed.
            let staged = batch.drain()?;
            batch.mark_completed()?;
            staged
        };

        let staged_count = staged.len();
        let mut committed = 0;
        for (instrument_id, record) in staged {
            match shared.latest.entry(instrument_id) {
                hash_map::Entry::Occupied(mut slot) => {
                    if record.is_after(slot.get()) {
                        slot.insert(record);
                        committed += 1;
                    }
                }
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(record);
                    committed += 1;
                }
            }
        }

        if !store.retain_terminal_batches {
            shared.batches.remove(batch_id);
        }

        store.metrics.batch_completed(committed);
        store.metrics.table_size(shared.latest.len());

        tracing::info!(
            batch = %batch_id,
            staged = staged_count,
            committed,
            "Committed batch."
        );
        Ok(())
    }

    async fn cancel_batch(&self, batch_id: &BatchId) -> Result<()> {
        let store: &Store = self.into();
        let mut shared = store.shared.write().await;

        let batch = shared
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| FeedError::illegal_state(format!("batch {batch_id} does not exist")))?;

        batch.mark_cancelled()?;

        if !store.retain_terminal_batches {
            shared.batches.remove(batch_id);
        }

        store.metrics.batch_cancelled();
        tracing::info!(batch = %batch_id, "Cancelled batch.");
        Ok(())
    }

    async fn cancel_expired_batches(&self, max_age: Duration) -> Vec<BatchId> {
        let store: &Store = self.into();
        let mut shared = store.shared.write().await;

        let expired: Vec<BatchId> = shared
            .batches
            .values()
            .filter(|batch| batch.state() == BatchState::Active && batch.age() > max_age)
            .map(|batch| batch.id().clone())
            .collect();

        for batch_id in &expired {
            if let Some(batch) = shared.batches.get_mut(batch_id) {
                // Filtered to active under this same lock, so this cannot
                // fail; stay quiet if it somehow does.
                if batch.mark_cancelled().is_ok() {
                    store.metrics.batch_cancelled();
                }
            }
            if !store.retain_terminal_batches {
                shared.batches.remove(batch_id);
            }
        }

        expired
    }

    async fn get_latest_price(&self, instrument_id: &str) -> Option<PriceRecord> {
        if instrument_id.is_empty() {
            return None;
        }
        let store: &Store = self.into();
        store.shared.read().await.latest.get(instrument_id).cloned()
    }

    async fn get_latest_prices(
        &self,
        instrument_ids: &[String],
    ) -> HashMap<InstrumentId, PriceRecord> {
        let store: &Store = self.into();
        let shared = store.shared.read().await;

        let mut result = HashMap::new();
        for instrument_id in instrument_ids {
            if instrument_id.is_empty() {
                continue;
            }
            if let Some(record) = shared.latest.get(instrument_id.as_str()) {
                result.insert(record.instrument_id().clone(), record.clone());
            }
        }
        result
    }

    async fn get_all_latest_prices(&self) -> HashMap<InstrumentId, PriceRecord> {
        let store: &Store = self.into();
        store.shared.read().await.latest.clone()
    }

    async fn reset(&self) {
        let store: &Store = self.into();
        let mut shared = store.shared.write().await;

        shared.batches.clear();
        shared.latest.clear();
        store.metrics.reset_occupancy();

        tracing::info!("Reset feed state.");
    }
}

// A batch is the private staging area a producer uploads into. Nothing in a
// batch is visible to readers until the coordinator commits it; the staged
// map is concurrent so parallel producers can upload into the same batch
// while the coordinator lock is held in shared mode.
use {
    super::{
        super::error::{
            FeedError,
            Result,
        },
        record::{
            InstrumentId,
            PriceRecord,
        },
    },
    dashmap::{
        mapref::entry::Entry,
        DashMap,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fmt,
        time::Instant,
    },
    uuid::Uuid,
};

/// Handle for a batch, issued by `start_batch`. Equality is string equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FeedError::invalid_argument("batch id must not be empty"));
        }
        Ok(BatchId(id))
    }

    /// Fresh random identifier. 128 bits of randomness makes collisions
    /// practically impossible; the coordinator still checks.
    pub(crate) fn generate() -> Self {
        BatchId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    /// Open and accepting prices.
    Active,
    /// Committed; its prices are visible.
    Completed,
    /// Discarded; its prices were never visible.
    Cancelled,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Active => write!(f, "active"),
            BatchState::Completed => write!(f, "completed"),
            BatchState::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub(crate) struct Batch {
    id:         BatchId,
    staged:     DashMap<InstrumentId, PriceRecord>,
    state:      BatchState,
    created_at: Instant,
}

impl Batch {
    pub fn new(id: BatchId) -> Self {
        Batch {
            id,
            staged: DashMap::new(),
            state: BatchState::Active,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Stages a price under the latest-as-of-wins rule: a new record replaces
    /// the staged one only if its as-of is strictly later; on a tie the
    /// incumbent stays. The entry guard holds the shard lock across the
    /// check-and-replace, so concurrent uploads for one instrument serialize
    /// into a single atomic read-modify-write.
    pub fn stage(&self, price: PriceRecord) -> Result<()> {
        if self.state != BatchState::Active {
            return Err(FeedError::illegal_state(format!(
                "batch {} is not active (state: {})",
                self.id, self.state
            )));
        }

        match self.staged.entry(price.instrument_id().clone()) {
            Entry::Occupied(mut slot) => {
                if price.is_after(slot.get()) {
                    slot.insert(price);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(price);
            }
        }

        Ok(())
    }

    /// Active -> Completed. Any other starting state is an error.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition_to(BatchState::Completed)
    }

    /// Active -> Cancelled. Staged data is dropped here and never read again.
    pub fn mark_cancelled(&mut self) -> Result<()> {
        self.transition_to(BatchState::Cancelled)?;
        self.staged.clear();
        Ok(())
    }

    fn transition_to(&mut self, terminal: BatchState) -> Result<()> {
        if self.state != BatchState::Active {
            return Err(FeedError::illegal_state(format!(
                "batch {} is not active (state: {})",
                self.id, self.state
            )));
        }
        self.state = terminal;
        Ok(())
    }

    /// Snapshot of the staged map for commit, clearing it on success. Every
    /// entry is checked against its key first; a mismatch means the staging
    /// invariant broke and the batch is left untouched.
    pub fn drain(&mut self) -> Result<Vec<(InstrumentId, PriceRecord)>> {
        let mut snapshot = Vec::with_capacity(self.staged.len());
        for entry in self.staged.iter() {
            if entry.key() != entry.value().instrument_id() {
                return Err(FeedError::internal(format!(
                    "staged entry {} holds a record for {}",
                    entry.key(),
                    entry.value().instrument_id()
                )));
            }
            snapshot.push((entry.key().clone(), entry.value().clone()));
        }
        self.staged.clear();
        Ok(snapshot)
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{
            super::record::PricePayload,
            *,
        },
        chrono::{
            DateTime,
            TimeZone,
            Utc,
        },
    };

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(instrument: &str, secs: i64) -> PriceRecord {
        PriceRecord::new(instrument, ts(secs), PricePayload::new()).unwrap()
    }

    fn active_batch() -> Batch {
        Batch::new(BatchId::generate())
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(BatchId::generate(), BatchId::generate());
    }

    #[test]
    fn test_empty_batch_id_rejected() {
        assert!(matches!(
            BatchId::new("").unwrap_err(),
            FeedError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_new_batch_is_active() {
        assert_eq!(active_batch().state(), BatchState::Active);
    }

    #[test]
    fn test_stage_keeps_latest_as_of() {
        let batch = active_batch();
        batch.stage(record("EURUSD", 10)).unwrap();
        batch.stage(record("EURUSD", 20)).unwrap();
        batch.stage(record("EURUSD", 15)).unwrap();

        let mut batch = batch;
        let staged = batch.drain().unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].1.as_of(), ts(20));
    }

    #[test]
    fn test_stage_tie_retains_incumbent() {
        let batch = active_batch();
        let incumbent = PriceRecord::new(
            "EURUSD",
            ts(10),
            [("seq".to_string(), serde_json::json!(1))]
                .into_iter()
                .collect(),
        )
        .unwrap();
        let challenger = PriceRecord::new(
            "EURUSD",
            ts(10),
            [("seq".to_string(), serde_json::json!(2))]
                .into_iter()
                .collect(),
        )
        .unwrap();

        batch.stage(incumbent.clone()).unwrap();
        batch.stage(challenger).unwrap();

        let mut batch = batch;
        let staged = batch.drain().unwrap();
        assert_eq!(staged[0].1, incumbent);
    }

    #[test]
    fn test_terminal_transitions_are_final() {
        let mut completed = active_batch();
        completed.mark_completed().unwrap();
        assert!(completed.mark_completed().is_err());
        assert!(completed.mark_cancelled().is_err());
        assert!(completed.stage(record("EURUSD", 10)).is_err());

        let mut cancelled = active_batch();
        cancelled.mark_cancelled().unwrap();
        assert!(cancelled.mark_completed().is_err());
        assert!(cancelled.mark_cancelled().is_err());
        assert!(cancelled.stage(record("EURUSD", 10)).is_err());
    }

    #[test]
    fn test_cancel_discards_staged_data() {
        let mut batch = active_batch();
        batch.stage(record("EURUSD", 10)).unwrap();
        batch.stage(record("XAUUSD", 10)).unwrap();
        batch.mark_cancelled().unwrap();
        assert_eq!(batch.staged_len(), 0);
    }

    #[test]
    fn test_drain_empties_the_staged_map() {
        let mut batch = active_batch();
        batch.stage(record("EURUSD", 10)).unwrap();
        let staged = batch.drain().unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(batch.staged_len(), 0);
    }
}

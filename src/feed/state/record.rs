// A price record is the immutable carrier for one observation: which
// instrument, the as-of time the observation is effective, and an opaque
// payload the feed stores but never inspects.
use {
    super::super::error::{
        FeedError,
        Result,
    },
    chrono::{
        DateTime,
        Utc,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        borrow::Borrow,
        collections::BTreeMap,
        fmt,
        hash::{
            Hash,
            Hasher,
        },
    },
};

/// Identifies an instrument. Non-empty; equality is byte-identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FeedError::invalid_argument(
                "instrument id must not be empty",
            ));
        }
        Ok(InstrumentId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Lets the latest table be probed with a bare &str.
impl Borrow<str> for InstrumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Opaque attribute dictionary attached to a price. The feed treats it as a
/// value; schema is the producer's business.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricePayload(BTreeMap<String, serde_json::Value>);

impl PricePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for PricePayload {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        PricePayload(iter.into_iter().collect())
    }
}

/// One price observation. Fields are set at construction and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    instrument_id: InstrumentId,
    as_of:         DateTime<Utc>,
    payload:       PricePayload,
}

impl PriceRecord {
    /// Builds a record, rejecting an empty instrument id.
    pub fn new(
        instrument_id: impl Into<String>,
        as_of: DateTime<Utc>,
        payload: PricePayload,
    ) -> Result<Self> {
        Ok(PriceRecord {
            instrument_id: InstrumentId::new(instrument_id)?,
            as_of,
            payload,
        })
    }

    pub fn from_parts(
        instrument_id: InstrumentId,
        as_of: DateTime<Utc>,
        payload: PricePayload,
    ) -> Self {
        PriceRecord {
            instrument_id,
            as_of,
            payload,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn payload(&self) -> &PricePayload {
        &self.payload
    }

    /// Strict recency comparison; equal timestamps are not "after".
    pub fn is_after(&self, other: &PriceRecord) -> bool {
        self.as_of > other.as_of
    }
}

// The payload holds arbitrary JSON and is not hashable; hashing covers the
// observable fields. Records that compare equal share those fields, so the
// Eq/Hash contract is preserved.
impl Hash for PriceRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instrument_id.hash(state);
        self.as_of.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone,
        serde_json::json,
    };

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_empty_instrument_id_rejected() {
        let err = PriceRecord::new("", ts(10), PricePayload::new()).unwrap_err();
        assert!(matches!(err, FeedError::InvalidArgument { .. }));
    }

    #[test]
    fn test_is_after_is_strict() {
        let older = PriceRecord::new("EURUSD", ts(10), PricePayload::new()).unwrap();
        let newer = PriceRecord::new("EURUSD", ts(20), PricePayload::new()).unwrap();
        let tied = PriceRecord::new("EURUSD", ts(10), PricePayload::new()).unwrap();

        assert!(newer.is_after(&older));
        assert!(!older.is_after(&newer));
        assert!(!tied.is_after(&older));
    }

    #[test]
    fn test_equality_is_value_wise() {
        let payload: PricePayload = [("bid".to_string(), json!(101.25))].into_iter().collect();

        let a = PriceRecord::new("EURUSD", ts(10), payload.clone()).unwrap();
        let b = PriceRecord::new("EURUSD", ts(10), payload).unwrap();
        let c = PriceRecord::new("EURUSD", ts(10), PricePayload::new()).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_payload_is_opaque_to_the_feed() {
        let mut payload = PricePayload::new();
        payload.insert("mid", json!({"value": 99.5, "source": "composite"}));

        let record = PriceRecord::new("XAUUSD", ts(30), payload).unwrap();
        assert_eq!(
            record.payload().get("mid").and_then(|v| v.get("source")),
            Some(&json!("composite"))
        );
    }
}

//! In-memory batched latest-price service.
//!
//! Producers stage prices into isolated batches; completing a batch makes
//! all of its prices visible to readers at once, and cancelling discards
//! them. Readers query the latest committed price per instrument. The
//! operation set lives on the [`feed::state::Prices`] trait, implemented by
//! [`feed::state::State`].

pub mod feed;
pub mod simulator;

pub use feed::{
    error::FeedError,
    state::{
        batch::{
            BatchId,
            BatchState,
        },
        record::{
            InstrumentId,
            PricePayload,
            PriceRecord,
        },
        Prices,
        State,
    },
};

//! In-process Prometheus metrics for the feed. Every lifecycle transition
//! and staging call is reflected here; embedders expose the shared registry
//! however they see fit.
use {
    lazy_static::lazy_static,
    prometheus_client::{
        metrics::{
            counter::Counter,
            gauge::Gauge,
        },
        registry::Registry,
    },
    tokio::sync::Mutex,
};

lazy_static! {
    /// Registry the feed's metrics are registered against. Shared so an
    /// embedding process can scrape one registry for all of its feeds.
    pub static ref PROMETHEUS_REGISTRY: Mutex<Registry> = Mutex::new(<Registry>::default());
}

pub struct PriceFeedMetrics {
    batches_started:   Counter,
    batches_completed: Counter,
    batches_cancelled: Counter,
    prices_staged:     Counter,
    prices_committed:  Counter,
    active_batches:    Gauge,
    latest_prices:     Gauge,
}

impl PriceFeedMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = PriceFeedMetrics {
            batches_started:   Counter::default(),
            batches_completed: Counter::default(),
            batches_cancelled: Counter::default(),
            prices_staged:     Counter::default(),
            prices_committed:  Counter::default(),
            active_batches:    Gauge::default(),
            latest_prices:     Gauge::default(),
        };

        registry.register(
            "pricefeed_batches_started",
            "Batches opened by start_batch",
            metrics.batches_started.clone(),
        );
        registry.register(
            "pricefeed_batches_completed",
            "Batches committed to the latest-price table",
            metrics.batches_completed.clone(),
        );
        registry.register(
            "pricefeed_batches_cancelled",
            "Batches discarded without commit",
            metrics.batches_cancelled.clone(),
        );
        registry.register(
            "pricefeed_prices_staged",
            "Price records accepted into a staging area",
            metrics.prices_staged.clone(),
        );
        registry.register(
            "pricefeed_prices_committed",
            "Price records merged into the latest-price table",
            metrics.prices_committed.clone(),
        );
        registry.register(
            "pricefeed_active_batches",
            "Batches currently open",
            metrics.active_batches.clone(),
        );
        registry.register(
            "pricefeed_latest_prices",
            "Instruments present in the latest-price table",
            metrics.latest_prices.clone(),
        );

        metrics
    }

    pub fn batch_started(&self) {
        self.batches_started.inc();
        self.active_batches.inc();
    }

    pub fn batch_completed(&self, committed: usize) {
        self.batches_completed.inc();
        self.active_batches.dec();
        self.prices_committed.inc_by(committed as u64);
    }

    pub fn batch_cancelled(&self) {
        self.batches_cancelled.inc();
        self.active_batches.dec();
    }

    pub fn price_staged(&self) {
        self.prices_staged.inc();
    }

    pub fn table_size(&self, instruments: usize) {
        self.latest_prices.set(instruments as i64);
    }

    pub fn reset_occupancy(&self) {
        self.active_batches.set(0);
        self.latest_prices.set(0);
    }
}

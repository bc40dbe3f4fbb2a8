//! Simulated producer/consumer fleet for exercising the feed end to end:
//! producers run full batch round trips with randomized prices while
//! consumers poll the latest table, all against one shared state.

use {
    crate::feed::state::{
        record::{
            PricePayload,
            PriceRecord,
        },
        Prices,
        State,
    },
    anyhow::Result,
    chrono::Utc,
    futures_util::future::join_all,
    rand::{
        rngs::OsRng,
        Rng,
    },
    std::sync::Arc,
    tokio::task::JoinHandle,
};

pub struct Config {
    pub producer_count:         usize,
    pub consumer_count:         usize,
    pub instrument_count:       usize,
    pub batches_per_producer:   usize,
    pub prices_per_batch:       usize,
    /// Every nth batch is cancelled instead of completed. Zero disables
    /// cancellation.
    pub cancel_every:           usize,
    pub consumer_poll_interval: tokio::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            producer_count:         4,
            consumer_count:         2,
            instrument_count:       25,
            batches_per_producer:   10,
            prices_per_batch:       50,
            cancel_every:           5,
            consumer_poll_interval: tokio::time::Duration::from_millis(25),
        }
    }
}

pub struct Simulator {
    config: Config,
}

impl Simulator {
    pub fn new() -> Self {
        Simulator {
            config: Default::default(),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Simulator { config }
    }

    pub async fn run(&self, state: Arc<State>) -> Result<()> {
        let instruments = self.generate_instrument_ids();

        // Consumers first so they observe the table filling up.
        let consumer_jhs = self.spawn_consumers(state.clone(), instruments.clone());
        let producer_jhs = self.spawn_producers(state.clone(), instruments);

        for result in Simulator::join_tasks(producer_jhs).await? {
            if let Some(err) = result.err() {
                tracing::error!(err = %err, "Producer failed.");
            }
        }

        // Producers are done; release the consumers and any background
        // services subscribed to the exit flag.
        let _ = crate::feed::EXIT.send(true);
        join_all(consumer_jhs)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let table = state.get_all_latest_prices().await;
        tracing::info!(instruments = table.len(), "Simulation finished.");
        Ok(())
    }

    fn generate_instrument_ids(&self) -> Vec<String> {
        (0..self.config.instrument_count)
            .map(|i| format!("SIM-{i:04}"))
            .collect()
    }

    fn spawn_producers(
        &self,
        state: Arc<State>,
        instruments: Vec<String>,
    ) -> Vec<JoinHandle<Result<()>>> {
        let mut producer_jhs = Vec::new();

        for producer in 0..self.config.producer_count {
            let state = state.clone();
            let instruments = instruments.clone();
            let batches = self.config.batches_per_producer;
            let prices = self.config.prices_per_batch;
            let cancel_every = self.config.cancel_every;

            producer_jhs.push(tokio::spawn(async move {
                for round in 0..batches {
                    let batch_id = state.start_batch().await?;

                    for _ in 0..prices {
                        let instrument =
                            instruments[OsRng.gen_range(0..instruments.len())].clone();
                        let payload: PricePayload = [
                            (
                                "price".to_string(),
                                serde_json::json!(OsRng.gen_range(100..1_000_000) as f64 / 100.0),
                            ),
                            ("producer".to_string(), serde_json::json!(producer)),
                        ]
                        .into_iter()
                        .collect();
                        let record = PriceRecord::new(instrument, Utc::now(), payload)?;
                        state.upload_price(&batch_id, record).await?;
                    }

                    if cancel_every != 0 && (round + 1) % cancel_every == 0 {
                        state.cancel_batch(&batch_id).await?;
                    } else {
                        state.complete_batch(&batch_id).await?;
                    }
                }
                Ok(())
            }));
        }

        producer_jhs
    }

    fn spawn_consumers(
        &self,
        state: Arc<State>,
        instruments: Vec<String>,
    ) -> Vec<JoinHandle<()>> {
        let mut consumer_jhs = Vec::new();

        for consumer in 0..self.config.consumer_count {
            let state = state.clone();
            let instruments = instruments.clone();
            let poll_interval = self.config.consumer_poll_interval;

            consumer_jhs.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(poll_interval);
                let mut exit = crate::feed::EXIT.subscribe();
                let mut observed = 0usize;
                loop {
                    tokio::select! {
                        _ = exit.changed() => {
                            tracing::info!(consumer, observed, "Consumer shutting down.");
                            return;
                        }
                        _ = interval.tick() => {
                            let instrument = &instruments[OsRng.gen_range(0..instruments.len())];
                            if state.get_latest_price(instrument).await.is_some() {
                                observed += 1;
                            }
                        }
                    }
                }
            }));
        }

        consumer_jhs
    }

    async fn join_tasks(handles: Vec<JoinHandle<Result<()>>>) -> Result<Vec<Result<()>>> {
        let results = join_all(handles)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new()
    }
}

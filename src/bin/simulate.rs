use {
    anyhow::{
        Context,
        Result,
    },
    clap::Parser,
    futures_util::future::join_all,
    pricefeed::{
        feed::{
            config::Config,
            Service,
        },
        simulator::{
            self,
            Simulator,
        },
    },
    std::{
        io::IsTerminal,
        path::PathBuf,
    },
    tracing_subscriber::{
        prelude::*,
        EnvFilter,
    },
};

#[derive(Parser, Debug)]
#[clap(version)]
/// Drive a simulated fleet of producers and consumers against the price feed
struct Arguments {
    /// Path to an optional configuration file (e.g. to enable the orphan
    /// reaper)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Number of producer tasks
    #[clap(long, default_value_t = 4)]
    producers: usize,

    /// Number of consumer tasks
    #[clap(long, default_value_t = 2)]
    consumers: usize,

    /// Batches each producer runs before exiting
    #[clap(long, default_value_t = 10)]
    batches: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();

    let env_filter = EnvFilter::from_default_env();

    // Initialize a Tracing Subscriber
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(true)
        .with_ansi(std::io::stderr().is_terminal());

    let mut layers = Vec::new();

    // Use the compact formatter if we're in a terminal, otherwise use the
    // JSON formatter.
    if std::io::stderr().is_terminal() {
        layers.push(fmt_layer.compact().boxed());
    } else {
        layers.push(fmt_layer.json().boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .init();

    let config = match &args.config {
        Some(path) => Config::new(path).context("Could not parse config")?,
        None => Config::default(),
    };

    let service = Service::new(config);
    let (state, service_jhs) = service.spawn().await;

    let simulator = Simulator::with_config(simulator::Config {
        producer_count: args.producers,
        consumer_count: args.consumers,
        batches_per_producer: args.batches,
        ..Default::default()
    });
    simulator.run(state).await?;

    // The simulator raised the exit flag on its way out; wait for any
    // background services to notice.
    join_all(service_jhs).await;

    Ok(())
}

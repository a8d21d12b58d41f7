//! # triggerd: trigger engine daemon
//!
//! Composition root that wires the engine together and feeds it.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise logging
//! - Register state trackers, build the event bus and the dispatcher
//! - Compile scenes with the built-in operations and start dispatching
//! - Read `<state> [value]` observations from stdin, one per line
//! - Shut down on end of input or Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use trigger_app::clock::SystemClock;
use trigger_app::dispatcher::TriggerDispatcher;
use trigger_app::event_bus::InProcessEventBus;
use trigger_domain::state::StateRegistry;
use triggerd::config::Config;
use triggerd::feed::StateFeeder;
use triggerd::operations::BuiltinResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        states = config.states.len(),
        scenes = config.scenes.len(),
        "starting triggerd"
    );

    // State trackers
    let registry = Arc::new(StateRegistry::with_states(config.states.iter().cloned()));

    // Event bus
    let bus = Arc::new(InProcessEventBus::new(256));

    // Dispatcher
    let dispatcher = TriggerDispatcher::with_tokio(config.dispatcher.clone())
        .context("invalid dispatcher configuration")?;
    dispatcher
        .init(
            bus.clone(),
            &config.scenes,
            registry.as_ref(),
            &BuiltinResolver,
            &config.templates,
        )
        .context("failed to initialise scenes")?;
    if !dispatcher.start_running_async() {
        anyhow::bail!("dispatcher refused to start");
    }

    let feeder = StateFeeder::new(registry, bus, Arc::new(SystemClock));
    let result = feed_stdin(&feeder).await;

    dispatcher.dispose();
    tracing::info!("triggerd stopped");
    result
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn feed_stdin(feeder: &StateFeeder<Arc<InProcessEventBus>>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    tracing::info!("end of input");
                    return Ok(());
                };
                if let Err(err) = feeder.feed_line(&line) {
                    tracing::warn!(%err, line = %line, "ignoring malformed observation");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                tracing::info!("interrupted");
                return Ok(());
            }
        }
    }
}

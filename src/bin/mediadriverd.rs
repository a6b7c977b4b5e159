//! CLI entry point: parse configuration, create the driver directory,
//! spawn the conductor/sender/receiver agents each on their own thread,
//! and block until told to shut down.

use std::sync::Arc;

use clap::Parser;
use mediadriver::Driver::agent::{Agent, CompositeAgent};
use mediadriver::Driver::conductor::DriverConductor;
use mediadriver::Driver::directory::DriverDirectory;
use mediadriver::Driver::idle_strategy::{BackoffIdleStrategy, BusySpinIdleStrategy, IdleStrategy, YieldingIdleStrategy};
use mediadriver::Driver::receiver::ReceiverAgent;
use mediadriver::Driver::runner::AgentRunner;
use mediadriver::Driver::sender::SenderAgent;
use mediadriver::Driver::SharedState;
use mediadriver::config::{IdleStrategyKind, MediaDriverConfig, ThreadingMode};

fn build_idle_strategy(kind: IdleStrategyKind) -> Box<dyn IdleStrategy> {
    match kind {
        IdleStrategyKind::Backoff => Box::new(BackoffIdleStrategy::default()),
        IdleStrategyKind::BusySpin => Box::new(BusySpinIdleStrategy),
        IdleStrategyKind::Yielding => Box::new(YieldingIdleStrategy),
    }
}

fn main() {
    let config = MediaDriverConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    if let Err(err) = config.validate() {
        tracing::error!(%err, "invalid configuration");
        std::process::exit(1);
    }

    let directory = match DriverDirectory::create(&config) {
        Ok(directory) => Arc::new(directory),
        Err(err) => {
            tracing::error!(%err, "failed to start driver");
            std::process::exit(1);
        }
    };

    let state = Arc::new(SharedState::default());

    let conductor: Box<dyn Agent> =
        Box::new(DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state)));
    let sender: Box<dyn Agent> = Box::new(SenderAgent::new(Arc::clone(&directory), config.clone(), Arc::clone(&state)));
    let receiver: Box<dyn Agent> =
        Box::new(ReceiverAgent::new(Arc::clone(&directory), config.clone(), Arc::clone(&state)));

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(err) = ctrlc::set_handler(move || {
        handler_running.store(false, std::sync::atomic::Ordering::Release);
    }) {
        tracing::warn!(%err, "failed to install Ctrl-C handler");
    }

    tracing::info!(driver_directory = %config.driver_directory.display(), threading_mode = ?config.threading_mode, "media driver started");

    if config.threading_mode == ThreadingMode::Invoker {
        // No background threads at all: this thread drives every agent's
        // duty cycle directly until told to stop.
        let mut invoker = CompositeAgent::new(vec![conductor, sender, receiver]);
        let mut idle = build_idle_strategy(config.conductor_idle_strategy);
        invoker.on_start();
        while running.load(std::sync::atomic::Ordering::Acquire) {
            match invoker.do_work() {
                Ok(work_count) => idle.idle(work_count),
                Err(err) => {
                    tracing::error!(%err, "invoker do_work failed");
                    idle.idle(0);
                }
            }
        }
        invoker.on_close();
        tracing::info!("shutting down");
        return;
    }

    let mut runners: Vec<AgentRunner> = match config.threading_mode {
        ThreadingMode::Dedicated => vec![
            AgentRunner::spawn(conductor, build_idle_strategy(config.conductor_idle_strategy)),
            AgentRunner::spawn(sender, build_idle_strategy(config.sender_idle_strategy)),
            AgentRunner::spawn(receiver, build_idle_strategy(config.receiver_idle_strategy)),
        ],
        ThreadingMode::Shared => {
            let composite: Box<dyn Agent> = Box::new(CompositeAgent::new(vec![conductor, sender, receiver]));
            vec![AgentRunner::spawn(composite, build_idle_strategy(config.conductor_idle_strategy))]
        }
        ThreadingMode::SharedNetwork => {
            let network: Box<dyn Agent> = Box::new(CompositeAgent::new(vec![sender, receiver]));
            vec![
                AgentRunner::spawn(conductor, build_idle_strategy(config.conductor_idle_strategy)),
                AgentRunner::spawn(network, build_idle_strategy(config.sender_idle_strategy)),
            ]
        }
        ThreadingMode::Invoker => unreachable!("handled above"),
    };

    while running.load(std::sync::atomic::Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    tracing::info!("shutting down");
    for runner in runners.drain(..) {
        runner.join();
    }
}

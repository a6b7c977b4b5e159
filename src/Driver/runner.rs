//! Spawns an [`Agent`] on its own OS thread and drives its `do_work`
//! loop until told to stop. Separated from `Agent` itself so the same
//! agent can be driven by a test harness (call `do_work` directly) or by
//! a real thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use crate::Driver::agent::Agent;
use crate::Driver::idle_strategy::IdleStrategy;

pub struct AgentRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AgentRunner {
    /// Spawn `agent` on a dedicated thread, driving it with `idle`
    /// between empty `do_work` calls until [`AgentRunner::stop`] is
    /// called.
    pub fn spawn(mut agent: Box<dyn Agent>, mut idle: Box<dyn IdleStrategy>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();

        let handle = std::thread::Builder::new()
            .name(agent.role_name().to_string())
            .spawn(move || {
                agent.on_start();
                info!(role = agent.role_name(), "agent started");
                while running_thread.load(Ordering::Acquire) {
                    match agent.do_work() {
                        Ok(work_count) => idle.idle(work_count),
                        Err(err) => {
                            error!(role = agent.role_name(), %err, "agent do_work failed");
                            idle.idle(0);
                        }
                    }
                }
                agent.on_close();
                info!(role = agent.role_name(), "agent stopped");
            })
            .expect("failed to spawn agent thread");

        Self { running, handle: Some(handle) }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("agent thread panicked during shutdown");
            }
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Driver::idle_strategy::BusySpinIdleStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct OnceAgent {
        counter: Arc<AtomicUsize>,
    }

    impl Agent for OnceAgent {
        fn role_name(&self) -> &'static str {
            "once"
        }

        fn do_work(&mut self) -> std::io::Result<usize> {
            self.counter.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(0)
        }
    }

    #[test]
    fn runner_drives_do_work_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let agent = Box::new(OnceAgent { counter: counter.clone() });
        let mut runner = AgentRunner::spawn(agent, Box::new(BusySpinIdleStrategy));

        std::thread::sleep(std::time::Duration::from_millis(20));
        runner.stop();
        runner.join();

        assert!(counter.load(AtomicOrdering::SeqCst) > 0);
    }
}

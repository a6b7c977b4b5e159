//! The cooperative-scheduling contract every driver thread (conductor,
//! sender, receiver) implements. There is no async runtime in the
//! driver: each agent is a plain `do_work` loop driven by an
//! [`IdleStrategy`](super::idle_strategy::IdleStrategy) when it has
//! nothing to do, exactly one OS thread per agent (or all three sharing
//! one thread in low-resource deployments -- see `runner`).

pub trait Agent: Send {
    /// Human-readable name, used in logs and thread naming.
    fn role_name(&self) -> &'static str;

    /// Called once before the first `do_work`.
    fn on_start(&mut self) {}

    /// Do as much work as is immediately available and return how many
    /// discrete units were done (frames sent, commands processed, bytes
    /// copied into a term buffer -- whatever unit makes sense for this
    /// agent). Returning `0` tells the runner's idle strategy to back
    /// off.
    fn do_work(&mut self) -> std::io::Result<usize>;

    /// Called once after the agent loop exits, for flushing state or
    /// releasing resources that `Drop` impls don't cover.
    fn on_close(&mut self) {}
}

/// Runs several agents in round-robin on one thread, summing their work
/// counts so the shared idle strategy only backs off once none of them
/// found anything to do. Used for the shared/shared-network threading
/// modes, where one OS thread drives more than one agent.
pub struct CompositeAgent {
    agents: Vec<Box<dyn Agent>>,
}

impl CompositeAgent {
    pub fn new(agents: Vec<Box<dyn Agent>>) -> Self {
        Self { agents }
    }
}

impl Agent for CompositeAgent {
    fn role_name(&self) -> &'static str {
        "composite"
    }

    fn on_start(&mut self) {
        for agent in &mut self.agents {
            agent.on_start();
        }
    }

    fn do_work(&mut self) -> std::io::Result<usize> {
        let mut total = 0;
        for agent in &mut self.agents {
            total += agent.do_work()?;
        }
        Ok(total)
    }

    fn on_close(&mut self) {
        for agent in &mut self.agents {
            agent.on_close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingAgent {
        calls: Arc<AtomicUsize>,
        work_each_call: usize,
    }

    impl Agent for CountingAgent {
        fn role_name(&self) -> &'static str {
            "counting"
        }

        fn do_work(&mut self) -> std::io::Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.work_each_call)
        }
    }

    #[test]
    fn composite_sums_work_across_its_agents() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut composite = CompositeAgent::new(vec![
            Box::new(CountingAgent { calls: calls.clone(), work_each_call: 2 }),
            Box::new(CountingAgent { calls: calls.clone(), work_each_call: 3 }),
        ]);
        composite.on_start();
        let total = composite.do_work().unwrap();
        assert_eq!(total, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

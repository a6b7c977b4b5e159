//! Tracks the set of destinations a single publication sends to. Most
//! channels have exactly one destination (the channel's own endpoint);
//! manual multi-destination-cast channels accumulate additional
//! destinations added at runtime by the client, each independently
//! removable.

use std::net::SocketAddr;

#[derive(Default)]
pub struct DestinationTracker {
    destinations: Vec<SocketAddr>,
}

impl DestinationTracker {
    pub fn new(initial: SocketAddr) -> Self {
        Self { destinations: vec![initial] }
    }

    pub fn empty() -> Self {
        Self { destinations: Vec::new() }
    }

    pub fn add(&mut self, destination: SocketAddr) {
        if !self.destinations.contains(&destination) {
            self.destinations.push(destination);
        }
    }

    pub fn remove(&mut self, destination: SocketAddr) -> bool {
        let before = self.destinations.len();
        self.destinations.retain(|d| *d != destination);
        self.destinations.len() != before
    }

    pub fn destinations(&self) -> &[SocketAddr] {
        &self.destinations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut tracker = DestinationTracker::empty();
        let dest = "127.0.0.1:9000".parse().unwrap();
        tracker.add(dest);
        tracker.add(dest);
        assert_eq!(tracker.destinations().len(), 1);
    }

    #[test]
    fn remove_reports_whether_it_removed_anything() {
        let mut tracker = DestinationTracker::new("127.0.0.1:9000".parse().unwrap());
        assert!(tracker.remove("127.0.0.1:9000".parse().unwrap()));
        assert!(!tracker.remove("127.0.0.1:9000".parse().unwrap()));
    }
}

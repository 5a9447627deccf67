//! # Dependency Tracker
//!
//! Bookkeeping for services that are waiting to start. Each waiting service has
//! a tracker holding the services and interfaces it still needs and a one-shot
//! completion signal. Availability events return the waiters they touched; the
//! caller then calls [`DependencyTracker::check`] on each of them, since a waiter
//! is only released once *both* of its wait sets are empty.
//!
//! The tracker never detects cycles. A dependency that never becomes available
//! leaves the waiter's signal unfired.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::oneshot;

use crate::record::interface_key;

#[derive(Debug)]
struct ServiceTracker {
    waiting_on_services: HashSet<String>,
    waiting_on_interfaces: HashSet<String>,
    signal: oneshot::Sender<()>,
    completion: Option<oneshot::Receiver<()>>,
}

impl ServiceTracker {
    fn new() -> Self {
        let (signal, completion) = oneshot::channel();
        Self {
            waiting_on_services: HashSet::new(),
            waiting_on_interfaces: HashSet::new(),
            signal,
            completion: Some(completion),
        }
    }

    fn is_satisfied(&self) -> bool {
        self.waiting_on_services.is_empty() && self.waiting_on_interfaces.is_empty()
    }
}

/// A service whose completion signal has not fired yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingService {
    pub id: String,
    /// Unresolved dependency keys (service ids and `#interface` keys).
    pub waiting_on: Vec<String>,
}

impl fmt::Display for PendingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} waits on [{}]", self.id, self.waiting_on.join(", "))
    }
}

#[derive(Debug, Default)]
pub struct DependencyTracker {
    waiting_on_service: HashMap<String, HashSet<String>>,
    waiting_on_interface: HashMap<String, HashMap<String, u32>>,
    interface_count: HashMap<String, u32>,
    satisfied: HashSet<String>,
    trackers: HashMap<String, ServiceTracker>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracker_mut(&mut self, id: &str) -> &mut ServiceTracker {
        self.trackers
            .entry(id.to_string())
            .or_insert_with(ServiceTracker::new)
    }

    /// Makes `waiter` wait for service `dependency`, unless it is already available.
    pub fn bind_to_service(&mut self, dependency: &str, waiter: &str) {
        if self.satisfied.contains(dependency) {
            return;
        }
        self.waiting_on_service
            .entry(dependency.to_string())
            .or_default()
            .insert(waiter.to_string());
        self.tracker_mut(waiter)
            .waiting_on_services
            .insert(dependency.to_string());
    }

    /// Makes `waiter` wait until `min_count` implementers of `interface` are available.
    pub fn bind_to_interface(&mut self, interface: &str, waiter: &str, min_count: u32) {
        if self.implementer_count(interface) >= min_count {
            return;
        }
        self.waiting_on_interface
            .entry(interface.to_string())
            .or_default()
            .insert(waiter.to_string(), min_count);
        self.tracker_mut(waiter)
            .waiting_on_interfaces
            .insert(interface.to_string());
    }

    /// Marks `id` available and returns the services that were waiting on it.
    pub fn service_available(&mut self, id: &str) -> Vec<String> {
        self.satisfied.insert(id.to_string());
        let mut waiters: Vec<String> = self
            .waiting_on_service
            .remove(id)
            .unwrap_or_default()
            .into_iter()
            .collect();
        waiters.sort();
        for waiter in &waiters {
            if let Some(tracker) = self.trackers.get_mut(waiter) {
                tracker.waiting_on_services.remove(id);
            }
        }
        waiters
    }

    /// Counts one more implementer of `interface` and returns the waiters whose
    /// minimum is now met. Waiters needing more implementers stay registered.
    pub fn interface_available(&mut self, interface: &str) -> Vec<String> {
        let count = {
            let count = self.interface_count.entry(interface.to_string()).or_default();
            *count += 1;
            *count
        };
        let Some(waiters) = self.waiting_on_interface.get_mut(interface) else {
            return Vec::new();
        };
        let mut ready: Vec<String> = waiters
            .iter()
            .filter(|(_, min_count)| **min_count <= count)
            .map(|(waiter, _)| waiter.clone())
            .collect();
        ready.sort();
        for waiter in &ready {
            waiters.remove(waiter);
        }
        if waiters.is_empty() {
            self.waiting_on_interface.remove(interface);
        }
        for waiter in &ready {
            if let Some(tracker) = self.trackers.get_mut(waiter) {
                tracker.waiting_on_interfaces.remove(interface);
            }
        }
        ready
    }

    /// Hands out the completion signal of `id`, creating its tracker if needed.
    /// Returns `None` if the signal was already handed out.
    pub fn completion(&mut self, id: &str) -> Option<oneshot::Receiver<()>> {
        self.tracker_mut(id).completion.take()
    }

    /// Fires the completion signal of `id` if nothing is left to wait for.
    pub fn check(&mut self, id: &str) -> bool {
        if !self.trackers.get(id).is_some_and(ServiceTracker::is_satisfied) {
            return false;
        }
        if let Some(tracker) = self.trackers.remove(id) {
            let _ = tracker.signal.send(());
        }
        true
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.satisfied.contains(id)
    }

    pub fn implementer_count(&self, interface: &str) -> u32 {
        self.interface_count.get(interface).copied().unwrap_or(0)
    }

    /// Every tracker that has not fired yet, with what it still waits on.
    pub fn pending(&self) -> Vec<PendingService> {
        let mut pending: Vec<PendingService> = self
            .trackers
            .iter()
            .map(|(id, tracker)| {
                let mut waiting_on: Vec<String> = tracker
                    .waiting_on_services
                    .iter()
                    .cloned()
                    .chain(tracker.waiting_on_interfaces.iter().map(|name| interface_key(name)))
                    .collect();
                waiting_on.sort();
                PendingService {
                    id: id.clone(),
                    waiting_on,
                }
            })
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_dependency_releases_waiter() {
        let mut tracker = DependencyTracker::new();
        tracker.bind_to_service("db", "api");
        let mut done = tracker.completion("api").expect("signal");
        assert!(!tracker.check("api"));
        assert!(done.try_recv().is_err());

        assert_eq!(tracker.service_available("db"), ["api"]);
        assert!(tracker.check("api"));
        assert!(done.try_recv().is_ok());
        assert!(tracker.pending().is_empty());
    }

    #[test]
    fn binding_to_an_available_service_is_a_no_op() {
        let mut tracker = DependencyTracker::new();
        tracker.service_available("db");
        tracker.bind_to_service("db", "api");
        assert!(tracker.is_available("db"));
        assert!(tracker.pending().is_empty());
        let mut done = tracker.completion("api").expect("signal");
        assert!(tracker.check("api"));
        assert!(done.try_recv().is_ok());
    }

    #[test]
    fn interface_waiter_needs_min_count() {
        let mut tracker = DependencyTracker::new();
        tracker.bind_to_interface("actor", "agent", 2);
        tracker.bind_to_interface("actor", "critic", 1);
        let _agent = tracker.completion("agent");

        assert_eq!(tracker.interface_available("actor"), ["critic"]);
        assert!(!tracker.check("agent"));
        assert_eq!(
            tracker.pending(),
            [PendingService {
                id: "agent".into(),
                waiting_on: vec!["#actor".into()],
            }]
        );

        assert_eq!(tracker.interface_available("actor"), ["agent"]);
        assert!(tracker.check("agent"));
        assert_eq!(tracker.implementer_count("actor"), 2);
    }

    #[test]
    fn waiter_with_both_kinds_fires_only_when_both_are_met() {
        let mut tracker = DependencyTracker::new();
        tracker.bind_to_service("db", "api");
        tracker.bind_to_interface("cache", "api", 1);
        let mut done = tracker.completion("api").expect("signal");

        tracker.service_available("db");
        assert!(!tracker.check("api"));
        tracker.interface_available("cache");
        assert!(tracker.check("api"));
        assert!(done.try_recv().is_ok());
    }

    #[test]
    fn completion_is_handed_out_once() {
        let mut tracker = DependencyTracker::new();
        assert!(tracker.completion("solo").is_some());
        assert!(tracker.completion("solo").is_none());
        assert!(tracker.check("solo"));
    }
}

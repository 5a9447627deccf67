//! # Service Container
//!
//! The `ContainerActor` is the server half of the container. It owns the
//! registered records, the live instances, the per-service status and the
//! [`DependencyTracker`], and processes [`ContainerRequest`]s one at a time.
//!
//! Sequential processing is what makes the activation bookkeeping safe: marking
//! a service activated, publishing it to the tracker and re-checking every
//! waiter happens inside one message, so no pipeline can observe a half-updated
//! state and no completion signal fires twice.
//!
//! The actor never runs user code. Factories, setters and hooks run in the
//! activation pipelines spawned by [`ContainerClient::startup`], which report
//! back with [`ContainerRequest::Activated`].
//!
//! ```rust
//! use service_framework::ContainerActor;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (actor, client) = ContainerActor::new(16);
//! let handle = tokio::spawn(actor.run());
//!
//! assert!(!client.has("anything").await.unwrap());
//! client.startup().await.unwrap();
//!
//! drop(client);
//! handle.await.unwrap();
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::ContainerClient;
use crate::config::RuntimeConfig;
use crate::error::ContainerError;
use crate::identity::Gid;
use crate::instance::{Instance, ServiceHandle};
use crate::message::{ContainerRequest, Deactivation, Resolved};
use crate::record::{DependencyKey, Injection, ServiceRecord};
use crate::tracker::DependencyTracker;

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Registered,
    Activating,
    Activated,
    Deactivating,
    Deactivated,
}

impl ServiceStatus {
    pub fn can_activate(self) -> bool {
        self == ServiceStatus::Registered
    }

    pub fn can_deactivate(self) -> bool {
        self == ServiceStatus::Activated
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            ServiceStatus::Registered => "registered",
            ServiceStatus::Activating => "activating",
            ServiceStatus::Activated => "activated",
            ServiceStatus::Deactivating => "deactivating",
            ServiceStatus::Deactivated => "deactivated",
        };
        f.write_str(status)
    }
}

pub struct ContainerActor {
    receiver: mpsc::Receiver<ContainerRequest>,
    records: HashMap<String, ServiceRecord>,
    /// Service ids in registration order.
    order: Vec<String>,
    status: HashMap<String, ServiceStatus>,
    instances: HashMap<String, Instance>,
    gid_to_id: HashMap<Gid, String>,
    /// Interface name to implementer ids, in registration order.
    interface_index: HashMap<String, Vec<String>>,
    tracker: DependencyTracker,
    started: bool,
    shutting_down: bool,
    detect_cycles: bool,
}

impl ContainerActor {
    /// Creates the actor and its client.
    ///
    /// `buffer_size` is the capacity of the request channel; callers wait for
    /// space when it is full.
    pub fn new(buffer_size: usize) -> (Self, ContainerClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            records: HashMap::new(),
            order: Vec::new(),
            status: HashMap::new(),
            instances: HashMap::new(),
            gid_to_id: HashMap::new(),
            interface_index: HashMap::new(),
            tracker: DependencyTracker::new(),
            started: false,
            shutting_down: false,
            detect_cycles: false,
        };
        (actor, ContainerClient::new(sender))
    }

    /// Creates the actor and its client with the container settings and
    /// configuration values of `config`.
    pub fn from_config(config: &RuntimeConfig) -> (Self, ContainerClient) {
        let (mut actor, client) = Self::new(config.container.buffer_size);
        actor.detect_cycles = config.container.detect_cycles;
        let client = client
            .with_startup_timeout(config.startup_timeout())
            .with_values(config.values.clone());
        (actor, client)
    }

    /// Runs the event loop until every client is dropped.
    ///
    /// Pipelines still waiting on dependencies hold a client of their own;
    /// [`ContainerClient::shutdown`] releases them.
    pub async fn run(mut self) {
        info!("Container started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ContainerRequest::Register { record, respond_to } => {
                    let _ = respond_to.send(Ok(self.register(*record)));
                }
                ContainerRequest::Has { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.instances.contains_key(&id)));
                }
                ContainerRequest::Resolve { id, respond_to } => {
                    let _ = respond_to.send(self.resolve(&id));
                }
                ContainerRequest::ResolveByIdentity { gid, respond_to } => {
                    let result = match self.gid_to_id.get(&gid) {
                        Some(id) => self.resolve(id),
                        None => Err(ContainerError::NotFound(gid.to_string())),
                    };
                    let _ = respond_to.send(result);
                }
                ContainerRequest::Query {
                    interface,
                    respond_to,
                } => {
                    let _ = respond_to.send(Ok(self.query(&interface)));
                }
                ContainerRequest::Status { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.status.get(&id).copied()));
                }
                ContainerRequest::Pending { respond_to } => {
                    let _ = respond_to.send(Ok(self.tracker.pending()));
                }
                ContainerRequest::BeginStartup { respond_to } => {
                    let _ = respond_to.send(self.begin_startup());
                }
                ContainerRequest::AwaitDependencies { id, respond_to } => {
                    let _ = respond_to.send(self.await_dependencies(&id));
                }
                ContainerRequest::ResolveArguments { args, respond_to } => {
                    let resolved = args
                        .into_iter()
                        .map(|arg| self.resolve_argument(arg))
                        .collect();
                    let _ = respond_to.send(resolved);
                }
                ContainerRequest::Activated {
                    id,
                    instance,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.activated(id, instance));
                }
                ContainerRequest::BeginShutdown { respond_to } => {
                    let _ = respond_to.send(Ok(self.begin_shutdown()));
                }
                ContainerRequest::Deactivated { id, respond_to } => {
                    self.instances.remove(&id);
                    self.status.insert(id.clone(), ServiceStatus::Deactivated);
                    info!(service = %id, "Deactivated");
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        info!(
            services = self.records.len(),
            live = self.instances.len(),
            "Container stopped"
        );
    }

    fn register(&mut self, mut record: ServiceRecord) -> bool {
        if self.records.contains_key(&record.id) {
            debug!(service = %record.id, "Already registered");
            return false;
        }
        // An interface listed twice still counts as one implementer.
        let mut seen = HashSet::new();
        record.interfaces.retain(|interface| seen.insert(interface.clone()));

        let id = record.id.clone();
        for interface in &record.interfaces {
            self.interface_index
                .entry(interface.clone())
                .or_default()
                .push(id.clone());
        }
        self.gid_to_id.insert(record.gid.clone(), id.clone());
        self.status.insert(id.clone(), ServiceStatus::Registered);
        self.order.push(id.clone());
        info!(
            service = %id,
            gid = %record.gid,
            priority = record.priority,
            disabled = record.disabled,
            "Registered"
        );
        self.records.insert(id, record);
        true
    }

    fn resolve(&self, id: &str) -> Result<Instance, ContainerError> {
        self.instances
            .get(id)
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))
    }

    /// Activated implementers of `interface`, by descending priority and then
    /// registration order.
    fn query(&self, interface: &str) -> Vec<ServiceHandle> {
        let mut handles: Vec<ServiceHandle> = self
            .interface_index
            .get(interface)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                let instance = self.instances.get(id)?;
                let priority = self.records.get(id).map_or(0, |r| r.priority);
                Some(ServiceHandle::new(id.clone(), priority, instance.clone()))
            })
            .collect();
        handles.sort_by_key(|handle| std::cmp::Reverse(handle.priority()));
        handles
    }

    fn begin_startup(&mut self) -> Result<Option<Vec<ServiceRecord>>, ContainerError> {
        if self.started {
            debug!("Startup already requested");
            return Ok(None);
        }
        if self.detect_cycles {
            if let Some(cycle) = self.find_cycle() {
                warn!(cycle = %cycle.join(" -> "), "Dependency cycle detected");
                return Err(ContainerError::DependencyCycle(cycle));
            }
        }
        self.started = true;

        let mut records: Vec<ServiceRecord> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|record| !record.disabled)
            .filter(|record| self.status.get(&record.id).is_some_and(|s| s.can_activate()))
            .cloned()
            .collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.priority));
        for record in &records {
            self.status.insert(record.id.clone(), ServiceStatus::Activating);
        }
        info!(services = records.len(), "Startup begins");
        Ok(Some(records))
    }

    fn await_dependencies(
        &mut self,
        id: &str,
    ) -> Result<tokio::sync::oneshot::Receiver<()>, ContainerError> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        for (key, dependency) in &record.dependencies {
            match DependencyKey::parse(key) {
                DependencyKey::Service(service) => self.tracker.bind_to_service(service, id),
                DependencyKey::Interface(interface) => self.tracker.bind_to_interface(
                    interface,
                    id,
                    dependency.min_count.unwrap_or(1),
                ),
            }
        }
        let completion = self
            .tracker
            .completion(id)
            .ok_or_else(|| ContainerError::Pipeline(format!("{id} is already waiting")))?;
        self.tracker.check(id);
        debug!(service = %id, dependencies = record.dependencies.len(), "Dependencies bound");
        Ok(completion)
    }

    fn resolve_argument(&self, arg: Injection) -> Result<Resolved, ContainerError> {
        match arg {
            Injection::Unbound => Ok(Resolved::Unbound),
            Injection::Service(id) => {
                let instance = self.resolve(&id)?;
                Ok(Resolved::Service { id, instance })
            }
            Injection::Interface(name) => Ok(Resolved::Interface(name)),
        }
    }

    fn activated(&mut self, id: String, instance: Instance) -> Result<(), ContainerError> {
        if self.shutting_down {
            warn!(service = %id, "Activated after shutdown began, not stored");
            self.status.insert(id.clone(), ServiceStatus::Deactivating);
            return Err(ContainerError::ShuttingDown(id));
        }
        self.instances.insert(id.clone(), instance);
        self.status.insert(id.clone(), ServiceStatus::Activated);
        info!(service = %id, live = self.instances.len(), "Activated");

        let mut waiters = self.tracker.service_available(&id);
        let interfaces = self
            .records
            .get(&id)
            .map(|record| record.interfaces.clone())
            .unwrap_or_default();
        for interface in &interfaces {
            waiters.extend(self.tracker.interface_available(interface));
        }
        for waiter in waiters {
            if self.tracker.check(&waiter) {
                debug!(service = %waiter, released_by = %id, "Dependencies satisfied");
            }
        }
        Ok(())
    }

    fn begin_shutdown(&mut self) -> Vec<Deactivation> {
        // Pipelines still waiting on a completion signal are released with an error.
        self.tracker = DependencyTracker::new();
        self.shutting_down = true;

        let mut deactivations = Vec::new();
        for id in &self.order {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            let activated = self.status.get(id).is_some_and(|s| s.can_deactivate());
            if record.disabled || !activated {
                continue;
            }
            let Some(instance) = self.instances.get(id) else {
                continue;
            };
            self.status.insert(id.clone(), ServiceStatus::Deactivating);
            deactivations.push(Deactivation {
                id: id.clone(),
                instance: instance.clone(),
                hook: record.deactivate.clone(),
            });
        }
        info!(services = deactivations.len(), "Shutdown begins");
        deactivations
    }

    /// Finds a dependency cycle among the enabled services.
    ///
    /// Service dependencies always count as edges. An interface dependency only
    /// counts when every enabled implementer is needed to reach its minimum,
    /// since otherwise the waiter may be released without the cycle closing.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let enabled: Vec<&ServiceRecord> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|record| !record.disabled)
            .collect();
        let enabled_ids: HashSet<&str> = enabled.iter().map(|r| r.id.as_str()).collect();

        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for record in &enabled {
            let targets = edges.entry(record.id.as_str()).or_default();
            for (key, dependency) in &record.dependencies {
                match DependencyKey::parse(key) {
                    DependencyKey::Service(service) => {
                        if enabled_ids.contains(service) {
                            targets.push(service);
                        }
                    }
                    DependencyKey::Interface(interface) => {
                        let implementers: Vec<&str> = self
                            .interface_index
                            .get(interface)
                            .into_iter()
                            .flatten()
                            .map(String::as_str)
                            .filter(|id| enabled_ids.contains(id))
                            .collect();
                        let needed = dependency.min_count.unwrap_or(1) as usize;
                        if implementers.len() == needed {
                            targets.extend(implementers);
                        }
                    }
                }
            }
        }

        let mut finished: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        for record in &enabled {
            if let Some(cycle) = visit(record.id.as_str(), &edges, &mut finished, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    finished: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if finished.contains(node) {
        return None;
    }
    if let Some(start) = path.iter().position(|seen| *seen == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|id| id.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    path.push(node);
    for next in edges.get(node).into_iter().flatten() {
        if let Some(cycle) = visit(*next, edges, finished, path) {
            return Some(cycle);
        }
    }
    path.pop();
    finished.insert(node);
    None
}

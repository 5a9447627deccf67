//! # Container Messages
//!
//! Requests sent from a [`ContainerClient`](crate::client::ContainerClient) to the
//! [`ContainerActor`](crate::actor::ContainerActor). The public operations map
//! one-to-one onto a variant. Startup and shutdown are split into several
//! messages because the long running work (factories, hooks) happens in
//! pipeline tasks outside the actor, which only ever does bookkeeping.

use tokio::sync::oneshot;

use crate::actor::ServiceStatus;
use crate::error::ContainerError;
use crate::identity::Gid;
use crate::instance::{Instance, ServiceHandle};
use crate::record::{Injection, LifecycleHook, ServiceRecord};
use crate::tracker::PendingService;

/// One-shot response channel used by the container.
pub type Response<T> = oneshot::Sender<Result<T, ContainerError>>;

/// An argument position as resolved by the container.
#[derive(Debug)]
pub enum Resolved {
    Unbound,
    Service { id: String, instance: Instance },
    Interface(String),
}

/// A service handed back for deactivation.
#[derive(Debug)]
pub struct Deactivation {
    pub id: String,
    pub instance: Instance,
    pub hook: Option<LifecycleHook>,
}

#[derive(Debug)]
pub enum ContainerRequest {
    /// Responds `false` when the id was already registered.
    Register {
        record: Box<ServiceRecord>,
        respond_to: Response<bool>,
    },
    Has {
        id: String,
        respond_to: Response<bool>,
    },
    Resolve {
        id: String,
        respond_to: Response<Instance>,
    },
    ResolveByIdentity {
        gid: Gid,
        respond_to: Response<Instance>,
    },
    Query {
        interface: String,
        respond_to: Response<Vec<ServiceHandle>>,
    },
    Status {
        id: String,
        respond_to: Response<Option<ServiceStatus>>,
    },
    Pending {
        respond_to: Response<Vec<PendingService>>,
    },
    /// Responds with the records to activate, or `None` if startup already ran.
    BeginStartup {
        respond_to: Response<Option<Vec<ServiceRecord>>>,
    },
    /// Binds the service's dependencies and hands out its completion signal.
    AwaitDependencies {
        id: String,
        respond_to: Response<oneshot::Receiver<()>>,
    },
    ResolveArguments {
        args: Vec<Injection>,
        respond_to: Response<Vec<Resolved>>,
    },
    Activated {
        id: String,
        instance: Instance,
        respond_to: Response<()>,
    },
    BeginShutdown {
        respond_to: Response<Vec<Deactivation>>,
    },
    Deactivated {
        id: String,
        respond_to: Response<()>,
    },
}

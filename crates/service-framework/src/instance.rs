//! # Instances, Callables and Arguments
//!
//! Live services are stored type-erased as [`Instance`]s. Factories, setters and
//! lifecycle hooks are captured as callables when a component declares them, so
//! the container never looks a method up by name at call time.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::ContainerClient;
use crate::error::{BoxError, ContainerError};
use crate::identity::short_type_name;
use crate::message::ContainerRequest;

/// A live, shared service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by the stored callables.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Builds a service instance from its (optional) configuration value and resolved arguments.
pub type FactoryFn =
    Arc<dyn Fn(Option<toml::Value>, Arguments) -> BoxFuture<Result<Instance, BoxError>> + Send + Sync>;

/// Runs against a built instance: injectable setters and activate/deactivate hooks.
pub type HookFn = Arc<dyn Fn(Instance, Arguments) -> BoxFuture<Result<(), BoxError>> + Send + Sync>;

/// Downcasts a type-erased instance.
pub fn downcast<T: Any + Send + Sync>(instance: Instance) -> Result<Arc<T>, ContainerError> {
    instance.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
        expected: short_type_name::<T>(),
    })
}

/// An activated service as seen by [`ContainerClient::query`].
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    id: String,
    priority: i32,
    instance: Instance,
}

impl ServiceHandle {
    pub fn new(id: impl Into<String>, priority: i32, instance: Instance) -> Self {
        Self {
            id: id.into(),
            priority,
            instance,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }
}

/// Live view of the activated implementers of an interface.
///
/// Every [`snapshot`](LiveList::snapshot) reflects the services activated at
/// that moment, ordered by descending priority. The list only holds a weak
/// handle to the container: instances keeping a list do not keep the
/// container running once every client is gone.
#[derive(Clone)]
pub struct LiveList {
    interface: String,
    sender: mpsc::WeakSender<ContainerRequest>,
}

impl LiveList {
    pub(crate) fn new(interface: String, sender: mpsc::WeakSender<ContainerRequest>) -> Self {
        Self { interface, sender }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Fails with [`ContainerError::ActorClosed`] once the container is gone.
    pub async fn snapshot(&self) -> Result<Vec<ServiceHandle>, ContainerError> {
        let sender = self.sender.upgrade().ok_or(ContainerError::ActorClosed)?;
        ContainerClient::new(sender).query(&self.interface).await
    }
}

impl std::fmt::Debug for LiveList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LiveList").field(&self.interface).finish()
    }
}

/// One resolved positional argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// The position carries no dependency declaration.
    Unbound,
    Service { id: String, instance: Instance },
    Implementers(LiveList),
}

/// Positional arguments handed to a factory or injectable setter.
#[derive(Debug, Clone, Default)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
    pub fn new(arguments: Vec<Argument>) -> Self {
        Self(arguments)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    /// The service injected at `index`, downcast to its concrete type.
    pub fn service<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, ContainerError> {
        match self.0.get(index) {
            Some(Argument::Service { instance, .. }) => downcast::<T>(instance.clone()),
            _ => Err(ContainerError::ArgumentMismatch {
                index,
                expected: "a service",
            }),
        }
    }

    /// The live implementer list injected at `index`.
    pub fn implementers(&self, index: usize) -> Result<LiveList, ContainerError> {
        match self.0.get(index) {
            Some(Argument::Implementers(list)) => Ok(list.clone()),
            _ => Err(ContainerError::ArgumentMismatch {
                index,
                expected: "an interface list",
            }),
        }
    }
}

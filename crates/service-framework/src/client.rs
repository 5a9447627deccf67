//! # Container Client
//!
//! The cloneable handle to a running [`ContainerActor`](crate::actor::ContainerActor).
//! Lookups are a single request/response round trip. [`startup`](ContainerClient::startup)
//! and [`shutdown`](ContainerClient::shutdown) drive the lifecycle from the
//! caller's side: they spawn the per-service pipelines and report their outcome.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::actor::ServiceStatus;
use crate::error::ContainerError;
use crate::identity::Gid;
use crate::instance::{downcast, Argument, Arguments, Instance, LiveList, ServiceHandle};
use crate::message::{ContainerRequest, Deactivation, Resolved, Response};
use crate::pipeline;
use crate::record::{Injection, ServiceRecord};
use crate::tracker::PendingService;

#[derive(Clone)]
pub struct ContainerClient {
    sender: mpsc::Sender<ContainerRequest>,
    startup_timeout: Option<Duration>,
    values: Arc<BTreeMap<String, toml::Value>>,
}

impl ContainerClient {
    pub fn new(sender: mpsc::Sender<ContainerRequest>) -> Self {
        Self {
            sender,
            startup_timeout: None,
            values: Arc::new(BTreeMap::new()),
        }
    }

    /// Fails [`startup`](Self::startup) with
    /// [`ContainerError::UnsatisfiedDependency`] if it has not settled in time.
    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Configuration values handed to factories through their `config_id`.
    pub fn with_values(mut self, values: BTreeMap<String, toml::Value>) -> Self {
        self.values = Arc::new(values);
        self
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Response<T>) -> ContainerRequest,
    ) -> Result<T, ContainerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(request(respond_to))
            .await
            .map_err(|_| ContainerError::ActorClosed)?;
        response.await.map_err(|_| ContainerError::ActorDropped)?
    }

    /// Registers a record. Returns `false` if the id was already taken, in
    /// which case nothing changes.
    pub async fn register(&self, record: ServiceRecord) -> Result<bool, ContainerError> {
        self.call(|respond_to| ContainerRequest::Register {
            record: Box::new(record),
            respond_to,
        })
        .await
    }

    /// Whether `id` has a live instance.
    pub async fn has(&self, id: &str) -> Result<bool, ContainerError> {
        self.call(|respond_to| ContainerRequest::Has {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn resolve(&self, id: &str) -> Result<Instance, ContainerError> {
        self.call(|respond_to| ContainerRequest::Resolve {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    /// Resolves `id` and downcasts it to `T`.
    pub async fn resolve_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, ContainerError> {
        downcast::<T>(self.resolve(id).await?)
    }

    pub async fn resolve_by_identity(&self, gid: &Gid) -> Result<Instance, ContainerError> {
        self.call(|respond_to| ContainerRequest::ResolveByIdentity {
            gid: gid.clone(),
            respond_to,
        })
        .await
    }

    /// Activated implementers of `interface`, highest priority first.
    pub async fn query(&self, interface: &str) -> Result<Vec<ServiceHandle>, ContainerError> {
        self.call(|respond_to| ContainerRequest::Query {
            interface: interface.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn status(&self, id: &str) -> Result<Option<ServiceStatus>, ContainerError> {
        self.call(|respond_to| ContainerRequest::Status {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    /// Services still waiting on dependencies, with what they wait on.
    pub async fn pending(&self) -> Result<Vec<PendingService>, ContainerError> {
        self.call(|respond_to| ContainerRequest::Pending { respond_to })
            .await
    }

    /// Activates every enabled registered service.
    ///
    /// Each service gets its own pipeline task, started in descending priority
    /// order. The call returns once every pipeline has finished, or with the
    /// first pipeline error. Pipelines still running at that point are left to
    /// finish on their own. Calling it again is a no-op.
    pub async fn startup(&self) -> Result<(), ContainerError> {
        let Some(records) = self
            .call(|respond_to| ContainerRequest::BeginStartup { respond_to })
            .await?
        else {
            return Ok(());
        };

        let mut pipelines = JoinSet::new();
        for record in records {
            let span = info_span!("activate", service = %record.id);
            pipelines.spawn(pipeline::activate(self.clone(), record).instrument(span));
        }

        let settled = match self.startup_timeout {
            Some(limit) => match tokio::time::timeout(limit, settle(&mut pipelines)).await {
                Ok(settled) => settled,
                Err(_) => {
                    let pending = self.pending().await?;
                    warn!(pending = pending.len(), ?limit, "Startup timed out");
                    Err(ContainerError::UnsatisfiedDependency(pending))
                }
            },
            None => settle(&mut pipelines).await,
        };
        pipelines.detach_all();

        match &settled {
            Ok(()) => info!("Startup complete"),
            Err(error) => warn!(%error, "Startup failed"),
        }
        settled
    }

    /// Deactivates every activated service.
    ///
    /// Deactivate hooks run concurrently. A failing or panicking hook is logged
    /// and the service is still removed and marked deactivated. Pipelines that
    /// finish activating afterwards run their own deactivate hook.
    pub async fn shutdown(&self) -> Result<(), ContainerError> {
        let deactivations = self
            .call(|respond_to| ContainerRequest::BeginShutdown { respond_to })
            .await?;

        let mut hooks = JoinSet::new();
        for Deactivation { id, instance, hook } in deactivations {
            let span = info_span!("deactivate", service = %id);
            let client = self.clone();
            hooks.spawn(
                async move {
                    if let Some(hook) = hook {
                        pipeline::deactivate(hook, instance).await;
                    }
                    client.deactivated(&id).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = hooks.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(error) => warn!(%error, "Deactivation task failed"),
            }
        }
        info!("Shutdown complete");
        Ok(())
    }

    pub(crate) async fn await_dependencies(
        &self,
        id: &str,
    ) -> Result<oneshot::Receiver<()>, ContainerError> {
        self.call(|respond_to| ContainerRequest::AwaitDependencies {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    /// Resolves declared injections into call arguments.
    pub(crate) async fn arguments(&self, args: &[Injection]) -> Result<Arguments, ContainerError> {
        if args.is_empty() {
            return Ok(Arguments::default());
        }
        let resolved = self
            .call(|respond_to| ContainerRequest::ResolveArguments {
                args: args.to_vec(),
                respond_to,
            })
            .await?;
        let arguments = resolved
            .into_iter()
            .map(|arg| match arg {
                Resolved::Unbound => Argument::Unbound,
                Resolved::Service { id, instance } => Argument::Service { id, instance },
                Resolved::Interface(name) => Argument::Implementers(LiveList::new(name, self.sender.downgrade())),
            })
            .collect();
        Ok(Arguments::new(arguments))
    }

    pub(crate) fn config_value(&self, config_id: &str) -> Option<toml::Value> {
        self.values.get(config_id).cloned()
    }

    pub(crate) async fn activated(&self, id: &str, instance: Instance) -> Result<(), ContainerError> {
        self.call(|respond_to| ContainerRequest::Activated {
            id: id.to_string(),
            instance,
            respond_to,
        })
        .await
    }

    pub(crate) async fn deactivated(&self, id: &str) -> Result<(), ContainerError> {
        debug!(service = %id, "Reporting deactivation");
        self.call(|respond_to| ContainerRequest::Deactivated {
            id: id.to_string(),
            respond_to,
        })
        .await
    }
}

async fn settle(pipelines: &mut JoinSet<Result<(), ContainerError>>) -> Result<(), ContainerError> {
    while let Some(joined) = pipelines.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(error),
            Err(error) => return Err(ContainerError::Pipeline(error.to_string())),
        }
    }
    Ok(())
}

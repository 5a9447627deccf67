//! Activation pipeline for a single service.

use tracing::{debug, info, warn, Instrument};

use crate::client::ContainerClient;
use crate::error::ContainerError;
use crate::instance::{Arguments, Instance};
use crate::record::{LifecycleHook, ServiceRecord};

/// Waits for the service's dependencies, builds it, runs its setters and
/// activate hook, then reports it activated.
pub(crate) async fn activate(client: ContainerClient, record: ServiceRecord) -> Result<(), ContainerError> {
    let ready = client.await_dependencies(&record.id).await?;
    if ready.await.is_err() {
        debug!("Released without its dependencies");
        return Err(ContainerError::Pipeline(format!(
            "{} was abandoned before its dependencies resolved",
            record.id
        )));
    }

    let instance = instantiate(&client, &record).await?;

    for method in &record.injectable_methods {
        let args = client.arguments(&method.args).await?;
        debug!(method = %method.name, args = args.len(), "Injecting");
        (method.call)(instance.clone(), args)
            .await
            .map_err(|source| ContainerError::Injection {
                id: record.id.clone(),
                method: method.name.clone(),
                source,
            })?;
    }

    if let Some(hook) = &record.activate {
        debug!(hook = %hook.name, "Running activate hook");
        (hook.call)(instance.clone(), Arguments::default())
            .await
            .map_err(|source| ContainerError::Activation {
                id: record.id.clone(),
                source,
            })?;
    }

    match client.activated(&record.id, instance.clone()).await {
        Ok(()) => {}
        Err(ContainerError::ShuttingDown(id)) => {
            // Shutdown has already passed this service by.
            if let Some(hook) = record.deactivate.clone() {
                deactivate(hook, instance).await;
            }
            client.deactivated(&id).await?;
            return Err(ContainerError::ShuttingDown(id));
        }
        Err(error) => return Err(error),
    }
    info!("Service ready");
    Ok(())
}

/// Runs a deactivate hook in a task of its own. Failures and panics are
/// logged and never returned.
pub(crate) async fn deactivate(hook: LifecycleHook, instance: Instance) {
    let LifecycleHook { name, call } = hook;
    debug!(hook = %name, "Running deactivate hook");
    let task = tokio::spawn(async move { call(instance, Arguments::default()).await }.in_current_span());
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(hook = %name, %error, "Deactivation failed"),
        Err(error) => warn!(hook = %name, %error, "Deactivate hook panicked"),
    }
}

async fn instantiate(client: &ContainerClient, record: &ServiceRecord) -> Result<Instance, ContainerError> {
    let Some(factory) = &record.factory else {
        return record
            .class_ref
            .construct()
            .ok_or_else(|| ContainerError::NotConstructible(record.id.clone()));
    };

    let config = match &record.config_id {
        Some(config_id) => {
            let value = client.config_value(config_id);
            if value.is_none() {
                warn!(config = %config_id, "No configuration value found");
            }
            value
        }
        None => None,
    };
    let args = client.arguments(&factory.args).await?;
    debug!(factory = %factory.name, args = args.len(), "Calling factory");
    (factory.call)(config, args)
        .await
        .map_err(|source| ContainerError::Instantiation {
            id: record.id.clone(),
            source,
        })
}

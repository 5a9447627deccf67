use service_framework::{
    Bootstrap, ConfigError, ContainerActor, ContainerClient, ContainerError, MetadataError, RuntimeConfig,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::CastDirectory;
use crate::services;

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("Container task failed: {0}")]
    Task(String),
}

/// The running production: a started container and the facades over it.
pub struct ProductionSystem {
    pub container: ContainerClient,

    pub directory: CastDirectory,

    handle: JoinHandle<()>,
}

impl ProductionSystem {
    /// Scans the troupe, applies the configured overrides, registers every
    /// service and starts them.
    pub async fn start(config: &RuntimeConfig) -> Result<Self, SystemError> {
        let mut bootstrap = Bootstrap::new();
        services::scan_all(&mut bootstrap);
        let records = bootstrap.records()?;
        let records = config.apply_overrides(records, bootstrap.identities_mut())?;

        let (actor, container) = ContainerActor::from_config(config);
        let handle = tokio::spawn(actor.run());

        for record in records {
            let id = record.id.clone();
            if !container.register(record).await? {
                warn!(service = %id, "Duplicate service id ignored");
            }
        }

        if let Err(e) = container.startup().await {
            error!(error = %e, "Startup failed, stopping what did start");
            if let Err(shutdown) = container.shutdown().await {
                warn!(error = %shutdown, "Shutdown after failed startup also failed");
            }
            return Err(e.into());
        }

        Ok(Self {
            directory: CastDirectory::new(container.clone()),
            container,
            handle,
        })
    }

    pub async fn shutdown(self) -> Result<(), SystemError> {
        info!("Shutting down production...");
        self.container.shutdown().await?;

        drop(self.directory);
        drop(self.container);

        if let Err(e) = self.handle.await {
            error!("Container task failed: {:?}", e);
            return Err(SystemError::Task(e.to_string()));
        }

        info!("Production shutdown complete.");
        Ok(())
    }
}

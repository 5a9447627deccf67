use async_trait::async_trait;
use service_framework::{ContainerClient, ContainerError, ServiceClient};
use tracing::{debug, instrument};

use crate::services::{Agent, Booking, Stage, StageSettings, ACTOR_INTERFACE};

#[derive(Debug, thiserror::Error)]
pub enum CastError {
    #[error("{0} is not part of the production")]
    Missing(String),
    #[error("Container communication error: {0}")]
    Container(String),
}

/// Read-only view of the production's cast, backed by the container.
#[derive(Clone)]
pub struct CastDirectory {
    inner: ContainerClient,
}

impl CastDirectory {
    pub fn new(inner: ContainerClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ServiceClient for CastDirectory {
    type Error = CastError;

    fn container(&self) -> &ContainerClient {
        &self.inner
    }

    fn map_error(e: ContainerError) -> Self::Error {
        match e {
            ContainerError::NotFound(id) => CastError::Missing(id),
            other => CastError::Container(other.to_string()),
        }
    }
}

impl CastDirectory {
    /// Ids of the performers currently on the bill, headliners first.
    #[instrument(skip(self))]
    pub async fn cast(&self) -> Result<Vec<String>, CastError> {
        debug!("Sending request");
        let performers = self.implementers(ACTOR_INTERFACE).await?;
        Ok(performers.iter().map(|handle| handle.id().to_string()).collect())
    }

    #[instrument(skip(self))]
    pub async fn agent_bookings(&self) -> Result<Vec<Booking>, CastError> {
        debug!("Sending request");
        let agent = self.lookup::<Agent>("agent").await?;
        Ok(agent.bookings())
    }

    #[instrument(skip(self))]
    pub async fn stage_settings(&self) -> Result<StageSettings, CastError> {
        debug!("Sending request");
        let stage = self.lookup::<Stage>("stage").await?;
        Ok(stage.settings.clone())
    }
}

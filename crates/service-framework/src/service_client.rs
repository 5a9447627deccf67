//! # ServiceClient Trait
//!
//! Common surface for application facades built on top of a [`ContainerClient`].
//! Implementors provide the container and an error mapping; typed lookups come
//! for free.
use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{ContainerClient, ContainerError, ServiceHandle};

#[async_trait]
pub trait ServiceClient: Send + Sync {
    type Error: Send + Sync;

    fn container(&self) -> &ContainerClient;

    fn map_error(e: ContainerError) -> Self::Error;

    #[tracing::instrument(skip(self))]
    async fn is_live(&self, id: &str) -> Result<bool, Self::Error> {
        tracing::debug!("Sending request");
        self.container().has(id).await.map_err(Self::map_error)
    }

    #[tracing::instrument(skip(self))]
    async fn lookup<T>(&self, id: &str) -> Result<Arc<T>, Self::Error>
    where
        T: Any + Send + Sync,
    {
        tracing::debug!("Sending request");
        self.container().resolve_as::<T>(id).await.map_err(Self::map_error)
    }

    #[tracing::instrument(skip(self))]
    async fn implementers(&self, interface: &str) -> Result<Vec<ServiceHandle>, Self::Error> {
        tracing::debug!("Sending request");
        self.container().query(interface).await.map_err(Self::map_error)
    }
}

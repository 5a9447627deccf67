//! # Service Framework
//!
//! An in-process service runtime. Component types declare themselves through
//! annotations (a service id, factories, lifecycle hooks and the dependencies of
//! their parameters); the framework aggregates those annotations per component,
//! normalizes them into [`ServiceRecord`]s, and a container actor starts the
//! resulting services concurrently while honoring their dependencies.
//!
//! ## Architecture Overview
//!
//! Data flows through five layers during a bootstrap pass:
//!
//! 1. **Identity** ([`IdentityRegistry`]) - a stable [`Gid`] per declared component type
//! 2. **Aggregation** ([`MetadataAggregator`]) - annotations grouped into one [`ClassAggregate`] per gid
//! 3. **Normalization** ([`normalize`]) - an aggregate flattened into a [`ServiceRecord`]
//! 4. **Tracking** ([`DependencyTracker`]) - who waits on which services and interfaces
//! 5. **Container** ([`ContainerActor`] + [`ContainerClient`]) - records, instances and lifecycle
//!
//! The first three are driven by [`Bootstrap`]; the container is the long-lived
//! runtime object afterwards.
//!
//! ## Dependencies
//!
//! A parameter can depend on a **service** by id, or on the implementers of an
//! **interface** with a minimum count. A service is only instantiated once every
//! service it names is activated and every interface it names has at least the
//! minimum number of activated implementers. Interface parameters receive a
//! [`LiveList`] that always reflects the currently activated implementers.
//!
//! ## Concurrency Model
//!
//! The [`ContainerActor`] owns all container state and processes requests
//! sequentially, so registration, activation bookkeeping and dependency release
//! need no locks. Each service's activation runs in its own Tokio task and talks
//! to the container through a cloned [`ContainerClient`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use service_framework::{Bootstrap, Component, ContainerActor, Declarer, ServiceDecl};
//!
//! struct Engine;
//!
//! impl Component for Engine {
//!     fn construct() -> Option<Self> {
//!         Some(Engine)
//!     }
//!
//!     fn declare(d: &mut Declarer<'_, Self>) {
//!         d.service(ServiceDecl::new("engine").interface("part"));
//!     }
//! }
//!
//! struct Car {
//!     engine: Arc<Engine>,
//! }
//!
//! impl Component for Car {
//!     fn declare(d: &mut Declarer<'_, Self>) {
//!         d.service(ServiceDecl::new("car"));
//!         d.factory("assemble", |_config, args| async move {
//!             Ok(Car { engine: args.service::<Engine>(0)? })
//!         })
//!         .depends_on(0, "engine");
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut bootstrap = Bootstrap::new();
//! bootstrap.scan::<Car>().scan::<Engine>();
//!
//! let (actor, client) = ContainerActor::new(16);
//! tokio::spawn(actor.run());
//! for record in bootstrap.records().unwrap() {
//!     client.register(record).await.unwrap();
//! }
//! client.startup().await.unwrap();
//!
//! let car = client.resolve_as::<Car>("car").await.unwrap();
//! assert!(Arc::ptr_eq(&car.engine, &client.resolve_as::<Engine>("engine").await.unwrap()));
//! assert_eq!(client.query("part").await.unwrap().len(), 1);
//!
//! client.shutdown().await.unwrap();
//! # }
//! ```
//!
//! ## Testing
//!
//! Code that only consumes the container can be tested against the
//! [`mock::MockContainer`] instead of a running container.

pub mod actor;
pub mod client;
pub mod config;
pub mod declare;
pub mod error;
pub mod identity;
pub mod instance;
pub mod message;
pub mod metadata;
pub mod mock;
mod pipeline;
pub mod record;
pub mod service_client;
pub mod tracker;

pub use actor::{ContainerActor, ServiceStatus};
pub use client::ContainerClient;
pub use config::{ContainerSettings, RuntimeConfig, ServiceOverride};
pub use declare::{Bootstrap, Component, Declarer, DependencyDecl, MethodDeclarer, MethodRole, ServiceDecl};
pub use error::{BoxError, ConfigError, ContainerError, MetadataError};
pub use identity::{ClassRef, Gid, IdentityRegistry, OwnerToken, Target};
pub use instance::{Argument, Arguments, Instance, LiveList, ServiceHandle};
pub use message::ContainerRequest;
pub use metadata::{Annotation, AnnotationKind, ClassAggregate, MetadataAggregator, Payload};
pub use record::{normalize, Dependency, Injection, RecordOverrides, ServiceRecord};
pub use service_client::ServiceClient;
pub use tracker::{DependencyTracker, PendingService};

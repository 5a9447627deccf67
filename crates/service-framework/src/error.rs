//! # Framework Errors
//!
//! Error types shared by the metadata pipeline and the service container.
//! User code (factories, setters, hooks) reports failures as [`BoxError`], which
//! the container wraps with the id of the service that failed.

use crate::identity::Gid;
use crate::tracker::PendingService;

/// Boxed error returned by user supplied factories, setters and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while turning aggregated metadata into service records.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Component {gid} has {found} service declarations, expected exactly one")]
    Cardinality { gid: Gid, found: usize },
}

/// Errors that can occur within the service container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Container closed")]
    ActorClosed,
    #[error("Container dropped response channel")]
    ActorDropped,
    #[error("Service not found: {0}")]
    NotFound(String),
    #[error("Service {0} has no factory and its type has no constructor")]
    NotConstructible(String),
    #[error("Service {id} failed to instantiate: {source}")]
    Instantiation {
        id: String,
        #[source]
        source: BoxError,
    },
    #[error("Service {id} failed in injectable method {method}: {source}")]
    Injection {
        id: String,
        method: String,
        #[source]
        source: BoxError,
    },
    #[error("Service {id} failed to activate: {source}")]
    Activation {
        id: String,
        #[source]
        source: BoxError,
    },
    #[error("Instance is not a {expected}")]
    TypeMismatch { expected: &'static str },
    #[error("Argument {index} is not {expected}")]
    ArgumentMismatch { index: usize, expected: &'static str },
    #[error("Startup stalled on unresolved dependencies: {}", describe_pending(.0))]
    UnsatisfiedDependency(Vec<PendingService>),
    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("Activation pipeline aborted: {0}")]
    Pipeline(String),
    #[error("Service {0} finished activating after shutdown began")]
    ShuttingDown(String),
}

fn describe_pending(pending: &[PendingService]) -> String {
    pending
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while loading runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Service {id} derives from unknown service {base}")]
    UnknownBase { id: String, base: String },
}

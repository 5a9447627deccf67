//! Wiring and lifecycle of the running production.

pub mod production;
pub mod tracing;

pub use production::{ProductionSystem, SystemError};

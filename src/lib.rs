//! # Service Recipe
//!
//! A small production wired together by the [`service_framework`] container.
//!
//! ## Core Components
//!
//! - **[services]**: The components. `tobias` and `gob` implement the `actor`
//!   interface, the `agent` books at least two actors, and the `stage` is built
//!   from its configuration once the agent is ready.
//! - **[clients]**: [`CastDirectory`](clients::CastDirectory), a typed facade over the container.
//! - **[lifecycle]**: [`ProductionSystem`](lifecycle::ProductionSystem) scans, configures,
//!   registers and starts every service, and shuts them down again.
//!
//! ## Quick Start
//!
//! The binary loads `config/bundle.toml` (or the file named by
//! `SERVICE_RECIPE_CONFIG`), starts the production, reads the agent's bookings
//! and the stage, and shuts down.
//!
//! ## Testing
//!
//! See [`service_framework::mock`] for testing facades without a running container.

pub mod clients;
pub mod lifecycle;
pub mod services;

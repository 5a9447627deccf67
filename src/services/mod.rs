//! The troupe: every component the production registers.

pub mod actors;
pub mod agent;
pub mod stage;

pub use actors::{Gob, Tobias, ACTOR_INTERFACE};
pub use agent::{Agent, Booking};
pub use stage::{Stage, StageSettings};

use service_framework::Bootstrap;

/// Scans every component of the production into `bootstrap`.
pub fn scan_all(bootstrap: &mut Bootstrap) {
    bootstrap
        .scan::<Agent>()
        .scan::<Tobias>()
        .scan::<Gob>()
        .scan::<Stage>();
}

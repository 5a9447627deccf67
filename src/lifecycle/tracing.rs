//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the `tracing` subscriber for the whole production.
//! Log levels come from `RUST_LOG`; the compact format hides module paths and
//! shows spans inline.
//!
//! ```bash
//! # Registration, activation and shutdown of every service
//! RUST_LOG=info cargo run
//!
//! # Also dependency binding, argument resolution and injected payloads
//! RUST_LOG=debug cargo run
//! ```
//!
//! Each activation pipeline runs inside an `activate` span carrying the service
//! id, so everything a service logs while starting is attributed to it:
//!
//! ```text
//! INFO Registered service="gob" gid=2 priority=100 disabled=false
//! INFO Startup begins services=4
//! INFO activate:  Illusion ready name="Gob Bluth" service="gob"
//! INFO Activated service="gob" live=1
//! INFO activate: Service ready service="gob"
//! INFO activate: Curtain up stage="Main Stage" capacity=300 lineup=["gob", "tobias"] service="stage"
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

//! The two performers of the troupe. Both implement the `actor` interface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use service_framework::{Component, Declarer, ServiceDecl, ServiceHandle};
use tracing::info;

pub const ACTOR_INTERFACE: &str = "actor";

/// Always ready; needs no warm-up.
#[derive(Debug)]
pub struct Tobias {
    pub name: String,
}

impl Component for Tobias {
    fn construct() -> Option<Self> {
        Some(Self {
            name: "Tobias Fünke".to_string(),
        })
    }

    fn declare(d: &mut Declarer<'_, Self>) {
        d.service(ServiceDecl::new("tobias").interface(ACTOR_INTERFACE));
    }
}

/// Headliner. Only on stage once his activate hook has run.
#[derive(Debug)]
pub struct Gob {
    pub name: String,
    on_stage: AtomicBool,
}

impl Gob {
    pub fn is_on_stage(&self) -> bool {
        self.on_stage.load(Ordering::SeqCst)
    }
}

impl Component for Gob {
    fn construct() -> Option<Self> {
        Some(Self {
            name: "Gob Bluth".to_string(),
            on_stage: AtomicBool::new(false),
        })
    }

    fn declare(d: &mut Declarer<'_, Self>) {
        d.service(ServiceDecl::new("gob").interface(ACTOR_INTERFACE).priority(100));
        d.activate("take_the_stage", |gob: Arc<Gob>| async move {
            gob.on_stage.store(true, Ordering::SeqCst);
            info!(name = %gob.name, "Illusion ready");
            Ok(())
        });
        d.deactivate("exit_stage", |gob: Arc<Gob>| async move {
            gob.on_stage.store(false, Ordering::SeqCst);
            Ok(())
        });
    }
}

/// Whether the performer behind `handle` is ready to be booked.
pub fn is_ready(handle: &ServiceHandle) -> bool {
    match handle.downcast::<Gob>() {
        Some(gob) => gob.is_on_stage(),
        None => handle.downcast::<Tobias>().is_some(),
    }
}

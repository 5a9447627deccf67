//! The talent agent books every performer implementing the `actor` interface.

use std::sync::{Arc, Mutex};

use service_framework::{Arguments, BoxError, Component, Declarer, LiveList, ServiceDecl};
use tracing::{debug, info};

use super::actors::{is_ready, ACTOR_INTERFACE};

/// A performer as the agent saw it when booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: String,
    pub ready: bool,
}

#[derive(Debug, Default)]
pub struct Agent {
    bookings: Mutex<Vec<Booking>>,
    performers: Mutex<Option<LiveList>>,
}

impl Agent {
    /// Performers booked during injection, headliners first.
    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings
            .lock()
            .map(|bookings| bookings.clone())
            .unwrap_or_default()
    }

    /// The live performer list, if it has been injected.
    pub fn performers(&self) -> Option<LiveList> {
        self.performers.lock().ok().and_then(|list| list.clone())
    }

    async fn book(self: Arc<Self>, args: Arguments) -> Result<(), BoxError> {
        let performers = args.implementers(0)?;
        let bookings: Vec<Booking> = performers
            .snapshot()
            .await?
            .iter()
            .map(|handle| Booking {
                id: handle.id().to_string(),
                ready: is_ready(handle),
            })
            .collect();
        debug!(?bookings, "Booked performers");

        *self.bookings.lock().map_err(|_| "bookings lock poisoned")? = bookings;
        *self.performers.lock().map_err(|_| "performer lock poisoned")? = Some(performers);
        Ok(())
    }
}

impl Component for Agent {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }

    fn declare(d: &mut Declarer<'_, Self>) {
        d.service(ServiceDecl::new("agent").priority(-1));
        d.inject("set_actors", |agent: Arc<Agent>, args| agent.book(args))
            .implementers(0, ACTOR_INTERFACE, Some(2));
        d.activate("open_office", |agent: Arc<Agent>| async move {
            info!(performers = agent.bookings().len(), "Agency open");
            Ok(())
        });
    }
}

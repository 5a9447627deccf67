//! The venue. Built by a factory from its configuration value, and only once
//! the agent has booked the performers.

use std::sync::Arc;

use serde::Deserialize;
use service_framework::{Arguments, BoxError, Component, Declarer, ServiceDecl};
use tracing::info;

use super::agent::Agent;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub name: String,
    pub capacity: u32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            name: "Rehearsal Room".to_string(),
            capacity: 20,
        }
    }
}

#[derive(Debug)]
pub struct Stage {
    pub settings: StageSettings,
    pub lineup: Vec<String>,
}

impl Stage {
    async fn build(config: Option<toml::Value>, args: Arguments) -> Result<Stage, BoxError> {
        let settings = match config {
            Some(value) => value.try_into::<StageSettings>()?,
            None => StageSettings::default(),
        };
        let agent = args.service::<Agent>(0)?;
        let lineup = agent.bookings().into_iter().map(|booking| booking.id).collect();
        Ok(Stage { settings, lineup })
    }
}

impl Component for Stage {
    fn declare(d: &mut Declarer<'_, Self>) {
        d.service(ServiceDecl::new("stage").priority(10));
        d.factory("build", Stage::build).depends_on(0, "agent");
        d.activate("raise_curtain", |stage: Arc<Stage>| async move {
            info!(
                stage = %stage.settings.name,
                capacity = stage.settings.capacity,
                lineup = ?stage.lineup,
                "Curtain up"
            );
            Ok(())
        });
    }
}

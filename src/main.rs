use service_framework::{RuntimeConfig, ServiceClient};
use service_recipe::lifecycle::tracing::setup_tracing;
use service_recipe::lifecycle::ProductionSystem;
use tracing::{info, Instrument};

const CONFIG_ENV: &str = "SERVICE_RECIPE_CONFIG";
const DEFAULT_CONFIG: &str = "config/bundle.toml";

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = RuntimeConfig::load(&path).map_err(|e| e.to_string())?;

    info!(config = %path, "Starting production");
    let system = ProductionSystem::start(&config)
        .await
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("casting");
    let bookings = async {
        info!("Asking the agent for the lineup");
        system
            .directory
            .agent_bookings()
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;

    for booking in &bookings {
        info!(performer = %booking.id, ready = booking.ready, "Booked");
    }

    let stage = system
        .directory
        .stage_settings()
        .await
        .map_err(|e| e.to_string())?;
    info!(stage = %stage.name, capacity = stage.capacity, "Tonight's venue");

    let understudy = system
        .directory
        .is_live("understudy")
        .await
        .map_err(|e| e.to_string())?;
    info!(understudy, "Understudy standing by");

    system.shutdown().await.map_err(|e| e.to_string())?;

    info!("Application finished successfully");
    Ok(())
}

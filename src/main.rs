use anyhow::Context;
use dae_meter_bridge::poll_coordinator::PollStatus;
use dae_meter_bridge::{BridgeConfig, ConfigFlow, FlowResult, HostRegistry, MeterSensor};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting DAE meter bridge");
    let config = BridgeConfig::from_env()?;
    let mut registry = HostRegistry::new(config.client_settings());

    let entry = match ConfigFlow::new()
        .step_creds(&mut registry, config.credentials.clone())
        .await
    {
        FlowResult::CreateEntry(entry) => entry,
        FlowResult::Form { errors, .. } => {
            anyhow::bail!("DAE account could not be configured: {errors:?}")
        }
        FlowResult::Abort { reason } => anyhow::bail!("DAE setup aborted: {reason}"),
    };

    let sensors = registry
        .setup_entry(&entry.entry_id)
        .await
        .context("initial DAE poll failed")?;
    for sensor in &sensors {
        info!(
            unique_id = sensor.unique_id(),
            channel_id = sensor.channel_id(),
            name = %sensor.device_info().name,
            model = %sensor.device_info().model,
            unit = %sensor.native_unit_of_measurement(),
            "registered meter sensor"
        );
    }
    report(&sensors);

    let coordinator = registry
        .coordinator(&entry.entry_id)
        .context("coordinator missing after setup")?;
    let mut updates = coordinator.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("poll coordinator stopped");
                    break;
                }
                let status = updates.borrow_and_update().status.clone();
                match status {
                    PollStatus::Idle => report(&sensors),
                    PollStatus::Failed(error) => {
                        warn!(%error, "poll failed, sensors keep their last readings")
                    }
                    PollStatus::Fetching => {}
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutting down DAE meter bridge");
                break;
            }
        }
    }

    registry.unload_entry(&entry.entry_id);
    Ok(())
}

fn report(sensors: &[MeterSensor]) {
    for sensor in sensors {
        info!(
            unique_id = sensor.unique_id(),
            value = ?sensor.native_value(),
            disconnected = ?sensor.disconnected(),
            "meter reading"
        );
    }
}

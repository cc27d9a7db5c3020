use crate::dae_types::{MeterDevice, Snapshot};
use crate::errors::HostError;
use crate::host::DOMAIN;
use crate::poll_coordinator::CoordinatorHandle;
use std::fmt;

pub const MANUFACTURER: &str = "DAE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfVolume {
    Gallons,
}

impl fmt::Display for UnitOfVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfVolume::Gallons => write!(f, "gal"),
        }
    }
}

/// Maps the vendor's unit labels onto the host's units.
pub fn map_unit(label: &str) -> Result<UnitOfVolume, HostError> {
    match label {
        "Gallon" => Ok(UnitOfVolume::Gallons),
        other => Err(HostError::UnhandledUnit(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorDeviceClass {
    Water,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStateClass {
    TotalIncreasing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// One water meter exposed to the host, reading through the coordinator.
#[derive(Debug, Clone)]
pub struct MeterSensor {
    unique_id: String,
    channel_id: i64,
    unit: UnitOfVolume,
    device_info: DeviceInfo,
    coordinator: CoordinatorHandle,
}

impl MeterSensor {
    pub const DEVICE_CLASS: SensorDeviceClass = SensorDeviceClass::Water;
    pub const STATE_CLASS: SensorStateClass = SensorStateClass::TotalIncreasing;

    pub fn new(device: &MeterDevice, coordinator: CoordinatorHandle) -> Result<Self, HostError> {
        let channel_id = device.meter.channel_id;
        Ok(Self {
            unique_id: format!("dae_meter_{channel_id}"),
            channel_id,
            unit: map_unit(&device.meter.unit)?,
            device_info: DeviceInfo {
                identifiers: (DOMAIN.to_string(), channel_id.to_string()),
                name: device.channel.channel_name.clone(),
                manufacturer: MANUFACTURER.to_string(),
                model: device.channel.model.clone(),
            },
            coordinator,
        })
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn native_unit_of_measurement(&self) -> UnitOfVolume {
        self.unit
    }

    /// Latest reading for this channel, `None` when the current snapshot lacks it.
    pub fn native_value(&self) -> Option<f64> {
        self.with_device(|device| device.meter.value)
    }

    pub fn disconnected(&self) -> Option<bool> {
        self.with_device(|device| device.meter.disconnected)
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.native_value().is_some()
    }

    fn with_device<T>(&self, read: impl FnOnce(&MeterDevice) -> T) -> Option<T> {
        let snapshot = self.coordinator.data()?;
        snapshot.get(&self.channel_id).map(read)
    }
}

/// Builds one sensor per meter device in the snapshot.
pub fn sensors_for_snapshot(
    snapshot: &Snapshot,
    coordinator: &CoordinatorHandle,
) -> Result<Vec<MeterSensor>, HostError> {
    snapshot
        .values()
        .map(|device| MeterSensor::new(device, coordinator.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dae_types::{Channel, Meter};
    use crate::errors::DaeResult;
    use crate::poll_coordinator::{PollCoordinator, SnapshotSource, DEFAULT_UPDATE_INTERVAL};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    fn device(id: i64, unit: &str, value: f64, disconnected: bool) -> MeterDevice {
        MeterDevice {
            channel: Channel {
                channel_id: id,
                channel_name: format!("Meter {id}"),
                model: "DAE-V100".to_string(),
                ..Default::default()
            },
            meter: Meter {
                unit: unit.to_string(),
                value,
                channel_id: id,
                timestamp: "2024-05-01 10:00:00".to_string(),
                disconnected,
            },
        }
    }

    struct QueuedSource(VecDeque<Snapshot>);

    #[async_trait]
    impl SnapshotSource for QueuedSource {
        async fn fetch_snapshot(&mut self) -> DaeResult<Snapshot> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    #[test]
    fn test_map_unit() {
        assert_eq!(map_unit("Gallon").unwrap(), UnitOfVolume::Gallons);
        assert!(matches!(
            map_unit("Furlong"),
            Err(HostError::UnhandledUnit(unit)) if unit == "Furlong"
        ));
    }

    #[tokio::test]
    async fn test_sensor_metadata_and_value() {
        let snapshot = Snapshot::from([(1042, device(1042, "Gallon", 15320.0, true))]);
        let mut coordinator = PollCoordinator::new(
            "dae",
            QueuedSource(VecDeque::from([snapshot.clone()])),
            DEFAULT_UPDATE_INTERVAL,
        );
        coordinator.first_refresh().await.unwrap();

        let sensors = sensors_for_snapshot(&snapshot, &coordinator.handle()).unwrap();
        assert_eq!(sensors.len(), 1);
        let sensor = &sensors[0];

        assert_eq!(sensor.unique_id(), "dae_meter_1042");
        assert_eq!(sensor.channel_id(), 1042);
        assert_eq!(
            sensor.device_info(),
            &DeviceInfo {
                identifiers: ("dae".to_string(), "1042".to_string()),
                name: "Meter 1042".to_string(),
                manufacturer: "DAE".to_string(),
                model: "DAE-V100".to_string(),
            }
        );
        assert_eq!(sensor.native_unit_of_measurement(), UnitOfVolume::Gallons);
        assert_eq!(sensor.native_value(), Some(15320.0));
        assert_eq!(sensor.disconnected(), Some(true));
        assert!(sensor.available());
    }

    #[tokio::test]
    async fn test_sensor_follows_coordinator_refresh() {
        let first = Snapshot::from([(7, device(7, "Gallon", 100.0, false))]);
        let second = Snapshot::from([(7, device(7, "Gallon", 112.5, false))]);
        let mut coordinator = PollCoordinator::new(
            "dae",
            QueuedSource(VecDeque::from([first.clone(), second, Snapshot::new()])),
            DEFAULT_UPDATE_INTERVAL,
        );
        coordinator.first_refresh().await.unwrap();
        let sensor = MeterSensor::new(&first[&7], coordinator.handle()).unwrap();
        assert_eq!(sensor.native_value(), Some(100.0));

        coordinator.refresh().await.unwrap();
        assert_eq!(sensor.native_value(), Some(112.5));

        coordinator.refresh().await.unwrap();
        assert_eq!(sensor.native_value(), None);
        assert!(!sensor.available());
    }

    #[tokio::test]
    async fn test_unknown_unit_fails_sensor_creation() {
        let snapshot = Snapshot::from([(3, device(3, "Litre", 1.0, false))]);
        let mut coordinator = PollCoordinator::new(
            "dae",
            QueuedSource(VecDeque::from([snapshot.clone()])),
            DEFAULT_UPDATE_INTERVAL,
        );
        coordinator.first_refresh().await.unwrap();

        let result = sensors_for_snapshot(&snapshot, &coordinator.handle());
        assert!(matches!(result, Err(HostError::UnhandledUnit(_))));
    }
}

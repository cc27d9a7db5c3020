use crate::dae_client::{DaeClient, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT};
use crate::dae_types::Credentials;
use crate::errors::{DaeResult, HostError};
use crate::poll_coordinator::{CoordinatorHandle, PollCoordinator, DEFAULT_UPDATE_INTERVAL};
use crate::sensor::{sensors_for_snapshot, MeterSensor};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub const DOMAIN: &str = "dae";

/// Stored configuration for one DAE account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub unique_id: String,
    pub title: String,
    pub data: Credentials,
}

/// How clients and coordinators built by the registry talk to DAE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint_url: String,
    pub request_timeout: Duration,
    pub update_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

struct LoadedEntry {
    coordinator: CoordinatorHandle,
    sensors: Vec<MeterSensor>,
    task: JoinHandle<()>,
}

/// Process-owned store of config entries and the coordinators running for them.
pub struct HostRegistry {
    settings: ClientSettings,
    entries: HashMap<String, ConfigEntry>,
    loaded: HashMap<String, LoadedEntry>,
}

impl HostRegistry {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
            loaded: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn client_for(&self, credentials: Credentials) -> DaeResult<DaeClient> {
        DaeClient::with_endpoint(
            credentials,
            self.settings.endpoint_url.clone(),
            self.settings.request_timeout,
        )
    }

    pub fn add_entry(
        &mut self,
        unique_id: impl Into<String>,
        title: impl Into<String>,
        data: Credentials,
    ) -> &ConfigEntry {
        let entry_id = Uuid::new_v4().to_string();
        let entry = ConfigEntry {
            entry_id: entry_id.clone(),
            unique_id: unique_id.into(),
            title: title.into(),
            data,
        };
        debug!(entry_id = %entry_id, unique_id = %entry.unique_id, "config entry added");
        self.entries.entry(entry_id).or_insert(entry)
    }

    pub fn entry(&self, entry_id: &str) -> Option<&ConfigEntry> {
        self.entries.get(entry_id)
    }

    pub fn entry_by_unique_id(&self, unique_id: &str) -> Option<&ConfigEntry> {
        self.entries
            .values()
            .find(|entry| entry.unique_id == unique_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values()
    }

    /// Builds the client and coordinator for an entry and waits for the first
    /// refresh. Nothing is kept if that refresh fails.
    pub async fn setup_entry(&mut self, entry_id: &str) -> Result<Vec<MeterSensor>, HostError> {
        let credentials = self
            .entries
            .get(entry_id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| HostError::UnknownEntry(entry_id.to_string()))?;
        self.unload_entry(entry_id);

        let client = self.client_for(credentials).map_err(HostError::Client)?;
        let mut coordinator = PollCoordinator::new(DOMAIN, client, self.settings.update_interval);
        coordinator
            .first_refresh()
            .await
            .map_err(|source| HostError::NotReady {
                entry_id: entry_id.to_string(),
                source,
            })?;

        let handle = coordinator.handle();
        let snapshot = handle.data().unwrap_or_default();
        let sensors = sensors_for_snapshot(&snapshot, &handle)?;
        let task = coordinator.spawn();

        info!(entry_id, sensors = sensors.len(), "config entry set up");
        self.loaded.insert(
            entry_id.to_string(),
            LoadedEntry {
                coordinator: handle,
                sensors: sensors.clone(),
                task,
            },
        );
        Ok(sensors)
    }

    pub fn coordinator(&self, entry_id: &str) -> Option<CoordinatorHandle> {
        self.loaded
            .get(entry_id)
            .map(|loaded| loaded.coordinator.clone())
    }

    pub fn sensors(&self, entry_id: &str) -> &[MeterSensor] {
        self.loaded
            .get(entry_id)
            .map(|loaded| loaded.sensors.as_slice())
            .unwrap_or_default()
    }

    /// Stops polling for an entry. Returns whether it was loaded.
    pub fn unload_entry(&mut self, entry_id: &str) -> bool {
        match self.loaded.remove(entry_id) {
            Some(loaded) => {
                loaded.task.abort();
                info!(entry_id, "config entry unloaded");
                true
            }
            None => false,
        }
    }

    pub async fn reload_entry(&mut self, entry_id: &str) -> Result<Vec<MeterSensor>, HostError> {
        self.unload_entry(entry_id);
        self.setup_entry(entry_id).await
    }

    /// Replaces the stored credentials and reloads the entry with them.
    pub async fn update_entry(
        &mut self,
        entry_id: &str,
        data: Credentials,
    ) -> Result<Vec<MeterSensor>, HostError> {
        let entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| HostError::UnknownEntry(entry_id.to_string()))?;
        entry.data = data;
        self.reload_entry(entry_id).await
    }

    pub fn remove_entry(&mut self, entry_id: &str) -> Option<ConfigEntry> {
        self.unload_entry(entry_id);
        self.entries.remove(entry_id)
    }
}

impl Drop for HostRegistry {
    fn drop(&mut self) {
        for loaded in self.loaded.values() {
            loaded.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    const PATH: &str = "/ws/home-owner.php";

    fn registry_for(server: &ServerGuard) -> HostRegistry {
        HostRegistry::new(ClientSettings {
            endpoint_url: format!("{}{}", server.url(), PATH),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        })
    }

    async fn vendor_mocks(server: &mut ServerGuard, unit: &str) -> Vec<Mock> {
        let login = server
            .mock("POST", PATH)
            .match_body(Matcher::UrlEncoded("d".into(), "login".into()))
            .with_status(200)
            .with_header("set-cookie", "PHPSESSID=sess-1; path=/")
            .with_body(json!({"result": true, "message": "ok", "data": null}).to_string())
            .create_async()
            .await;
        let channels = server
            .mock("POST", PATH)
            .match_body(Matcher::UrlEncoded("d".into(), "channel".into()))
            .with_status(200)
            .with_body(
                json!({"result": true, "message": "", "data": [[{
                    "channel-id": 5,
                    "channel-name": "Cabin",
                    "email": "owner@example.com",
                    "device-type": 1,
                    "model": "DAE-V100",
                    "project-name": "Pines",
                    "mac-address": "AA:BB:CC:00:00:05"
                }]]})
                .to_string(),
            )
            .create_async()
            .await;
        let meters = server
            .mock("POST", PATH)
            .match_body(Matcher::UrlEncoded("d".into(), "data".into()))
            .with_status(200)
            .with_body(
                json!({"result": true, "message": "", "data": [{
                    "unit": unit,
                    "value": 4200,
                    "channel-id": 5,
                    "timestamp": "2024-05-01 10:00:00",
                    "disconnected": false
                }]})
                .to_string(),
            )
            .create_async()
            .await;
        vec![login, channels, meters]
    }

    #[tokio::test]
    async fn test_setup_entry_creates_sensor_per_meter() {
        let mut server = Server::new_async().await;
        let _mocks = vendor_mocks(&mut server, "Gallon").await;
        let mut registry = registry_for(&server);
        let entry_id = registry
            .add_entry("owner", "owner", Credentials::new("owner", "secret"))
            .entry_id
            .clone();

        let sensors = registry.setup_entry(&entry_id).await.unwrap();

        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].unique_id(), "dae_meter_5");
        assert_eq!(sensors[0].device_info().name, "Cabin");
        assert_eq!(sensors[0].native_value(), Some(4200.0));
        assert_eq!(registry.sensors(&entry_id).len(), 1);

        let coordinator = registry.coordinator(&entry_id).unwrap();
        assert!(coordinator.last_update_success());

        assert!(registry.unload_entry(&entry_id));
        assert!(registry.coordinator(&entry_id).is_none());
        assert!(registry.entry(&entry_id).is_some());
    }

    #[tokio::test]
    async fn test_setup_entry_not_ready_on_rejected_login() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", PATH)
            .match_body(Matcher::UrlEncoded("d".into(), "login".into()))
            .with_status(200)
            .with_body(json!({"result": false, "message": "bad creds"}).to_string())
            .create_async()
            .await;
        let mut registry = registry_for(&server);
        let entry_id = registry
            .add_entry("owner", "owner", Credentials::new("owner", "wrong"))
            .entry_id
            .clone();

        let result = registry.setup_entry(&entry_id).await;

        assert!(matches!(result, Err(HostError::NotReady { .. })));
        assert!(registry.coordinator(&entry_id).is_none());
        assert!(registry.sensors(&entry_id).is_empty());
    }

    #[tokio::test]
    async fn test_setup_entry_rejects_unhandled_unit() {
        let mut server = Server::new_async().await;
        let _mocks = vendor_mocks(&mut server, "Hogshead").await;
        let mut registry = registry_for(&server);
        let entry_id = registry
            .add_entry("owner", "owner", Credentials::new("owner", "secret"))
            .entry_id
            .clone();

        let result = registry.setup_entry(&entry_id).await;
        assert!(matches!(result, Err(HostError::UnhandledUnit(unit)) if unit == "Hogshead"));
    }

    #[tokio::test]
    async fn test_unknown_entry() {
        let mut registry = HostRegistry::new(ClientSettings::default());
        let result = registry.setup_entry("missing").await;
        assert!(matches!(result, Err(HostError::UnknownEntry(_))));
        assert!(!registry.unload_entry("missing"));
    }

    #[tokio::test]
    async fn test_update_and_remove_entry() {
        let mut server = Server::new_async().await;
        let _mocks = vendor_mocks(&mut server, "Gallon").await;
        let mut registry = registry_for(&server);
        let entry_id = registry
            .add_entry("owner", "owner", Credentials::new("owner", "secret"))
            .entry_id
            .clone();
        registry.setup_entry(&entry_id).await.unwrap();

        let sensors = registry
            .update_entry(&entry_id, Credentials::new("owner", "rotated"))
            .await
            .unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(registry.entry(&entry_id).unwrap().data.password, "rotated");

        let removed = registry.remove_entry(&entry_id).unwrap();
        assert_eq!(removed.unique_id, "owner");
        assert!(registry.entry(&entry_id).is_none());
        assert!(registry.coordinator(&entry_id).is_none());
        assert_eq!(registry.entries().count(), 0);
    }
}

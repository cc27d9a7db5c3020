use crate::errors::{DaeError, DaeResult};
use serde_derive::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Vendor account credentials, fixed for the lifetime of a client.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Top level shape shared by every DAE response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    pub result: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl Envelope {
    pub fn from_body(body: &str) -> DaeResult<Self> {
        serde_json::from_str(body).map_err(DaeError::parse)
    }

    fn into_parts(self) -> DaeResult<(bool, String, Value)> {
        let data = self
            .data
            .ok_or_else(|| DaeError::Parse("response has no data".to_string()))?;
        Ok((self.result, self.message, data))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResult {
    pub result: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl From<Envelope> for LoginResult {
    fn from(envelope: Envelope) -> Self {
        Self {
            result: envelope.result,
            message: envelope.message,
            data: envelope.data,
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Channel {
    pub channel_id: i64,
    pub channel_name: String,
    pub email: String,
    pub device_type: i64,
    pub model: String,
    pub project_name: String,
    pub mac_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelListResult {
    pub result: bool,
    pub message: String,
    pub data: Vec<Channel>,
}

impl TryFrom<Envelope> for ChannelListResult {
    type Error = DaeError;

    // Channels arrive wrapped in an outer list holding a single inner list.
    fn try_from(envelope: Envelope) -> DaeResult<Self> {
        let (result, message, data) = envelope.into_parts()?;
        let nested: Vec<Vec<Channel>> = serde_json::from_value(data).map_err(DaeError::parse)?;
        let data = nested
            .into_iter()
            .next()
            .ok_or_else(|| DaeError::Parse("channel list is empty".to_string()))?;

        Ok(Self {
            result,
            message,
            data,
        })
    }
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Meter {
    pub unit: String,
    pub value: f64,
    pub channel_id: i64,
    pub timestamp: String,
    pub disconnected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterListResult {
    pub result: bool,
    pub message: String,
    pub data: Vec<Meter>,
}

impl TryFrom<Envelope> for MeterListResult {
    type Error = DaeError;

    fn try_from(envelope: Envelope) -> DaeResult<Self> {
        let (result, message, data) = envelope.into_parts()?;
        let data = serde_json::from_value(data).map_err(DaeError::parse)?;

        Ok(Self {
            result,
            message,
            data,
        })
    }
}

/// A channel together with its latest reading.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterDevice {
    pub channel: Channel,
    pub meter: Meter,
}

/// Meter devices keyed by channel id, rebuilt from scratch on every poll.
pub type Snapshot = BTreeMap<i64, MeterDevice>;

/// Pairs every reading with the channel of the same id.
///
/// A reading whose channel is missing fails the whole join.
pub fn join_channel_meters(channels: &[Channel], meters: Vec<Meter>) -> DaeResult<Snapshot> {
    let mut snapshot = Snapshot::new();
    for meter in meters {
        let channel = channels
            .iter()
            .find(|channel| channel.channel_id == meter.channel_id)
            .ok_or(DaeError::Join(meter.channel_id))?;
        snapshot.insert(
            meter.channel_id,
            MeterDevice {
                channel: channel.clone(),
                meter,
            },
        );
    }
    Ok(snapshot)
}

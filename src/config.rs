use crate::dae_client::{DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT};
use crate::dae_types::Credentials;
use crate::host::ClientSettings;
use crate::poll_coordinator::DEFAULT_UPDATE_INTERVAL;
use std::env;
use std::time::Duration;

/// Runtime configuration, read from `DAE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub credentials: Credentials,
    pub endpoint_url: String,
    pub update_interval: Duration,
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("DAE_USERNAME")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DAE_USERNAME is required"))?;
        // Passwords are taken verbatim, surrounding whitespace included.
        let password = lookup("DAE_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DAE_PASSWORD is required"))?;

        Ok(Self {
            credentials: Credentials::new(username, password),
            endpoint_url: lookup("DAE_ENDPOINT")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            update_interval: parse_secs(&lookup, "DAE_POLL_INTERVAL_SECS", DEFAULT_UPDATE_INTERVAL)?,
            request_timeout: parse_secs(
                &lookup,
                "DAE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT,
            )?,
        })
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            endpoint_url: self.endpoint_url.clone(),
            request_timeout: self.request_timeout,
            update_interval: self.update_interval,
        }
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => anyhow::bail!("{key} must be a positive number of seconds"),
    }
}

use crate::dae_types::Credentials;
use crate::host::{ConfigEntry, HostRegistry};
use std::collections::BTreeMap;
use tracing::{error, info};

pub const STEP_CREDS: &str = "creds";
pub const ERROR_INVALID_AUTH: &str = "invalid_auth";
pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    Form {
        step_id: String,
        errors: BTreeMap<String, String>,
        last_step: bool,
    },
    CreateEntry(ConfigEntry),
    Abort {
        reason: String,
    },
}

/// User-facing setup of a DAE account: ask for credentials, check them, store them.
#[derive(Debug, Default)]
pub struct ConfigFlow;

impl ConfigFlow {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }

    pub fn step_user(&self) -> FlowResult {
        creds_form(None)
    }

    /// Checks the credentials against DAE and creates the entry when they work.
    /// The username doubles as the entry's unique id and title.
    pub async fn step_creds(&self, registry: &mut HostRegistry, input: Credentials) -> FlowResult {
        if registry.entry_by_unique_id(&input.username).is_some() {
            info!(username = %input.username, "DAE account already configured");
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            };
        }

        let mut client = match registry.client_for(input.clone()) {
            Ok(client) => client,
            Err(err) => {
                error!(error = %err, "failed to build DAE client");
                return creds_form(Some(ERROR_CANNOT_CONNECT));
            }
        };

        match client.login().await {
            Ok(login) if login.result => {}
            Ok(_) => {
                error!("Unauthorized");
                return creds_form(Some(ERROR_INVALID_AUTH));
            }
            Err(err) => {
                error!(error = %err, "could not validate DAE credentials");
                return creds_form(Some(ERROR_CANNOT_CONNECT));
            }
        }

        let username = input.username.clone();
        let entry = registry.add_entry(username.clone(), username, input).clone();
        info!(entry_id = %entry.entry_id, "DAE config entry created");
        FlowResult::CreateEntry(entry)
    }
}

fn creds_form(error: Option<&str>) -> FlowResult {
    FlowResult::Form {
        step_id: STEP_CREDS.to_string(),
        errors: error
            .map(|error| BTreeMap::from([("base".to_string(), error.to_string())]))
            .unwrap_or_default(),
        last_step: true,
    }
}

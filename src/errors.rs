use thiserror::Error;

/// Everything that can abort a single request or fetch cycle against the DAE endpoint.
#[derive(Debug, Error)]
pub enum DaeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response from DAE: {0}")]
    Parse(String),
    #[error("meter reading for channel {0} has no matching channel")]
    Join(i64),
}

impl DaeError {
    pub fn parse<E: std::fmt::Display>(error: E) -> Self {
        Self::Parse(error.to_string())
    }
}

pub type DaeResult<T> = Result<T, DaeError>;

/// Failures of the host-side plumbing around the client (entries, setup, sensors).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no config entry with id {0}")]
    UnknownEntry(String),
    #[error("config entry {entry_id} is not ready: {source}")]
    NotReady {
        entry_id: String,
        #[source]
        source: DaeError,
    },
    #[error("unhandled unit of measurement: {0}")]
    UnhandledUnit(String),
    #[error("failed to build DAE client: {0}")]
    Client(#[source] DaeError),
}

use crate::dae_types::{
    join_channel_meters, ChannelListResult, Credentials, Envelope, LoginResult, MeterListResult,
    Snapshot,
};
use crate::errors::{DaeError, DaeResult};
use reqwest::header::COOKIE;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://meter.iotems.net/ws/home-owner.php";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const SESSION_COOKIE: &str = "PHPSESSID";

type FormFields = [(&'static str, String)];

/// Client for the DAE home-owner endpoint.
///
/// Holds the account credentials and the current session cookie. Requests that
/// need a session log in on demand and get replayed once after a fresh login
/// when the server flags them as failed.
pub struct DaeClient {
    credentials: Credentials,
    endpoint_url: String,
    session: Option<String>,
    client: reqwest::Client,
}

impl DaeClient {
    pub fn new(credentials: Credentials) -> DaeResult<Self> {
        Self::with_endpoint(credentials, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_endpoint(
        credentials: Credentials,
        endpoint_url: impl Into<String>,
        request_timeout: Duration,
    ) -> DaeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            credentials,
            endpoint_url: endpoint_url.into(),
            session: None,
            client,
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Fetches channels and readings and joins them by channel id.
    pub async fn get_channel_meters(&mut self) -> DaeResult<Snapshot> {
        let channels = self.list_channels().await?;
        let meters = self.read_meters(None).await?;

        let snapshot = join_channel_meters(&channels.data, meters.data)?;
        debug!(
            channels = channels.data.len(),
            meters = snapshot.len(),
            "fetched DAE channel meters"
        );
        Ok(snapshot)
    }

    /// Logs in and stores the session cookie from the response.
    ///
    /// A rejected login comes back as `result == false`, only transport and
    /// shape problems are errors.
    pub async fn login(&mut self) -> DaeResult<LoginResult> {
        let form = [
            ("d", "login".to_string()),
            ("username", self.credentials.username.clone()),
            ("password", self.credentials.password.clone()),
        ];

        self.session = None;
        let response = self.post(&form).await?;
        let session = session_cookie(&response);
        let envelope = Envelope::from_body(&response.text().await?)?;

        if envelope.result {
            let session = session.ok_or_else(|| {
                DaeError::Parse(format!("login response carried no {SESSION_COOKIE} cookie"))
            })?;
            self.session = Some(session);
            info!(username = %self.credentials.username, "logged in to DAE");
        } else {
            warn!(
                username = %self.credentials.username,
                message = %envelope.message,
                "DAE rejected login"
            );
        }

        Ok(envelope.into())
    }

    pub async fn list_channels(&mut self) -> DaeResult<ChannelListResult> {
        let form = [
            ("d", "channel".to_string()),
            ("m", "list".to_string()),
            ("username", self.credentials.username.clone()),
        ];

        let envelope = self.request(&form).await?;
        ChannelListResult::try_from(envelope)
    }

    pub async fn read_meters(&mut self, channel_id: Option<i64>) -> DaeResult<MeterListResult> {
        let mut form = vec![
            ("d", "data".to_string()),
            ("username", self.credentials.username.clone()),
        ];
        if let Some(channel_id) = channel_id {
            form.push(("channel-id", channel_id.to_string()));
        }

        let envelope = self.request(&form).await?;
        MeterListResult::try_from(envelope)
    }

    /// Sends an authenticated request with a single re-login and replay on rejection.
    async fn request(&mut self, form: &FormFields) -> DaeResult<Envelope> {
        if self.session.is_none() {
            debug!("no DAE session yet, logging in first");
            self.authenticate().await?;
        }

        let envelope = self.send(form).await?;
        if envelope.result {
            return Ok(envelope);
        }

        warn!(
            action = action_of(form),
            message = %envelope.message,
            "DAE request rejected, logging in again"
        );
        self.authenticate().await?;

        let envelope = self.send(form).await?;
        if envelope.result {
            Ok(envelope)
        } else {
            Err(DaeError::Auth(format!(
                "{} request rejected after re-login: {}",
                action_of(form),
                envelope.message
            )))
        }
    }

    async fn authenticate(&mut self) -> DaeResult<()> {
        let login = self.login().await?;
        if login.result {
            Ok(())
        } else {
            Err(DaeError::Auth(login.message))
        }
    }

    async fn send(&self, form: &FormFields) -> DaeResult<Envelope> {
        let response = self.post(form).await?;
        Envelope::from_body(&response.text().await?)
    }

    async fn post(&self, form: &FormFields) -> DaeResult<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint_url).form(form);
        if let Some(session) = &self.session {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={session}"));
        }

        Ok(request.send().await?.error_for_status()?)
    }
}

fn action_of(form: &FormFields) -> &str {
    form.iter()
        .find(|(key, _)| *key == "d")
        .map(|(_, value)| value.as_str())
        .unwrap_or("unknown")
}

fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

use crate::dae_client::DaeClient;
use crate::dae_types::Snapshot;
use crate::errors::DaeResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Anything that can produce a full snapshot in one call.
#[async_trait]
pub trait SnapshotSource: Send + 'static {
    async fn fetch_snapshot(&mut self) -> DaeResult<Snapshot>;
}

#[async_trait]
impl SnapshotSource for DaeClient {
    async fn fetch_snapshot(&mut self) -> DaeResult<Snapshot> {
        self.get_channel_meters().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Idle,
    Fetching,
    Failed(String),
}

/// What observers see: the last good snapshot plus how the latest cycle went.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub data: Option<Arc<Snapshot>>,
    pub status: PollStatus,
    pub last_update_success: bool,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            data: None,
            status: PollStatus::Idle,
            last_update_success: false,
        }
    }
}

/// Read side of a coordinator, cheap to clone and hand to entities.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    receiver: watch::Receiver<CoordinatorState>,
}

impl CoordinatorHandle {
    pub fn data(&self) -> Option<Arc<Snapshot>> {
        self.receiver.borrow().data.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.receiver.borrow().clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.receiver.borrow().last_update_success
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.receiver.clone()
    }
}

/// Polls a [`SnapshotSource`] on a fixed interval and publishes each snapshot.
pub struct PollCoordinator<S> {
    name: String,
    source: S,
    update_interval: Duration,
    state: watch::Sender<CoordinatorState>,
}

impl<S: SnapshotSource> PollCoordinator<S> {
    pub fn new(name: impl Into<String>, source: S, update_interval: Duration) -> Self {
        let (state, _) = watch::channel(CoordinatorState::default());
        Self {
            name: name.into(),
            source,
            update_interval,
            state,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            receiver: self.state.subscribe(),
        }
    }

    /// Runs one fetch cycle. A failure keeps the previous snapshot visible.
    pub async fn refresh(&mut self) -> DaeResult<()> {
        self.state
            .send_modify(|state| state.status = PollStatus::Fetching);
        debug!(coordinator = %self.name, "refreshing");

        match self.source.fetch_snapshot().await {
            Ok(snapshot) => {
                let meters = snapshot.len();
                self.state.send_modify(|state| {
                    state.data = Some(Arc::new(snapshot));
                    state.status = PollStatus::Idle;
                    state.last_update_success = true;
                });
                debug!(coordinator = %self.name, meters, "refresh complete");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.state.send_modify(|state| {
                    state.status = PollStatus::Failed(message);
                    state.last_update_success = false;
                });
                Err(err)
            }
        }
    }

    /// The refresh that setup waits on before the entry counts as loaded.
    pub async fn first_refresh(&mut self) -> DaeResult<()> {
        if let Err(err) = self.refresh().await {
            error!(coordinator = %self.name, error = %err, "initial refresh failed");
            return Err(err);
        }
        info!(coordinator = %self.name, "initial refresh complete");
        Ok(())
    }

    /// Moves the coordinator onto its own task. The first tick fires one
    /// interval from now, the preceding fetch being the first refresh.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(
            coordinator = %self.name,
            interval_secs = self.update_interval.as_secs(),
            "starting poll loop"
        );

        // Each refresh is awaited before the next tick, so cycles never overlap.
        let mut ticks = interval_at(Instant::now() + self.update_interval, self.update_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;

            if let Err(err) = self.refresh().await {
                warn!(
                    coordinator = %self.name,
                    error = %err,
                    "poll cycle failed, keeping last snapshot"
                );
            }
        }
    }
}

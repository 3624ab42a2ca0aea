//! The poll loop: bulk details → diff → retrieval jobs → durable state.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use engine_logging::{engine_error, engine_info, engine_warn};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracker_core::{update, CycleStats, Effect, HandleRecord, Msg, SkipReason, TrackerState};

use crate::catalog::{CatalogClient, Credentials, Session};
use crate::handles::{load_handles, HandlesError};
use crate::retrieval::{RetrievalQueue, RetrievalSettings, RetrievalSink};
use crate::state_file::{StateFile, StateFileError};
use crate::CatalogError;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct TrackerSettings {
    pub handles_path: PathBuf,
    pub state_path: PathBuf,
    pub poll_interval: Duration,
    pub retrieval: RetrievalSettings,
    pub clock: Clock,
}

impl TrackerSettings {
    /// Default layout under one persistence directory.
    pub fn in_dir(persist_dir: &Path) -> Self {
        Self {
            handles_path: persist_dir.join("handles.json"),
            state_path: persist_dir.join("lastUpdates.json"),
            poll_interval: Duration::from_secs(15 * 60),
            retrieval: RetrievalSettings::new(persist_dir.join("apks")),
            clock: Arc::new(Utc::now),
        }
    }
}

impl fmt::Debug for TrackerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSettings")
            .field("handles_path", &self.handles_path)
            .field("state_path", &self.state_path)
            .field("poll_interval", &self.poll_interval)
            .field("retrieval", &self.retrieval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("could not log in: {0}")]
    Auth(#[source] CatalogError),
    #[error(transparent)]
    InputLoad(#[from] HandlesError),
    #[error("could not open the state file: {0}")]
    StorageOpen(#[source] StateFileError),
    #[error("could not persist the state file: {0}")]
    StorageFlush(#[source] StateFileError),
    #[error("could not start the retrieval worker: {0}")]
    Worker(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub stats: CycleStats,
    pub submitted: usize,
    pub flushed: bool,
    /// Set when the bulk details request itself failed and nothing was diffed.
    pub fetch_error: Option<CatalogError>,
}

pub struct Tracker {
    client: Arc<dyn CatalogClient>,
    session: Session,
    handles: Vec<String>,
    state: TrackerState,
    state_file: StateFile,
    queue: RetrievalQueue,
    settings: TrackerSettings,
}

impl Tracker {
    /// Loads state and handles, logs in and starts the retrieval worker.
    ///
    /// Any failure here aborts startup.
    pub async fn start(
        settings: TrackerSettings,
        client: Arc<dyn CatalogClient>,
        credentials: &Credentials,
        sink: Arc<dyn RetrievalSink>,
    ) -> Result<Self, TrackerError> {
        let (state_file, snapshot) =
            StateFile::open(&settings.state_path).map_err(TrackerError::StorageOpen)?;
        let (state, _) = update(TrackerState::new(), Msg::Restore(snapshot));

        let handles = load_handles(&settings.handles_path)?;

        let session = client.authenticate(credentials).await.map_err(|err| {
            engine_error!("Could not login: {}", err);
            TrackerError::Auth(err)
        })?;
        match credentials {
            Credentials::Password { .. } => engine_info!(
                "Logged in with email and password. The new device id is \"{}\". The new auth token is \"{}\"",
                session.device_id,
                session.auth_token
            ),
            Credentials::Token { .. } => engine_info!("Logged in with auth token"),
        }

        let queue = RetrievalQueue::start(
            client.clone(),
            session.clone(),
            settings.retrieval.clone(),
            sink,
        )?;

        engine_info!("### Init done");
        Ok(Self {
            client,
            session,
            handles,
            state,
            state_file,
            queue,
            settings,
        })
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn handles(&self) -> &[String] {
        &self.handles
    }

    /// One poll: request details for every handle, diff, queue jobs, persist if changed.
    ///
    /// A failed details request is logged and reported in the summary; only a
    /// failed flush is returned as an error.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, TrackerError> {
        engine_info!("### Bulk checking details");
        let observed_at = (self.settings.clock)();
        match self.client.bulk_details(&self.session, &self.handles).await {
            Ok(details) => self.apply_details(observed_at, details),
            Err(err) => {
                engine_error!("Could not fetch details for the tracked handles: {}", err);
                Ok(CycleSummary {
                    fetch_error: Some(err),
                    ..CycleSummary::default()
                })
            }
        }
    }

    /// Polls until `shutdown` fires or persisting fails, then shuts down.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), TrackerError> {
        let result = self.poll_until(&shutdown).await;
        self.shutdown().await;
        result
    }

    pub async fn shutdown(self) {
        self.state_file.close();
        self.queue.shutdown().await;
        engine_info!("Shutdown");
    }

    async fn poll_until(&mut self, shutdown: &CancellationToken) -> Result<(), TrackerError> {
        let interval = self.settings.poll_interval;
        loop {
            // Only the details request can be interrupted; diffing and
            // persisting never await.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                summary = self.run_cycle() => {
                    summary?;
                }
            }

            engine_info!("Sleeping for {} minutes", interval.as_secs_f64() / 60.0);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        engine_info!("### Received interrupt. Shutting down");
        Ok(())
    }

    fn apply_details(
        &mut self,
        observed_at: DateTime<Utc>,
        details: Vec<Option<Value>>,
    ) -> Result<CycleSummary, TrackerError> {
        engine_info!(
            "Received a response for {} handles. Parsing them",
            details.len()
        );
        if details.len() != self.handles.len() {
            engine_warn!(
                "Requested details for {} handles but received {} entries",
                self.handles.len(),
                details.len()
            );
        }

        let mut details = details.into_iter();
        let records = self
            .handles
            .iter()
            .map(|handle| HandleRecord::new(handle.clone(), details.next().flatten()))
            .collect();

        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(
            state,
            Msg::DetailsReceived {
                observed_at,
                records,
            },
        );
        self.state = state;
        for skipped in self.state.last_skipped() {
            match &skipped.reason {
                SkipReason::NoDetails => {
                    engine_error!("No details returned for handle {}", skipped.handle)
                }
                SkipReason::Unparsable(err) => engine_error!(
                    "Could not get the details excerpt for {}: {}",
                    skipped.handle,
                    err
                ),
            }
        }
        let stats = self.state.last_cycle();
        engine_info!("Parsed {} excerpts", stats.parsed);

        let mut submitted = 0;
        for effect in effects {
            match effect {
                Effect::EnqueueRetrieval(job) => {
                    if let Some(excerpt) = self.state.get(&job.handle) {
                        engine_info!(
                            "For handle {} found new upload from {} (version {}, code {}). Queueing download",
                            excerpt.handle(),
                            excerpt.published_at().format("%Y-%m-%d"),
                            excerpt.version(),
                            excerpt.version_code()
                        );
                    }
                    if self.queue.submit(job) {
                        submitted += 1;
                    }
                }
            }
        }

        let flushed = self.persist()?;
        Ok(CycleSummary {
            stats,
            submitted,
            flushed,
            fetch_error: None,
        })
    }

    fn persist(&mut self) -> Result<bool, TrackerError> {
        if !self.state.is_dirty() {
            return Ok(false);
        }
        engine_info!("Updated the last updates map. Writing it to disk");
        self.state_file.flush(&self.state).map_err(|err| {
            engine_error!("Could not write the state file. Aborting: {}", err);
            TrackerError::StorageFlush(err)
        })?;
        self.state.mark_flushed();
        Ok(true)
    }
}

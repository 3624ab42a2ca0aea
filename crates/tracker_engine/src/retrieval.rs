//! Single-worker retrieval queue.
//!
//! Jobs run one at a time, in submission order, on a dedicated `downloader`
//! thread. Every job, successful or not, is followed by a cooldown before the
//! next one starts. Failed jobs are logged and dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use engine_logging::{engine_error, engine_info, engine_warn};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracker_core::RetrievalJob;

use crate::catalog::{CatalogClient, PayloadStream, Session};
use crate::filename::{auxiliary_artifact_name, primary_artifact_name};
use crate::{CatalogError, RetrievalEvent, RetrievalOutcome};

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub artifact_dir: PathBuf,
    /// Pause after every job before the next one may start.
    pub cooldown: Duration,
    pub primary_extension: String,
    pub auxiliary_extension: String,
}

impl RetrievalSettings {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            cooldown: Duration::from_secs(29),
            primary_extension: "apk".to_string(),
            auxiliary_extension: "obb".to_string(),
        }
    }
}

pub trait RetrievalSink: Send + Sync {
    fn emit(&self, event: RetrievalEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl RetrievalSink for NoopSink {
    fn emit(&self, _event: RetrievalEvent) {}
}

pub struct RetrievalQueue {
    job_tx: mpsc::UnboundedSender<RetrievalJob>,
    stop: CancellationToken,
    thread: thread::JoinHandle<()>,
}

impl RetrievalQueue {
    pub fn start(
        client: Arc<dyn CatalogClient>,
        session: Session,
        settings: RetrievalSettings,
        sink: Arc<dyn RetrievalSink>,
    ) -> io::Result<Self> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let worker = Worker {
            client,
            session,
            settings,
            sink,
            stop: stop.clone(),
        };

        let thread = thread::Builder::new()
            .name("downloader".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        engine_error!("Could not start the retrieval runtime: {}", err);
                        return;
                    }
                };
                runtime.block_on(worker.run(job_rx));
            })?;

        Ok(Self {
            job_tx,
            stop,
            thread,
        })
    }

    /// Queues a job without waiting for it. Returns false if the worker has exited.
    pub fn submit(&self, job: RetrievalJob) -> bool {
        match self.job_tx.send(job) {
            Ok(()) => true,
            Err(mpsc::error::SendError(job)) => {
                engine_error!(
                    "Retrieval worker is not running; dropping download of {} (version code {})",
                    job.handle,
                    job.version_code
                );
                false
            }
        }
    }

    /// Stops taking new jobs, lets an in-flight job finish and waits for the worker.
    pub async fn shutdown(self) {
        let Self {
            job_tx,
            stop,
            thread,
        } = self;
        stop.cancel();
        drop(job_tx);
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => engine_error!("Retrieval worker thread panicked"),
            Err(err) => engine_error!("Could not wait for the retrieval worker: {}", err),
        }
    }
}

struct Worker {
    client: Arc<dyn CatalogClient>,
    session: Session,
    settings: RetrievalSettings,
    sink: Arc<dyn RetrievalSink>,
    stop: CancellationToken,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<RetrievalJob>) {
        loop {
            let job = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            engine_info!(
                "### Starting the download for {} (version code {})",
                job.handle,
                job.version_code
            );
            self.sink.emit(RetrievalEvent::Started(job.clone()));
            let result = self.retrieve(&job).await;
            match &result {
                Ok(outcome) => engine_info!(
                    "Download for {} finished: {} files, {} bytes",
                    job.handle,
                    outcome.files.len(),
                    outcome.bytes_written
                ),
                Err(err) => engine_error!(
                    "Download for {} (version code {}) failed: {}",
                    job.handle,
                    job.version_code,
                    err
                ),
            }
            self.sink.emit(RetrievalEvent::Completed { job, result });

            engine_info!("Sleeping {} seconds", self.settings.cooldown.as_secs_f32());
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.settings.cooldown) => {}
            }
        }

        jobs.close();
        while let Ok(job) = jobs.try_recv() {
            engine_warn!(
                "Abandoning queued download for {} (version code {})",
                job.handle,
                job.version_code
            );
        }
        engine_info!("Retrieval worker stopped");
    }

    async fn retrieve(&self, job: &RetrievalJob) -> Result<RetrievalOutcome, CatalogError> {
        let delivery = self
            .client
            .delivery(&self.session, &job.handle, job.version_code)
            .await?;
        let dir = &self.settings.artifact_dir;
        tokio::fs::create_dir_all(dir).await?;

        let mut outcome = RetrievalOutcome {
            files: Vec::with_capacity(1 + delivery.auxiliary.len()),
            bytes_written: 0,
        };

        engine_info!("Saving payload to disk");
        let name = primary_artifact_name(
            &delivery.doc_id,
            job.observed_at,
            job.version_code,
            &self.settings.primary_extension,
        );
        let (path, bytes) = write_stream(dir, &name, delivery.primary).await?;
        outcome.files.push(path);
        outcome.bytes_written += bytes;

        if !delivery.auxiliary.is_empty() {
            engine_info!("Saving additional data to disk");
        }
        for auxiliary in delivery.auxiliary {
            engine_info!("Saving {}", auxiliary.kind);
            let name = auxiliary_artifact_name(
                &delivery.doc_id,
                job.observed_at,
                &auxiliary.kind,
                auxiliary.version_code,
                &self.settings.auxiliary_extension,
            );
            let (path, bytes) = write_stream(dir, &name, auxiliary.stream).await?;
            outcome.files.push(path);
            outcome.bytes_written += bytes;
        }

        Ok(outcome)
    }
}

/// Streams into `{filename}.part`, then renames it into place.
async fn write_stream(
    dir: &Path,
    filename: &str,
    mut stream: PayloadStream,
) -> Result<(PathBuf, u64), CatalogError> {
    let target = dir.join(filename);
    let partial = dir.join(format!("{filename}.part"));

    let result = match copy_stream(&partial, &mut stream).await {
        Ok(bytes) => tokio::fs::rename(&partial, &target)
            .await
            .map(|()| bytes)
            .map_err(CatalogError::from),
        Err(err) => Err(err),
    };
    match result {
        Ok(bytes) => Ok((target, bytes)),
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(err)
        }
    }
}

async fn copy_stream(path: &Path, stream: &mut PayloadStream) -> Result<u64, CatalogError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

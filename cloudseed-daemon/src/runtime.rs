use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use cloudseed_core::SyncConfig;
use cloudseed_sync::{CloudSync, ConflictResolver, ConnectionStatus, DocumentStore};

use crate::error::{io_err, DaemonError};

struct SweepJob {
    source: &'static str,
    respond_to: oneshot::Sender<Result<SweepSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub source: String,
    pub attempted: usize,
    pub saved: usize,
    pub still_pending: usize,
    pub failed: Vec<String>,
    pub duration_ms: u128,
}

/// Control side of a running sweeper task.
pub struct SweeperHandle {
    jobs: mpsc::Sender<SweepJob>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<(), DaemonError>>,
}

impl SweeperHandle {
    /// Run a sweep now and wait for its result.
    pub async fn sweep_now(&self) -> Result<SweepSummary, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(SweepJob {
                source: "request",
                respond_to: tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sweep queue"))?;

        let outcome = rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("sweep response"))?;
        outcome.map_err(DaemonError::Protocol)
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        let _ = self.shutdown.send(());
        handle_join("sweeper", self.task.await)
    }
}

/// Open the document store named by `config`.
pub fn documents_from_config(config: &SyncConfig) -> Result<DocumentStore, DaemonError> {
    let dir = config
        .document_dir
        .as_ref()
        .ok_or(DaemonError::MissingDocumentDir)?;
    Ok(DocumentStore::open(dir)?)
}

/// Start the sweeper task.
///
/// Pending documents are swept every `sweep_interval`, whenever the
/// connection returns to `Normal`, and on [`SweeperHandle::sweep_now`].
pub fn spawn_sweeper(
    client: CloudSync,
    documents: DocumentStore,
    resolver: Arc<dyn ConflictResolver>,
) -> SweeperHandle {
    let (jobs_tx, jobs_rx) = mpsc::channel::<SweepJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let task = {
        let shutdown_rx = shutdown_tx.subscribe();
        let status_rx = client.subscribe();
        tokio::spawn(sweeper_task(
            client,
            documents,
            resolver,
            jobs_rx,
            status_rx,
            shutdown_rx,
        ))
    };

    SweeperHandle {
        jobs: jobs_tx,
        shutdown: shutdown_tx,
        task,
    }
}

/// Run a sweeper until ctrl-c.
pub async fn run(client: CloudSync, resolver: Arc<dyn ConflictResolver>) -> Result<(), DaemonError> {
    let documents = documents_from_config(client.config())?;
    tracing::info!(
        root = %documents.root().display(),
        interval_secs = client.config().sweep_interval().as_secs(),
        "sweeper starting",
    );
    let handle = spawn_sweeper(client, documents, resolver);

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "ctrl-c handler failed");
    } else {
        tracing::info!("received ctrl-c, shutting down sweeper");
    }
    handle.shutdown().await
}

/// Start a runtime, run the sweeper, and block until it exits.
pub fn start_blocking(
    client: CloudSync,
    resolver: Arc<dyn ConflictResolver>,
) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(client, resolver))
}

async fn sweeper_task(
    client: CloudSync,
    documents: DocumentStore,
    resolver: Arc<dyn ConflictResolver>,
    mut jobs_rx: mpsc::Receiver<SweepJob>,
    mut status_rx: watch::Receiver<ConnectionStatus>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let period = client.config().sweep_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                log_sweep("interval", sweep_once(&client, &documents, resolver.as_ref(), "interval").await);
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                tracing::debug!(?status, "connection status changed");
                if status == ConnectionStatus::Normal {
                    log_sweep("reconnect", sweep_once(&client, &documents, resolver.as_ref(), "reconnect").await);
                }
            }
            maybe_job = jobs_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = sweep_once(&client, &documents, resolver.as_ref(), job.source)
                    .await
                    .map_err(|err| err.to_string());
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    tracing::info!("sweeper stopped");
    Ok(())
}

async fn sweep_once(
    client: &CloudSync,
    documents: &DocumentStore,
    resolver: &dyn ConflictResolver,
    source: &'static str,
) -> Result<SweepSummary, DaemonError> {
    let started = Instant::now();

    let store = documents.clone();
    let mut pending = tokio::task::spawn_blocking(move || store.pending())
        .await
        .map_err(|err| DaemonError::Protocol(format!("document scan join error: {err}")))??;

    let report = client.sweep(pending.iter_mut(), resolver).await;

    Ok(SweepSummary {
        source: source.to_string(),
        attempted: report.attempted(),
        saved: report.saved,
        still_pending: report.still_pending,
        failed: report
            .failed
            .iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect(),
        duration_ms: started.elapsed().as_millis(),
    })
}

fn log_sweep(trigger: &str, result: Result<SweepSummary, DaemonError>) {
    match result {
        Ok(summary) if summary.attempted == 0 => {
            tracing::debug!(trigger, "sweep found nothing pending");
        }
        Ok(summary) => {
            tracing::info!(
                trigger,
                saved = summary.saved,
                still_pending = summary.still_pending,
                failed = summary.failed.len(),
                duration_ms = summary.duration_ms,
                "sweep completed",
            );
        }
        Err(err) => {
            tracing::error!(trigger, error = %err, "sweep failed");
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber. `RUST_LOG` filters (default `info`);
/// `CLOUDSEED_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CLOUDSEED_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt().json().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

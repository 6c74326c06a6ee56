//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};
use vseg_models::{JobId, JobProgressRecord};

use crate::metrics;
use crate::pipeline::{JobRequest, Orchestrator};

/// Runs submitted jobs with bounded concurrency.
///
/// Jobs beyond the limit stay `pending` until a slot frees up. Shutdown is
/// broadcast to every running job as cancellation.
pub struct JobExecutor {
    orchestrator: Arc<Orchestrator>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl JobExecutor {
    pub fn new(orchestrator: Orchestrator, max_concurrent_jobs: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0usize);
        Self {
            orchestrator: Arc::new(orchestrator),
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            shutdown,
            in_flight: Arc::new(in_flight),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Register the job as pending and schedule it.
    pub async fn submit(&self, request: JobRequest) -> JobId {
        let job_id = request.job_id.clone();
        let store = self.orchestrator.store().clone();
        store.create(job_id.clone()).await;

        if *self.shutdown.borrow() {
            store.fail(&job_id, "worker is shutting down").await;
            return job_id;
        }

        self.in_flight.send_modify(|n| *n += 1);
        metrics::set_in_flight(*self.in_flight.borrow());

        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.job_semaphore);
        let cancel = self.shutdown.subscribe();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    if *cancel.borrow() {
                        store.fail(&request.job_id, "job cancelled").await;
                    } else {
                        // Outcome is recorded in the store by the orchestrator
                        let _ = orchestrator.run(request, cancel).await;
                    }
                }
                Err(_) => {
                    warn!(job_id = %request.job_id, "Executor closed before job started");
                    store.fail(&request.job_id, "worker is shutting down").await;
                }
            }
            in_flight.send_modify(|n| *n = n.saturating_sub(1));
            metrics::set_in_flight(*in_flight.borrow());
        });

        job_id
    }

    /// Submit and wait for the job's terminal record.
    pub async fn run_to_completion(&self, request: JobRequest) -> Option<JobProgressRecord> {
        let store = self.orchestrator.store().clone();
        let mut events = store.subscribe();
        let job_id = self.submit(request).await;

        loop {
            if let Some(record) = store.get(&job_id).await {
                if record.is_terminal() {
                    return Some(record);
                }
            }
            match events.recv().await {
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return store.get(&job_id).await,
            }
        }
    }

    /// Number of submitted jobs not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every submitted job has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Cancel running jobs and wait up to `grace` for them to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        info!(in_flight = self.in_flight(), "Shutting down executor");
        self.shutdown.send_replace(true);
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            warn!(in_flight = self.in_flight(), "Jobs still running after shutdown grace period");
        }
    }
}

//! In-memory job progress table.
//!
//! Each job has a single writer (its orchestrator run) and any number of
//! readers. Readers always get a cloned snapshot taken under the lock, and
//! every accepted update is broadcast to subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use vseg_models::{JobId, JobProgressRecord, JobResult};

const EVENT_CAPACITY: usize = 256;

/// Shared handle to the progress table.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    records: Arc<RwLock<HashMap<JobId, JobProgressRecord>>>,
    events: broadcast::Sender<JobProgressRecord>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Register a pending job. An existing record with the same id is kept.
    pub async fn create(&self, job_id: JobId) -> JobProgressRecord {
        let mut records = self.records.write().await;
        let record = records
            .entry(job_id.clone())
            .or_insert_with(|| JobProgressRecord::new(job_id))
            .clone();
        let _ = self.events.send(record.clone());
        record
    }

    pub async fn get(&self, job_id: &JobId) -> Option<JobProgressRecord> {
        self.records.read().await.get(job_id).cloned()
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<JobProgressRecord> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.as_str().cmp(b.job_id.as_str())));
        all
    }

    /// Apply `change` to a record.
    ///
    /// `change` returns whether it modified the record; only then is the new
    /// snapshot broadcast. Returns the snapshot, or `None` for unknown jobs.
    pub async fn update<F>(&self, job_id: &JobId, change: F) -> Option<JobProgressRecord>
    where
        F: FnOnce(&mut JobProgressRecord) -> bool,
    {
        let mut records = self.records.write().await;
        let record = records.get_mut(job_id)?;
        let changed = change(record);
        let snapshot = record.clone();

        // Sent under the lock so subscribers see events in sequence order
        if changed {
            let _ = self.events.send(snapshot.clone());
        }
        Some(snapshot)
    }

    pub async fn advance(&self, job_id: &JobId, progress: u8, step: &str) -> Option<JobProgressRecord> {
        self.update(job_id, |r| r.advance(progress, step)).await
    }

    pub async fn complete(&self, job_id: &JobId, result: JobResult) -> Option<JobProgressRecord> {
        self.update(job_id, |r| r.complete(result)).await
    }

    pub async fn fail(&self, job_id: &JobId, error: &str) -> Option<JobProgressRecord> {
        self.update(job_id, |r| r.fail(error)).await
    }

    pub async fn fail_retryable(&self, job_id: &JobId, error: &str) -> Option<JobProgressRecord> {
        self.update(job_id, |r| r.fail_retryable(error)).await
    }

    /// Stream of record snapshots after each accepted change.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressRecord> {
        self.events.subscribe()
    }

    pub fn reporter(&self, job_id: JobId) -> JobReporter {
        JobReporter {
            store: self.clone(),
            job_id,
        }
    }
}

/// Write handle for one job's progress.
#[derive(Debug, Clone)]
pub struct JobReporter {
    store: ProgressStore,
    job_id: JobId,
}

impl JobReporter {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Record a step; progress below the current value is ignored.
    pub async fn step(&self, progress: u8, step: &str) {
        tracing::debug!(job_id = %self.job_id, progress, step, "Progress");
        self.store.advance(&self.job_id, progress, step).await;
    }

    /// Current percentage, 0 for unknown jobs.
    pub async fn current(&self) -> u8 {
        self.store
            .get(&self.job_id)
            .await
            .map(|r| r.progress_percent)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vseg_models::ProcessingStatus;

    #[tokio::test]
    async fn test_updates_bump_sequence_and_broadcast() {
        let store = ProgressStore::new();
        let id = JobId::from_string("job-1");
        store.create(id.clone()).await;
        let mut events = store.subscribe();

        let snapshot = store.advance(&id, 10, "Uploading video").await.unwrap();
        assert_eq!(snapshot.status, ProcessingStatus::Processing);
        assert_eq!(snapshot.event_seq, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.progress_percent, 10);
        assert_eq!(event.step_description, "Uploading video");
    }

    #[tokio::test]
    async fn test_progress_never_goes_backwards() {
        let store = ProgressStore::new();
        let id = JobId::from_string("job-2");
        store.create(id.clone()).await;
        store.advance(&id, 40, "Polling").await;
        let snapshot = store.advance(&id, 25, "Late upload report").await.unwrap();
        assert_eq!(snapshot.progress_percent, 40);
    }

    #[tokio::test]
    async fn test_terminal_record_is_final() {
        let store = ProgressStore::new();
        let id = JobId::from_string("job-3");
        store.create(id.clone()).await;
        store.fail(&id, "segmentation failed").await;
        let mut events = store.subscribe();

        let snapshot = store.advance(&id, 90, "Computing placement").await.unwrap();
        assert_eq!(snapshot.status, ProcessingStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("segmentation failed"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_job_and_listing() {
        let store = ProgressStore::new();
        assert!(store.advance(&JobId::from_string("missing"), 5, "x").await.is_none());

        store.create(JobId::from_string("a")).await;
        store.create(JobId::from_string("b")).await;
        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at <= listed[1].created_at);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_records() {
        let store = ProgressStore::new();
        let id = JobId::from_string("job-4");
        store.create(id.clone()).await;

        let writer = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for pct in 1..=100u8 {
                    store.advance(&id, pct, &format!("step {pct}")).await;
                }
            })
        };
        for _ in 0..50 {
            if let Some(r) = store.get(&id).await {
                if r.progress_percent > 0 {
                    assert_eq!(r.step_description, format!("step {}", r.progress_percent));
                }
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().event_seq, 100);
    }
}

//! Processing queue selection and caching.

use tokio::sync::RwLock;
use vseg_models::QueueState;

use crate::types::QueueInfo;

/// What the resolver decided for a queue listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuePick {
    /// Active queue of the wanted category
    Active(String),
    /// Paused queue of the wanted category; activate before use
    Paused(QueueInfo),
    /// Queues exist but none match; submit without a queue id
    ServiceDefault,
    /// No queues at all; the capability probably needs provisioning
    NoQueues,
}

/// Choose a queue for `category`, preferring an active one.
pub fn choose_queue(queues: &[QueueInfo], category: &str) -> QueuePick {
    if queues.is_empty() {
        return QueuePick::NoQueues;
    }

    let matching = || queues.iter().filter(|q| q.category.eq_ignore_ascii_case(category));

    if let Some(active) = matching().find(|q| q.state == QueueState::Active) {
        return QueuePick::Active(active.queue_id.clone());
    }
    if let Some(paused) = matching().find(|q| q.state == QueueState::Paused) {
        return QueuePick::Paused(paused.clone());
    }
    QueuePick::ServiceDefault
}

/// Resolved queue id, reused across submissions until invalidated.
///
/// `Some(None)` caches the decision to submit without a queue id.
#[derive(Debug, Default)]
pub struct QueueCache {
    resolved: RwLock<Option<Option<String>>>,
}

impl QueueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Option<String>> {
        self.resolved.read().await.clone()
    }

    pub async fn set(&self, queue_id: Option<String>) {
        *self.resolved.write().await = Some(queue_id);
    }

    pub async fn invalidate(&self) {
        *self.resolved.write().await = None;
    }
}

//! Debounced, coalescing persistence scheduling.
//!
//! Every committed change marks its replicant dirty. The first dirty mark
//! arms a timer; further commits within the window only replace the value
//! to be written, so a burst of changes costs one save. Saves run on their
//! own task and never block the commit path; failures are logged only.

use crate::adapter::PersistenceAdapter;
use replicant_types::ReplicantId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct Persistor {
    inner: Arc<PersistorInner>,
}

struct PersistorInner {
    adapter: Arc<dyn PersistenceAdapter>,
    pending: Mutex<HashMap<ReplicantId, Value>>,
}

impl Persistor {
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            inner: Arc::new(PersistorInner {
                adapter,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Schedules a save of `value` after `interval`, coalescing with any
    /// save already scheduled for the same replicant.
    pub async fn schedule(&self, id: ReplicantId, value: Value, interval: Duration) {
        let armed = {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id.clone(), value).is_none()
        };
        if !armed {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let value = inner.pending.lock().await.remove(&id);
            // A flush may have raced us and already written it.
            let Some(value) = value else { return };
            match inner.adapter.save(&id, &value).await {
                Ok(()) => debug!("persisted replicant {id}"),
                Err(e) => warn!("failed to persist replicant {id}: {e}"),
            }
        });
    }

    /// Writes every pending value immediately. Used on shutdown.
    pub async fn flush(&self) {
        let drained: Vec<(ReplicantId, Value)> =
            self.inner.pending.lock().await.drain().collect();
        for (id, value) in drained {
            if let Err(e) = self.inner.adapter.save(&id, &value).await {
                warn!("failed to persist replicant {id} during flush: {e}");
            }
        }
    }
}

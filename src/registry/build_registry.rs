use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::builder::{BuildOutcome, BuildProgress, FragmentationBuilder};
use crate::core::EntityStatus;
use crate::{Error, Result};

/// `(stream_id, fragmentation name)`
pub type BuildKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed(String),
    Aborted,
}

/// Snapshot of one build as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct BuildMetadata {
    pub stream_id: String,
    pub fragmentation: String,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub events_processed: u64,
    pub memberships_written: u64,
}

struct BuildEntry {
    status: BuildStatus,
    started_at: DateTime<Utc>,
    progress: Arc<BuildProgress>,
    shutdown: watch::Sender<bool>,
    finished: watch::Receiver<bool>,
}

impl BuildEntry {
    fn metadata(&self, key: &BuildKey) -> BuildMetadata {
        BuildMetadata {
            stream_id: key.0.clone(),
            fragmentation: key.1.clone(),
            status: self.status.clone(),
            started_at: self.started_at,
            events_processed: self.progress.events(),
            memberships_written: self.progress.memberships(),
        }
    }
}

/// Tracks fragmentation builds and keeps at most one running per fragmentation.
#[derive(Clone, Default)]
pub struct BuildRegistry {
    builds: Arc<RwLock<HashMap<BuildKey, BuildEntry>>>,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `builder` on the tokio runtime.
    ///
    /// Fails when the fragmentation is not `Building` or already has an entry,
    /// running or finished. A finished entry must be unregistered first, and
    /// the builder still refuses to run unless the stored status is `Building`.
    pub fn start(&self, builder: FragmentationBuilder) -> Result<()> {
        let fragmentation = builder.fragmentation();
        let key: BuildKey = (fragmentation.stream_id.clone(), fragmentation.name.clone());

        if fragmentation.status != EntityStatus::Building {
            return Err(Error::BuildRejected(format!(
                "fragmentation '{}' is {:?}; create a new fragmentation to rebuild",
                key.1, fragmentation.status
            )));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(false);

        {
            let mut builds = self.builds.write();
            if let Some(entry) = builds.get(&key) {
                let reason = if entry.status == BuildStatus::Running {
                    format!("a build for '{}' is already running", key.1)
                } else {
                    format!("fragmentation '{}' has already been built", key.1)
                };
                return Err(Error::BuildRejected(reason));
            }

            builds.insert(
                key.clone(),
                BuildEntry {
                    status: BuildStatus::Running,
                    started_at: Utc::now(),
                    progress: builder.progress(),
                    shutdown: shutdown_tx,
                    finished: finished_rx,
                },
            );
        }

        info!(stream_id = %key.0, fragmentation = %key.1, "build scheduled");

        let builds = Arc::clone(&self.builds);
        tokio::spawn(async move {
            let status = match builder.run(shutdown_rx).await {
                BuildOutcome::Completed { .. } => BuildStatus::Completed,
                BuildOutcome::Failed(e) => BuildStatus::Failed(e.to_string()),
                BuildOutcome::Aborted { .. } => BuildStatus::Aborted,
            };

            if let Some(entry) = builds.write().get_mut(&key) {
                entry.status = status;
            }
            let _ = finished_tx.send(true);
        });

        Ok(())
    }

    /// Ask a running build to abort after the event it is processing.
    ///
    /// Returns `false` when no build for `key` is running.
    pub fn stop(&self, key: &BuildKey) -> bool {
        let builds = self.builds.read();
        match builds.get(key) {
            Some(entry) if entry.status == BuildStatus::Running => {
                entry.shutdown.send(true).is_ok()
            }
            _ => false,
        }
    }

    pub fn stop_all(&self) {
        for entry in self.builds.read().values() {
            let _ = entry.shutdown.send(true);
        }
    }

    /// Drop the entry for a finished build and return its final state.
    pub fn unregister(&self, key: &BuildKey) -> Result<Option<BuildMetadata>> {
        let mut builds = self.builds.write();
        if builds.get(key).is_some_and(|entry| entry.status == BuildStatus::Running) {
            return Err(Error::BuildRejected(format!(
                "build for '{}' is still running; stop it first",
                key.1
            )));
        }
        let removed = builds.remove(key).map(|entry| entry.metadata(key));
        if removed.is_some() {
            debug!(stream_id = %key.0, fragmentation = %key.1, "build unregistered");
        }
        Ok(removed)
    }

    /// Drop every finished entry. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut builds = self.builds.write();
        let before = builds.len();
        builds.retain(|_, entry| entry.status == BuildStatus::Running);
        let pruned = before - builds.len();
        if pruned > 0 {
            info!(pruned, "finished builds pruned");
        }
        pruned
    }

    pub fn status(&self, key: &BuildKey) -> Option<BuildMetadata> {
        self.builds.read().get(key).map(|entry| entry.metadata(key))
    }

    pub fn list(&self) -> Vec<BuildMetadata> {
        let builds = self.builds.read();
        let mut all: Vec<BuildMetadata> =
            builds.iter().map(|(key, entry)| entry.metadata(key)).collect();
        all.sort_by(|a, b| (&a.stream_id, &a.fragmentation).cmp(&(&b.stream_id, &b.fragmentation)));
        all
    }

    /// Wait until the build for `key` has finished and return its final state.
    pub async fn wait(&self, key: &BuildKey) -> Option<BuildMetadata> {
        let mut finished = self.builds.read().get(key).map(|entry| entry.finished.clone())?;
        let _ = finished.wait_for(|done| *done).await;
        self.status(key)
    }
}

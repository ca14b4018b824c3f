//! One-shot backfill of a fragmentation over its stream's full history.
//!
//! A build labels every historical event with the fragmentation's strategy and
//! appends the event to each resulting bucket. Bucket counts only ever grow, so
//! a build is single-shot: it runs only while the *stored* fragmentation is
//! `Building`, and it leaves that state as `Ready` on success or `Failed`
//! otherwise. Concurrent runs on one fragmentation are prevented by
//! [`BuildRegistry`](crate::registry::BuildRegistry), not here.
//!
//! Events appended to the stream while a build is scanning may be missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::TryStreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::buckets::create_strategy;
use crate::core::{EntityStatus, Fragmentation};
use crate::storage::Storage;
use crate::{Error, Result};

/// Counters observable while a build runs. Advisory only.
#[derive(Debug, Default)]
pub struct BuildProgress {
    events: AtomicU64,
    memberships: AtomicU64,
}

impl BuildProgress {
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn memberships(&self) -> u64 {
        self.memberships.load(Ordering::Relaxed)
    }
}

/// How a build run ended. Only `Completed` flips the fragmentation to `Ready`.
#[derive(Debug)]
pub enum BuildOutcome {
    Completed { events: u64, memberships: u64 },
    Failed(Error),
    Aborted { events: u64 },
}

pub struct FragmentationBuilder {
    storage: Arc<dyn Storage>,
    fragmentation: Fragmentation,
    progress: Arc<BuildProgress>,
    progress_interval: u64,
}

impl FragmentationBuilder {
    pub fn new(storage: Arc<dyn Storage>, fragmentation: Fragmentation) -> Self {
        Self {
            storage,
            fragmentation,
            progress: Arc::new(BuildProgress::default()),
            progress_interval: 1000,
        }
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn fragmentation(&self) -> &Fragmentation {
        &self.fragmentation
    }

    pub fn progress(&self) -> Arc<BuildProgress> {
        Arc::clone(&self.progress)
    }

    /// Run the backfill to the end of the stream, or until `shutdown` turns true.
    ///
    /// Any run that starts writing but does not complete leaves the
    /// fragmentation `Failed`, so its partial counts are never served or
    /// built upon.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> BuildOutcome {
        let outcome = match self.backfill(&shutdown).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    stream_id = %self.fragmentation.stream_id,
                    fragmentation = %self.fragmentation.name,
                    error = %e,
                    "fragmentation build failed"
                );
                BuildOutcome::Failed(e)
            }
        };

        match &outcome {
            BuildOutcome::Completed { .. } | BuildOutcome::Failed(Error::BuildRejected(_)) => {}
            _ => self.abandon().await,
        }
        outcome
    }

    async fn backfill(&self, shutdown: &watch::Receiver<bool>) -> Result<BuildOutcome> {
        let (stream_id, name) = (&self.fragmentation.stream_id, &self.fragmentation.name);

        // The caller's copy may be stale; only the stored status counts.
        let fragmentation = self
            .storage
            .get_fragmentation_by_name(stream_id, name)
            .await?
            .ok_or_else(|| Error::FragmentationNotFound(name.clone()))?;
        if fragmentation.status != EntityStatus::Building {
            return Err(Error::BuildRejected(format!(
                "fragmentation '{}' is {:?}; only a building fragmentation can be built",
                name, fragmentation.status
            )));
        }

        if self.storage.get_stream_by_id(stream_id).await?.is_none() {
            return Err(Error::StreamNotFound(stream_id.clone()));
        }

        let mut strategy = create_strategy(&fragmentation);
        let mut events = self.storage.get_events_by_stream(stream_id, None).await?;
        info!(%stream_id, fragmentation = %name, "starting fragmentation build");

        while let Some(event) = events.try_next().await? {
            let stop = *shutdown.borrow();
            if stop {
                let processed = self.progress.events();
                warn!(%stream_id, fragmentation = %name, processed, "fragmentation build aborted");
                return Ok(BuildOutcome::Aborted { events: processed });
            }

            for bucket in strategy.label_object(&event) {
                self.storage
                    .append_event_to_bucket(
                        &bucket.stream_id,
                        &bucket.fragment_name,
                        &bucket.value,
                        &event,
                    )
                    .await?;
                self.progress.memberships.fetch_add(1, Ordering::Relaxed);
            }

            let processed = self.progress.events.fetch_add(1, Ordering::Relaxed) + 1;
            if processed % self.progress_interval == 0 {
                info!(%stream_id, fragmentation = %name, processed, "fragmentation build progress");
            }
        }

        // An operator may have retired the fragmentation while it was building.
        let promoted = self
            .storage
            .update_fragmentation_status(stream_id, name, EntityStatus::Building, EntityStatus::Ready)
            .await?;
        if !promoted {
            let processed = self.progress.events();
            warn!(
                %stream_id,
                fragmentation = %name,
                processed,
                "fragmentation left building state during build; not marking ready"
            );
            return Ok(BuildOutcome::Aborted { events: processed });
        }

        let events = self.progress.events();
        let memberships = self.progress.memberships();
        info!(%stream_id, fragmentation = %name, events, memberships, "fragmentation build completed");
        debug!(fragmentation = %name, "status set to READY");

        Ok(BuildOutcome::Completed { events, memberships })
    }

    async fn abandon(&self) {
        let (stream_id, name) = (&self.fragmentation.stream_id, &self.fragmentation.name);
        match self
            .storage
            .update_fragmentation_status(stream_id, name, EntityStatus::Building, EntityStatus::Failed)
            .await
        {
            Ok(true) => warn!(%stream_id, fragmentation = %name, "fragmentation marked FAILED"),
            Ok(false) => {}
            Err(e) => error!(
                %stream_id,
                fragmentation = %name,
                error = %e,
                "could not mark fragmentation failed"
            ),
        }
    }
}

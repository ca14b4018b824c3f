//! Operator actions: registering streams, ingesting events, defining and retiring fragmentations.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::builder::FragmentationBuilder;
use crate::core::{EntityStatus, EventStream, Fragmentation, ShaclPath, StrategyConfig};
use crate::ingest::parse_events;
use crate::registry::BuildRegistry;
use crate::storage::Storage;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterStream {
    pub name: String,
    pub source_uri: String,
    pub time_property: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFragmentation {
    pub name: String,
    pub shacl_path: Vec<String>,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

#[derive(Clone)]
pub struct OperatorService {
    storage: Arc<dyn Storage>,
    builds: BuildRegistry,
    progress_interval: u64,
}

impl OperatorService {
    pub fn new(storage: Arc<dyn Storage>, builds: BuildRegistry, progress_interval: u64) -> Self {
        Self { storage, builds, progress_interval }
    }

    pub fn builds(&self) -> &BuildRegistry {
        &self.builds
    }

    async fn stream(&self, name: &str) -> Result<EventStream> {
        self.storage.get_stream_by_name(name).await?.ok_or_else(|| Error::StreamNotFound(name.to_string()))
    }

    /// Register a stream; re-registering a known source URI renames it.
    pub async fn register_stream(&self, request: RegisterStream) -> Result<EventStream> {
        if request.name.is_empty() || request.source_uri.is_empty() {
            return Err(Error::InvalidRequest("name and source_uri are required".to_string()));
        }
        if request.time_property.is_empty() {
            return Err(Error::InvalidRequest("time_property must not be empty".to_string()));
        }

        let stream = EventStream::new(
            &request.source_uri,
            &request.name,
            ShaclPath::new(request.time_property),
        );
        self.storage.add_stream(stream.clone()).await?;
        info!(name = %stream.name, source_uri = %stream.source_uri, "stream registered");
        Ok(stream)
    }

    /// Append the events found in an N-Quads payload; returns how many were stored.
    pub async fn ingest(&self, stream_name: &str, payload: &str) -> Result<usize> {
        let stream = self.stream(stream_name).await?;
        let events = parse_events(&stream, payload)?;
        let count = events.len();

        for event in events {
            self.storage.append_event(&stream.source_uri, event).await?;
        }

        info!(stream = %stream.name, count, "events ingested");
        Ok(count)
    }

    /// Persist a new fragmentation in `Building` state and schedule its backfill.
    pub async fn create_fragmentation(
        &self,
        stream_name: &str,
        request: CreateFragmentation,
    ) -> Result<Fragmentation> {
        if request.name.is_empty() || request.shacl_path.is_empty() {
            return Err(Error::InvalidRequest("name and shacl_path are required".to_string()));
        }

        let stream = self.stream(stream_name).await?;
        if self.storage.get_fragmentation_by_name(&stream.source_uri, &request.name).await?.is_some() {
            return Err(Error::Conflict(format!(
                "fragmentation '{}' already exists on stream '{}'",
                request.name, stream.name
            )));
        }

        let fragmentation = Fragmentation::new(
            &stream.source_uri,
            &request.name,
            ShaclPath::new(request.shacl_path),
            request.strategy,
        );
        self.storage.add_fragmentation(fragmentation.clone()).await?;

        let builder = FragmentationBuilder::new(Arc::clone(&self.storage), fragmentation.clone())
            .with_progress_interval(self.progress_interval);
        self.builds.start(builder)?;

        Ok(fragmentation)
    }

    pub async fn list_fragmentations(&self, stream_name: &str) -> Result<Vec<Fragmentation>> {
        let stream = self.stream(stream_name).await?;
        self.storage.list_fragmentations(&stream.source_uri).await
    }

    /// Withdraw a fragmentation from the serving path, aborting its build if one runs.
    pub async fn retire_fragmentation(&self, stream_name: &str, name: &str) -> Result<Fragmentation> {
        let stream = self.stream(stream_name).await?;
        let key = (stream.source_uri.clone(), name.to_string());
        if self.builds.stop(&key) {
            info!(stream = %stream.name, fragmentation = name, "running build asked to stop");
        }

        // Compare-and-set against whatever the builder last wrote. Statuses only
        // move forward, so this settles within a few rounds.
        loop {
            let mut fragmentation = self
                .storage
                .get_fragmentation_by_name(&stream.source_uri, name)
                .await?
                .ok_or_else(|| Error::FragmentationNotFound(name.to_string()))?;
            if fragmentation.status == EntityStatus::Retired {
                return Ok(fragmentation);
            }

            let retired = self
                .storage
                .update_fragmentation_status(
                    &stream.source_uri,
                    name,
                    fragmentation.status,
                    EntityStatus::Retired,
                )
                .await?;
            if retired {
                info!(stream = %stream.name, fragmentation = name, "fragmentation retired");
                fragmentation.status = EntityStatus::Retired;
                return Ok(fragmentation);
            }
        }
    }
}

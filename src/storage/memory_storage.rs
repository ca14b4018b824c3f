use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::core::{Bucket, EntityStatus, EventStream, Fragmentation, RDFEvent};
use crate::storage::{EventSequence, Storage};
use crate::{Error, Result};

/// Events are ordered by timestamp, then by arrival.
type EventKey = (DateTime<Utc>, u64);

const DEFAULT_CHUNK_SIZE: usize = 256;

#[derive(Debug)]
struct BucketEntry {
    bucket: Bucket,
    members: BTreeMap<EventKey, RDFEvent>,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by source URI; `name` is the canonical alias.
    streams: HashMap<String, EventStream>,
    /// Every name ever registered, mapped to its source URI.
    aliases: HashMap<String, String>,
    events: HashMap<String, BTreeMap<EventKey, RDFEvent>>,
    fragmentations: HashMap<(String, String), Fragmentation>,
    buckets: HashMap<(String, String), BTreeMap<String, BucketEntry>>,
    sequence: u64,
}

#[derive(Debug, Clone)]
enum Source {
    Stream(String),
    Bucket { stream_id: String, fragment_name: String, value: String },
}

impl State {
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    fn members(&self, source: &Source) -> Option<&BTreeMap<EventKey, RDFEvent>> {
        match source {
            Source::Stream(stream_id) => self.events.get(stream_id),
            Source::Bucket { stream_id, fragment_name, value } => self
                .buckets
                .get(&(stream_id.clone(), fragment_name.clone()))
                .and_then(|buckets| buckets.get(value))
                .map(|entry| &entry.members),
        }
    }
}

/// In-process storage backed by ordered maps behind a single lock.
///
/// Event sequences are read lazily in chunks; each chunk resumes strictly after
/// the last key handed out, so events appended meanwhile may or may not be seen.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
    chunk_size: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), chunk_size: chunk_size.max(1) }
    }

    fn scan(&self, source: Source, since: Option<DateTime<Utc>>) -> EventSequence {
        let state = Arc::clone(&self.state);
        let chunk_size = self.chunk_size;
        let start = since.map_or(Bound::Unbounded, |t| Bound::Included((t, 0)));

        stream::unfold(start, move |cursor| {
            let state = Arc::clone(&state);
            let source = source.clone();
            async move {
                let chunk: Vec<(EventKey, RDFEvent)> = {
                    let guard = state.read();
                    guard.members(&source).map_or_else(Vec::new, |members| {
                        members
                            .range((cursor, Bound::Unbounded))
                            .take(chunk_size)
                            .map(|(key, event)| (*key, event.clone()))
                            .collect()
                    })
                };

                let (last_key, _) = chunk.last()?;
                let next = Bound::Excluded(*last_key);
                Some((stream::iter(chunk.into_iter().map(|(_, event)| Ok::<RDFEvent, Error>(event))), next))
            }
        })
        .flatten()
        .boxed()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn add_stream(&self, stream: EventStream) -> Result<()> {
        let mut state = self.state.write();

        if let Some(owner) = state.aliases.get(&stream.name) {
            if *owner != stream.source_uri {
                return Err(Error::Conflict(format!(
                    "stream name '{}' already belongs to {}",
                    stream.name, owner
                )));
            }
        }

        debug!(source_uri = %stream.source_uri, name = %stream.name, "registering stream");
        state.aliases.insert(stream.name.clone(), stream.source_uri.clone());
        state.events.entry(stream.source_uri.clone()).or_default();
        state.streams.insert(stream.source_uri.clone(), stream);
        Ok(())
    }

    async fn get_stream_by_name(&self, name: &str) -> Result<Option<EventStream>> {
        let state = self.state.read();
        Ok(state.aliases.get(name).and_then(|uri| state.streams.get(uri)).cloned())
    }

    async fn get_stream_by_id(&self, source_uri: &str) -> Result<Option<EventStream>> {
        Ok(self.state.read().streams.get(source_uri).cloned())
    }

    async fn append_event(&self, stream_id: &str, event: RDFEvent) -> Result<()> {
        let mut state = self.state.write();
        if !state.streams.contains_key(stream_id) {
            return Err(Error::StreamNotFound(stream_id.to_string()));
        }

        let key = (event.timestamp, state.next_sequence());
        state.events.entry(stream_id.to_string()).or_default().insert(key, event);
        Ok(())
    }

    async fn get_fragmentation_by_name(
        &self,
        stream_id: &str,
        name: &str,
    ) -> Result<Option<Fragmentation>> {
        let key = (stream_id.to_string(), name.to_string());
        Ok(self.state.read().fragmentations.get(&key).cloned())
    }

    async fn add_fragmentation(&self, fragmentation: Fragmentation) -> Result<()> {
        let key = (fragmentation.stream_id.clone(), fragmentation.name.clone());
        debug!(
            stream_id = %fragmentation.stream_id,
            name = %fragmentation.name,
            status = ?fragmentation.status,
            "storing fragmentation"
        );
        self.state.write().fragmentations.insert(key, fragmentation);
        Ok(())
    }

    async fn list_fragmentations(&self, stream_id: &str) -> Result<Vec<Fragmentation>> {
        let state = self.state.read();
        let mut fragmentations: Vec<Fragmentation> = state
            .fragmentations
            .values()
            .filter(|f| f.stream_id == stream_id)
            .cloned()
            .collect();
        fragmentations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fragmentations)
    }

    async fn update_fragmentation_status(
        &self,
        stream_id: &str,
        name: &str,
        expected: EntityStatus,
        status: EntityStatus,
    ) -> Result<bool> {
        let key = (stream_id.to_string(), name.to_string());
        let mut state = self.state.write();
        match state.fragmentations.get_mut(&key) {
            Some(fragmentation) if fragmentation.status == expected => {
                debug!(stream_id, name, from = ?expected, to = ?status, "fragmentation status changed");
                fragmentation.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_events_by_stream(
        &self,
        stream_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<EventSequence> {
        Ok(self.scan(Source::Stream(stream_id.to_string()), since))
    }

    async fn get_events_by_bucket(
        &self,
        stream_id: &str,
        fragment_name: &str,
        bucket_value: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<EventSequence> {
        let source = Source::Bucket {
            stream_id: stream_id.to_string(),
            fragment_name: fragment_name.to_string(),
            value: bucket_value.to_string(),
        };
        Ok(self.scan(source, since))
    }

    async fn get_buckets_by_fragmentation(
        &self,
        stream_id: &str,
        fragmentation_name: &str,
    ) -> Result<Vec<Bucket>> {
        let key = (stream_id.to_string(), fragmentation_name.to_string());
        let state = self.state.read();
        Ok(state
            .buckets
            .get(&key)
            .map(|buckets| buckets.values().map(|entry| entry.bucket.clone()).collect())
            .unwrap_or_default())
    }

    async fn append_event_to_bucket(
        &self,
        stream_id: &str,
        fragment_name: &str,
        bucket_value: &str,
        event: &RDFEvent,
    ) -> Result<()> {
        let mut state = self.state.write();
        let key = (event.timestamp, state.next_sequence());

        let entry = state
            .buckets
            .entry((stream_id.to_string(), fragment_name.to_string()))
            .or_default()
            .entry(bucket_value.to_string())
            .or_insert_with(|| BucketEntry {
                bucket: Bucket::new(stream_id, fragment_name, bucket_value),
                members: BTreeMap::new(),
            });

        entry.bucket.count += 1;
        entry.members.insert(key, event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ShaclPath;
    use chrono::TimeZone;
    use futures_util::TryStreamExt;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, second).unwrap()
    }

    async fn storage_with_stream() -> MemoryStorage {
        let storage = MemoryStorage::with_chunk_size(2);
        storage
            .add_stream(EventStream::new("http://example.org/s", "s", ShaclPath::default()))
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_events_come_back_in_timestamp_order() {
        let storage = storage_with_stream().await;
        for second in [3, 1, 2, 1, 5] {
            storage.append_event("http://example.org/s", RDFEvent::new(at(second), vec![])).await.unwrap();
        }

        let events: Vec<RDFEvent> = storage
            .get_events_by_stream("http://example.org/s", None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let seconds: Vec<DateTime<Utc>> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(seconds, vec![at(1), at(1), at(2), at(3), at(5)]);
    }

    #[tokio::test]
    async fn test_since_is_inclusive() {
        let storage = storage_with_stream().await;
        for second in [1, 2, 2, 3] {
            storage.append_event("http://example.org/s", RDFEvent::new(at(second), vec![])).await.unwrap();
        }

        let events: Vec<RDFEvent> = storage
            .get_events_by_stream("http://example.org/s", Some(at(2)))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, at(2));
    }

    #[tokio::test]
    async fn test_rename_keeps_alias() {
        let storage = storage_with_stream().await;
        storage
            .add_stream(EventStream::new("http://example.org/s", "renamed", ShaclPath::default()))
            .await
            .unwrap();

        let via_old = storage.get_stream_by_name("s").await.unwrap().unwrap();
        assert_eq!(via_old.name, "renamed");
        let via_id = storage.get_stream_by_id("http://example.org/s").await.unwrap().unwrap();
        assert_eq!(via_id.name, "renamed");
    }

    #[tokio::test]
    async fn test_name_owned_by_other_stream_conflicts() {
        let storage = storage_with_stream().await;
        let result = storage
            .add_stream(EventStream::new("http://example.org/other", "s", ShaclPath::default()))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_status_update_only_from_expected() {
        let storage = storage_with_stream().await;
        let fragmentation =
            Fragmentation::new("http://example.org/s", "f", ShaclPath::default(), Default::default());
        storage.add_fragmentation(fragmentation).await.unwrap();

        let moved = storage
            .update_fragmentation_status("http://example.org/s", "f", EntityStatus::Ready, EntityStatus::Retired)
            .await
            .unwrap();
        assert!(!moved);

        let moved = storage
            .update_fragmentation_status("http://example.org/s", "f", EntityStatus::Building, EntityStatus::Ready)
            .await
            .unwrap();
        assert!(moved);

        let stored = storage.get_fragmentation_by_name("http://example.org/s", "f").await.unwrap().unwrap();
        assert_eq!(stored.status, EntityStatus::Ready);

        let missing = storage
            .update_fragmentation_status("http://example.org/s", "nope", EntityStatus::Building, EntityStatus::Ready)
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_bucket_counts_increment() {
        let storage = storage_with_stream().await;
        let event = RDFEvent::new(at(1), vec![]);
        storage.append_event_to_bucket("http://example.org/s", "f", "a", &event).await.unwrap();
        storage.append_event_to_bucket("http://example.org/s", "f", "a", &event).await.unwrap();
        storage.append_event_to_bucket("http://example.org/s", "f", "b", &event).await.unwrap();

        let buckets = storage.get_buckets_by_fragmentation("http://example.org/s", "f").await.unwrap();
        let counts: Vec<(&str, u64)> = buckets.iter().map(|b| (b.value.as_str(), b.count)).collect();
        assert_eq!(counts, vec![("a", 2), ("b", 1)]);
    }
}

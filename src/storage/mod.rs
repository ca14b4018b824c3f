//! Storage contract consumed by the builder and the serving path.
//!
//! The durable engine behind it is an external collaborator; [`MemoryStorage`]
//! implements the contract in-process for the server binary and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::core::{Bucket, EntityStatus, EventStream, Fragmentation, RDFEvent};
use crate::Result;

pub mod memory_storage;

pub use memory_storage::MemoryStorage;

/// Lazy, ascending-timestamp sequence of events.
pub type EventSequence = BoxStream<'static, Result<RDFEvent>>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Register a stream, or rename it when its `source_uri` is already known.
    /// Previous names keep resolving to the stream as non-canonical aliases.
    async fn add_stream(&self, stream: EventStream) -> Result<()>;

    /// Resolve any alias to the stream's current record.
    async fn get_stream_by_name(&self, name: &str) -> Result<Option<EventStream>>;

    async fn get_stream_by_id(&self, source_uri: &str) -> Result<Option<EventStream>>;

    /// Append an event to a stream's log.
    async fn append_event(&self, stream_id: &str, event: RDFEvent) -> Result<()>;

    async fn get_fragmentation_by_name(
        &self,
        stream_id: &str,
        name: &str,
    ) -> Result<Option<Fragmentation>>;

    /// Insert or overwrite a fragmentation; used for status transitions too.
    async fn add_fragmentation(&self, fragmentation: Fragmentation) -> Result<()>;

    async fn list_fragmentations(&self, stream_id: &str) -> Result<Vec<Fragmentation>>;

    /// Move a fragmentation from `expected` to `status` atomically.
    ///
    /// Returns `false` without writing when the stored status is not `expected`
    /// or the fragmentation does not exist.
    async fn update_fragmentation_status(
        &self,
        stream_id: &str,
        name: &str,
        expected: EntityStatus,
        status: EntityStatus,
    ) -> Result<bool>;

    /// Events of a stream with `timestamp >= since`, oldest first.
    async fn get_events_by_stream(
        &self,
        stream_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<EventSequence>;

    /// Events assigned to one bucket with `timestamp >= since`, oldest first.
    async fn get_events_by_bucket(
        &self,
        stream_id: &str,
        fragment_name: &str,
        bucket_value: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<EventSequence>;

    async fn get_buckets_by_fragmentation(
        &self,
        stream_id: &str,
        fragmentation_name: &str,
    ) -> Result<Vec<Bucket>>;

    /// Record that `event` belongs to a bucket and increment its count, atomically.
    async fn append_event_to_bucket(
        &self,
        stream_id: &str,
        fragment_name: &str,
        bucket_value: &str,
        event: &RDFEvent,
    ) -> Result<()>;
}

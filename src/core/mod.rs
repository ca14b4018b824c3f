//! Core data structures and types for the streamtree fragmentation engine

use chrono::{DateTime, Utc};
use oxigraph::model::Quad;
use serde::{Deserialize, Serialize};

pub mod path;
pub use path::ShaclPath;

/// XML Schema string datatype, used for prefix bucket values.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// XML Schema dateTime datatype, used for timestamp cursors.
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// An append-only stream of RDF events.
///
/// `source_uri` is the immutable identity. `name` is the canonical alias at the
/// time the record was read; older names may still resolve to the same stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStream {
    pub source_uri: String,
    pub name: String,
    pub time_property: ShaclPath,
}

impl EventStream {
    pub fn new(source_uri: &str, name: &str, time_property: ShaclPath) -> Self {
        Self { source_uri: source_uri.to_string(), name: name.to_string(), time_property }
    }
}

/// One event of a stream: its event time and the statements describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RDFEvent {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<Quad>,
}

impl RDFEvent {
    pub fn new(timestamp: DateTime<Utc>, data: Vec<Quad>) -> Self {
        Self { timestamp, data }
    }
}

/// Lifecycle of a fragmentation. Only `Ready` fragmentations are served.
///
/// A status only moves forward: `Building` to `Ready` or `Failed`, and any
/// status to `Retired`. Nothing ever returns to `Building`, so a backfill
/// runs at most once per fragmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    /// Created, backfill not completed yet
    Building,
    /// Backfill completed; visible on the serving path
    Ready,
    /// Backfill failed or was aborted; its bucket counts are partial
    Failed,
    /// Withdrawn by an operator
    Retired,
}

impl EntityStatus {
    pub fn is_servable(self) -> bool {
        matches!(self, EntityStatus::Ready)
    }
}

/// Strategy discriminator plus strategy-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Bucket on every prefix of the selected value.
    Prefix {
        /// Deepest prefix to emit; the full value when absent.
        #[serde(default)]
        max_length: Option<usize>,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Prefix { max_length: None }
    }
}

/// A named partitioning scheme over one stream, identified by `(stream_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragmentation {
    pub stream_id: String,
    pub name: String,
    pub shacl_path: ShaclPath,
    pub strategy: StrategyConfig,
    pub status: EntityStatus,
}

impl Fragmentation {
    /// A fresh fragmentation waiting for its build.
    pub fn new(stream_id: &str, name: &str, shacl_path: ShaclPath, strategy: StrategyConfig) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
            shacl_path,
            strategy,
            status: EntityStatus::Building,
        }
    }
}

/// A partition cell of a fragmentation, a.k.a. fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub stream_id: String,
    pub fragment_name: String,
    pub value: String,
    pub count: u64,
    pub data_type: String,
}

impl Bucket {
    pub fn new(stream_id: &str, fragment_name: &str, value: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            fragment_name: fragment_name.to_string(),
            value: value.to_string(),
            count: 0,
            data_type: XSD_STRING.to_string(),
        }
    }
}

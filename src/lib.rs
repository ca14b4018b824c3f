//! # streamtree
//!
//! streamtree partitions append-only streams of timestamped RDF events into
//! named fragments (buckets) and publishes the result as a paginated TREE
//! hypermedia collection.
//!
//! A stream is registered once and receives events over time. Operators define
//! fragmentations on a stream: a SHACL path selecting one value per event and a
//! bucketing strategy turning that value into bucket labels. Each fragmentation
//! is backfilled by a one-shot builder task, after which it becomes servable.
//!
//! ## Features
//!
//! - Pluggable bucket strategies (prefix bucketing ships by default)
//! - Asynchronous, single-shot fragmentation builds with progress tracking
//! - Cursor pagination that never splits a group of equal timestamps
//! - Canonical stream names with permanent redirects from aliases
//!
//! ## Example
//!
//! ```rust
//! use streamtree::buckets::{BucketStrategy, PrefixBucketStrategy};
//! use streamtree::core::ShaclPath;
//!
//! let path = ShaclPath::new(vec!["http://example.org/name".to_string()]);
//! let strategy = PrefixBucketStrategy::new("http://example.org/stream", "by-name", path, None);
//! assert_eq!(strategy.relation_type(), "https://w3id.org/tree#PrefixRelation");
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]

/// Entity model: streams, events, fragmentations and buckets
pub mod core;

/// Bucket strategies and the per-strategy fragment registry
pub mod buckets;

/// One-shot fragmentation builder
pub mod builder;

/// Registries of in-flight work
pub mod registry;

/// Storage contract and the in-memory implementation
pub mod storage;

/// Cursor pagination over ordered event sequences
pub mod pagination;

/// TREE relations and JSON-LD views
pub mod hypermedia;

/// Read path shared by the HTTP handlers
pub mod serving;

/// N-Quads ingestion into stream events
pub mod ingest;

/// Server configuration
pub mod config;

/// HTTP API
pub mod http;

pub mod error {
    //! Error types and result definitions

    use thiserror::Error;

    /// Result type alias for streamtree operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for streamtree
    #[derive(Debug, Error)]
    pub enum Error {
        /// No stream is registered under the requested name or identifier
        #[error("Stream not found: {0}")]
        StreamNotFound(String),
        /// The fragmentation does not exist or is not servable
        #[error("Fragmentation not found: {0}")]
        FragmentationNotFound(String),
        /// An entity with the same identity already exists
        #[error("Conflict: {0}")]
        Conflict(String),
        /// A request whose payload fails validation
        #[error("Invalid request: {0}")]
        InvalidRequest(String),
        /// A `since` cursor that cannot be parsed
        #[error("Invalid cursor: {0}")]
        InvalidCursor(String),
        /// Malformed RDF payload
        #[error("RDF error: {0}")]
        Rdf(String),
        /// A build that may not run for this fragmentation
        #[error("Build rejected: {0}")]
        BuildRejected(String),
        /// Failure reported by the storage collaborator
        #[error("Storage error: {0}")]
        Storage(String),
        /// Configuration error
        #[error("Configuration error: {0}")]
        Config(String),
        /// IO error
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }
}

// Re-export commonly used types
pub use error::{Error, Result};

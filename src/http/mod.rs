//! HTTP API module for streamtree
//!
//! Provides REST endpoints for:
//! - TREE views of streams, fragmentations and buckets
//! - Stream registration and N-Quads ingestion
//! - Fragmentation lifecycle and build status

pub mod server;

pub use server::{
    create_server, start_server, ApiError, AppState, ErrorResponse, IngestResponse, PageParams,
    PruneResponse, SuccessResponse,
};

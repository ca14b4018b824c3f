pub mod build_registry;

pub use build_registry::{BuildKey, BuildMetadata, BuildRegistry, BuildStatus};

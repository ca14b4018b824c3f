//! Bucket strategies decide which buckets of a fragmentation an event belongs to.
//!
//! Every strategy is built from the same `(stream_id, fragment_name, shacl_path)`
//! triple plus its own parameters, and labels one event at a time. Labeling is
//! deterministic: the same event and configuration always yield the same
//! ordered bucket values.

use std::sync::Arc;

use crate::core::{Bucket, Fragmentation, RDFEvent, StrategyConfig};

pub mod prefix;
pub mod registry;

pub use prefix::PrefixBucketStrategy;
pub use registry::FragmentRegistry;

/// Labeling contract shared by all bucketing schemes.
pub trait BucketStrategy: Send {
    /// Buckets the event belongs to, in strategy order. Empty when the
    /// event has no value under the strategy's path.
    fn label_object(&mut self, event: &RDFEvent) -> Vec<Arc<Bucket>>;

    /// TREE relation type describing this strategy's buckets.
    fn relation_type(&self) -> &'static str;

    /// Select which stored buckets appear in the fragmentation index.
    fn filter_index_fragments(&self, buckets: Vec<Bucket>) -> Vec<Bucket> {
        buckets
    }
}

/// Build the strategy a fragmentation is configured with.
pub fn create_strategy(fragmentation: &Fragmentation) -> Box<dyn BucketStrategy> {
    match &fragmentation.strategy {
        StrategyConfig::Prefix { max_length } => Box::new(PrefixBucketStrategy::new(
            &fragmentation.stream_id,
            &fragmentation.name,
            fragmentation.shacl_path.clone(),
            *max_length,
        )),
    }
}

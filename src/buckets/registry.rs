//! Per-strategy deduplication of bucket objects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::Bucket;

/// Maps bucket values to a single shared bucket for the lifetime of one strategy.
///
/// This is an in-memory identity cache only; durable counts live in storage.
#[derive(Debug)]
pub struct FragmentRegistry {
    stream_id: String,
    fragment_name: String,
    buckets: HashMap<String, Arc<Bucket>>,
}

impl FragmentRegistry {
    pub fn new(stream_id: &str, fragment_name: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            fragment_name: fragment_name.to_string(),
            buckets: HashMap::new(),
        }
    }

    /// The bucket registered for `value`, creating it with a zero count on first use.
    pub fn get_bucket(&mut self, value: &str) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(value) {
            return Arc::clone(bucket);
        }

        let bucket = Arc::new(Bucket::new(&self.stream_id, &self.fragment_name, value));
        self.buckets.insert(value.to_string(), Arc::clone(&bucket));
        bucket
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

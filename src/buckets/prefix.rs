//! Prefix bucketing: an event with value `"abc"` lands in `"a"`, `"ab"` and `"abc"`.
//!
//! Writing every prefix makes any prefix depth answerable from a single bucket,
//! at the cost of one membership per character of the value.

use std::sync::Arc;

use crate::buckets::{BucketStrategy, FragmentRegistry};
use crate::core::{Bucket, RDFEvent, ShaclPath};

pub const PREFIX_RELATION: &str = "https://w3id.org/tree#PrefixRelation";

pub struct PrefixBucketStrategy {
    shacl_path: ShaclPath,
    max_length: Option<usize>,
    registry: FragmentRegistry,
}

impl PrefixBucketStrategy {
    pub fn new(
        stream_id: &str,
        fragment_name: &str,
        shacl_path: ShaclPath,
        max_length: Option<usize>,
    ) -> Self {
        Self { shacl_path, max_length, registry: FragmentRegistry::new(stream_id, fragment_name) }
    }

    fn select_value(&self, event: &RDFEvent) -> Option<String> {
        self.shacl_path.select_value(&event.data)
    }
}

impl BucketStrategy for PrefixBucketStrategy {
    fn label_object(&mut self, event: &RDFEvent) -> Vec<Arc<Bucket>> {
        let Some(value) = self.select_value(event) else {
            return Vec::new();
        };

        // Cut on char boundaries so multibyte values never yield invalid prefixes.
        let ends: Vec<usize> =
            value.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
        let depth = self.max_length.map_or(ends.len(), |max| max.min(ends.len()));

        ends[..depth].iter().map(|&end| self.registry.get_bucket(&value[..end])).collect()
    }

    fn relation_type(&self) -> &'static str {
        PREFIX_RELATION
    }
}

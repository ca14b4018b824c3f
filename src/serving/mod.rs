//! The read path: canonical-name resolution, pagination and hypermedia views.
//!
//! Handlers stay thin; everything a request means is decided here, so the
//! protocol is testable without a socket.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::buckets::create_strategy;
use crate::config::ServerConfig;
use crate::core::{EventStream, Fragmentation};
use crate::hypermedia::{collection_node, events_to_json_ld, Relation, View, TREE_VIEW};
use crate::pagination::{parse_since, read_page, DataUrls};
use crate::storage::Storage;
use crate::{Error, Result};

pub mod operator;

pub use operator::{CreateFragmentation, OperatorService, RegisterStream};

/// Query parameters of a data request.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// The `since` cursor as sent by the client
    pub since: Option<String>,
    /// Full query string, replayed verbatim on canonical redirects
    pub raw_query: Option<String>,
}

impl PageRequest {
    pub fn since(since: &str) -> Self {
        Self { since: Some(since.to_string()), raw_query: Some(format!("since={}", since)) }
    }

    fn cursor(&self) -> Result<Option<DateTime<Utc>>> {
        self.since.as_deref().map(parse_since).transpose()
    }

    fn redirect_to(&self, url: String) -> Reply {
        match self.raw_query.as_deref() {
            Some(query) if !query.is_empty() => Reply::Redirect(format!("{}?{}", url, query)),
            _ => Reply::Redirect(url),
        }
    }
}

/// Outcome of a data request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Permanent redirect to the canonical URL
    Redirect(String),
    /// JSON-LD document
    Document(Value),
}

enum Resolution {
    Canonical(EventStream),
    Alias(EventStream),
}

#[derive(Clone)]
pub struct DataService {
    storage: Arc<dyn Storage>,
    urls: DataUrls,
    page_size: usize,
    bucket_page_size: usize,
}

impl DataService {
    pub fn new(storage: Arc<dyn Storage>, config: &ServerConfig) -> Self {
        Self {
            storage,
            urls: DataUrls::new(&config.public_base_url()),
            page_size: config.page_size,
            bucket_page_size: config.bucket_page_size,
        }
    }

    pub fn urls(&self) -> &DataUrls {
        &self.urls
    }

    /// Resolve a requested name; any name other than the stored one is an alias.
    async fn resolve_stream(&self, name: &str) -> Result<Resolution> {
        let stream = self
            .storage
            .get_stream_by_name(name)
            .await?
            .ok_or_else(|| Error::StreamNotFound(name.to_string()))?;

        let canonical = self
            .storage
            .get_stream_by_id(&stream.source_uri)
            .await?
            .ok_or_else(|| Error::StreamNotFound(stream.source_uri.clone()))?;

        if canonical.name == name {
            Ok(Resolution::Canonical(canonical))
        } else {
            debug!(requested = name, canonical = %canonical.name, "redirecting alias");
            Ok(Resolution::Alias(canonical))
        }
    }

    async fn servable_fragmentation(&self, stream: &EventStream, name: &str) -> Result<Fragmentation> {
        match self.storage.get_fragmentation_by_name(&stream.source_uri, name).await? {
            Some(fragmentation) if fragmentation.status.is_servable() => Ok(fragmentation),
            _ => Err(Error::FragmentationNotFound(name.to_string())),
        }
    }

    /// `GET /data/{stream}`: one page of the raw event collection.
    pub async fn collection(&self, stream_name: &str, request: &PageRequest) -> Result<Reply> {
        let stream = match self.resolve_stream(stream_name).await? {
            Resolution::Canonical(stream) => stream,
            Resolution::Alias(canonical) => {
                return Ok(request.redirect_to(self.urls.collection(&canonical.name)));
            }
        };

        let since = request.cursor()?;
        let events = self.storage.get_events_by_stream(&stream.source_uri, since).await?;
        let page = read_page(events, since, self.page_size).await?;

        let collection_url = self.urls.collection(&stream.name);
        let view_url = self.urls.collection_since(&stream.name, since);

        let mut relations = Vec::new();
        if let Some(next) = page.next_cursor() {
            relations.push(Relation::next_page(
                self.urls.collection_since(&stream.name, Some(next)),
                &stream.time_property,
                next,
            ));
        }

        let mut included = vec![collection_node(&collection_url, &view_url, &page.events)];
        included.extend(events_to_json_ld(&page.events));

        Ok(Reply::Document(View { id: view_url, relations, included }.to_json_ld()))
    }

    /// `GET /data/{stream}/{fragmentation}`: relations to every indexed bucket.
    pub async fn fragmentation_index(
        &self,
        stream_name: &str,
        fragmentation_name: &str,
        request: &PageRequest,
    ) -> Result<Reply> {
        let stream = match self.resolve_stream(stream_name).await? {
            Resolution::Canonical(stream) => stream,
            Resolution::Alias(canonical) => {
                return Ok(request
                    .redirect_to(self.urls.fragmentation(&canonical.name, fragmentation_name)));
            }
        };

        let fragmentation = self.servable_fragmentation(&stream, fragmentation_name).await?;
        let strategy = create_strategy(&fragmentation);
        let buckets = self
            .storage
            .get_buckets_by_fragmentation(&stream.source_uri, &fragmentation.name)
            .await?;

        let relations = strategy
            .filter_index_fragments(buckets)
            .iter()
            .map(|bucket| {
                Relation::fragment(
                    strategy.relation_type(),
                    self.urls.fragment(&stream.name, &fragmentation.name, &bucket.value),
                    &fragmentation.shacl_path,
                    bucket,
                )
            })
            .collect();

        let view_url = self.urls.fragmentation(&stream.name, &fragmentation.name);
        let included = vec![json!({
            "@id": self.urls.collection(&stream.name),
            TREE_VIEW: view_url,
        })];

        Ok(Reply::Document(View { id: view_url, relations, included }.to_json_ld()))
    }

    /// `GET /data/{stream}/{fragmentation}/{bucket}`: a bounded page of one bucket.
    ///
    /// No `next` relation is emitted; callers resume with their own `since`.
    pub async fn fragment(
        &self,
        stream_name: &str,
        fragmentation_name: &str,
        bucket_value: &str,
        request: &PageRequest,
    ) -> Result<Reply> {
        let stream = match self.resolve_stream(stream_name).await? {
            Resolution::Canonical(stream) => stream,
            Resolution::Alias(canonical) => {
                return Ok(request.redirect_to(self.urls.fragment(
                    &canonical.name,
                    fragmentation_name,
                    bucket_value,
                )));
            }
        };

        let fragmentation = self.servable_fragmentation(&stream, fragmentation_name).await?;
        let since = request.cursor()?;
        let events = self
            .storage
            .get_events_by_bucket(&stream.source_uri, &fragmentation.name, bucket_value, since)
            .await?;
        let page = read_page(events, since, self.bucket_page_size).await?;

        Ok(Reply::Document(Value::Array(events_to_json_ld(&page.events))))
    }
}

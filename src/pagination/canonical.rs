//! URLs of the data routes, always built from a stream name.
//!
//! Aliases of a stream must redirect to the URL built from its canonical name,
//! keeping the query string intact.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::pagination::format_timestamp;

/// Characters escaped inside a single path segment or query value.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn encode(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

#[derive(Debug, Clone)]
pub struct DataUrls {
    base: String,
}

impl DataUrls {
    pub fn new(base: &str) -> Self {
        Self { base: base.trim_end_matches('/').to_string() }
    }

    pub fn collection(&self, stream: &str) -> String {
        format!("{}/data/{}", self.base, encode(stream))
    }

    pub fn collection_since(&self, stream: &str, since: Option<DateTime<Utc>>) -> String {
        with_since(self.collection(stream), since)
    }

    pub fn fragmentation(&self, stream: &str, fragmentation: &str) -> String {
        format!("{}/{}", self.collection(stream), encode(fragmentation))
    }

    pub fn fragment(&self, stream: &str, fragmentation: &str, value: &str) -> String {
        format!("{}/{}", self.fragmentation(stream, fragmentation), encode(value))
    }

    pub fn fragment_since(
        &self,
        stream: &str,
        fragmentation: &str,
        value: &str,
        since: Option<DateTime<Utc>>,
    ) -> String {
        with_since(self.fragment(stream, fragmentation, value), since)
    }
}

fn with_since(url: String, since: Option<DateTime<Utc>>) -> String {
    match since {
        Some(t) => format!("{}?since={}", url, encode(&format_timestamp(t))),
        None => url,
    }
}

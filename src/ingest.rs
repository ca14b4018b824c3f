//! Turning an N-Quads payload into stream events.
//!
//! Every subject whose time property resolves to a timestamp starts one event;
//! the event holds every statement reachable from that subject.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Quad;
use tracing::{debug, warn};

use crate::core::path::{node_key, term_value, SubjectIndex};
use crate::core::{EventStream, RDFEvent};
use crate::{Error, Result};

pub fn parse_nquads(payload: &str) -> Result<Vec<Quad>> {
    RdfParser::from_format(RdfFormat::NQuads)
        .for_reader(payload.as_bytes())
        .collect::<std::result::Result<Vec<Quad>, _>>()
        .map_err(|e| Error::Rdf(e.to_string()))
}

/// Split a payload into the events of `stream`, in document order.
pub fn parse_events(stream: &EventStream, payload: &str) -> Result<Vec<RDFEvent>> {
    if stream.time_property.is_empty() {
        return Err(Error::Rdf(format!("stream '{}' has no time property", stream.name)));
    }

    let quads = parse_nquads(payload)?;
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut events = Vec::new();

    let index = SubjectIndex::new(&quads);

    for root in index.roots() {
        let Some(term) = stream.time_property.select_from(&index, root) else {
            continue;
        };
        let raw = term_value(term)
            .ok_or_else(|| Error::Rdf(format!("time property of {} is not a literal", root)))?;
        let timestamp = parse_timestamp(&raw)?;

        let members = reachable(&index, root);
        claimed.extend(members.iter().copied());
        events.push(RDFEvent::new(timestamp, members.into_iter().map(|i| quads[i].clone()).collect()));
    }

    let dropped = quads.len() - claimed.len();
    if dropped > 0 {
        warn!(stream = %stream.name, dropped, "statements not reachable from any timestamped subject");
    }
    debug!(stream = %stream.name, events = events.len(), quads = quads.len(), "parsed payload");

    Ok(events)
}

/// Indices of the statements reachable from `root` through IRI and blank-node objects.
fn reachable(index: &SubjectIndex<'_>, root: &str) -> Vec<usize> {
    let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
    let mut frontier = vec![root.to_string()];
    let mut members: Vec<usize> = Vec::new();

    while let Some(node) = frontier.pop() {
        members.extend_from_slice(index.indices(&node));
        for quad in index.statements(&node) {
            if let Some(key) = node_key(&quad.object) {
                if visited.insert(key.clone()) {
                    frontier.push(key);
                }
            }
        }
    }

    members.sort_unstable();
    members
}

/// `xsd:dateTime` lexical form; values without an offset are read as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.and_utc())
        .map_err(|e| Error::Rdf(format!("invalid timestamp '{}': {}", raw, e)))
}

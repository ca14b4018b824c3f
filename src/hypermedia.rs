//! TREE hypermedia: relations between pages and nodes, and the JSON-LD views built from them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use oxigraph::model::{Quad, Term};
use serde_json::{json, Map, Value};

use crate::core::{path::root_subjects, Bucket, RDFEvent, ShaclPath, XSD_DATE_TIME, XSD_STRING};
use crate::pagination::format_timestamp;

pub const TREE_VIEW: &str = "https://w3id.org/tree#view";
pub const TREE_MEMBER: &str = "https://w3id.org/tree#member";
pub const TREE_RELATION: &str = "https://w3id.org/tree#relation";
pub const TREE_NODE: &str = "https://w3id.org/tree#node";
pub const TREE_REMAINING_ITEMS: &str = "https://w3id.org/tree#remainingItems";
pub const TREE_PATH: &str = "https://w3id.org/tree#path";
pub const TREE_VALUE: &str = "https://w3id.org/tree#value";
pub const GREATER_OR_EQUAL_THAN_RELATION: &str = "https://w3id.org/tree#GreaterOrEqualThanRelation";

/// A link to another page or node, with the value condition selecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub relation_type: String,
    pub node: String,
    pub remaining_items: Option<u64>,
    pub path: Vec<String>,
    pub value: String,
    pub value_type: String,
}

impl Relation {
    /// Relation to the page starting at `since`, over the stream's time property.
    pub fn next_page(node: String, time_property: &ShaclPath, since: DateTime<Utc>) -> Self {
        Self {
            relation_type: GREATER_OR_EQUAL_THAN_RELATION.to_string(),
            node,
            remaining_items: None,
            path: time_property.predicates().to_vec(),
            value: format_timestamp(since),
            value_type: XSD_DATE_TIME.to_string(),
        }
    }

    /// Relation to one bucket of a fragmentation.
    pub fn fragment(relation_type: &str, node: String, shacl_path: &ShaclPath, bucket: &Bucket) -> Self {
        Self {
            relation_type: relation_type.to_string(),
            node,
            remaining_items: Some(bucket.count),
            path: shacl_path.predicates().to_vec(),
            value: bucket.value.clone(),
            value_type: bucket.data_type.clone(),
        }
    }

    pub fn to_json_ld(&self) -> Value {
        let mut node = Map::new();
        node.insert("@id".to_string(), json!(self.node));
        if let Some(count) = self.remaining_items {
            node.insert(TREE_REMAINING_ITEMS.to_string(), json!(count));
        }

        let path: Vec<Value> = self.path.iter().map(|p| json!({ "@id": p })).collect();

        json!({
            "@type": self.relation_type,
            TREE_NODE: node,
            TREE_PATH: path,
            TREE_VALUE: { "@value": self.value, "@type": self.value_type },
        })
    }
}

/// One served resource: its identifier, outgoing relations and embedded nodes.
#[derive(Debug, Clone, Default)]
pub struct View {
    pub id: String,
    pub relations: Vec<Relation>,
    pub included: Vec<Value>,
}

impl View {
    pub fn to_json_ld(&self) -> Value {
        let relations: Vec<Value> = self.relations.iter().map(Relation::to_json_ld).collect();
        json!({
            "@id": self.id,
            TREE_RELATION: relations,
            "@included": self.included,
        })
    }
}

/// Collection node linking a collection to the view that serves it and its members.
pub fn collection_node(collection: &str, view: &str, events: &[RDFEvent]) -> Value {
    let members: Vec<Value> = events
        .iter()
        .filter_map(|e| root_subjects(&e.data).into_iter().next())
        .map(|subject| json!({ "@id": json_ld_id(&subject) }))
        .collect();

    json!({
        "@id": collection,
        TREE_VIEW: view,
        TREE_MEMBER: members,
    })
}

/// Flattened expanded JSON-LD of the events' statements, one node per subject
/// in order of first appearance. Graph names are not kept.
pub fn events_to_json_ld(events: &[RDFEvent]) -> Vec<Value> {
    let quads: Vec<&Quad> = events.iter().flat_map(|e| e.data.iter()).collect();

    let mut order: Vec<String> = Vec::new();
    let mut nodes: HashMap<String, Map<String, Value>> = HashMap::new();

    for quad in quads {
        let Some(object) = object_to_json_ld(&quad.object) else {
            continue;
        };
        let subject = json_ld_id(&quad.subject.to_string());

        let node = nodes.entry(subject.clone()).or_insert_with(|| {
            order.push(subject.clone());
            let mut node = Map::new();
            node.insert("@id".to_string(), json!(subject));
            node
        });

        let values = node
            .entry(quad.predicate.as_str().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = values {
            if !values.contains(&object) {
                values.push(object);
            }
        }
    }

    order.into_iter().filter_map(|id| nodes.remove(&id)).map(Value::Object).collect()
}

/// JSON-LD identifier from an N-Triples subject: `<iri>` becomes `iri`, blank nodes stay `_:id`.
fn json_ld_id(ntriples: &str) -> String {
    ntriples
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(ntriples)
        .to_string()
}

fn object_to_json_ld(term: &Term) -> Option<Value> {
    match term {
        Term::NamedNode(node) => Some(json!({ "@id": node.as_str() })),
        Term::BlankNode(node) => Some(json!({ "@id": format!("_:{}", node.as_str()) })),
        Term::Literal(literal) => {
            if let Some(language) = literal.language() {
                Some(json!({ "@value": literal.value(), "@language": language }))
            } else if literal.datatype().as_str() == XSD_STRING {
                Some(json!({ "@value": literal.value() }))
            } else {
                Some(json!({ "@value": literal.value(), "@type": literal.datatype().as_str() }))
            }
        }
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

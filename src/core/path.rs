//! SHACL sequence paths evaluated over an event's statements.

use std::collections::{HashMap, HashSet};

use oxigraph::model::{Quad, Term};
use serde::{Deserialize, Serialize};

/// An ordered list of predicate IRIs, read as a SHACL sequence path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShaclPath(Vec<String>);

impl ShaclPath {
    pub fn new(predicates: Vec<String>) -> Self {
        Self(predicates)
    }

    pub fn predicates(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Select the scalar value this path points at: a literal's lexical form or an IRI.
    ///
    /// Roots are tried in order of first appearance, so the result is
    /// deterministic for a given statement order.
    pub fn select_value(&self, quads: &[Quad]) -> Option<String> {
        self.select_term(quads).and_then(term_value)
    }

    /// Like [`ShaclPath::select_value`], returning the raw term.
    pub fn select_term<'a>(&self, quads: &'a [Quad]) -> Option<&'a Term> {
        if self.0.is_empty() {
            return None;
        }
        let index = SubjectIndex::new(quads);
        index.roots().iter().find_map(|root| self.select_from(&index, root))
    }

    /// Walk the path from one subject, given in N-Triples form (`<iri>` or `_:id`).
    pub fn select_from<'a>(&self, index: &SubjectIndex<'a>, root: &str) -> Option<&'a Term> {
        let mut frontier = vec![root.to_string()];

        for (step, predicate) in self.0.iter().enumerate() {
            let last = step + 1 == self.0.len();
            let mut next = Vec::new();

            for node in &frontier {
                for quad in index.statements(node).filter(|q| q.predicate.as_str() == predicate.as_str()) {
                    if last {
                        return Some(&quad.object);
                    }
                    if let Some(key) = node_key(&quad.object) {
                        next.push(key);
                    }
                }
            }

            if next.is_empty() {
                return None;
            }
            frontier = next;
        }

        None
    }
}

impl From<Vec<String>> for ShaclPath {
    fn from(predicates: Vec<String>) -> Self {
        Self(predicates)
    }
}

/// N-Triples key of a term that can be the subject of further statements.
pub fn node_key(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.to_string()),
        Term::BlankNode(node) => Some(node.to_string()),
        _ => None,
    }
}

/// Scalar string form of a term; blank nodes have none.
pub fn term_value(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        Term::Literal(literal) => Some(literal.value().to_string()),
        _ => None,
    }
}

/// Statements grouped by subject, keyed by the subject's N-Triples form.
///
/// Built once per statement set so path walks and reachability scans look a
/// subject up instead of rescanning every statement.
pub struct SubjectIndex<'a> {
    quads: &'a [Quad],
    by_subject: HashMap<String, Vec<usize>>,
    roots: Vec<String>,
}

impl<'a> SubjectIndex<'a> {
    pub fn new(quads: &'a [Quad]) -> Self {
        let mut by_subject: HashMap<String, Vec<usize>> = HashMap::new();
        let mut subjects: Vec<String> = Vec::new();
        for (i, quad) in quads.iter().enumerate() {
            let subject = quad.subject.to_string();
            let positions = by_subject.entry(subject.clone()).or_default();
            if positions.is_empty() {
                subjects.push(subject);
            }
            positions.push(i);
        }

        let objects: HashSet<String> = quads.iter().filter_map(|q| node_key(&q.object)).collect();
        let roots: Vec<String> = subjects.iter().filter(|s| !objects.contains(*s)).cloned().collect();

        Self {
            quads,
            by_subject,
            roots: if roots.is_empty() { subjects } else { roots },
        }
    }

    /// Subjects that are never used as an object, in order of first appearance.
    /// Falls back to every subject when the statements form a cycle.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Positions of the statements about `node`, in document order.
    pub fn indices(&self, node: &str) -> &[usize] {
        self.by_subject.get(node).map_or(&[][..], Vec::as_slice)
    }

    pub fn statements<'s>(&'s self, node: &str) -> impl Iterator<Item = &'a Quad> + 's {
        self.indices(node).iter().map(|&i| &self.quads[i])
    }
}

/// Subjects that are never used as an object, in order of first appearance.
pub fn root_subjects(quads: &[Quad]) -> Vec<String> {
    SubjectIndex::new(quads).roots().to_vec()
}

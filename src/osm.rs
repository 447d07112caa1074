use serde_json::{Map, Value};

/// A shaped or stored OSM record. Key order follows insertion order.
pub type Document = Map<String, Value>;

/// Provenance attributes moved under `created`, in the order they are checked.
pub const CREATED_FIELDS: [&str; 5] = ["version", "changeset", "timestamp", "user", "uid"];

/// Keys the shaper writes itself; a tag with one of these names overwrites it.
pub const RESERVED_KEYS: [&str; 5] = ["type", "created", "pos", "node_refs", "members"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"node" => Some(ElementKind::Node),
            b"way" => Some(ElementKind::Way),
            b"relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

/// One XML element with its attributes (in document order) and its children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<RawElement>,
}

impl RawElement {
    pub fn new(name: impl Into<String>) -> Self {
        RawElement {
            name: name.into(),
            ..RawElement::default()
        }
    }

    /// Builder used by tests and by hand-assembled elements.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: RawElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn kind(&self) -> Option<ElementKind> {
        ElementKind::from_name(self.name.as_bytes())
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All descendants, depth-first in document order. The element itself is
    /// not included.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a RawElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a RawElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

/// Tag keys a document carries beyond the keys every record has.
pub fn is_standard_key(key: &str) -> bool {
    matches!(key, "created" | "id" | "type" | "node_refs" | "members")
}

use crate::osm::{Document, is_standard_key};
use std::collections::BTreeMap;

/// How often each tag key appears across `documents`, ignoring the keys
/// every record carries (`created`, `id`, `type`, `node_refs`, `members`).
pub fn count_tags<'a, I>(documents: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut tags = BTreeMap::new();
    for doc in documents {
        for key in doc.keys().filter(|key| !is_standard_key(key)) {
            *tags.entry(key.clone()).or_insert(0) += 1;
        }
    }
    tags
}

/// How often each first word appears in a list of street names. Blank names
/// are skipped.
pub fn street_types<I, S>(streets: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut types = BTreeMap::new();
    for street in streets {
        if let Some(first_word) = street.as_ref().split_whitespace().next() {
            *types.entry(first_word.to_string()).or_insert(0) += 1;
        }
    }
    types
}

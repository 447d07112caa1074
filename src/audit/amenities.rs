use crate::collection::{Collection, Filter, Update};
use anyhow::Result;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;

/// An `amenity` value must appear this many times before it is treated as a
/// canonical tag.
pub const MIN_AMENITY_OCCURRENCES: usize = 3;

/// Count how many records carry each distinct string `amenity` value, in the
/// order the values are first seen.
pub fn amenity_counts<C: Collection + ?Sized>(collection: &C) -> Result<Vec<(String, usize)>> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for record in collection.find(&Filter::new().exists("amenity"))? {
        let Some(value) = record.doc.get("amenity").and_then(Value::as_str) else {
            continue;
        };
        match counts.iter_mut().find(|(tag, _)| tag == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    Ok(counts)
}

/// Promote boolean-like tags such as `cafe=yes` into `amenity=cafe`.
///
/// Every `amenity` value seen at least `min_occurrences` times becomes a
/// candidate. Records with a field named after a candidate get
/// `amenity` set to it, and the field is removed where its value is `"yes"`.
/// Candidates run in first-seen order, so a record matching several ends up
/// with the last one.
/// Returns, per candidate, how many records had `amenity` set.
pub fn canonicalize_amenities<C: Collection + ?Sized>(
    collection: &mut C,
    min_occurrences: usize,
) -> Result<BTreeMap<String, usize>> {
    let counts = amenity_counts(collection)?;
    let mut updated = BTreeMap::new();

    for (tag, count) in counts {
        if count < min_occurrences {
            debug!("Amenity `{}` seen {} times, below threshold", tag, count);
            continue;
        }
        let matched = collection.update_many(
            &Filter::new().exists(tag.as_str()),
            &Update::new().set("amenity", tag.as_str()),
        )?;
        collection.update_many(
            &Filter::new().equals(tag.as_str(), "yes"),
            &Update::new().unset(tag.as_str()),
        )?;
        updated.insert(tag, matched);
    }

    info!("Amenity canonicalization updated {:?}", updated);
    Ok(updated)
}

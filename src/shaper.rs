use crate::osm::{CREATED_FIELDS, Document, ElementKind, RESERVED_KEYS, RawElement};
use log::warn;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors raised while shaping a single element. All of them mean the input
/// is not valid OSM XML and conversion should stop.
#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("<{element}> in {parent} {id} is missing required attribute `{attribute}`")]
    MissingAttribute {
        parent: &'static str,
        id: String,
        element: String,
        attribute: &'static str,
    },
    #[error("{kind} {id} has invalid {axis} coordinate `{value}`")]
    InvalidCoordinate {
        kind: &'static str,
        id: String,
        axis: &'static str,
        value: String,
    },
}

/// Convert one top-level element and its subtree into a flat document.
///
/// Returns `Ok(None)` when the element is not a node, way or relation.
pub fn shape_element(element: &RawElement) -> Result<Option<Document>, ShapeError> {
    let Some(kind) = element.kind() else {
        return Ok(None);
    };
    let id = element.attr("id").unwrap_or_default().to_string();

    let mut doc = Document::new();
    for (key, value) in &element.attributes {
        doc.insert(key.clone(), Value::String(value.clone()));
    }
    doc.insert("type".to_string(), json!(kind.as_str()));

    let mut created = Map::new();
    for field in CREATED_FIELDS {
        if has_value(&doc, field)
            && let Some(value) = doc.shift_remove(field)
        {
            created.insert(field.to_string(), value);
        }
    }
    doc.insert("created".to_string(), Value::Object(created));

    if has_value(&doc, "lat") && has_value(&doc, "lon") {
        let lat = parse_coordinate(&mut doc, kind, &id, "lat")?;
        let lon = parse_coordinate(&mut doc, kind, &id, "lon")?;
        doc.insert("pos".to_string(), json!([lat, lon]));
    }

    for child in element.descendants() {
        match (child.name.as_str(), kind) {
            ("tag", _) => {
                let key = required_attr(child, kind, &id, "k")?;
                let value = required_attr(child, kind, &id, "v")?;
                if RESERVED_KEYS.contains(&key) && doc.contains_key(key) {
                    warn!(
                        "{} {}: tag `{}` overwrites reserved key",
                        kind.as_str(),
                        id,
                        key
                    );
                }
                doc.insert(key.to_string(), json!(value));
            }
            ("nd", ElementKind::Way) => {
                let reference = required_attr(child, kind, &id, "ref")?;
                append_to_list(&mut doc, kind, &id, "node_refs", json!(reference));
            }
            ("member", ElementKind::Relation) => {
                let member: Map<String, Value> = child
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                append_to_list(&mut doc, kind, &id, "members", Value::Object(member));
            }
            _ => {}
        }
    }

    Ok(Some(doc))
}

/// Push onto the list under `key`, creating it on first use. A tag that
/// replaced the list with a plain value is itself replaced by a new list.
fn append_to_list(doc: &mut Document, kind: ElementKind, id: &str, key: &str, item: Value) {
    if let Some(Value::Array(list)) = doc.get_mut(key) {
        list.push(item);
        return;
    }
    if doc.contains_key(key) {
        warn!(
            "{} {}: `{}` tag replaced by child elements",
            kind.as_str(),
            id,
            key
        );
    }
    doc.insert(key.to_string(), Value::Array(vec![item]));
}

fn has_value(doc: &Document, key: &str) -> bool {
    doc.get(key)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.is_empty())
}

fn parse_coordinate(
    doc: &mut Document,
    kind: ElementKind,
    id: &str,
    axis: &'static str,
) -> Result<f64, ShapeError> {
    let raw = match doc.shift_remove(axis) {
        Some(Value::String(raw)) => raw,
        other => other.map(|v| v.to_string()).unwrap_or_default(),
    };
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ShapeError::InvalidCoordinate {
            kind: kind.as_str(),
            id: id.to_string(),
            axis,
            value: raw.clone(),
        })
}

fn required_attr<'a>(
    child: &'a RawElement,
    kind: ElementKind,
    id: &str,
    attribute: &'static str,
) -> Result<&'a str, ShapeError> {
    child
        .attr(attribute)
        .ok_or_else(|| ShapeError::MissingAttribute {
            parent: kind.as_str(),
            id: id.to_string(),
            element: child.name.clone(),
            attribute,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(k: &str, v: &str) -> RawElement {
        RawElement::new("tag").with_attr("k", k).with_attr("v", v)
    }

    fn sample_node() -> RawElement {
        RawElement::new("node")
            .with_attr("id", "261114295")
            .with_attr("visible", "true")
            .with_attr("version", "7")
            .with_attr("changeset", "11129782")
            .with_attr("timestamp", "2012-03-28T18:31:23Z")
            .with_attr("user", "bbmiller")
            .with_attr("uid", "451048")
            .with_attr("lat", "44.4268")
            .with_attr("lon", "26.1025")
            .with_child(tag("amenity", "cafe"))
            .with_child(tag("name", "Cafeneaua"))
    }

    #[test]
    fn test_node_position_and_provenance() {
        let doc = shape_element(&sample_node()).unwrap().unwrap();

        assert_eq!(doc["type"], "node");
        assert_eq!(doc["id"], "261114295");
        assert_eq!(doc["visible"], "true");
        assert_eq!(doc["pos"], json!([44.4268, 26.1025]));
        assert!(!doc.contains_key("lat"));
        assert!(!doc.contains_key("lon"));
        assert_eq!(
            doc["created"],
            json!({
                "version": "7",
                "changeset": "11129782",
                "timestamp": "2012-03-28T18:31:23Z",
                "user": "bbmiller",
                "uid": "451048"
            })
        );
        for field in CREATED_FIELDS {
            assert!(!doc.contains_key(field), "{field} left at top level");
        }
        assert_eq!(doc["amenity"], "cafe");
        assert_eq!(doc["name"], "Cafeneaua");
        assert!(!doc.contains_key("node_refs"));
        assert!(!doc.contains_key("members"));
    }

    #[test]
    fn test_pos_requires_both_coordinates() {
        let element = RawElement::new("node")
            .with_attr("id", "1")
            .with_attr("lat", "44.1");
        let doc = shape_element(&element).unwrap().unwrap();

        assert!(!doc.contains_key("pos"));
        assert_eq!(doc["lat"], "44.1");
    }

    #[test]
    fn test_empty_provenance_stays_top_level() {
        let element = RawElement::new("node")
            .with_attr("id", "1")
            .with_attr("user", "")
            .with_attr("uid", "42");
        let doc = shape_element(&element).unwrap().unwrap();

        assert_eq!(doc["created"], json!({"uid": "42"}));
        assert_eq!(doc["user"], "");
    }

    #[test]
    fn test_way_node_refs_keep_order() {
        let element = RawElement::new("way")
            .with_attr("id", "10")
            .with_child(RawElement::new("nd").with_attr("ref", "3"))
            .with_child(RawElement::new("nd").with_attr("ref", "1"))
            .with_child(tag("highway", "residential"))
            .with_child(RawElement::new("nd").with_attr("ref", "2"));
        let doc = shape_element(&element).unwrap().unwrap();

        assert_eq!(doc["type"], "way");
        assert_eq!(doc["node_refs"], json!(["3", "1", "2"]));
        assert_eq!(doc["highway"], "residential");
        assert!(!doc.contains_key("pos"));
    }

    #[test]
    fn test_nd_outside_way_is_ignored() {
        let element = RawElement::new("relation")
            .with_attr("id", "5")
            .with_child(RawElement::new("nd").with_attr("ref", "3"));
        let doc = shape_element(&element).unwrap().unwrap();

        assert!(!doc.contains_key("node_refs"));
    }

    #[test]
    fn test_relation_members() {
        let element = RawElement::new("relation")
            .with_attr("id", "99")
            .with_child(
                RawElement::new("member")
                    .with_attr("type", "way")
                    .with_attr("ref", "123")
                    .with_attr("role", "outer"),
            )
            .with_child(
                RawElement::new("member")
                    .with_attr("type", "node")
                    .with_attr("ref", "7")
                    .with_attr("role", ""),
            )
            .with_child(tag("type", "multipolygon"));
        let doc = shape_element(&element).unwrap().unwrap();

        assert_eq!(
            doc["members"],
            json!([
                {"type": "way", "ref": "123", "role": "outer"},
                {"type": "node", "ref": "7", "role": ""}
            ])
        );
        // The `type` tag collides with the reserved key and wins.
        assert_eq!(doc["type"], "multipolygon");
    }

    #[test]
    fn test_tag_after_nd_overwrites_node_refs() {
        let element = RawElement::new("way")
            .with_attr("id", "12")
            .with_child(RawElement::new("nd").with_attr("ref", "7"))
            .with_child(tag("node_refs", "tagval"))
            .with_child(tag("highway", "service"));
        let doc = shape_element(&element).unwrap().unwrap();

        assert_eq!(doc["node_refs"], "tagval");
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "type", "created", "node_refs", "highway"]);
    }

    #[test]
    fn test_list_keys_sit_where_first_child_appears() {
        let element = RawElement::new("relation")
            .with_attr("id", "30")
            .with_child(tag("name", "Ring"))
            .with_child(RawElement::new("member").with_attr("ref", "1"))
            .with_child(tag("route", "bus"))
            .with_child(RawElement::new("member").with_attr("ref", "2"));
        let doc = shape_element(&element).unwrap().unwrap();

        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "type", "created", "name", "members", "route"]);
        assert_eq!(doc["members"], json!([{"ref": "1"}, {"ref": "2"}]));
    }

    #[test]
    fn test_duplicate_tags_last_wins() {
        let element = RawElement::new("node")
            .with_attr("id", "1")
            .with_child(tag("name", "first"))
            .with_child(tag("name", "second"));
        let doc = shape_element(&element).unwrap().unwrap();

        assert_eq!(doc["name"], "second");
    }

    #[test]
    fn test_not_applicable_elements() {
        assert_eq!(shape_element(&tag("k", "v")).unwrap(), None);
        assert_eq!(shape_element(&RawElement::new("osm")).unwrap(), None);
        assert_eq!(shape_element(&RawElement::new("bounds")).unwrap(), None);
    }

    #[test]
    fn test_tag_without_value_is_fatal() {
        let element = RawElement::new("way")
            .with_attr("id", "77")
            .with_child(RawElement::new("tag").with_attr("k", "name"));

        let err = shape_element(&element).unwrap_err();
        assert_eq!(
            err,
            ShapeError::MissingAttribute {
                parent: "way",
                id: "77".to_string(),
                element: "tag".to_string(),
                attribute: "v",
            }
        );
    }

    #[test]
    fn test_invalid_coordinate_is_fatal() {
        let element = RawElement::new("node")
            .with_attr("id", "1")
            .with_attr("lat", "north")
            .with_attr("lon", "26.1");

        let err = shape_element(&element).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidCoordinate { axis: "lat", .. }));
    }
}

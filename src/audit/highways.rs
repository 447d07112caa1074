use crate::collection::{Collection, Filter, Update};
use anyhow::Result;
use log::info;

/// City written to `is_in:city` when a highway only carried `addr:city`.
///
/// The record's own `addr:city` value is not used.
pub const DEFAULT_CITY_NAME: &str = "București";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub names_filled: usize,
    pub streets_removed: usize,
    pub cities_filled: usize,
    pub cities_removed: usize,
}

/// Drop address tags from highways, keeping `name` and `is_in:city` filled.
pub fn reconcile_highway_addresses<C: Collection + ?Sized>(
    collection: &mut C,
    city_name: &str,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let highways = collection.find(&Filter::new().equals("type", "way").exists("highway"))?;

    for highway in highways {
        let doc = &highway.doc;
        let mut update = Update::new();

        if let Some(street) = doc.get("addr:street") {
            if !doc.contains_key("name") {
                update = update.set("name", street.clone());
                report.names_filled += 1;
            }
            update = update.unset("addr:street");
            report.streets_removed += 1;
        }
        if doc.contains_key("addr:city") {
            if !doc.contains_key("is_in:city") {
                update = update.set("is_in:city", city_name);
                report.cities_filled += 1;
            }
            update = update.unset("addr:city");
            report.cities_removed += 1;
        }

        if !update.is_empty() {
            collection.update_one(highway.id, &update)?;
        }
    }

    info!(
        "Highway reconciliation: {} names filled, {} addr:street removed, {} is_in:city filled, {} addr:city removed",
        report.names_filled, report.streets_removed, report.cities_filled, report.cities_removed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use crate::osm::Document;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_highway_address_fields_reconciled() -> Result<()> {
        let mut collection: MemoryCollection = vec![
            doc(json!({
                "type": "way",
                "highway": "tertiary",
                "name": "Strada Novaci",
                "addr:street": "Strada Novaci",
                "addr:city": "București",
                "is_in:city": "București"
            })),
            doc(json!({
                "type": "way",
                "highway": "residential",
                "addr:street": "Strada Izvor",
                "addr:city": "Ilfov"
            })),
            doc(json!({"type": "way", "building": "yes", "addr:street": "Strada Izvor"})),
        ]
        .into_iter()
        .collect();

        let report = reconcile_highway_addresses(&mut collection, DEFAULT_CITY_NAME)?;
        assert_eq!(
            report,
            ReconcileReport {
                names_filled: 1,
                streets_removed: 2,
                cities_filled: 1,
                cities_removed: 2,
            }
        );

        assert_eq!(
            Value::Object(collection.get(1).unwrap().clone()),
            json!({
                "type": "way",
                "highway": "tertiary",
                "name": "Strada Novaci",
                "is_in:city": "București"
            })
        );

        let second = collection.get(2).unwrap();
        assert_eq!(second["name"], "Strada Izvor");
        assert!(!second.contains_key("addr:street"));
        assert!(!second.contains_key("addr:city"));
        // The fixed city literal wins over the record's own addr:city value.
        assert_eq!(second["is_in:city"], "București");

        assert_eq!(collection.get(3).unwrap()["addr:street"], "Strada Izvor");
        Ok(())
    }

    #[test]
    fn test_city_literal_is_configurable() -> Result<()> {
        let mut collection: MemoryCollection =
            vec![doc(json!({"type": "way", "highway": "primary", "addr:city": "Cluj"}))]
                .into_iter()
                .collect();

        reconcile_highway_addresses(&mut collection, "Otopeni")?;
        assert_eq!(collection.get(1).unwrap()["is_in:city"], "Otopeni");
        Ok(())
    }
}

use crate::collection::{Collection, Filter, Update};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

const ADDR_PREFIX: &str = "addr:";

/// Lookup tables for correcting the first word of a street name.
///
/// Matching is exact: case and diacritics matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetNameTables {
    /// Street-type words that are already correct.
    pub expected_prefixes: BTreeSet<String>,
    /// Misspelt or abbreviated first word -> replacement text.
    pub mappings: HashMap<String, String>,
}

impl StreetNameTables {
    /// Tables for Bucharest street names.
    pub fn bucharest() -> Self {
        let expected_prefixes = [
            "Acces",
            "Aeroportul",
            "Aleea",
            "Autostrada",
            "Bulevardul",
            "Calea",
            "DN7",
            "Drumul",
            "Intrarea",
            "Pasajul",
            "Piața",
            "Podul",
            "Prelungirea",
            "Splaiul",
            "Strada",
            "Șoseaua",
        ];
        let mappings = [
            ("A1", "Autostrada A1"),
            ("acces", "Acces"),
            ("Alee", "Aleea"),
            ("Cale", "Calea"),
            ("Drum", "Drumul"),
            ("Intrare", "Intrarea"),
            ("Intrares", "Intrarea"),
            ("Pasaj", "Pasajul"),
            ("Piațeta", "Piața"),
            ("Pod", "Podul"),
            ("Strava", "Strada"),
            ("intrare", "Intrarea"),
            ("Întrarea", "Intrarea"),
            ("Soseaua", "Șoseaua"),
            ("Şoseaua", "Șoseaua"),
        ];

        StreetNameTables {
            expected_prefixes: expected_prefixes.iter().map(|s| s.to_string()).collect(),
            mappings: mappings
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    /// Load tables from a JSON file with `expected_prefixes` and `mappings`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read street tables: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid street tables file: {}", path.display()))
    }
}

impl Default for StreetNameTables {
    fn default() -> Self {
        StreetNameTables::bucharest()
    }
}

/// Correct the street-type word at the start of `street`.
///
/// Returns the input unchanged when the first word is already an expected
/// prefix, the input with that word replaced when the tables know a
/// correction, and `None` otherwise.
pub fn correct_street_name(street: &str, tables: &StreetNameTables) -> Option<String> {
    let first_word = street.split_whitespace().next()?;
    if tables.expected_prefixes.contains(first_word) {
        return Some(street.to_string());
    }
    tables
        .mappings
        .get(first_word)
        .map(|replacement| street.replacen(first_word, replacement, 1))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreetAuditReport {
    pub buildings_restructured: usize,
    pub highways_renamed: usize,
    pub uncorrectable: usize,
}

/// Normalize building addresses and highway names across the collection.
pub fn audit_street_names<C: Collection + ?Sized>(
    collection: &mut C,
    tables: &StreetNameTables,
) -> Result<StreetAuditReport> {
    let mut report = StreetAuditReport::default();

    let buildings = collection.find(
        &Filter::new()
            .equals("type", "way")
            .exists("building")
            .exists("addr:street"),
    )?;
    for building in buildings {
        let Some(street) = building.doc.get("addr:street").and_then(Value::as_str) else {
            continue;
        };
        match correct_street_name(street, tables) {
            Some(corrected) => {
                let update = address_update(&building.doc, corrected);
                collection.update_one(building.id, &update)?;
                report.buildings_restructured += 1;
            }
            None => {
                debug!("No correction for building street `{}`", street);
                report.uncorrectable += 1;
            }
        }
    }

    let highways = collection.find(
        &Filter::new()
            .equals("type", "way")
            .exists("highway")
            .exists("name"),
    )?;
    for highway in highways {
        let Some(name) = highway.doc.get("name").and_then(Value::as_str) else {
            continue;
        };
        match correct_street_name(name, tables) {
            Some(corrected) => {
                collection.update_one(highway.id, &Update::new().set("name", corrected))?;
                report.highways_renamed += 1;
            }
            None => {
                debug!("No correction for highway name `{}`", name);
                report.uncorrectable += 1;
            }
        }
    }

    info!(
        "Street audit: {} buildings restructured, {} highways renamed, {} uncorrectable",
        report.buildings_restructured, report.highways_renamed, report.uncorrectable
    );
    Ok(report)
}

/// Move every `addr:*` field under a nested `address` object and store the
/// corrected street there.
pub fn address_update(doc: &Map<String, Value>, street: String) -> Update {
    let mut address = Map::new();
    let mut update = Update::new();
    for (field, value) in doc {
        if let Some(suffix) = field.strip_prefix(ADDR_PREFIX) {
            address.insert(suffix.to_string(), value.clone());
            update = update.unset(field.clone());
        }
    }
    address.insert("street".to_string(), Value::String(street));
    update.set("address", Value::Object(address))
}

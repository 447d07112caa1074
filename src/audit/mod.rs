//! Record-editing passes over a document collection.
//!
//! Each pass reads the records it needs, then writes field-level updates
//! back one record at a time. Passes are independent of each other.

pub mod amenities;
pub mod highways;
pub mod stats;
pub mod street_names;

pub use amenities::*;
pub use highways::*;
pub use stats::*;
pub use street_names::*;

use crate::collection::Collection;
use anyhow::Result;
use std::fmt;
use std::str::FromStr;

/// Tunables shared by the audit passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub tables: StreetNameTables,
    pub city_name: String,
    pub min_amenity_occurrences: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            tables: StreetNameTables::bucharest(),
            city_name: DEFAULT_CITY_NAME.to_string(),
            min_amenity_occurrences: MIN_AMENITY_OCCURRENCES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPass {
    Streets,
    Highways,
    Amenities,
    All,
}

impl FromStr for AuditPass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "streets" => Ok(AuditPass::Streets),
            "highways" => Ok(AuditPass::Highways),
            "amenities" => Ok(AuditPass::Amenities),
            "all" => Ok(AuditPass::All),
            other => anyhow::bail!("Unknown audit pass '{}'", other),
        }
    }
}

impl fmt::Display for AuditPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditPass::Streets => "streets",
            AuditPass::Highways => "highways",
            AuditPass::Amenities => "amenities",
            AuditPass::All => "all",
        };
        f.write_str(name)
    }
}

/// Outcome of [`run_audit`]; a field is `None` when its pass did not run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub streets: Option<StreetAuditReport>,
    pub highways: Option<ReconcileReport>,
    pub amenities: Option<std::collections::BTreeMap<String, usize>>,
}

/// Run one pass, or all of them in the order streets, highways, amenities.
pub fn run_audit<C: Collection + ?Sized>(
    collection: &mut C,
    pass: AuditPass,
    settings: &AuditSettings,
) -> Result<AuditSummary> {
    let mut summary = AuditSummary::default();
    if matches!(pass, AuditPass::Streets | AuditPass::All) {
        summary.streets = Some(audit_street_names(collection, &settings.tables)?);
    }
    if matches!(pass, AuditPass::Highways | AuditPass::All) {
        summary.highways = Some(reconcile_highway_addresses(
            collection,
            &settings.city_name,
        )?);
    }
    if matches!(pass, AuditPass::Amenities | AuditPass::All) {
        summary.amenities = Some(canonicalize_amenities(
            collection,
            settings.min_amenity_occurrences,
        )?);
    }
    Ok(summary)
}

use crate::osm::Document;
use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const LOAD_BATCH_SIZE: usize = 10_000;

pub type DocId = u64;

/// A document together with the id the collection assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocId,
    pub doc: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(String),
    Equals(String, Value),
}

/// Conjunction of field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::Exists(field.into()));
        self
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Equals(field.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Exists(field) => doc.contains_key(field),
            Condition::Equals(field, value) => doc.get(field) == Some(value),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(String, Value),
    Unset(String),
}

/// Field operations applied in order to each matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<FieldOp>,
}

impl Update {
    pub fn new() -> Self {
        Update::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::Set(field.into(), value.into()));
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(FieldOp::Unset(field.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn apply(&self, doc: &mut Document) {
        for op in &self.ops {
            match op {
                FieldOp::Set(field, value) => {
                    doc.insert(field.clone(), value.clone());
                }
                FieldOp::Unset(field) => {
                    doc.shift_remove(field);
                }
            }
        }
    }
}

/// A mutable set of documents addressed by [`DocId`].
pub trait Collection {
    fn insert(&mut self, doc: Document) -> Result<DocId>;

    fn insert_many(&mut self, docs: Vec<Document>) -> Result<Vec<DocId>> {
        docs.into_iter().map(|doc| self.insert(doc)).collect()
    }

    fn find(&self, filter: &Filter) -> Result<Vec<StoredDocument>>;

    /// Returns `false` when no document has this id.
    fn update_one(&mut self, id: DocId, update: &Update) -> Result<bool>;

    /// Returns the number of documents the filter matched.
    fn update_many(&mut self, filter: &Filter, update: &Update) -> Result<usize>;

    fn count(&self, filter: &Filter) -> Result<usize> {
        Ok(self.find(filter)?.len())
    }
}

/// Vector-backed collection; ids are positions plus one.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    docs: Vec<Document>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        MemoryCollection::default()
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.docs.get(index)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl FromIterator<Document> for MemoryCollection {
    fn from_iter<T: IntoIterator<Item = Document>>(iter: T) -> Self {
        MemoryCollection {
            docs: iter.into_iter().collect(),
        }
    }
}

impl Collection for MemoryCollection {
    fn insert(&mut self, doc: Document) -> Result<DocId> {
        self.docs.push(doc);
        Ok(self.docs.len() as DocId)
    }

    fn find(&self, filter: &Filter) -> Result<Vec<StoredDocument>> {
        Ok(self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(index, doc)| StoredDocument {
                id: index as DocId + 1,
                doc: doc.clone(),
            })
            .collect())
    }

    fn update_one(&mut self, id: DocId, update: &Update) -> Result<bool> {
        let Some(index) = usize::try_from(id).ok().and_then(|id| id.checked_sub(1)) else {
            return Ok(false);
        };
        match self.docs.get_mut(index) {
            Some(doc) => {
                update.apply(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_many(&mut self, filter: &Filter, update: &Update) -> Result<usize> {
        let mut matched = 0usize;
        for doc in self.docs.iter_mut().filter(|doc| filter.matches(doc)) {
            update.apply(doc);
            matched += 1;
        }
        Ok(matched)
    }
}

/// Bulk-load a JSON-lines file produced by the converter. Blank lines are
/// skipped; any other line must be a JSON object.
pub fn load_json_lines<C: Collection + ?Sized>(collection: &mut C, path: &Path) -> Result<usize> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSON-lines file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut batch = Vec::with_capacity(LOAD_BATCH_SIZE);
    let mut loaded = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: not a JSON object", path.display(), index + 1))?;
        batch.push(doc);

        if batch.len() == LOAD_BATCH_SIZE {
            loaded += collection.insert_many(std::mem::take(&mut batch))?.len();
            info!("Loaded {} documents", loaded);
        }
    }
    if !batch.is_empty() {
        loaded += collection.insert_many(batch)?.len();
    }

    info!("Loaded {} documents from {}", loaded, path.display());
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_filter_exists_and_equals() {
        let way = doc(json!({"type": "way", "highway": "primary", "name": "Calea Victoriei"}));

        assert!(Filter::new().matches(&way));
        assert!(Filter::new().exists("highway").matches(&way));
        assert!(
            Filter::new()
                .equals("type", "way")
                .exists("name")
                .matches(&way)
        );
        assert!(!Filter::new().equals("type", "node").matches(&way));
        assert!(!Filter::new().exists("building").matches(&way));
    }

    #[test]
    fn test_update_set_and_unset_in_order() {
        let mut record = doc(json!({"a": 1, "b": 2}));
        Update::new()
            .set("c", 3)
            .unset("a")
            .set("b", "two")
            .apply(&mut record);

        assert_eq!(Value::Object(record), json!({"b": "two", "c": 3}));
    }

    #[test]
    fn test_memory_collection_updates() -> Result<()> {
        let mut collection: MemoryCollection = vec![
            doc(json!({"cafe": "yes"})),
            doc(json!({"cafe": "no"})),
            doc(json!({"shop": "bakery"})),
        ]
        .into_iter()
        .collect();

        let matched = collection.update_many(
            &Filter::new().exists("cafe"),
            &Update::new().set("amenity", "cafe"),
        )?;
        assert_eq!(matched, 2);
        assert_eq!(collection.count(&Filter::new().equals("amenity", "cafe"))?, 2);

        assert!(collection.update_one(3, &Update::new().unset("shop"))?);
        assert!(!collection.update_one(4, &Update::new().unset("shop"))?);
        assert!(!collection.update_one(0, &Update::new().unset("shop"))?);
        assert_eq!(collection.get(3), Some(&Document::new()));
        Ok(())
    }

    #[test]
    fn test_load_json_lines() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, r#"{{"id": "1", "type": "node"}}"#)?;
        writeln!(file)?;
        writeln!(file, r#"{{"id": "2", "type": "way"}}"#)?;
        file.flush()?;

        let mut collection = MemoryCollection::new();
        let loaded = load_json_lines(&mut collection, file.path())?;

        assert_eq!(loaded, 2);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get(2).unwrap()["type"], "way");
        Ok(())
    }

    #[test]
    fn test_load_json_lines_reports_bad_line() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, r#"{{"id": "1"}}"#)?;
        writeln!(file, "[1, 2]")?;
        file.flush()?;

        let mut collection = MemoryCollection::new();
        let err = load_json_lines(&mut collection, file.path()).unwrap_err();
        assert!(format!("{err:#}").contains(":2: not a JSON object"));
        Ok(())
    }
}

use crate::collection::{Collection, DocId, Filter, StoredDocument, Update};
use crate::osm::Document;
use anyhow::{Context, Result};
use lmdb::{Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MAP_SIZE_BYTES: usize = 64 * 1024 * 1024 * 1024;
const NEXT_ID_KEY: &[u8] = b"next_id";

/// Disk-based document collection using LMDB.
///
/// Documents are stored as JSON under their big-endian id. Ids start at 1
/// and are never reused; this tool never deletes documents.
pub struct DocumentStore {
    env: Environment,
    documents: Database,
    meta: Database,
    path: PathBuf,
    _temp_dir: Option<TempDir>, // Dropped after `env`, removing the scratch directory
}

impl DocumentStore {
    /// Open (or create) the store file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_temp(path.to_path_buf(), None)
    }

    /// Create a store in a fresh temporary directory, deleted on drop.
    pub fn new_temp() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("documents.mdb");
        Self::open_with_temp(path, Some(temp_dir))
    }

    fn open_with_temp(path: PathBuf, temp_dir: Option<TempDir>) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let env = Environment::new()
            .set_flags(lmdb::EnvironmentFlags::NO_SUB_DIR) // Use single file, not directory
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE_BYTES)
            .open(&path)
            .with_context(|| format!("Failed to open document store: {}", path.display()))?;

        let documents = env.create_db(Some("documents"), DatabaseFlags::empty())?;
        let meta = env.create_db(Some("meta"), DatabaseFlags::empty())?;
        debug!("Opened document store {}", path.display());

        Ok(DocumentStore {
            env,
            documents,
            meta,
            path,
            _temp_dir: temp_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch a single document by id.
    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        let txn = self.env.begin_ro_txn()?;
        read_document(&txn, self.documents, id)
    }

    /// Sync all pending writes to disk
    pub fn sync(&self) -> Result<()> {
        self.env.sync(true)?;
        Ok(())
    }

    fn next_id<T: Transaction>(&self, txn: &T) -> Result<DocId> {
        match txn.get(self.meta, &NEXT_ID_KEY) {
            Ok(value) => {
                let bytes: [u8; 8] = value
                    .try_into()
                    .context("Corrupt id counter in document store")?;
                Ok(DocId::from_be_bytes(bytes))
            }
            Err(lmdb::Error::NotFound) => Ok(1),
            Err(e) => Err(e.into()),
        }
    }

    fn put_document(&self, txn: &mut RwTransaction<'_>, id: DocId, doc: &Document) -> Result<()> {
        let value = serde_json::to_vec(doc)?;
        txn.put(self.documents, &id.to_be_bytes(), &value, WriteFlags::empty())?;
        Ok(())
    }

    fn insert_in(&self, txn: &mut RwTransaction<'_>, doc: &Document) -> Result<DocId> {
        let id = self.next_id(&*txn)?;
        self.put_document(txn, id, doc)?;
        txn.put(
            self.meta,
            &NEXT_ID_KEY,
            &(id + 1).to_be_bytes(),
            WriteFlags::empty(),
        )?;
        Ok(id)
    }
}

fn read_document<T: Transaction>(txn: &T, db: Database, id: DocId) -> Result<Option<Document>> {
    match txn.get(db, &id.to_be_bytes()) {
        Ok(value) => {
            let doc = serde_json::from_slice(value)
                .with_context(|| format!("Corrupt document {} in store", id))?;
            Ok(Some(doc))
        }
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Collection for DocumentStore {
    fn insert(&mut self, doc: Document) -> Result<DocId> {
        let mut txn = self.env.begin_rw_txn()?;
        let id = self.insert_in(&mut txn, &doc)?;
        txn.commit()?;
        Ok(id)
    }

    /// Store multiple documents efficiently in a single transaction
    fn insert_many(&mut self, docs: Vec<Document>) -> Result<Vec<DocId>> {
        let mut txn = self.env.begin_rw_txn()?;
        let mut ids = Vec::with_capacity(docs.len());
        for doc in &docs {
            ids.push(self.insert_in(&mut txn, doc)?);
        }
        txn.commit()?;
        Ok(ids)
    }

    fn find(&self, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let txn = self.env.begin_ro_txn()?;
        let end = self.next_id(&txn)?;
        let mut found = Vec::new();
        for id in 1..end {
            if let Some(doc) = read_document(&txn, self.documents, id)?
                && filter.matches(&doc)
            {
                found.push(StoredDocument { id, doc });
            }
        }
        Ok(found)
    }

    fn update_one(&mut self, id: DocId, update: &Update) -> Result<bool> {
        let mut txn = self.env.begin_rw_txn()?;
        let Some(mut doc) = read_document(&txn, self.documents, id)? else {
            return Ok(false);
        };
        update.apply(&mut doc);
        self.put_document(&mut txn, id, &doc)?;
        txn.commit()?;
        Ok(true)
    }

    fn update_many(&mut self, filter: &Filter, update: &Update) -> Result<usize> {
        let mut txn = self.env.begin_rw_txn()?;
        let end = self.next_id(&txn)?;
        let mut matched = 0usize;
        for id in 1..end {
            let Some(mut doc) = read_document(&txn, self.documents, id)? else {
                continue;
            };
            if !filter.matches(&doc) {
                continue;
            }
            update.apply(&mut doc);
            self.put_document(&mut txn, id, &doc)?;
            matched += 1;
        }
        txn.commit()?;
        Ok(matched)
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!(
                "Failed to sync document store {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

//! The embedded node: a registry of named document indices backed by
//! per-index tantivy directories under one base path.
//!
//! An index created without a mapping stays *pending* until either
//! `put_mapping` or the first bulk load (which infers a mapping from the
//! batch) materializes it. Searches against a pending index see zero
//! documents rather than failing.

mod health;
mod index;

pub use health::HealthStatus;
pub use index::{BulkOp, OpenIndex};

use crate::schema::{self, IndexMapping};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

enum IndexEntry {
    /// Created without a mapping; no storage exists yet.
    Pending,
    Open(Arc<OpenIndex>),
}

pub struct LocalNode {
    base_path: PathBuf,
    indices: RwLock<HashMap<String, IndexEntry>>,
}

impl LocalNode {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalNode {
            base_path: base_path.into(),
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an index, materializing it immediately when a mapping is
    /// given. Creating a name that already exists is a setup failure.
    pub fn create_index(&self, name: &str, mapping: Option<IndexMapping>) -> Result<()> {
        let mut indices = self.indices.write();
        if indices.contains_key(name) {
            return Err(Error::Setup(format!("index '{name}' already exists")));
        }
        let entry = match mapping {
            Some(mapping) => {
                let open = OpenIndex::create(name, &self.base_path.join(name), mapping)?;
                IndexEntry::Open(Arc::new(open))
            }
            None => IndexEntry::Pending,
        };
        indices.insert(name.to_string(), entry);
        tracing::info!(index = name, "created index");
        Ok(())
    }

    /// Applies a mapping. Materializes a pending index; on an open index the
    /// mapping must be identical, anything else is a conflict.
    pub fn put_mapping(&self, name: &str, mapping: IndexMapping) -> Result<()> {
        let mut indices = self.indices.write();
        match indices.get(name) {
            None => Err(Error::IndexNotFound(name.to_string())),
            Some(IndexEntry::Open(open)) => {
                if open.mapping == mapping {
                    Ok(())
                } else {
                    Err(Error::Mapping(format!(
                        "index '{name}' already has a conflicting mapping"
                    )))
                }
            }
            Some(IndexEntry::Pending) => {
                let open = OpenIndex::create(name, &self.base_path.join(name), mapping)?;
                indices.insert(name.to_string(), IndexEntry::Open(Arc::new(open)));
                tracing::info!(index = name, "mapping applied");
                Ok(())
            }
        }
    }

    /// Returns the mapping, or `None` while the index is still pending.
    pub fn get_mapping(&self, name: &str) -> Result<Option<IndexMapping>> {
        let indices = self.indices.read();
        match indices.get(name) {
            None => Err(Error::IndexNotFound(name.to_string())),
            Some(IndexEntry::Pending) => Ok(None),
            Some(IndexEntry::Open(open)) => Ok(Some(open.mapping.clone())),
        }
    }

    /// Deletes an index and its storage. Idempotent: deleting an absent
    /// index succeeds.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        let removed = self.indices.write().remove(name);
        if removed.is_none() {
            tracing::debug!(index = name, "delete of absent index ignored");
            return Ok(());
        }
        match std::fs::remove_dir_all(self.base_path.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(index = name, "deleted index");
        Ok(())
    }

    /// Loads a batch into the index. A first bulk against a pending index
    /// infers its mapping from the batch before applying it.
    pub fn bulk(&self, name: &str, ops: &[BulkOp]) -> Result<()> {
        let open = {
            let indices = self.indices.read();
            match indices.get(name) {
                None => return Err(Error::IndexNotFound(name.to_string())),
                Some(IndexEntry::Open(open)) => Some(Arc::clone(open)),
                Some(IndexEntry::Pending) => None,
            }
        };
        let open = match open {
            Some(open) => open,
            None => {
                let inferred = schema::infer_mapping(ops.iter().filter_map(BulkOp::source));
                self.put_mapping(name, inferred)?;
                self.open_index(name)?
            }
        };
        tracing::debug!(index = name, ops = ops.len(), "bulk");
        open.apply_bulk(ops)
    }

    pub fn refresh(&self, name: &str) -> Result<()> {
        self.open_index(name)?.refresh()
    }

    pub fn health(&self, name: &str) -> HealthStatus {
        let indices = self.indices.read();
        match indices.get(name) {
            None => HealthStatus::Red,
            Some(IndexEntry::Pending) => HealthStatus::Yellow,
            Some(IndexEntry::Open(_)) => HealthStatus::Green,
        }
    }

    /// Blocks until the index reports at least `wait_for`, or fails with
    /// `ClusterUnavailable` once `deadline` has elapsed.
    pub fn wait_for_health(
        &self,
        name: &str,
        wait_for: HealthStatus,
        deadline: Duration,
    ) -> Result<HealthStatus> {
        health::wait_for_status(name, wait_for, deadline, || self.health(name))
    }

    /// The open index behind `name`; pending indices are not open.
    pub fn open_index(&self, name: &str) -> Result<Arc<OpenIndex>> {
        let indices = self.indices.read();
        match indices.get(name) {
            None => Err(Error::IndexNotFound(name.to_string())),
            Some(IndexEntry::Pending) => Err(Error::Setup(format!(
                "index '{name}' has no mapping yet"
            ))),
            Some(IndexEntry::Open(open)) => Ok(Arc::clone(open)),
        }
    }

    /// Resolves a search target list to `(name, open-index-or-pending)`
    /// pairs. An empty list targets every index, in name order so that
    /// multi-index results are deterministic.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<(String, Option<Arc<OpenIndex>>)>> {
        let indices = self.indices.read();
        let mut targets: Vec<&String> = if names.is_empty() {
            indices.keys().collect()
        } else {
            names.iter().collect()
        };
        targets.sort();
        let mut resolved = Vec::with_capacity(targets.len());
        for name in targets {
            match indices.get(name.as_str()) {
                None => return Err(Error::IndexNotFound(name.clone())),
                Some(IndexEntry::Pending) => resolved.push((name.clone(), None)),
                Some(IndexEntry::Open(open)) => {
                    resolved.push((name.clone(), Some(Arc::clone(open))))
                }
            }
        }
        Ok(resolved)
    }
}

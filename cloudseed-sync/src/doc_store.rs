//! File-backed store for [`SyncedDocument`]s.
//!
//! Layout: `<root>/<zone>/<name>.json`, one document per file.
//! Writes go to `<path>.json.tmp` and are renamed into place.

use std::path::{Path, PathBuf};

use cloudseed_core::ZoneId;

use crate::document::SyncedDocument;
use crate::error::{io_err, SyncError};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, zone: &ZoneId, name: &str) -> PathBuf {
        self.root
            .join(file_stem(&zone.0))
            .join(format!("{}.json", file_stem(name)))
    }

    /// Attach `doc` to this store and write it.
    pub fn insert(&self, doc: &mut SyncedDocument) -> Result<(), SyncError> {
        let path = self.path_for(&doc.zone, &doc.name);
        doc.attach(path.clone());
        write_document(&path, doc)?;
        tracing::debug!("inserted: {}", path.display());
        Ok(())
    }

    /// Load one document. `None` if it does not exist.
    pub fn load(&self, zone: &ZoneId, name: &str) -> Result<Option<SyncedDocument>, SyncError> {
        let path = self.path_for(zone, name);
        if !path.exists() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    /// Delete a document. Returns `false` if there was nothing to delete.
    pub fn remove(&self, zone: &ZoneId, name: &str) -> Result<bool, SyncError> {
        let path = self.path_for(zone, name);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        Ok(true)
    }

    /// Every document, sorted by zone then name.
    pub fn list(&self) -> Result<Vec<SyncedDocument>, SyncError> {
        let mut docs = Vec::new();
        for zone_dir in sorted_entries(&self.root)? {
            if !zone_dir.is_dir() {
                continue;
            }
            for path in sorted_entries(&zone_dir)? {
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                docs.push(read_document(&path)?);
            }
        }
        docs.sort_by(|a, b| (&a.zone, &a.name).cmp(&(&b.zone, &b.name)));
        Ok(docs)
    }

    /// Documents holding a deferred save.
    pub fn pending(&self) -> Result<Vec<SyncedDocument>, SyncError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(SyncedDocument::has_pending)
            .collect())
    }
}

/// Atomically write `doc` to `path`.
pub(crate) fn write_document(path: &Path, doc: &SyncedDocument) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid document path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn read_document(path: &Path) -> Result<SyncedDocument, SyncError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut doc: SyncedDocument = serde_json::from_str(&contents)?;
    doc.attach(path.to_path_buf());
    Ok(doc)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Percent-escape a zone or document name into one path component that
/// stays inside its parent directory. Distinct names give distinct stems.
fn file_stem(name: &str) -> String {
    match name {
        "" => return "%".to_owned(),
        "." => return "%2E".to_owned(),
        ".." => return "%2E%2E".to_owned(),
        _ => {}
    }
    let mut stem = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | ':' | '%' | '\0' => stem.push_str(&format!("%{:02X}", c as u32)),
            c => stem.push(c),
        }
    }
    stem
}

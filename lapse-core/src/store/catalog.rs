use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::JsonDoc;
use crate::error::{LapseError, Result};

/// One finalized archive file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub profile: String,
    pub file: String,
    /// Archive file length in bytes.
    pub size: u64,
    pub images: u32,
    pub fps: u32,
    pub first: i64,
    pub last: i64,
    /// Unix seconds the archive was taken.
    pub archived: i64,
}

/// `archives.json`: ordered list of archives, oldest first.
pub struct ArchiveCatalog {
    doc: JsonDoc<Vec<ArchiveEntry>>,
}

impl ArchiveCatalog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            doc: JsonDoc::new(path),
        }
    }

    pub fn list(&self) -> Result<Vec<ArchiveEntry>> {
        self.doc.read(|v| v.clone())
    }

    pub fn contains(&self, file: &str) -> Result<bool> {
        self.doc.read(|v| v.iter().any(|e| e.file == file))
    }

    pub fn push(&self, entry: ArchiveEntry) -> Result<()> {
        self.doc.mutate(|v| {
            if v.iter().any(|e| e.file == entry.file) {
                return Err(LapseError::InvalidInput(format!(
                    "archive {} already catalogued",
                    entry.file
                )));
            }
            v.push(entry);
            Ok(())
        })
    }

    /// Remove the entry named `file`, running `on_remove` before the catalog
    /// is saved. Fails with `NotFound` when no entry matches.
    pub fn remove_with(
        &self,
        file: &str,
        on_remove: impl FnOnce(&ArchiveEntry) -> Result<()>,
    ) -> Result<ArchiveEntry> {
        self.doc.mutate(|v| {
            let pos = v
                .iter()
                .position(|e| e.file == file)
                .ok_or_else(|| LapseError::NotFound(format!("archive {file}")))?;
            on_remove(&v[pos])?;
            Ok(v.remove(pos))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file: &str, archived: i64) -> ArchiveEntry {
        ArchiveEntry {
            profile: "cam1".into(),
            file: file.into(),
            size: 1024,
            images: 3,
            fps: 10,
            first: 1,
            last: 2,
            archived,
        }
    }

    #[test]
    fn entries_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let cat = ArchiveCatalog::new(dir.path().join("archives.json"));
        cat.push(entry("b.avi", 2)).unwrap();
        cat.push(entry("a.avi", 1)).unwrap();
        let files: Vec<_> = cat.list().unwrap().into_iter().map(|e| e.file).collect();
        assert_eq!(files, ["b.avi", "a.avi"]);
        assert!(cat.push(entry("a.avi", 3)).is_err());
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cat = ArchiveCatalog::new(dir.path().join("archives.json"));
        cat.push(entry("a.avi", 1)).unwrap();
        let err = cat.remove_with("zzz.avi", |_| Ok(())).unwrap_err();
        assert!(err.is_not_found());
        assert!(cat.contains("a.avi").unwrap());
    }

    #[test]
    fn failing_hook_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archives.json");
        let cat = ArchiveCatalog::new(path.clone());
        cat.push(entry("a.avi", 1)).unwrap();
        let res = cat.remove_with("a.avi", |_| {
            Err(LapseError::Io(std::io::Error::other("disk gone")))
        });
        assert!(res.is_err());
        assert!(ArchiveCatalog::new(path).contains("a.avi").unwrap());
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::JsonDoc;
use crate::error::Result;

/// Running counters for one profile's active container. Times are unix
/// seconds; zero means "not yet".
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Recording {
    pub images: u32,
    /// Sum of unpadded frame payload lengths.
    pub size: u64,
    pub first: i64,
    pub last: i64,
    pub fps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<i64>,
}

impl Recording {
    /// Zero the counters of the active container; fps and the last
    /// archive stamp survive.
    pub fn reset(&mut self) {
        self.images = 0;
        self.size = 0;
        self.first = 0;
        self.last = 0;
    }
}

/// `recordings.json`: profile id -> counters.
pub struct RecordingStore {
    doc: JsonDoc<BTreeMap<String, Recording>>,
}

impl RecordingStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            doc: JsonDoc::new(path),
        }
    }

    pub fn get(&self, profile_id: &str) -> Result<Option<Recording>> {
        self.doc.read(|m| m.get(profile_id).cloned())
    }

    pub fn all(&self) -> Result<BTreeMap<String, Recording>> {
        self.doc.read(|m| m.clone())
    }

    pub fn put(&self, profile_id: &str, rec: Recording) -> Result<()> {
        self.doc.mutate(|m| {
            m.insert(profile_id.to_string(), rec);
            Ok(())
        })
    }

    /// Update an existing record in place; `None` when the profile is unknown.
    pub fn update<R>(
        &self,
        profile_id: &str,
        f: impl FnOnce(&mut Recording) -> R,
    ) -> Result<Option<R>> {
        if self.get(profile_id)?.is_none() {
            return Ok(None);
        }
        self.doc.mutate(|m| Ok(m.get_mut(profile_id).map(f)))
    }

    pub fn remove(&self, profile_id: &str) -> Result<Option<Recording>> {
        if self.get(profile_id)?.is_none() {
            return Ok(None);
        }
        self.doc.mutate(|m| Ok(m.remove(profile_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordings.json");
        let store = RecordingStore::new(path.clone());
        assert_eq!(store.get("cam1").unwrap(), None);

        let rec = Recording {
            images: 3,
            size: 3499,
            first: 100,
            last: 300,
            fps: 10,
            archived: None,
        };
        store.put("cam1", rec.clone()).unwrap();

        let reopened = RecordingStore::new(path);
        assert_eq!(reopened.get("cam1").unwrap(), Some(rec));
    }

    #[test]
    fn update_and_remove_only_known_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().join("recordings.json"));
        assert_eq!(store.update("ghost", |r| r.images).unwrap(), None);
        assert!(!dir.path().join("recordings.json").exists());

        store
            .put(
                "cam1",
                Recording {
                    images: 5,
                    fps: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .update("cam1", |r| {
                r.archived = Some(42);
                r.reset();
            })
            .unwrap();
        let rec = store.get("cam1").unwrap().unwrap();
        assert_eq!((rec.images, rec.fps, rec.archived), (0, 10, Some(42)));

        assert!(store.remove("cam1").unwrap().is_some());
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn reads_original_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordings.json");
        std::fs::write(
            &path,
            br#"{"cam1":{"images":2,"size":10,"first":1,"last":2,"fps":10}}"#,
        )
        .unwrap();
        let store = RecordingStore::new(path);
        assert_eq!(store.get("cam1").unwrap().unwrap().images, 2);
    }
}

use std::path::{Path, PathBuf};

use crate::error::{LapseError, Result};
use crate::util::sanitize::check_component;

pub const CONTAINER_FILE: &str = "timelapse.avi";
pub const INDEX_FILE: &str = "timelapse.idx";
pub const RECORDINGS_FILE: &str = "recordings.json";
pub const CATALOG_FILE: &str = "archives.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const ARCHIVE_DIR: &str = "archives";

/// Entries of the data root a profile directory must not land on.
const RESERVED: [&str; 4] = [ARCHIVE_DIR, RECORDINGS_FILE, CATALOG_FILE, SETTINGS_FILE];

/// Where everything lives under the data root:
///
/// ```text
/// <root>/recordings.json
/// <root>/archives.json
/// <root>/archives/<name>_<date>.avi
/// <root>/<profile>/timelapse.avi
/// <root>/<profile>/timelapse.idx
/// ```
#[derive(Clone, Debug)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn profile_dir(&self, profile_id: &str) -> Result<PathBuf> {
        check_component("profile id", profile_id)?;
        if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(profile_id)) {
            return Err(LapseError::InvalidInput(format!(
                "profile id {profile_id:?} is reserved"
            )));
        }
        Ok(self.root.join(profile_id))
    }

    pub fn container(&self, profile_id: &str) -> Result<PathBuf> {
        Ok(self.profile_dir(profile_id)?.join(CONTAINER_FILE))
    }

    pub fn index(&self, profile_id: &str) -> Result<PathBuf> {
        Ok(self.profile_dir(profile_id)?.join(INDEX_FILE))
    }

    pub fn recordings(&self) -> PathBuf {
        self.root.join(RECORDINGS_FILE)
    }

    pub fn catalog(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn archive_file(&self, file: &str) -> Result<PathBuf> {
        check_component("archive name", file)?;
        Ok(self.archive_dir().join(file))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_ids_cannot_take_root_entries() {
        let layout = Layout::new("/data");
        assert_eq!(
            layout.container("cam1").unwrap(),
            PathBuf::from("/data/cam1/timelapse.avi")
        );
        for id in ["archives", "Archives", "recordings.json", "archives.json", "settings.json"] {
            assert!(
                matches!(layout.profile_dir(id), Err(LapseError::InvalidInput(_))),
                "{id}"
            );
        }
    }
}

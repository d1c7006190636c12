use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::domain::{AppendOutcome, Capture, ProfileRef};
use crate::error::Result;
use crate::policy::RetentionPolicy;
use crate::record::reconcile::ReconcileReport;
use crate::store::catalog::ArchiveEntry;
use crate::store::recordings::Recording;

#[derive(Clone, Debug)]
pub struct OpenParams {
    /// Data root holding the profile directories, stores and archives.
    pub root: PathBuf,
    /// `None` reads `settings.json` under the root.
    pub policy: Option<RetentionPolicy>,
}

impl OpenParams {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policy: None,
        }
    }
}

/// Everything the capture service and the CLI do with recordings.
///
/// Operations on one profile are serialized; different profiles proceed
/// independently.
pub trait TimelapseRepo: Send + Sync {
    fn policy(&self) -> &RetentionPolicy;

    /// Append a frame, archiving the recording once it reaches the size
    /// threshold.
    fn append_frame(&self, cap: &Capture<'_>) -> Result<AppendOutcome>;

    fn read_frame(&self, profile_id: &str, n: u32) -> Result<Vec<u8>>;

    fn archive(&self, profile: &ProfileRef, now: OffsetDateTime) -> Result<ArchiveEntry>;

    fn delete_archive(&self, file: &str) -> Result<ArchiveEntry>;

    fn list_archives(&self) -> Result<Vec<ArchiveEntry>>;

    /// Location of a catalogued archive; `NotFound` for unknown names.
    fn archive_path(&self, file: &str) -> Result<PathBuf>;

    fn check_retention(&self, now: OffsetDateTime) -> Result<Vec<ArchiveEntry>>;

    fn update_fps(&self, profile_id: &str, fps: u32) -> Result<bool>;

    fn export(&self, profile_id: &str, fps: u32, sink: &mut dyn Write) -> Result<u64>;

    fn recording(&self, profile_id: &str) -> Result<Option<Recording>>;

    fn recordings(&self) -> Result<BTreeMap<String, Recording>>;

    fn clear(&self, profile_id: &str) -> Result<()>;

    fn remove(&self, profile_id: &str) -> Result<()>;

    fn reconcile(&self, profile_id: &str) -> Result<ReconcileReport>;
}

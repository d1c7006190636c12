use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::archive::manager;
use crate::domain::{AppendOutcome, Capture, ProfileRef};
use crate::error::{LapseError, Result};
use crate::layout::Layout;
use crate::policy::RetentionPolicy;
use crate::read::frame;
use crate::record::reconcile::{self, ReconcileReport};
use crate::record::writer;
use crate::repo::{OpenParams, TimelapseRepo};
use crate::store::catalog::{ArchiveCatalog, ArchiveEntry};
use crate::store::recordings::{Recording, RecordingStore};
use crate::util::locks::ProfileLocks;

/// Recordings kept as plain files under one data root.
pub struct FsTimelapseRepo {
    layout: Layout,
    recordings: RecordingStore,
    catalog: ArchiveCatalog,
    locks: ProfileLocks,
    policy: RetentionPolicy,
}

impl FsTimelapseRepo {
    pub fn new(params: OpenParams) -> Result<Self> {
        let layout = Layout::new(params.root);
        fs::create_dir_all(layout.root())?;
        let policy = match params.policy {
            Some(p) => p,
            None => RetentionPolicy::load(&layout.settings())?,
        };
        info!(
            root = %layout.root().display(),
            threshold_mib = policy.archive_threshold_mib,
            retention_months = policy.retention_months,
            "recordings opened"
        );
        Ok(Self {
            recordings: RecordingStore::new(layout.recordings()),
            catalog: ArchiveCatalog::new(layout.catalog()),
            locks: ProfileLocks::new(),
            layout,
            policy,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}

impl TimelapseRepo for FsTimelapseRepo {
    fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    fn append_frame(&self, cap: &Capture<'_>) -> Result<AppendOutcome> {
        let profile = cap.profile;
        self.locks.with(&profile.id, || {
            let appended = writer::append_frame(&self.layout, &self.recordings, cap)?;
            let mut archived = None;
            if appended.size >= self.policy.threshold_bytes() {
                // The frame is committed either way; a failed rotation is
                // retried on the next append.
                match manager::archive(
                    &self.layout,
                    &self.recordings,
                    &self.catalog,
                    profile,
                    cap.timestamp,
                ) {
                    Ok(entry) => archived = Some(entry.file),
                    Err(e) => warn!(profile = %profile.id, error = %e, "auto-archive failed"),
                }
            }
            Ok(AppendOutcome {
                frame: appended.frame,
                size: appended.size,
                archived,
            })
        })
    }

    fn read_frame(&self, profile_id: &str, n: u32) -> Result<Vec<u8>> {
        self.locks
            .with(profile_id, || frame::read_frame(&self.layout, profile_id, n))
    }

    fn archive(&self, profile: &ProfileRef, now: OffsetDateTime) -> Result<ArchiveEntry> {
        self.locks.with(&profile.id, || {
            manager::archive(&self.layout, &self.recordings, &self.catalog, profile, now)
        })
    }

    fn delete_archive(&self, file: &str) -> Result<ArchiveEntry> {
        manager::delete_archive(&self.layout, &self.catalog, file)
    }

    fn list_archives(&self) -> Result<Vec<ArchiveEntry>> {
        self.catalog.list()
    }

    fn archive_path(&self, file: &str) -> Result<PathBuf> {
        let path = self.layout.archive_file(file)?;
        if !self.catalog.contains(file)? {
            return Err(LapseError::NotFound(format!("archive {file}")));
        }
        Ok(path)
    }

    fn check_retention(&self, now: OffsetDateTime) -> Result<Vec<ArchiveEntry>> {
        manager::check_retention(
            &self.layout,
            &self.catalog,
            self.policy.retention_months,
            now,
        )
    }

    fn update_fps(&self, profile_id: &str, fps: u32) -> Result<bool> {
        self.locks.with(profile_id, || {
            manager::update_fps(&self.layout, &self.recordings, profile_id, fps)
        })
    }

    fn export(&self, profile_id: &str, fps: u32, sink: &mut dyn Write) -> Result<u64> {
        self.locks.with(profile_id, || {
            manager::export(&self.layout, &self.recordings, profile_id, fps, sink)
        })
    }

    fn recording(&self, profile_id: &str) -> Result<Option<Recording>> {
        self.recordings.get(profile_id)
    }

    fn recordings(&self) -> Result<BTreeMap<String, Recording>> {
        self.recordings.all()
    }

    fn clear(&self, profile_id: &str) -> Result<()> {
        self.locks
            .with(profile_id, || writer::clear(&self.layout, &self.recordings, profile_id))
    }

    fn remove(&self, profile_id: &str) -> Result<()> {
        self.locks
            .with(profile_id, || writer::remove(&self.layout, &self.recordings, profile_id))
    }

    fn reconcile(&self, profile_id: &str) -> Result<ReconcileReport> {
        self.locks.with(profile_id, || {
            reconcile::reconcile(&self.layout, &self.recordings, profile_id)
        })
    }
}

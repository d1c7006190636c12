use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use tracing::{info, warn};

use crate::container::idx::{FrameIndex, IndexEntry};
use crate::container::movi::{scan_chunks, scan_complete_chunks};
use crate::container::riff::{HEADER_LEN, RiffHeader, patch_frame_count, patch_payload_size};
use crate::error::{LapseError, Result};
use crate::layout::Layout;
use crate::store::recordings::{Recording, RecordingStore};

/// What a consistency pass found and changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub frames: u32,
    /// Sum of unpadded payload sizes.
    pub size: u64,
    /// Bytes dropped from the container tail.
    pub trimmed_bytes: u64,
    /// Frame count and `movi` size rewritten after a torn append.
    pub header_repaired: bool,
    pub index_rebuilt: bool,
    pub counters_fixed: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.trimmed_bytes == 0
            && !self.header_repaired
            && !self.index_rebuilt
            && !self.counters_fixed
    }
}

/// Bring index and counters in line with the container.
///
/// The container header is authoritative: bytes past its `movi` list are
/// dropped, the index is rebuilt from the chunks when it disagrees and the
/// counters are set to what the container holds.
///
/// A header that does not describe the chunks on disk is left over from an
/// append that stopped between its chunk write and its header patch. The
/// whole chunks are then counted up to the last committed frame (counters,
/// else index), the rest is cut off and the header is patched to match.
/// Only a foreign chunk tag in that range is a `Format` error.
pub fn reconcile(
    layout: &Layout,
    recordings: &RecordingStore,
    profile_id: &str,
) -> Result<ReconcileReport> {
    let container_path = layout.container(profile_id)?;
    let index_path = layout.index(profile_id)?;
    let mut report = ReconcileReport::default();

    let len = file_len(&container_path)?;
    let existing = recordings.get(profile_id)?;
    let (scanned, header_fps) = if len < HEADER_LEN {
        if len > 0 {
            // A header that never finished writing holds no frames.
            OpenOptions::new()
                .write(true)
                .open(&container_path)?
                .set_len(0)?;
            report.trimmed_bytes = len;
        }
        (Vec::new(), None)
    } else {
        let mut avi = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&container_path)?;
        let header = RiffHeader::read_at_start(&mut avi)?;
        match declared_chunks(&mut avi, &header, len)? {
            Some(scanned) => {
                let movi_end = HEADER_LEN + header.movi_bytes as u64;
                if len > movi_end {
                    avi.set_len(movi_end)?;
                    report.trimmed_bytes = len - movi_end;
                }
                (scanned, Some(header.fps))
            }
            None => {
                let committed = existing.as_ref().map(|r| r.images).or_else(|| {
                    FrameIndex::open_read(&index_path)
                        .and_then(|mut i| i.count())
                        .ok()
                });
                let kept = scan_complete_chunks(&mut avi, len, committed)?;
                let movi_bytes: u64 = kept.iter().map(|e| e.span() as u64).sum();
                report.header_repaired = true;
                if kept.is_empty() {
                    // Nothing committed: start over as if cleared.
                    avi.set_len(0)?;
                    report.trimmed_bytes = len;
                    (kept, None)
                } else {
                    let keep_len = HEADER_LEN + movi_bytes;
                    avi.set_len(keep_len)?;
                    report.trimmed_bytes = len - keep_len;
                    let frames = kept.len() as u32;
                    patch_frame_count(&mut avi, frames)?;
                    patch_payload_size(&mut avi, frames, movi_bytes as u32)?;
                    avi.flush()?;
                    (kept, Some(header.fps))
                }
            }
        }
    };

    report.frames = scanned.len() as u32;
    report.size = scanned.iter().map(|e| e.size as u64).sum();

    if current_entries(&index_path)?.as_deref() != Some(&scanned[..]) {
        let mut idx = FrameIndex::initialize(&index_path)?;
        for (i, e) in scanned.iter().enumerate() {
            idx.append_entry(i as u32 + 1, e.size)?;
        }
        report.index_rebuilt = true;
    }

    let stale = match &existing {
        Some(r) => r.images != report.frames || r.size != report.size,
        None => report.frames > 0,
    };
    if stale {
        let mut rec = existing.unwrap_or_else(|| Recording {
            fps: header_fps.unwrap_or_default(),
            ..Default::default()
        });
        if report.frames == 0 {
            rec.reset();
        }
        rec.images = report.frames;
        rec.size = report.size;
        recordings.put(profile_id, rec)?;
        report.counters_fixed = true;
    }

    if report.is_clean() {
        info!(profile = profile_id, frames = report.frames, "recording consistent");
    } else {
        warn!(profile = profile_id, ?report, "recording repaired");
    }
    Ok(report)
}

/// Chunks of the `movi` list the header declares, or `None` when the header
/// does not describe what is on disk.
fn declared_chunks(
    avi: &mut File,
    header: &RiffHeader,
    len: u64,
) -> Result<Option<Vec<IndexEntry>>> {
    if len < HEADER_LEN + header.movi_bytes as u64 {
        return Ok(None);
    }
    match scan_chunks(avi, header) {
        Ok(scanned) if scanned.len() as u32 == header.frames => Ok(Some(scanned)),
        Ok(_) | Err(LapseError::Format(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn file_len(path: &std::path::Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(m) => Ok(m.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Entries of the index on disk; `Some(empty)` for an absent or empty file,
/// `None` when it cannot be read back.
fn current_entries(path: &std::path::Path) -> Result<Option<Vec<IndexEntry>>> {
    if file_len(path)? == 0 {
        return Ok(Some(Vec::new()));
    }
    Ok(FrameIndex::open_read(path).and_then(|mut i| i.entries()).ok())
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use crate::archive::retention::is_expired;
use crate::container::idx::{FrameIndex, IDX_HEADER_LEN};
use crate::container::riff::{
    HEADER_LEN, INDEX_ENTRY_LEN, RiffHeader, fps_or_default, patch_timing,
};
use crate::domain::ProfileRef;
use crate::error::{LapseError, Result};
use crate::layout::Layout;
use crate::record::reconcile::{file_len, reconcile};
use crate::record::writer::truncate_pair;
use crate::store::catalog::{ArchiveCatalog, ArchiveEntry};
use crate::store::recordings::{Recording, RecordingStore};
use crate::util::sanitize::archive_stem;

const DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub const MIN_EXPORT_FPS: u32 = 1;
pub const MAX_EXPORT_FPS: u32 = 60;

/// Merge the active container with its index and move it into the archive
/// directory, then start the profile over with an empty recording.
///
/// Nothing is catalogued unless the merged file is in place; a failure while
/// merging or moving puts the container back as it was.
pub fn archive(
    layout: &Layout,
    recordings: &RecordingStore,
    catalog: &ArchiveCatalog,
    profile: &ProfileRef,
    now: OffsetDateTime,
) -> Result<ArchiveEntry> {
    let id = profile.id.as_str();
    let header = settled_header(layout, recordings, id)?
        .filter(|h| h.frames > 0)
        .ok_or_else(|| LapseError::NotFound(format!("no frames recorded for {id}")))?;
    let rec = recordings.get(id)?.unwrap_or_default();

    let container_path = layout.container(id)?;
    let index = fs::read(layout.index(id)?)?;
    let want_idx = IDX_HEADER_LEN + header.frames as u64 * INDEX_ENTRY_LEN as u64;
    if index.len() as u64 != want_idx {
        return Err(LapseError::Format(format!(
            "index for {id} is {} bytes, expected {want_idx}",
            index.len()
        )));
    }

    let file = unique_name(layout, catalog, &profile.name, now)?;
    let dest = layout.archive_file(&file)?;
    fs::create_dir_all(layout.archive_dir())?;

    let original_len = HEADER_LEN + header.movi_bytes as u64;
    merge_index(&container_path, &index, &header).inspect_err(|_| {
        restore_len(&container_path, original_len);
    })?;
    if let Err(e) = fs::rename(&container_path, &dest) {
        restore_len(&container_path, original_len);
        return Err(e.into());
    }

    let entry = ArchiveEntry {
        profile: id.to_string(),
        file: file.clone(),
        size: header.merged_len(),
        images: header.frames,
        fps: header.fps,
        first: rec.first,
        last: rec.last,
        archived: now.unix_timestamp(),
    };
    if let Err(e) = catalog.push(entry.clone()) {
        // Put the container back so the recording can carry on.
        if fs::rename(&dest, &container_path).is_ok() {
            restore_len(&container_path, original_len);
        }
        return Err(e);
    }

    let mut next = rec;
    next.reset();
    next.archived = Some(now.unix_timestamp());
    recordings.put(id, next)?;
    truncate_pair(layout, id)?;

    info!(
        profile = id,
        file = %file,
        frames = entry.images,
        bytes = entry.size,
        "recording archived"
    );
    Ok(entry)
}

/// Append the index bytes behind the `movi` list and check the result is
/// exactly as long as the header says.
fn merge_index(container: &Path, index: &[u8], header: &RiffHeader) -> Result<()> {
    let mut f = OpenOptions::new().read(true).write(true).open(container)?;
    f.seek(SeekFrom::Start(HEADER_LEN + header.movi_bytes as u64))?;
    f.write_all(index)?;
    f.flush()?;
    f.sync_all()?;
    let len = f.metadata()?.len();
    if len != header.merged_len() {
        return Err(LapseError::Format(format!(
            "merged file is {len} bytes, header declares {}",
            header.merged_len()
        )));
    }
    Ok(())
}

fn restore_len(path: &Path, len: u64) {
    let res = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(len));
    if let Err(e) = res {
        warn!(path = %path.display(), error = %e, "could not roll back merged index");
    }
}

/// `<name>_<YYYY-MM-DD>.avi`, then `-2`, `-3`, ... for further archives the
/// same day.
fn unique_name(
    layout: &Layout,
    catalog: &ArchiveCatalog,
    display_name: &str,
    now: OffsetDateTime,
) -> Result<String> {
    let date = now
        .to_offset(UtcOffset::UTC)
        .date()
        .format(DATE)
        .map_err(|e| LapseError::InvalidInput(format!("cannot format archive date: {e}")))?;
    let base = format!("{}_{date}", archive_stem(display_name));
    let mut n = 1u32;
    loop {
        let file = if n == 1 {
            format!("{base}.avi")
        } else {
            format!("{base}-{n}.avi")
        };
        if !catalog.contains(&file)? && !layout.archive_file(&file)?.exists() {
            return Ok(file);
        }
        n += 1;
    }
}

/// Header of the active container after making sure index and counters
/// agree with it; `None` when there is no container yet.
fn settled_header(
    layout: &Layout,
    recordings: &RecordingStore,
    profile_id: &str,
) -> Result<Option<RiffHeader>> {
    let container_path = layout.container(profile_id)?;
    if file_len(&container_path)? < HEADER_LEN {
        return Ok(None);
    }
    let mut avi = File::open(&container_path)?;
    let header = RiffHeader::read_at_start(&mut avi)?;
    let len = avi.metadata()?.len();
    let indexed = FrameIndex::open_read(&layout.index(profile_id)?)
        .and_then(|mut i| i.count())
        .unwrap_or(u32::MAX);
    let counted = recordings.get(profile_id)?.map(|r| r.images);
    if len == HEADER_LEN + header.movi_bytes as u64
        && indexed == header.frames
        && counted == Some(header.frames)
    {
        return Ok(Some(header));
    }
    drop(avi);
    let report = reconcile(layout, recordings, profile_id)?;
    debug!(?report, "reconciled before archive/export");
    if file_len(&container_path)? < HEADER_LEN {
        return Ok(None);
    }
    let mut avi = File::open(&container_path)?;
    Ok(Some(RiffHeader::read_at_start(&mut avi)?))
}

/// Remove a catalogued archive and its file. A file already gone from disk
/// is not an error; an unknown name is `NotFound`.
pub fn delete_archive(
    layout: &Layout,
    catalog: &ArchiveCatalog,
    file: &str,
) -> Result<ArchiveEntry> {
    let path = layout.archive_file(file)?;
    let entry = catalog.remove_with(file, |_| match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(file, "archive file already missing");
            Ok(())
        }
        Err(e) => Err(e.into()),
    })?;
    info!(file, profile = %entry.profile, "archive deleted");
    Ok(entry)
}

/// Delete every archive at least `retention_months` old. Failures are
/// logged and the sweep carries on with the next entry.
pub fn check_retention(
    layout: &Layout,
    catalog: &ArchiveCatalog,
    retention_months: u32,
    now: OffsetDateTime,
) -> Result<Vec<ArchiveEntry>> {
    let mut removed = Vec::new();
    for entry in catalog.list()? {
        let archived = match OffsetDateTime::from_unix_timestamp(entry.archived) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %entry.file, error = %e, "bad archive timestamp, skipping");
                continue;
            }
        };
        if !is_expired(archived, now, retention_months) {
            continue;
        }
        match delete_archive(layout, catalog, &entry.file) {
            Ok(e) => removed.push(e),
            Err(e) => warn!(file = %entry.file, error = %e, "retention delete failed"),
        }
    }
    info!(removed = removed.len(), retention_months, "retention sweep done");
    Ok(removed)
}

pub fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(MIN_EXPORT_FPS, MAX_EXPORT_FPS)
}

/// Set the playback rate of the active recording. Only the header timing
/// fields and the stored fps change. Returns whether anything changed.
/// A rate of 0 means the default rate.
pub fn update_fps(
    layout: &Layout,
    recordings: &RecordingStore,
    profile_id: &str,
    fps: u32,
) -> Result<bool> {
    let fps = clamp_fps(fps_or_default(fps));
    let container_path = layout.container(profile_id)?;
    let has_container = file_len(&container_path)? >= HEADER_LEN;
    let mut rec = match recordings.get(profile_id)? {
        Some(r) => r,
        None if has_container => Recording::default(),
        None => return Err(LapseError::NotFound(format!("recording {profile_id}"))),
    };
    if rec.fps == fps {
        return Ok(false);
    }
    if has_container {
        let mut f = OpenOptions::new().write(true).open(&container_path)?;
        patch_timing(&mut f, fps)?;
        f.flush()?;
    }
    rec.fps = fps;
    recordings.put(profile_id, rec)?;
    info!(profile = profile_id, fps, "playback rate updated");
    Ok(true)
}

/// Stream the active recording as one playable file: container then index.
/// Returns the number of bytes written.
pub fn export(
    layout: &Layout,
    recordings: &RecordingStore,
    profile_id: &str,
    fps: u32,
    sink: &mut dyn Write,
) -> Result<u64> {
    let header = settled_header(layout, recordings, profile_id)?
        .ok_or_else(|| LapseError::NotFound(format!("no recording for {profile_id}")))?;
    update_fps(layout, recordings, profile_id, clamp_fps(fps))?;

    let movi_end = HEADER_LEN + header.movi_bytes as u64;
    let avi = File::open(layout.container(profile_id)?)?;
    let mut written = io::copy(&mut avi.take(movi_end), sink)?;
    let idx_len = IDX_HEADER_LEN + header.frames as u64 * INDEX_ENTRY_LEN as u64;
    let idx = File::open(layout.index(profile_id)?)?;
    written += io::copy(&mut idx.take(idx_len), sink)?;
    sink.flush()?;

    debug!(profile = profile_id, bytes = written, "recording exported");
    Ok(written)
}

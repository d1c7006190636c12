use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::container::idx::FrameIndex;
use crate::container::movi::append_chunk;
use crate::container::riff::{
    HEADER_LEN, RiffHeader, fps_or_default, patch_frame_count, patch_payload_size, patch_timing,
};
use crate::domain::Capture;
use crate::error::{LapseError, Result};
use crate::layout::Layout;
use crate::record::reconcile::reconcile;
use crate::store::recordings::{Recording, RecordingStore};
use crate::util::le::pad4;

/// Result of one append, before any auto-archive decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub frame: u32,
    pub size: u64,
}

/// Append one frame to the profile's container/index pair.
///
/// Order on disk: chunk, index entry, header patch. Counters are persisted
/// last, so a failure anywhere leaves the previously committed recording
/// as it was. The caller holds the profile lock.
pub fn append_frame(
    layout: &Layout,
    recordings: &RecordingStore,
    cap: &Capture<'_>,
) -> Result<Appended> {
    let profile_id = cap.profile.id.as_str();
    if cap.payload.is_empty() {
        return Err(LapseError::InvalidInput(format!(
            "empty frame for profile {profile_id}"
        )));
    }
    let payload_len = u32::try_from(cap.payload.len())
        .map_err(|_| LapseError::InvalidInput("frame larger than 4 GiB".into()))?;
    let container_path = layout.container(profile_id)?;
    let index_path = layout.index(profile_id)?;

    fs::create_dir_all(layout.profile_dir(profile_id)?)?;

    let mut rec = match recordings.get(profile_id)? {
        Some(r) => r,
        None => Recording {
            fps: fps_or_default(cap.fps),
            ..Default::default()
        },
    };
    let fps = if rec.fps == 0 {
        fps_or_default(cap.fps)
    } else {
        rec.fps
    };

    let (mut avi, mut header, created) = open_container(&container_path, cap, payload_len, fps)?;
    let mut idx = open_index(&index_path, created, &mut rec, profile_id)?;

    let indexed = idx.count()?;
    let short = avi.metadata()?.len() < HEADER_LEN + header.movi_bytes as u64;
    if !created && (header.frames != rec.images || indexed != header.frames || short) {
        warn!(
            profile = profile_id,
            header = header.frames,
            index = indexed,
            metadata = rec.images,
            "container, index and counters disagree; reconciling"
        );
        drop(idx);
        drop(avi);
        let report = reconcile(layout, recordings, profile_id)?;
        debug!(?report, "reconciled before append");
        rec = recordings.get(profile_id)?.unwrap_or(Recording {
            fps,
            ..Default::default()
        });
        let (f, h, created) = open_container(&container_path, cap, payload_len, fps)?;
        avi = f;
        header = h;
        idx = open_index(&index_path, created, &mut rec, profile_id)?;
    }

    // Anything past the declared movi list is debris from a failed append.
    let movi_end = HEADER_LEN + header.movi_bytes as u64;
    if avi.metadata()?.len() > movi_end {
        warn!(profile = profile_id, "dropping bytes past the last committed frame");
        avi.set_len(movi_end)?;
    }

    append_chunk(&mut avi, cap.payload)?;
    let end = avi.stream_position()?;
    let frames = rec.images + 1;
    let size = rec.size + payload_len as u64;

    idx.append_entry(frames, payload_len)?;

    let movi_bytes = u32::try_from(end - HEADER_LEN).map_err(|_| {
        LapseError::InvalidInput(format!("container for {profile_id} would exceed 4 GiB"))
    })?;
    patch_frame_count(&mut avi, frames)?;
    patch_payload_size(&mut avi, frames, movi_bytes)?;
    patch_timing(&mut avi, fps)?;
    avi.flush()?;

    let ts = cap.timestamp.unix_timestamp();
    if rec.images == 0 {
        rec.first = ts;
    }
    rec.last = ts;
    rec.images = frames;
    rec.size = size;
    rec.fps = fps;
    recordings.put(profile_id, rec)?;

    debug!(
        profile = profile_id,
        frame = frames,
        bytes = payload_len,
        padded = payload_len + pad4(payload_len),
        size,
        "frame appended"
    );
    Ok(Appended {
        frame: frames,
        size,
    })
}

/// Open the container, creating it with a one-frame header when it is absent
/// or was truncated by a clear/archive.
fn open_container(
    path: &Path,
    cap: &Capture<'_>,
    payload_len: u32,
    fps: u32,
) -> Result<(File, RiffHeader, bool)> {
    let mut f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    if f.metadata()?.len() >= HEADER_LEN {
        let header = RiffHeader::read_at_start(&mut f)?;
        return Ok((f, header, false));
    }

    f.set_len(0)?;
    let header = RiffHeader::build(
        1,
        payload_len + pad4(payload_len),
        cap.resolution.width,
        cap.resolution.height,
        fps,
    );
    f.seek(SeekFrom::Start(0))?;
    header.write_to(&mut f)?;
    info!(path = %path.display(), resolution = %cap.resolution, fps, "new container");
    // The one-frame header describes the frame about to be written; report
    // the empty state so the append proceeds from zero.
    let mut empty = header;
    empty.frames = 0;
    empty.movi_bytes = 0;
    Ok((f, empty, true))
}

fn open_index(
    path: &Path,
    created: bool,
    rec: &mut Recording,
    profile_id: &str,
) -> Result<FrameIndex> {
    if !created {
        return FrameIndex::open(path);
    }
    if rec.images != 0 {
        warn!(
            profile = profile_id,
            images = rec.images,
            "container missing, restarting counters"
        );
        rec.reset();
    }
    FrameIndex::initialize(path)
}

/// Zero the active recording: truncate both files, remove stray files in
/// the profile directory and reset the counters.
pub fn clear(layout: &Layout, recordings: &RecordingStore, profile_id: &str) -> Result<()> {
    let dir = layout.profile_dir(profile_id)?;
    if !dir.is_dir() {
        return Err(LapseError::NotFound(format!("profile {profile_id}")));
    }
    let keep = [layout.container(profile_id)?, layout.index(profile_id)?];
    for entry in walkdir::WalkDir::new(&dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let p = entry.path();
        if keep.iter().any(|k| k == p) {
            continue;
        }
        let res = if entry.file_type().is_dir() {
            fs::remove_dir(p)
        } else {
            fs::remove_file(p)
        };
        if let Err(e) = res {
            warn!(path = %p.display(), error = %e, "could not remove stray file");
        }
    }
    truncate_pair(layout, profile_id)?;
    recordings.update(profile_id, Recording::reset)?;
    info!(profile = profile_id, "recording cleared");
    Ok(())
}

/// Delete the profile directory and its counters.
pub fn remove(layout: &Layout, recordings: &RecordingStore, profile_id: &str) -> Result<()> {
    let dir = layout.profile_dir(profile_id)?;
    let had_dir = match fs::remove_dir_all(&dir) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };
    let had_rec = recordings.remove(profile_id)?.is_some();
    if !had_dir && !had_rec {
        return Err(LapseError::NotFound(format!("recording {profile_id}")));
    }
    info!(profile = profile_id, "recording deleted");
    Ok(())
}

/// Leave empty container and index files behind for the next capture.
pub fn truncate_pair(layout: &Layout, profile_id: &str) -> Result<()> {
    fs::create_dir_all(layout.profile_dir(profile_id)?)?;
    for p in [layout.container(profile_id)?, layout.index(profile_id)?] {
        File::create(&p)?;
    }
    Ok(())
}

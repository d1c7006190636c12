use std::fs::File;
use std::io;

use tracing::debug;

use crate::container::idx::FrameIndex;
use crate::container::movi::read_chunk;
use crate::error::{LapseError, Result};
use crate::layout::Layout;

/// Payload of frame `n` (1-based) of the active recording, byte-exact.
///
/// Missing files, an entry outside the index or a chunk cut short all come
/// back as `NotFound`.
pub fn read_frame(layout: &Layout, profile_id: &str, n: u32) -> Result<Vec<u8>> {
    let mut idx = FrameIndex::open_read(&layout.index(profile_id)?)?;
    let entry = idx.read_entry(n)?;

    let path = layout.container(profile_id)?;
    let mut avi = File::open(&path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LapseError::NotFound(format!("container {}", path.display())),
        _ => e.into(),
    })?;
    let payload = read_chunk(&mut avi, &entry)?;
    debug!(profile = profile_id, frame = n, bytes = payload.len(), "frame read");
    Ok(payload)
}

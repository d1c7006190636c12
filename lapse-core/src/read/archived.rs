use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::container::idx::{CHUNK_TAG, IDX_HEADER_LEN, IDX1, IndexEntry, parse_entries};
use crate::container::movi::read_chunk;
use crate::container::riff::{CHUNK_HEADER_LEN, HEADER_LEN, INDEX_ENTRY_LEN, RiffHeader};
use crate::error::{LapseError, Result};
use crate::util::le::{fourcc_at, fourcc_str, le32_at};

/// A finalized archive: container with its `idx1` merged behind `movi`.
pub struct ArchivedVideo {
    f: Mutex<File>,
    pub path: PathBuf,
    pub header: RiffHeader,
    pub entries: Vec<IndexEntry>,
    pub len: u64,
}

/// Totals gathered by [`ArchivedVideo::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySummary {
    pub frames: u32,
    /// Sum of unpadded payload sizes.
    pub payload_bytes: u64,
    pub riff_size: u32,
}

impl ArchivedVideo {
    pub fn open(path: &Path) -> Result<Self> {
        let mut f = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LapseError::NotFound(format!("archive {}", path.display())),
            _ => e.into(),
        })?;
        let len = f.metadata()?.len();
        if len < HEADER_LEN + IDX_HEADER_LEN {
            return Err(LapseError::Format(format!(
                "{}: {len} bytes is too short for a merged recording",
                path.display()
            )));
        }
        let header = RiffHeader::read_at_start(&mut f)?;

        // idx1 follows the movi list
        let idx_pos = HEADER_LEN + header.movi_bytes as u64;
        if idx_pos + IDX_HEADER_LEN > len {
            return Err(LapseError::Format(format!(
                "{}: movi list runs past the end of the file",
                path.display()
            )));
        }
        let mut hdr = [0u8; IDX_HEADER_LEN as usize];
        f.seek(SeekFrom::Start(idx_pos))?;
        f.read_exact(&mut hdr)?;
        if &fourcc_at(&hdr, 0) != IDX1 {
            return Err(LapseError::Format(format!(
                "{}: expected idx1 at byte {idx_pos}, found '{}'",
                path.display(),
                fourcc_str(&fourcc_at(&hdr, 0))
            )));
        }
        let idx_bytes = le32_at(&hdr, 4) as u64;
        if idx_pos + IDX_HEADER_LEN + idx_bytes != len {
            return Err(LapseError::Format(format!(
                "{}: idx1 declares {idx_bytes} bytes, {} remain",
                path.display(),
                len - idx_pos - IDX_HEADER_LEN
            )));
        }
        let count = (idx_bytes / INDEX_ENTRY_LEN as u64) as u32;
        let mut buf = vec![0u8; idx_bytes as usize];
        f.read_exact(&mut buf)?;
        let entries = parse_entries(&buf, count)?;

        Ok(Self {
            f: Mutex::new(f),
            path: path.to_path_buf(),
            header,
            entries,
            len,
        })
    }

    pub fn frames(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Payload of frame `n` (1-based).
    pub fn read_frame(&self, n: u32) -> Result<Vec<u8>> {
        let entry = n
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
            .ok_or_else(|| LapseError::NotFound(format!("frame {n}")))?;
        let mut f = self.f.lock().unwrap_or_else(|p| p.into_inner());
        read_chunk(&mut *f, entry)
    }

    /// Check that header, movi list and idx1 describe the same frames:
    /// RIFF size matches the file, index count matches the header and every
    /// entry points at a `00dc` chunk of its declared size inside `movi`.
    pub fn verify(&self) -> Result<VerifySummary> {
        let riff_size = self.header.riff_size();
        if riff_size as u64 + 8 != self.len {
            return Err(self.mismatch(format!(
                "RIFF size {riff_size} + 8 != file length {}",
                self.len
            )));
        }
        if self.frames() != self.header.frames {
            return Err(self.mismatch(format!(
                "idx1 holds {} entries, header declares {} frames",
                self.frames(),
                self.header.frames
            )));
        }

        let movi_end = HEADER_LEN + self.header.movi_bytes as u64;
        let mut f = self.f.lock().unwrap_or_else(|p| p.into_inner());
        let mut prefix = [0u8; CHUNK_HEADER_LEN as usize];
        let mut payload_bytes = 0u64;
        for (i, e) in self.entries.iter().enumerate() {
            let n = i + 1;
            if &e.tag != CHUNK_TAG {
                return Err(self.mismatch(format!("entry {n} has tag '{}'", fourcc_str(&e.tag))));
            }
            if e.chunk_pos() < HEADER_LEN || e.chunk_pos() + e.span() as u64 > movi_end {
                return Err(self.mismatch(format!("entry {n} points outside the movi list")));
            }
            f.seek(SeekFrom::Start(e.chunk_pos()))?;
            f.read_exact(&mut prefix)?;
            if &fourcc_at(&prefix, 0) != CHUNK_TAG || le32_at(&prefix, 4) != e.size {
                return Err(self.mismatch(format!("chunk of entry {n} does not match its entry")));
            }
            payload_bytes += e.size as u64;
        }

        Ok(VerifySummary {
            frames: self.frames(),
            payload_bytes,
            riff_size,
        })
    }

    fn mismatch(&self, what: String) -> LapseError {
        LapseError::Format(format!("{}: {what}", self.path.display()))
    }
}

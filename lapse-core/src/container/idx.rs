use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container::riff::{CHUNK_HEADER_LEN, INDEX_ENTRY_LEN, MOVI_TAG_OFF};
use crate::error::{LapseError, Result};
use crate::util::le::{FourCc, encode32, fourcc_at, le32_at, pad4};

pub const IDX1: &FourCc = b"idx1";
/// Stream 0, compressed video.
pub const CHUNK_TAG: &FourCc = b"00dc";
pub const AVIIF_KEYFRAME: u32 = 0x0000_0010;
/// `{idx1, byte count}` prefix of the index.
pub const IDX_HEADER_LEN: u64 = 8;
/// The first chunk sits right after the `movi` FourCC.
pub const FIRST_OFFSET: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub tag: FourCc,
    pub flags: u32,
    /// Offset of the chunk prefix, relative to the `movi` FourCC.
    pub offset: u32,
    /// Unpadded payload length.
    pub size: u32,
}

impl IndexEntry {
    pub fn new(offset: u32, size: u32) -> Self {
        Self {
            tag: *CHUNK_TAG,
            flags: AVIIF_KEYFRAME,
            offset,
            size,
        }
    }

    pub fn encode(&self) -> [u8; INDEX_ENTRY_LEN as usize] {
        let mut buf = [0u8; INDEX_ENTRY_LEN as usize];
        buf[0..4].copy_from_slice(&self.tag);
        buf[4..8].copy_from_slice(&encode32(self.flags));
        buf[8..12].copy_from_slice(&encode32(self.offset));
        buf[12..16].copy_from_slice(&encode32(self.size));
        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            tag: fourcc_at(buf, 0),
            flags: le32_at(buf, 4),
            offset: le32_at(buf, 8),
            size: le32_at(buf, 12),
        }
    }

    /// Bytes this chunk occupies in `movi`: prefix, payload and padding.
    pub fn span(&self) -> u32 {
        CHUNK_HEADER_LEN + self.size + pad4(self.size)
    }

    /// Offset the following chunk will be written at.
    pub fn next_offset(&self) -> u32 {
        self.offset.saturating_add(self.span())
    }

    /// Absolute position of the chunk prefix inside the container file.
    pub fn chunk_pos(&self) -> u64 {
        MOVI_TAG_OFF + self.offset as u64
    }

    /// Absolute position of the payload inside the container file.
    pub fn payload_pos(&self) -> u64 {
        self.chunk_pos() + CHUNK_HEADER_LEN as u64
    }
}

/// Decode `count` consecutive entries; the slice must hold exactly that many.
pub fn parse_entries(buf: &[u8], count: u32) -> Result<Vec<IndexEntry>> {
    let need = count as usize * INDEX_ENTRY_LEN as usize;
    if buf.len() != need {
        return Err(LapseError::Format(format!(
            "index size mismatch: got {} bytes, expected {}",
            buf.len(),
            need
        )));
    }
    Ok(buf
        .chunks_exact(INDEX_ENTRY_LEN as usize)
        .map(IndexEntry::decode)
        .collect())
}

/// Append-only `idx1` sidecar: `{idx1, count * 16}` followed by the entries.
pub struct FrameIndex {
    f: File,
    pub path: PathBuf,
}

impl FrameIndex {
    /// Create (or truncate) the index with a header declaring zero entries.
    pub fn initialize(path: &Path) -> Result<Self> {
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        write_header(&mut f, 0)?;
        f.flush()?;
        Ok(Self {
            f,
            path: path.to_path_buf(),
        })
    }

    /// Open for read-modify-write; an absent or empty file is initialized.
    pub fn open(path: &Path) -> Result<Self> {
        let f = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::initialize(path),
            Err(e) => return Err(e.into()),
        };
        if f.metadata()?.len() < IDX_HEADER_LEN {
            drop(f);
            return Self::initialize(path);
        }
        let mut idx = Self {
            f,
            path: path.to_path_buf(),
        };
        idx.check_tag()?;
        Ok(idx)
    }

    /// Open an existing index read-only.
    pub fn open_read(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                LapseError::NotFound(format!("frame index {}", path.display()))
            }
            _ => e.into(),
        })?;
        let mut idx = Self {
            f,
            path: path.to_path_buf(),
        };
        idx.check_tag()?;
        Ok(idx)
    }

    fn check_tag(&mut self) -> Result<()> {
        let mut hdr = [0u8; IDX_HEADER_LEN as usize];
        self.f.seek(SeekFrom::Start(0))?;
        self.f.read_exact(&mut hdr).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                LapseError::NotFound(format!("empty frame index {}", self.path.display()))
            }
            _ => e.into(),
        })?;
        if &fourcc_at(&hdr, 0) != IDX1 {
            return Err(LapseError::Format(format!(
                "{} does not start with idx1",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Entry count declared by the header.
    pub fn count(&mut self) -> Result<u32> {
        let mut hdr = [0u8; IDX_HEADER_LEN as usize];
        self.f.seek(SeekFrom::Start(0))?;
        self.f.read_exact(&mut hdr)?;
        Ok(le32_at(&hdr, 4) / INDEX_ENTRY_LEN)
    }

    /// Write entry `frame_number` (1-based) for a payload of `size` bytes and
    /// bump the header count to `frame_number`.
    pub fn append_entry(&mut self, frame_number: u32, size: u32) -> Result<IndexEntry> {
        if frame_number == 0 {
            return Err(LapseError::InvalidInput("frame numbers start at 1".into()));
        }
        let offset = if frame_number == 1 {
            FIRST_OFFSET
        } else {
            self.read_entry(frame_number - 1)
                .map_err(|_| {
                    LapseError::Format(format!(
                        "{}: no entry {} to chain frame {} onto",
                        self.path.display(),
                        frame_number - 1,
                        frame_number
                    ))
                })?
                .next_offset()
        };
        let entry = IndexEntry::new(offset, size);

        let pos = entry_pos(frame_number);
        self.f.seek(SeekFrom::Start(pos))?;
        self.f.write_all(&entry.encode())?;
        // Drop anything a failed earlier append may have left behind.
        self.f.set_len(pos + INDEX_ENTRY_LEN as u64)?;
        write_header(&mut self.f, frame_number)?;
        self.f.flush()?;
        debug!(frame_number, offset, size, "index entry appended");
        Ok(entry)
    }

    /// Random access to entry `frame_number` (1-based).
    pub fn read_entry(&mut self, frame_number: u32) -> Result<IndexEntry> {
        let count = self.count()?;
        if frame_number == 0 || frame_number > count {
            return Err(frame_not_found(frame_number));
        }
        let mut buf = [0u8; INDEX_ENTRY_LEN as usize];
        self.f.seek(SeekFrom::Start(entry_pos(frame_number)))?;
        self.f.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => frame_not_found(frame_number),
            _ => e.into(),
        })?;
        Ok(IndexEntry::decode(&buf))
    }

    pub fn entries(&mut self) -> Result<Vec<IndexEntry>> {
        let count = self.count()?;
        let mut buf = vec![0u8; count as usize * INDEX_ENTRY_LEN as usize];
        self.f.seek(SeekFrom::Start(IDX_HEADER_LEN))?;
        self.f.read_exact(&mut buf)?;
        parse_entries(&buf, count)
    }

    /// Keep only the first `n` entries.
    pub fn truncate_to(&mut self, n: u32) -> Result<()> {
        self.f
            .set_len(IDX_HEADER_LEN + n as u64 * INDEX_ENTRY_LEN as u64)?;
        write_header(&mut self.f, n)?;
        self.f.flush()?;
        Ok(())
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.f
    }
}

fn entry_pos(frame_number: u32) -> u64 {
    IDX_HEADER_LEN + (frame_number as u64 - 1) * INDEX_ENTRY_LEN as u64
}

fn frame_not_found(frame_number: u32) -> LapseError {
    LapseError::NotFound(format!("frame {frame_number}"))
}

fn write_header<W: Write + Seek>(w: &mut W, count: u32) -> io::Result<()> {
    w.seek(SeekFrom::Start(0))?;
    w.write_all(IDX1)?;
    w.write_all(&encode32(count.saturating_mul(INDEX_ENTRY_LEN)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timelapse.idx");
        (dir, path)
    }

    #[test]
    fn initialize_declares_zero_entries() {
        let (_dir, path) = scratch();
        let mut idx = FrameIndex::initialize(&path).unwrap();
        assert_eq!(idx.count().unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"idx1\0\0\0\0");
    }

    #[test]
    fn offsets_chain_from_four() {
        let (_dir, path) = scratch();
        let mut idx = FrameIndex::initialize(&path).unwrap();
        let a = idx.append_entry(1, 1000).unwrap();
        let b = idx.append_entry(2, 1500).unwrap();
        let c = idx.append_entry(3, 999).unwrap();
        let d = idx.append_entry(4, 1).unwrap();
        assert_eq!((a.offset, b.offset, c.offset), (4, 1012, 2520));
        // 999 bytes are padded to 1000 in the container
        assert_eq!(d.offset, 2520 + 8 + 1000);
        assert_eq!(idx.count().unwrap(), 4);
        assert_eq!(idx.read_entry(3).unwrap(), c);
    }

    #[test]
    fn out_of_range_frames_are_not_found() {
        let (_dir, path) = scratch();
        let mut idx = FrameIndex::initialize(&path).unwrap();
        idx.append_entry(1, 16).unwrap();
        assert!(idx.read_entry(0).unwrap_err().is_not_found());
        assert!(idx.read_entry(2).unwrap_err().is_not_found());
    }

    #[test]
    fn short_file_reads_as_not_found() {
        let (_dir, path) = scratch();
        let mut idx = FrameIndex::initialize(&path).unwrap();
        idx.append_entry(1, 16).unwrap();
        idx.append_entry(2, 16).unwrap();
        // header claims two entries, file only holds one and a half
        let len = std::fs::metadata(&path).unwrap().len();
        idx.file_mut().set_len(len - 8).unwrap();
        assert!(idx.read_entry(2).unwrap_err().is_not_found());
        assert!(idx.read_entry(1).is_ok());
    }

    #[test]
    fn reopen_and_truncate() {
        let (_dir, path) = scratch();
        {
            let mut idx = FrameIndex::open(&path).unwrap();
            for n in 1..=3 {
                idx.append_entry(n, 40).unwrap();
            }
        }
        let mut idx = FrameIndex::open(&path).unwrap();
        assert_eq!(idx.count().unwrap(), 3);
        idx.truncate_to(1).unwrap();
        assert_eq!(idx.entries().unwrap().len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 + 16);
        let next = idx.append_entry(2, 40).unwrap();
        assert_eq!(next.offset, 4 + 48);
    }

    #[test]
    fn open_read_missing_is_not_found() {
        let (_dir, path) = scratch();
        let err = FrameIndex::open_read(&path).err().unwrap();
        assert!(err.is_not_found());
    }
}

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{LapseError, Result};
use crate::util::le::{FourCc, encode32, fourcc_at, fourcc_str, le32_at, put32_at};

/// Fixed header length; the first chunk of the `movi` list starts here.
pub const HEADER_LEN: u64 = 248;
/// Position of the `movi` FourCC. Index offsets are relative to it.
pub const MOVI_TAG_OFF: u64 = HEADER_LEN - 4;
/// `{tag, size}` prefix of every RIFF chunk.
pub const CHUNK_HEADER_LEN: u32 = 8;
/// One `idx1` entry: tag, flags, offset, size.
pub const INDEX_ENTRY_LEN: u32 = 16;

pub const DEFAULT_FPS: u32 = 10;
pub const AVIF_HASINDEX: u32 = 0x0000_0010;

pub const RIFF: &FourCc = b"RIFF";
pub const AVI: &FourCc = b"AVI ";
pub const LIST: &FourCc = b"LIST";
pub const MOVI: &FourCc = b"movi";
pub const MJPG: &FourCc = b"MJPG";

const HDRL_SIZE: u32 = 216;
const AVIH_SIZE: u32 = 56;
const STRL_SIZE: u32 = 116;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;
const ODML_SIZE: u32 = 16;
const DMLH_SIZE: u32 = 4;

// Field offsets inside the header.
const OFF_RIFF_SIZE: u64 = 4;
const OFF_USEC_PER_FRAME: u64 = 32;
const OFF_TOTAL_FRAMES: u64 = 48;
const OFF_WIDTH: usize = 64;
const OFF_HEIGHT: usize = 68;
const OFF_STRH_SCALE: usize = 128;
const OFF_STRH_RATE: u64 = 132;
const OFF_STRH_LENGTH: u64 = 140;
const OFF_DMLH_FRAMES: u64 = 232;
const OFF_MOVI_SIZE: u64 = 240;

/// Substitute the default for an unset frame rate.
#[inline]
pub fn fps_or_default(fps: u32) -> u32 {
    if fps == 0 { DEFAULT_FPS } else { fps }
}

/// round(1_000_000 / fps), never dividing by zero.
pub fn usec_per_frame(fps: u32) -> u32 {
    let fps = fps_or_default(fps);
    (1_000_000 + fps / 2) / fps
}

/// Declared RIFF size once the `idx1` for `frames` entries sits after `movi`.
pub fn riff_size(frames: u32, movi_bytes: u32) -> u32 {
    let n = (HEADER_LEN - 8)
        + movi_bytes as u64
        + CHUNK_HEADER_LEN as u64
        + INDEX_ENTRY_LEN as u64 * frames as u64;
    n.min(u32::MAX as u64) as u32
}

/// In-memory view of the container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffHeader {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u32,
    /// Bytes of chunk data in the `movi` list, chunk prefixes and padding included.
    pub movi_bytes: u32,
}

impl RiffHeader {
    /// `payload_bytes` is the padded payload total, chunk prefixes excluded.
    pub fn build(frames: u32, payload_bytes: u32, width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps_or_default(fps),
            frames,
            movi_bytes: payload_bytes.saturating_add(frames.saturating_mul(CHUNK_HEADER_LEN)),
        }
    }

    pub fn movi_size(&self) -> u32 {
        self.movi_bytes.saturating_add(4)
    }

    pub fn riff_size(&self) -> u32 {
        riff_size(self.frames, self.movi_bytes)
    }

    /// File length of the container once its index has been merged behind it.
    pub fn merged_len(&self) -> u64 {
        self.riff_size() as u64 + 8
    }

    pub fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut h = [0u8; HEADER_LEN as usize];
        let frame_bytes = self.width.wrapping_mul(self.height).wrapping_mul(3);

        h[0..4].copy_from_slice(RIFF);
        put32_at(&mut h, 4, self.riff_size());
        h[8..12].copy_from_slice(AVI);

        h[12..16].copy_from_slice(LIST);
        put32_at(&mut h, 16, HDRL_SIZE);
        h[20..24].copy_from_slice(b"hdrl");

        h[24..28].copy_from_slice(b"avih");
        put32_at(&mut h, 28, AVIH_SIZE);
        put32_at(&mut h, 32, usec_per_frame(self.fps));
        put32_at(&mut h, 36, frame_bytes.wrapping_mul(self.fps));
        // 40: padding granularity
        put32_at(&mut h, 44, AVIF_HASINDEX);
        put32_at(&mut h, 48, self.frames);
        // 52: initial frames
        put32_at(&mut h, 56, 1);
        put32_at(&mut h, 60, frame_bytes);
        put32_at(&mut h, OFF_WIDTH, self.width);
        put32_at(&mut h, OFF_HEIGHT, self.height);
        // 72..88: reserved

        h[88..92].copy_from_slice(LIST);
        put32_at(&mut h, 92, STRL_SIZE);
        h[96..100].copy_from_slice(b"strl");

        h[100..104].copy_from_slice(b"strh");
        put32_at(&mut h, 104, STRH_SIZE);
        h[108..112].copy_from_slice(b"vids");
        h[112..116].copy_from_slice(MJPG);
        // 116 flags, 120 priority+language, 124 initial frames
        put32_at(&mut h, OFF_STRH_SCALE, 1);
        put32_at(&mut h, 132, self.fps);
        // 136 start
        put32_at(&mut h, 140, self.frames);
        put32_at(&mut h, 144, frame_bytes);
        put32_at(&mut h, 148, u32::MAX); // quality: driver default
        // 152 sample size, 156..164 rcFrame
        h[160..162].copy_from_slice(&(self.width.min(u16::MAX as u32) as u16).to_le_bytes());
        h[162..164].copy_from_slice(&(self.height.min(u16::MAX as u32) as u16).to_le_bytes());

        h[164..168].copy_from_slice(b"strf");
        put32_at(&mut h, 168, STRF_SIZE);
        put32_at(&mut h, 172, STRF_SIZE);
        put32_at(&mut h, 176, self.width);
        put32_at(&mut h, 180, self.height);
        put32_at(&mut h, 184, 1 | (24 << 16)); // 1 plane, 24 bpp
        h[188..192].copy_from_slice(MJPG);
        put32_at(&mut h, 192, frame_bytes);
        // 196..212: pels/meter and palette

        h[212..216].copy_from_slice(LIST);
        put32_at(&mut h, 216, ODML_SIZE);
        h[220..224].copy_from_slice(b"odml");
        h[224..228].copy_from_slice(b"dmlh");
        put32_at(&mut h, 228, DMLH_SIZE);
        put32_at(&mut h, 232, self.frames);

        h[236..240].copy_from_slice(LIST);
        put32_at(&mut h, 240, self.movi_size());
        h[244..248].copy_from_slice(MOVI);
        h
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(&self.encode())
    }

    pub fn decode(h: &[u8; HEADER_LEN as usize]) -> Result<Self> {
        expect_tag(h, 0, RIFF)?;
        expect_tag(h, 8, AVI)?;
        expect_tag(h, 12, LIST)?;
        expect_tag(h, 24, b"avih")?;
        expect_tag(h, 100, b"strh")?;
        expect_tag(h, 112, MJPG)?;
        expect_tag(h, 236, LIST)?;
        expect_tag(h, 244, MOVI)?;

        let scale = le32_at(h, OFF_STRH_SCALE).max(1);
        let movi_size = le32_at(h, OFF_MOVI_SIZE as usize);
        if movi_size < 4 {
            return Err(LapseError::Format(format!(
                "movi list size {movi_size} is smaller than its own tag"
            )));
        }
        Ok(Self {
            width: le32_at(h, OFF_WIDTH),
            height: le32_at(h, OFF_HEIGHT),
            fps: le32_at(h, OFF_STRH_RATE as usize) / scale,
            frames: le32_at(h, OFF_TOTAL_FRAMES as usize),
            movi_bytes: movi_size - 4,
        })
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut h = [0u8; HEADER_LEN as usize];
        r.read_exact(&mut h)?;
        Self::decode(&h)
    }

    /// Read the header at the start of a seekable container.
    pub fn read_at_start<F: Read + Seek>(f: &mut F) -> Result<Self> {
        f.seek(SeekFrom::Start(0))?;
        Self::read_from(f)
    }
}

fn expect_tag(h: &[u8], off: usize, want: &FourCc) -> Result<()> {
    let got = fourcc_at(h, off);
    if &got != want {
        return Err(LapseError::Format(format!(
            "expected '{}' at offset {off}, found '{}'",
            fourcc_str(want),
            fourcc_str(&got)
        )));
    }
    Ok(())
}

fn put_field<F: Write + Seek>(f: &mut F, off: u64, value: u32) -> std::io::Result<()> {
    f.seek(SeekFrom::Start(off))?;
    f.write_all(&encode32(value))
}

/// Rewrite the three frame-count fields (avih, strh length, dmlh).
pub fn patch_frame_count<F: Write + Seek>(f: &mut F, frames: u32) -> std::io::Result<()> {
    put_field(f, OFF_TOTAL_FRAMES, frames)?;
    put_field(f, OFF_STRH_LENGTH, frames)?;
    put_field(f, OFF_DMLH_FRAMES, frames)
}

/// Rewrite the `movi` list size and the RIFF size that depends on it.
pub fn patch_payload_size<F: Write + Seek>(
    f: &mut F,
    frames: u32,
    movi_bytes: u32,
) -> std::io::Result<()> {
    put_field(f, OFF_MOVI_SIZE, movi_bytes.saturating_add(4))?;
    put_field(f, OFF_RIFF_SIZE, riff_size(frames, movi_bytes))
}

/// Rewrite playback timing: µs per frame and the stream rate.
pub fn patch_timing<F: Write + Seek>(f: &mut F, fps: u32) -> std::io::Result<()> {
    let fps = fps_or_default(fps);
    put_field(f, OFF_USEC_PER_FRAME, usec_per_frame(fps))?;
    put_field(f, OFF_STRH_RATE, fps)
}

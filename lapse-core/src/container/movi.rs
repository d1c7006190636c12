use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::container::idx::{CHUNK_TAG, IndexEntry};
use crate::container::riff::{CHUNK_HEADER_LEN, HEADER_LEN, MOVI_TAG_OFF, RiffHeader};
use crate::error::{LapseError, Result};
use crate::util::le::{encode32, fourcc_at, fourcc_str, le32_at, pad4};

/// Append one `{00dc, len, payload, pad}` chunk at the end of the container.
/// Returns the payload length plus padding.
pub fn append_chunk<F: Write + Seek>(f: &mut F, payload: &[u8]) -> Result<u32> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        LapseError::InvalidInput(format!("frame of {} bytes exceeds a RIFF chunk", payload.len()))
    })?;
    let pad = pad4(len);

    f.seek(SeekFrom::End(0))?;
    let mut prefix = [0u8; CHUNK_HEADER_LEN as usize];
    prefix[0..4].copy_from_slice(CHUNK_TAG);
    prefix[4..8].copy_from_slice(&encode32(len));
    f.write_all(&prefix)?;
    f.write_all(payload)?;
    if pad > 0 {
        f.write_all(&[0u8; 4][..pad as usize])?;
    }
    Ok(len + pad)
}

/// Read exactly the payload described by `entry`, skipping the chunk prefix.
pub fn read_chunk<F: Read + Seek>(f: &mut F, entry: &IndexEntry) -> Result<Vec<u8>> {
    f.seek(SeekFrom::Start(entry.chunk_pos()))?;
    let mut prefix = [0u8; CHUNK_HEADER_LEN as usize];
    f.read_exact(&mut prefix).map_err(short_read)?;

    let tag = fourcc_at(&prefix, 0);
    let declared = le32_at(&prefix, 4);
    if &tag != CHUNK_TAG || declared != entry.size {
        return Err(LapseError::Format(format!(
            "chunk at movi+{} is '{}' with {} bytes, index says {} bytes",
            entry.offset,
            fourcc_str(&tag),
            declared,
            entry.size
        )));
    }

    let mut payload = vec![0u8; entry.size as usize];
    f.read_exact(&mut payload).map_err(short_read)?;
    Ok(payload)
}

/// Walk the chunks of the `movi` list declared by `header` and rebuild the
/// index entries they imply.
pub fn scan_chunks<F: Read + Seek>(f: &mut F, header: &RiffHeader) -> Result<Vec<IndexEntry>> {
    let end = HEADER_LEN + header.movi_bytes as u64;
    let mut out = Vec::with_capacity(header.frames as usize);
    let mut pos = HEADER_LEN;
    let mut prefix = [0u8; CHUNK_HEADER_LEN as usize];
    while pos < end {
        if pos + CHUNK_HEADER_LEN as u64 > end {
            return Err(LapseError::Format(format!(
                "partial chunk prefix at byte {pos} of the movi list"
            )));
        }
        f.seek(SeekFrom::Start(pos))?;
        f.read_exact(&mut prefix)?;
        let tag = fourcc_at(&prefix, 0);
        if &tag != CHUNK_TAG {
            return Err(LapseError::Format(format!(
                "unexpected chunk '{}' at byte {pos}",
                fourcc_str(&tag)
            )));
        }
        let size = le32_at(&prefix, 4);
        let entry = IndexEntry::new((pos - MOVI_TAG_OFF) as u32, size);
        pos += CHUNK_HEADER_LEN as u64 + size as u64 + pad4(size) as u64;
        if pos > end {
            return Err(LapseError::Format(format!(
                "chunk at movi+{} runs past the movi list",
                entry.offset
            )));
        }
        out.push(entry);
    }
    Ok(out)
}

/// Walk whole chunks from the start of the `movi` list without trusting the
/// header: stop at the first chunk that does not fit in `file_len` bytes, or
/// once `limit` chunks are found. A foreign tag before that is `Format`.
pub fn scan_complete_chunks<F: Read + Seek>(
    f: &mut F,
    file_len: u64,
    limit: Option<u32>,
) -> Result<Vec<IndexEntry>> {
    let mut out = Vec::new();
    let mut pos = HEADER_LEN;
    let mut prefix = [0u8; CHUNK_HEADER_LEN as usize];
    while pos + CHUNK_HEADER_LEN as u64 <= file_len
        && limit.is_none_or(|n| (out.len() as u32) < n)
    {
        f.seek(SeekFrom::Start(pos))?;
        f.read_exact(&mut prefix)?;
        let tag = fourcc_at(&prefix, 0);
        if &tag != CHUNK_TAG {
            return Err(LapseError::Format(format!(
                "unexpected chunk '{}' at byte {pos}",
                fourcc_str(&tag)
            )));
        }
        let size = le32_at(&prefix, 4);
        let next = pos + CHUNK_HEADER_LEN as u64 + size as u64 + pad4(size) as u64;
        if next > file_len {
            break;
        }
        let entry = IndexEntry::new((pos - MOVI_TAG_OFF) as u32, size);
        out.push(entry);
        pos = next;
    }
    Ok(out)
}

fn short_read(e: io::Error) -> LapseError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => LapseError::NotFound("frame data truncated".into()),
        _ => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunk_is_padded_to_dword() {
        let mut cur = Cursor::new(vec![0u8; MOVI_TAG_OFF as usize + 4]);
        let written = append_chunk(&mut cur, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(written, 8);
        let buf = cur.get_ref();
        let chunk = &buf[MOVI_TAG_OFF as usize + 4..];
        assert_eq!(&chunk[0..4], b"00dc");
        assert_eq!(le32_at(chunk, 4), 5);
        assert_eq!(&chunk[8..], &[1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn read_back_exact_payload() {
        let mut cur = Cursor::new(vec![0u8; MOVI_TAG_OFF as usize + 4]);
        append_chunk(&mut cur, b"first").unwrap();
        append_chunk(&mut cur, b"second!").unwrap();
        let first = IndexEntry::new(4, 5);
        let second = IndexEntry::new(first.next_offset(), 7);
        assert_eq!(read_chunk(&mut cur, &second).unwrap(), b"second!");
        assert_eq!(read_chunk(&mut cur, &first).unwrap(), b"first");
    }

    #[test]
    fn mismatched_size_is_rejected() {
        let mut cur = Cursor::new(vec![0u8; MOVI_TAG_OFF as usize + 4]);
        append_chunk(&mut cur, b"abcd").unwrap();
        let err = read_chunk(&mut cur, &IndexEntry::new(4, 3)).unwrap_err();
        assert!(matches!(err, LapseError::Format(_)));
    }

    #[test]
    fn scan_recovers_entries() {
        let header = RiffHeader::build(0, 0, 8, 8, 10);
        let mut cur = Cursor::new(header.encode().to_vec());
        let mut payload_bytes = 0;
        for len in [5usize, 12, 1] {
            payload_bytes += append_chunk(&mut cur, &vec![7u8; len]).unwrap();
        }
        let header = RiffHeader::build(3, payload_bytes, 8, 8, 10);
        let entries = scan_chunks(&mut cur, &header).unwrap();
        let sizes: Vec<_> = entries.iter().map(|e| e.size).collect();
        assert_eq!(sizes, [5, 12, 1]);
        assert_eq!(entries[0].offset, 4);
        assert_eq!(entries[1].offset, entries[0].next_offset());
        assert_eq!(entries[2].offset, entries[1].next_offset());
    }

    #[test]
    fn scan_rejects_overrun() {
        let header = RiffHeader::build(0, 0, 8, 8, 10);
        let mut cur = Cursor::new(header.encode().to_vec());
        append_chunk(&mut cur, &[1u8; 16]).unwrap();
        // header claims fewer bytes than the chunk occupies
        let short = RiffHeader::build(1, 8, 8, 8, 10);
        assert!(matches!(
            scan_chunks(&mut cur, &short).unwrap_err(),
            LapseError::Format(_)
        ));
    }

    #[test]
    fn complete_scan_stops_at_a_cut_chunk() {
        let header = RiffHeader::build(0, 0, 8, 8, 10);
        let mut cur = Cursor::new(header.encode().to_vec());
        append_chunk(&mut cur, &[1u8; 6]).unwrap();
        append_chunk(&mut cur, &[2u8; 9]).unwrap();
        let len = cur.get_ref().len();
        cur.get_mut().truncate(len - 3);
        let len = cur.get_ref().len() as u64;

        let entries = scan_complete_chunks(&mut cur, len, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 6);
        assert!(scan_complete_chunks(&mut cur, len, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn complete_scan_rejects_foreign_tags() {
        let header = RiffHeader::build(0, 0, 8, 8, 10);
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(b"JUNK\x04\x00\x00\x00abcd");
        let len = bytes.len() as u64;
        let mut cur = Cursor::new(bytes);
        assert!(matches!(
            scan_complete_chunks(&mut cur, len, None).unwrap_err(),
            LapseError::Format(_)
        ));
    }

    #[test]
    fn truncated_payload_is_not_found() {
        let mut cur = Cursor::new(vec![0u8; MOVI_TAG_OFF as usize + 4]);
        append_chunk(&mut cur, &[9u8; 32]).unwrap();
        let len = cur.get_ref().len();
        cur.get_mut().truncate(len - 10);
        let err = read_chunk(&mut cur, &IndexEntry::new(4, 32)).unwrap_err();
        assert!(err.is_not_found());
    }
}

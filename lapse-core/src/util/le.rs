//! Little-endian field codec. Every header and index field on disk goes
//! through here, so the layout does not depend on the host byte order.

pub type FourCc = [u8; 4];

#[inline]
pub fn encode32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

#[inline]
pub fn decode32(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Decode the u32 stored at `off` in `buf`. Callers guarantee bounds.
#[inline]
pub fn le32_at(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    decode32(b)
}

#[inline]
pub fn put32_at(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&encode32(value));
}

#[inline]
pub fn fourcc_at(buf: &[u8], off: usize) -> FourCc {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    b
}

pub fn fourcc_str(cc: &FourCc) -> String {
    cc.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Zero bytes needed after `len` payload bytes to reach a 4-byte boundary.
#[inline]
pub fn pad4(len: u32) -> u32 {
    (4 - len % 4) % 4
}

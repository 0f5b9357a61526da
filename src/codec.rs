//! Binary codec helpers
//!
//! LEB128 variable-length unsigned integers and length-prefixed byte strings,
//! shared by the artifact index, generation index and tail cursor formats.
//!
//! ```text
//! varuint: 7 bits per byte, low group first, high bit = "more bytes follow"
//!   300 -> [0xAC, 0x02]
//! string:  [varuint len][len bytes]
//! ```

use bytes::{Buf, BufMut};

use crate::error::{LogTableError, Result};

/// Longest valid encoding of a u64 (ceil(64 / 7))
pub const MAX_VARUINT_LEN: usize = 10;

/// Append a varuint
pub fn put_varuint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes `put_varuint` emits for `value`
pub fn varuint_len(value: u64) -> usize {
    let bits = 64 - value.max(1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Read a varuint, failing on truncation or overlong input
pub fn get_varuint(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;

    for i in 0..MAX_VARUINT_LEN {
        if !buf.has_remaining() {
            return Err(LogTableError::CorruptFormat(
                "truncated varuint".to_string(),
            ));
        }

        let byte = buf.get_u8();
        let group = (byte & 0x7f) as u64;

        if i == MAX_VARUINT_LEN - 1 && group > 1 {
            return Err(LogTableError::CorruptFormat(
                "varuint overflows u64".to_string(),
            ));
        }

        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }

    Err(LogTableError::CorruptFormat(
        "varuint longer than 10 bytes".to_string(),
    ))
}

/// Append a varuint length followed by the bytes
pub fn put_bytes(buf: &mut impl BufMut, data: &[u8]) {
    put_varuint(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Read a length-prefixed byte string
pub fn get_bytes(buf: &mut impl Buf) -> Result<Vec<u8>> {
    let len = get_varuint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(LogTableError::CorruptFormat(format!(
            "length prefix {} exceeds remaining {} bytes",
            len,
            buf.remaining()
        )));
    }

    let mut data = vec![0u8; len as usize];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

/// Append a length-prefixed UTF-8 string
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

/// Read a length-prefixed UTF-8 string
pub fn get_string(buf: &mut impl Buf) -> Result<String> {
    let data = get_bytes(buf)?;
    String::from_utf8(data)
        .map_err(|e| LogTableError::CorruptFormat(format!("invalid utf-8 string: {}", e)))
}

/// Read a fixed-width little-endian u64, failing on truncation
pub fn get_u64_le(buf: &mut impl Buf) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(LogTableError::CorruptFormat("truncated u64".to_string()));
    }
    Ok(buf.get_u64_le())
}

/// Read a single byte, failing on truncation
pub fn get_u8(buf: &mut impl Buf) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(LogTableError::CorruptFormat("truncated u8".to_string()));
    }
    Ok(buf.get_u8())
}

//! Low-level byte reading utilities.
//!
//! All multi-byte integers in a book are big-endian. Callers index into
//! fixed-size page buffers, so these helpers take a slice and an offset.

use byteorder::{BigEndian, ByteOrder};

/// Read a 2 byte big-endian number.
pub fn u16_at(b: &[u8], off: usize) -> u16 {
    BigEndian::read_u16(&b[off..off + 2])
}

/// Read a 3 byte big-endian number.
pub fn u24_at(b: &[u8], off: usize) -> u32 {
    BigEndian::read_u24(&b[off..off + 3])
}

/// Read a 4 byte big-endian number.
pub fn u32_at(b: &[u8], off: usize) -> u32 {
    BigEndian::read_u32(&b[off..off + 4])
}

/// Read a 5 byte big-endian number.
///
/// Used for EBZip file sizes and wide slice index entries.
pub fn u40_at(b: &[u8], off: usize) -> u64 {
    BigEndian::read_uint(&b[off..off + 5], 5)
}

/// Read a big-endian number of 2 to 5 bytes.
pub fn uint_at(b: &[u8], off: usize, width: usize) -> u64 {
    BigEndian::read_uint(&b[off..off + width], width)
}

fn bcd(b: &[u8], off: usize, len: usize) -> u32 {
    b[off..off + len].iter().fold(0u32, |acc, &x| {
        acc * 100 + ((x >> 4) & 0x0f) as u32 * 10 + (x & 0x0f) as u32
    })
}

/// Decode a 2 byte packed BCD number (4 digits).
pub fn bcd2(b: &[u8], off: usize) -> u32 {
    bcd(b, off, 2)
}

/// Decode a 4 byte packed BCD number (8 digits).
pub fn bcd4(b: &[u8], off: usize) -> u32 {
    bcd(b, off, 4)
}

/// Decode fixed-width ASCII, trimming padding and NUL bytes.
pub fn ascii_field(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).trim().to_string()
}

/// Decode fixed-width ISO 8859-1 text, trimming control bytes and spaces at
/// both ends.
pub fn latin1_field(b: &[u8]) -> String {
    let s: String = b.iter().map(|&c| c as char).collect();
    s.trim_matches(|c: char| c <= ' ').to_string()
}

/// Format a 16-bit character code as four lowercase hex digits.
pub fn hex4(code: u16) -> String {
    format!("{:04x}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        let b = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(u16_at(&b, 0), 0x0102);
        assert_eq!(u24_at(&b, 1), 0x020304);
        assert_eq!(u32_at(&b, 2), 0x03040506);
        assert_eq!(u40_at(&b, 0), 0x0102030405);
        assert_eq!(uint_at(&b, 1, 3), 0x020304);
    }

    #[test]
    fn test_bcd() {
        let b = [0x12, 0x34, 0x00, 0x00, 0x05, 0x67];
        assert_eq!(bcd2(&b, 0), 1234);
        assert_eq!(bcd4(&b, 2), 567);
    }

    #[test]
    fn test_ascii_field() {
        assert_eq!(ascii_field(b"HONMON  "), "HONMON");
        assert_eq!(ascii_field(b"GAI16F\0\0"), "GAI16F");
        assert_eq!(hex4(0xa12b), "a12b");
    }

    #[test]
    fn test_latin1_field() {
        assert_eq!(latin1_field(b"Caf\xe9 \0\0"), "Caf\u{e9}");
    }
}

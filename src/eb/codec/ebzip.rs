//! EBZip slice compression for book data files.
//!
//! An EBZip file splits the original data into fixed-size slices and deflates
//! each slice independently, so that any page can be read back by inflating a
//! single slice.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Header (22 bytes)        │ magic, mode/level, index width, size, Adler-32, mtime
//! ├──────────────────────────┤
//! │ Slice index              │ (slices + 1) offsets, 2..=5 bytes each
//! ├──────────────────────────┤
//! │ Slice 0, slice 1, ...    │ zlib stream, or raw when it does not shrink
//! └──────────────────────────┘
//! ```
//!
//! Header byte 6 is zero unless the slice index is wider than the original
//! size implies. That happens when raw slices and the index push the
//! container past what the implied width can address.

use std::io::{Read, Write};

use adler2::adler32_slice;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, trace};

use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::PAGE_SIZE;
use crate::eb::utils;

/// Size of the fixed file header.
pub const HEADER_SIZE: usize = 22;
/// Largest slice level; slices are `2048 << level` bytes.
pub const MAX_SLICE_LEVEL: u8 = 5;
/// Largest DEFLATE level.
pub const MAX_DEFLATE_LEVEL: u32 = 9;

const MAGIC: &[u8; 5] = b"EBZip";

/// Settings for [`compress_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EbzipOptions {
    /// Slice size exponent, `0..=5`. Larger slices compress better but make each
    /// random read inflate more data.
    pub slice_level: u8,
    /// DEFLATE level, `0..=9`. Level 0 stores every slice raw.
    pub deflate_level: u32,
}

impl Default for EbzipOptions {
    fn default() -> Self {
        Self {
            slice_level: 0,
            deflate_level: MAX_DEFLATE_LEVEL,
        }
    }
}

/// Parsed EBZip file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EbzipHeader {
    pub mode: u8,
    pub level: u8,
    /// Explicit slice index width, or 0 when it follows from `file_size`.
    pub width: u8,
    /// Size of the original, uncompressed data.
    pub file_size: u64,
    /// Adler-32 of the original data.
    pub checksum: u32,
    pub mtime: u32,
}

impl EbzipHeader {
    /// Parses and validates the 22-byte header.
    ///
    /// # Errors
    /// Returns `Format` if the magic is wrong, the mode is not 1 or 2, the
    /// level exceeds the largest slice level, or the index width is invalid.
    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < HEADER_SIZE {
            return Err(EbError::format(format!(
                "EBZip header too short: {} bytes",
                b.len()
            )));
        }
        if &b[0..5] != MAGIC {
            return Err(EbError::format("Missing EBZip signature"));
        }
        let mode = b[5] >> 4;
        let level = b[5] & 0x0f;
        if mode != 1 && mode != 2 {
            return Err(EbError::Format(format!("Unsupported EBZip mode: {}", mode)));
        }
        if level > MAX_SLICE_LEVEL {
            return Err(EbError::Format(format!("Unsupported EBZip level: {}", level)));
        }
        let width = b[6];
        if width != 0 && !(2..=5).contains(&width) {
            return Err(EbError::Format(format!("Unsupported EBZip index width: {}", width)));
        }
        Ok(Self {
            mode,
            level,
            width,
            file_size: utils::u40_at(b, 9),
            checksum: utils::u32_at(b, 14),
            mtime: utils::u32_at(b, 18),
        })
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[0..5].copy_from_slice(MAGIC);
        b[5] = (self.mode << 4) | (self.level & 0x0f);
        b[6] = self.width;
        b[9..14].copy_from_slice(&self.file_size.to_be_bytes()[3..8]);
        b[14..18].copy_from_slice(&self.checksum.to_be_bytes());
        b[18..22].copy_from_slice(&self.mtime.to_be_bytes());
        b
    }

    /// Uncompressed size of one slice.
    pub fn slice_size(&self) -> usize {
        (PAGE_SIZE as usize) << self.level
    }

    /// Width in bytes of one slice index entry.
    pub fn index_width(&self) -> usize {
        match self.width {
            0 => index_width(self.file_size),
            w => w as usize,
        }
    }

    /// Number of slices covering the original data.
    pub fn slice_count(&self) -> u64 {
        self.file_size.div_ceil(self.slice_size() as u64)
    }

    /// File offset of the index entry for `slice`.
    pub fn index_position(&self, slice: u64) -> u64 {
        HEADER_SIZE as u64 + slice * self.index_width() as u64
    }
}

/// Width of a slice index entry for data of `file_size` bytes.
pub fn index_width(file_size: u64) -> usize {
    if file_size < 1 << 16 {
        2
    } else if file_size < 1 << 24 {
        3
    } else if file_size < 1 << 32 {
        4
    } else {
        5
    }
}

/// Narrowest index width able to address every offset of a container for
/// `file_size` bytes, assuming every slice is stored raw.
pub fn container_index_width(file_size: u64, slice_level: u8) -> usize {
    let slice_size = (PAGE_SIZE as u64) << slice_level;
    let slices = file_size.div_ceil(slice_size);
    let mut width = index_width(file_size);
    while width < 5 {
        let largest = HEADER_SIZE as u64 + (slices + 1) * width as u64 + slices * slice_size;
        if largest < 1 << (width * 8) {
            break;
        }
        width += 1;
    }
    width
}

/// Compresses `data` with 2048-byte slices at the given DEFLATE level.
///
/// # Errors
/// Returns `InvalidArgument` for a level above 9.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    compress_with(
        data,
        &EbzipOptions {
            slice_level: 0,
            deflate_level: level,
        },
    )
}

/// Compresses `data` into an EBZip container.
///
/// The final slice is zero-padded to the full slice size before compression.
/// Slices whose compressed form is not smaller than the slice are stored raw.
///
/// # Errors
/// Returns `InvalidArgument` for out-of-range options.
pub fn compress_with(data: &[u8], options: &EbzipOptions) -> Result<Vec<u8>> {
    if options.slice_level > MAX_SLICE_LEVEL {
        return Err(EbError::InvalidArgument(format!(
            "EBZip slice level {} out of range 0..={}",
            options.slice_level, MAX_SLICE_LEVEL
        )));
    }
    if options.deflate_level > MAX_DEFLATE_LEVEL {
        return Err(EbError::InvalidArgument(format!(
            "DEFLATE level {} out of range 0..={}",
            options.deflate_level, MAX_DEFLATE_LEVEL
        )));
    }

    let file_size = data.len() as u64;
    let width = container_index_width(file_size, options.slice_level);
    let header = EbzipHeader {
        mode: if file_size < 1 << 32 { 1 } else { 2 },
        level: options.slice_level,
        width: if width == index_width(file_size) { 0 } else { width as u8 },
        file_size,
        checksum: adler32_slice(data),
        mtime: 0,
    };
    let slice_size = header.slice_size();
    let slices = header.slice_count();
    let limit: u64 = if width >= 5 { u64::MAX } else { 1 << (width * 8) };
    debug!(
        "EBZip compress: {} bytes, {} slices of {} bytes, index width {}",
        file_size, slices, slice_size, width
    );

    let index_len = (slices as usize + 1) * width;
    let mut index = Vec::with_capacity(index_len);
    let mut body = Vec::new();
    let mut pos = (HEADER_SIZE + index_len) as u64;
    let mut slice = vec![0u8; slice_size];

    for chunk in data.chunks(slice_size) {
        slice[..chunk.len()].copy_from_slice(chunk);
        slice[chunk.len()..].fill(0);

        let compressed = deflate_slice(&slice, options.deflate_level)?;
        push_index(&mut index, pos, width, limit)?;
        if compressed.len() >= slice_size {
            trace!("Slice at {:#x} stored raw", pos);
            body.extend_from_slice(&slice);
            pos += slice_size as u64;
        } else {
            body.extend_from_slice(&compressed);
            pos += compressed.len() as u64;
        }
    }
    push_index(&mut index, pos, width, limit)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + index.len() + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&index);
    out.extend_from_slice(&body);
    Ok(out)
}

fn push_index(index: &mut Vec<u8>, pos: u64, width: usize, limit: u64) -> Result<()> {
    if pos >= limit {
        return Err(EbError::Format(format!(
            "Slice offset {:#x} does not fit a {}-byte index entry",
            pos, width
        )));
    }
    index.extend_from_slice(&pos.to_be_bytes()[8 - width..]);
    Ok(())
}

fn deflate_slice(slice: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(slice)?;
    Ok(encoder.finish()?)
}

/// Expands one stored slice into `out`, which must be exactly one slice long.
///
/// A stored length equal to the slice size means the slice was kept raw.
///
/// # Errors
/// Returns `Format` for an empty or oversized slice, corrupt zlib data or a
/// stream inflating past the slice size, and `SizeMismatch` when the inflated
/// slice is short.
pub fn decode_slice(raw: &[u8], out: &mut [u8]) -> Result<()> {
    let slice_size = out.len();
    if raw.is_empty() || raw.len() > slice_size {
        return Err(EbError::Format(format!(
            "Invalid EBZip slice length {} for slice size {}",
            raw.len(),
            slice_size
        )));
    }
    if raw.len() == slice_size {
        out.copy_from_slice(raw);
        return Ok(());
    }

    let mut decoder = ZlibDecoder::new(raw);
    let mut filled = 0;
    while filled < slice_size {
        let n = decoder
            .read(&mut out[filled..])
            .map_err(|e| EbError::Format(format!("Zlib inflate failed: {}", e)))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled != slice_size {
        return Err(EbError::SizeMismatch {
            context: "EBZip slice",
            expected: slice_size as u64,
            found: filled as u64,
        });
    }
    let mut extra = [0u8; 1];
    let overflow = decoder
        .read(&mut extra)
        .map_err(|e| EbError::Format(format!("Zlib inflate failed: {}", e)))?;
    if overflow > 0 {
        return Err(EbError::Format(format!(
            "EBZip slice inflates past {} bytes",
            slice_size
        )));
    }
    Ok(())
}

/// Reads the `(start, end)` offsets of `slice` from an in-memory index.
pub(crate) fn slice_bounds(index: &[u8], width: usize) -> (u64, u64) {
    (
        utils::uint_at(index, 0, width),
        utils::uint_at(index, width, width),
    )
}

/// Expands a complete EBZip container back into the original data.
///
/// # Errors
/// Returns `Format` for a truncated header, index or slice, and
/// `ChecksumMismatch` when the result does not match the stored Adler-32.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let header = EbzipHeader::parse(bytes)?;
    let slice_size = header.slice_size();
    let width = header.index_width();
    let slices = header.slice_count();

    let index_end = header.index_position(slices) as usize + width;
    if bytes.len() < index_end {
        return Err(EbError::format("Truncated EBZip slice index"));
    }

    let mut out = Vec::with_capacity(slices as usize * slice_size);
    let mut slice = vec![0u8; slice_size];
    for i in 0..slices {
        let at = header.index_position(i) as usize;
        let (start, end) = slice_bounds(&bytes[at..at + width * 2], width);
        if end < start || end as usize > bytes.len() {
            return Err(EbError::Format(format!(
                "EBZip slice {} out of bounds: {:#x}..{:#x}",
                i, start, end
            )));
        }
        decode_slice(&bytes[start as usize..end as usize], &mut slice)?;
        out.extend_from_slice(&slice);
    }
    out.truncate(header.file_size as usize);

    let actual = adler32_slice(&out);
    if actual != header.checksum {
        return Err(EbError::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7) % 251) as u8).collect()
    }

    #[test]
    fn test_empty_input() {
        let packed = compress(&[], 6).unwrap();
        assert_eq!(packed.len(), HEADER_SIZE + 2);
        assert_eq!(decompress(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_header_fields() {
        let data = sample(5000);
        let packed = compress_with(
            &data,
            &EbzipOptions {
                slice_level: 1,
                deflate_level: 9,
            },
        )
        .unwrap();
        let header = EbzipHeader::parse(&packed).unwrap();
        assert_eq!(header.mode, 1);
        assert_eq!(header.level, 1);
        assert_eq!(header.file_size, 5000);
        assert_eq!(header.slice_size(), 4096);
        assert_eq!(header.slice_count(), 2);
        assert_eq!(header.checksum, adler32_slice(&data));
    }

    #[test]
    fn test_level_zero_stores_raw_slices() {
        let data = sample(3000);
        let packed = compress(&data, 0).unwrap();
        // header + 3 two-byte index entries + two raw slices
        assert_eq!(packed.len(), HEADER_SIZE + 6 + 2 * 2048);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    /// Incompressible bytes from a linear congruential generator.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn test_fixed_sample_golden() {
        let data = sample(10240);

        // stored slices: header, 6 two-byte offsets, 5 raw slices
        let stored = compress(&data, 0).unwrap();
        assert_eq!(stored.len(), 10274);
        assert_eq!(
            &stored[..HEADER_SIZE],
            &[
                b'E', b'B', b'Z', b'i', b'p', 0x10, 0, 0, 0, 0, 0, 0, 0x28, 0, 0x6f, 0x21, 0x84, 0x96, 0, 0, 0, 0
            ]
        );
        let offsets: Vec<u16> = stored[HEADER_SIZE..HEADER_SIZE + 12]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(offsets, [34, 2082, 4130, 6178, 8226, 10274]);

        let packed = compress(&data, 9).unwrap();
        assert_eq!(&packed[..HEADER_SIZE], &stored[..HEADER_SIZE]);
        assert_eq!(packed, compress(&data, 9).unwrap());
        assert!(packed.len() < data.len() / 3);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_container_index_width() {
        assert_eq!(container_index_width(0, 0), 2);
        assert_eq!(container_index_width(10240, 0), 2);
        // 32 raw slices overflow a 2-byte offset
        assert_eq!(container_index_width(65000, 0), 3);
        assert_eq!(container_index_width(0xffff, 5), 3);
        assert_eq!(container_index_width(0x10000, 0), 3);
        assert_eq!(container_index_width((1 << 24) - 1000, 0), 4);
        assert_eq!(container_index_width(1 << 40, 0), 5);
    }

    #[test]
    fn test_round_trip_below_two_byte_boundary() {
        let data = noise(65000);
        for level in [0, 9] {
            let packed = compress(&data, level).unwrap();
            let header = EbzipHeader::parse(&packed).unwrap();
            assert_eq!(header.width, 3);
            assert_eq!(header.index_width(), 3);
            assert_eq!(decompress(&packed).unwrap(), data);
        }

        // small enough that the size implied width still holds
        let data = noise(60000);
        let packed = compress(&data, 9).unwrap();
        assert_eq!(EbzipHeader::parse(&packed).unwrap().width, 0);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_round_trip_below_three_byte_boundary() {
        let data = noise((1 << 24) - 1000);
        let packed = compress(&data, 0).unwrap();
        assert_eq!(EbzipHeader::parse(&packed).unwrap().index_width(), 4);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_bad_index_width() {
        let mut b = compress(&[1, 2, 3], 6).unwrap();
        b[6] = 1;
        assert!(matches!(EbzipHeader::parse(&b), Err(EbError::Format(_))));
        b[6] = 6;
        assert!(EbzipHeader::parse(&b).is_err());
        b[6] = 4;
        assert_eq!(EbzipHeader::parse(&b).unwrap().index_width(), 4);
    }

    #[test]
    fn test_slice_inflating_too_far() {
        let raw = deflate_slice(&[0u8; 4096], 9).unwrap();
        let mut out = [0u8; 2048];
        assert!(matches!(decode_slice(&raw, &mut out), Err(EbError::Format(_))));

        let raw = deflate_slice(&[0u8; 1024], 9).unwrap();
        assert!(matches!(
            decode_slice(&raw, &mut out),
            Err(EbError::SizeMismatch { .. })
        ));

        let raw = deflate_slice(&[7u8; 2048], 9).unwrap();
        decode_slice(&raw, &mut out).unwrap();
        assert_eq!(out, [7u8; 2048]);
    }

    #[test]
    fn test_corrupted_checksum() {
        let data = sample(100);
        let mut packed = compress(&data, 6).unwrap();
        packed[14] ^= 0xff;
        assert!(matches!(
            decompress(&packed),
            Err(EbError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_header() {
        assert!(EbzipHeader::parse(b"EBZap\x10\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0").is_err());
        let mut b = compress(&[1, 2, 3], 6).unwrap();
        b[5] = 0x16;
        assert!(EbzipHeader::parse(&b).is_err());
        b[5] = 0x30;
        assert!(EbzipHeader::parse(&b).is_err());
    }

    #[test]
    fn test_truncated_index() {
        let packed = compress(&sample(5000), 6).unwrap();
        assert!(decompress(&packed[..HEADER_SIZE + 3]).is_err());
    }

    #[test]
    fn test_invalid_options() {
        assert!(compress(&[0], 10).is_err());
        let options = EbzipOptions {
            slice_level: 6,
            deflate_level: 1,
        };
        assert!(compress_with(&[0], &options).is_err());
    }

    #[test]
    fn test_index_width() {
        assert_eq!(index_width(0), 2);
        assert_eq!(index_width(0xffff), 2);
        assert_eq!(index_width(0x10000), 3);
        assert_eq!(index_width(0x1000000), 4);
        assert_eq!(index_width(0x100000000), 5);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            data in proptest::collection::vec(any::<u8>(), 0..9000),
            level in 0u32..=9,
            slice_level in 0u8..=2,
        ) {
            let options = EbzipOptions { slice_level, deflate_level: level };
            let packed = compress_with(&data, &options).unwrap();
            prop_assert_eq!(decompress(&packed).unwrap(), data);
        }
    }
}

//! Codec layer for compressed data and character sets.
//!
//! # Submodules
//!
//! - [`ebzip`][]: EBZip slice container (compress, decompress, slice decode)
//! - [`huffman`][]: EPWING Huffman code tree and page decoder
//! - [`jis`][]: JIS X 0208 / GB 2312 text conversion

pub mod ebzip;
pub mod huffman;
pub mod jis;

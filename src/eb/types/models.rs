//! Core data structures shared by every layer of the reader.
//!
//! This module defines:
//! - Page addressing constants and helpers
//! - Disc, character code and file format enumerations
//! - External font size classes

use std::fmt;

use super::error::{EbError, Result};

/// Size of one page of a book file. Every address in the format is expressed as
/// a 1-based page number plus a byte offset inside that page.
pub const PAGE_SIZE: u64 = 2048;

/// Converts a `(page, offset)` pair into an absolute byte position.
///
/// Page 0 is treated as page 1 so that unset references do not underflow.
pub fn position(page: u64, offset: u64) -> u64 {
    page.saturating_sub(1) * PAGE_SIZE + offset
}

/// Returns the 1-based page number containing `pos`.
pub fn page_of(pos: u64) -> u64 {
    pos / PAGE_SIZE + 1
}

/// Returns the offset of `pos` within its page.
pub fn offset_of(pos: u64) -> u64 {
    pos % PAGE_SIZE
}

/// The kind of disc a book directory was mastered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscType {
    /// EB / EBG / EBXA / EBXA-C, described by a `catalog` file.
    Eb,
    /// EPWING, described by a `catalogs` file.
    Epwing,
}

impl fmt::Display for DiscType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscType::Eb => write!(f, "EB"),
            DiscType::Epwing => write!(f, "EPWING"),
        }
    }
}

/// Character set used by the text of a book.
///
/// The mode lives on the book and applies to every subbook at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharCode {
    Iso8859_1,
    Jisx0208,
    Jisx0208Gb2312,
}

impl CharCode {
    /// Whether text is single-byte Latin rather than double-byte JIS.
    pub fn is_latin(self) -> bool {
        self == CharCode::Iso8859_1
    }

    pub fn to_u16(self) -> u16 {
        match self {
            CharCode::Iso8859_1 => 1,
            CharCode::Jisx0208 => 2,
            CharCode::Jisx0208Gb2312 => 3,
        }
    }
}

impl TryFrom<u16> for CharCode {
    type Error = EbError;
    fn try_from(v: u16) -> Result<Self> {
        match v {
            1 => Ok(Self::Iso8859_1),
            2 => Ok(Self::Jisx0208),
            3 => Ok(Self::Jisx0208Gb2312),
            _ => Err(EbError::Format(format!("Unknown character code: {}", v))),
        }
    }
}

/// Storage format of a book data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Plain,
    /// Slice-compressed `.ebz` container.
    Ebzip,
    /// EPWING Huffman-compressed text.
    Epwing,
    /// EPWING V6 Huffman text with 32-bit leaves and raw-page flags.
    Epwing6,
}

impl TryFrom<u8> for FileFormat {
    type Error = EbError;

    /// Parses the format byte stored in an EPWING catalog extension record.
    fn try_from(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(Self::Plain),
            0x11 => Ok(Self::Epwing),
            0x12 => Ok(Self::Epwing6),
            _ => Err(EbError::Format(format!("Unknown file format: {:#04x}", v))),
        }
    }
}

/// Size class of an external (gaiji) font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontType {
    Font16,
    Font24,
    Font30,
    Font48,
}

impl FontType {
    pub const ALL: [FontType; 4] = [
        FontType::Font16,
        FontType::Font24,
        FontType::Font30,
        FontType::Font48,
    ];

    pub fn index(self) -> usize {
        match self {
            FontType::Font16 => 0,
            FontType::Font24 => 1,
            FontType::Font30 => 2,
            FontType::Font48 => 3,
        }
    }

    /// Glyph height in pixels.
    pub fn height(self) -> usize {
        match self {
            FontType::Font16 => 16,
            FontType::Font24 => 24,
            FontType::Font30 => 30,
            FontType::Font48 => 48,
        }
    }

    /// Glyph width in pixels for the given width class.
    pub fn width(self, class: GlyphWidth) -> usize {
        match (class, self) {
            (GlyphWidth::Narrow, FontType::Font16) => 8,
            (GlyphWidth::Narrow, FontType::Font24) => 16,
            (GlyphWidth::Narrow, FontType::Font30) => 16,
            (GlyphWidth::Narrow, FontType::Font48) => 24,
            (GlyphWidth::Wide, FontType::Font16) => 16,
            (GlyphWidth::Wide, FontType::Font24) => 24,
            (GlyphWidth::Wide, FontType::Font30) => 32,
            (GlyphWidth::Wide, FontType::Font48) => 48,
        }
    }

    /// Bitmap size in bytes of one glyph: one bit per pixel, rows padded to bytes.
    pub fn glyph_size(self, class: GlyphWidth) -> usize {
        self.width(class) / 8 * self.height()
    }
}

/// Display width class of an external character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlyphWidth {
    Narrow,
    Wide,
}

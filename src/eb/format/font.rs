//! External character (gaiji) fonts and the code ranges they cover.

use log::debug;

use crate::eb::io::file::BookFile;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{FontType, GlyphWidth};
use crate::eb::utils::u16_at;

/// A contiguous run of external character codes.
///
/// JIS books lay codes out in rows of 0x5e cells from `0x21` to `0x7e`; Latin
/// books use rows of 0xfe cells from `0x01` to `0xfe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    pub start: u16,
    pub end: u16,
    latin: bool,
}

impl CodeRange {
    /// Builds the range of `count` codes beginning at `start`.
    ///
    /// Returns `Ok(None)` when `count` is zero.
    ///
    /// # Errors
    /// Returns `Format` when the range falls outside the code space.
    pub fn new(start: u16, count: u16, latin: bool) -> Result<Option<Self>> {
        if count == 0 {
            return Ok(None);
        }
        let (start32, count32) = (start as u32, count as u32);
        let (end, valid) = if latin {
            let mut end = start32 + ((count32 / 0xfe) << 8) + count32 % 0xfe - 1;
            if end & 0xff > 0xfe {
                end += 0x100 - 0xfe;
            }
            let low = start32 & 0xff;
            (end, (0x01..=0xfe).contains(&low) && (0x0001..=0x1efe).contains(&start32))
        } else {
            let mut end = start32 + ((count32 / 0x5e) << 8) + count32 % 0x5e - 1;
            if end & 0xff > 0x7e {
                end += 0x100 - 0x5e;
            }
            let low = start32 & 0xff;
            (end, (0x21..=0x7e).contains(&low) && start32 >= 0xa121 && end <= 0xfe7e)
        };
        if !valid || end > u16::MAX as u32 {
            return Err(EbError::Format(format!(
                "Invalid character range: start {:#06x}, {} characters",
                start, count
            )));
        }
        Ok(Some(Self {
            start,
            end: end as u16,
            latin,
        }))
    }

    pub fn contains(&self, code: u16) -> bool {
        (self.start..=self.end).contains(&code)
    }

    /// Sequential slot of `code` within the range.
    pub fn index_of(&self, code: u16) -> Option<usize> {
        if !self.contains(code) {
            return None;
        }
        let (row_len, low_range) = if self.latin {
            (0xfe, 0x01..=0xfe)
        } else {
            (0x5e, 0x21..=0x7e)
        };
        let low = (code & 0xff) as usize;
        if !low_range.contains(&low) {
            return None;
        }
        let rows = (code >> 8) as usize - (self.start >> 8) as usize;
        Some(rows * row_len + low - (self.start & 0xff) as usize)
    }
}

/// One external font: a bitmap per character code of one size and width class.
#[derive(Debug, Clone)]
pub struct ExtFont {
    file: BookFile,
    page: u64,
    font_type: FontType,
    width: GlyphWidth,
    range: CodeRange,
}

impl ExtFont {
    /// Reads the font header at `page` of `file`.
    ///
    /// Returns `Ok(None)` when the header declares no characters.
    ///
    /// # Errors
    /// Returns an error if the header cannot be read or declares an invalid range.
    pub fn load(
        file: BookFile,
        page: u64,
        font_type: FontType,
        width: GlyphWidth,
        latin: bool,
    ) -> Result<Option<Self>> {
        let mut b = [0u8; 16];
        let mut reader = file.reader();
        reader.seek_page(page, 0)?;
        reader.read_exact(&mut b)?;
        let Some(range) = CodeRange::new(u16_at(&b, 10), u16_at(&b, 12), latin)? else {
            return Ok(None);
        };
        debug!(
            "{:?} {:?} font at page {}: {:#06x}..={:#06x}",
            width, font_type, page, range.start, range.end
        );
        Ok(Some(Self {
            file,
            page,
            font_type,
            width,
            range,
        }))
    }

    pub fn font_type(&self) -> FontType {
        self.font_type
    }

    pub fn glyph_width(&self) -> GlyphWidth {
        self.width
    }

    /// Width of one glyph in pixels.
    pub fn width(&self) -> usize {
        self.font_type.width(self.width)
    }

    /// Height of one glyph in pixels.
    pub fn height(&self) -> usize {
        self.font_type.height()
    }

    pub fn range(&self) -> CodeRange {
        self.range
    }

    /// Returns the packed 1-bit bitmap of `code`, or an empty vector when the
    /// font does not cover it.
    ///
    /// # Errors
    /// Returns an error if the glyph data cannot be read.
    pub fn glyph(&self, code: u16) -> Result<Vec<u8>> {
        let Some(index) = self.range.index_of(code) else {
            return Ok(Vec::new());
        };
        let size = self.font_type.glyph_size(self.width);
        // glyphs never straddle a 1024-byte block
        let per_block = 1024 / size;
        let offset = index / per_block * 1024 + index % per_block * size;
        let mut glyph = vec![0u8; size];
        let mut reader = self.file.reader();
        reader.seek_page(self.page + 1, offset as u64)?;
        reader.read_exact(&mut glyph)?;
        Ok(glyph)
    }
}

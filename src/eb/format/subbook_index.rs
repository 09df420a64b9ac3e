//! Parsing of the subbook index page and multi search pages.
//!
//! The index page sits at the page named by the catalog (usually 1) of the
//! subbook text file. It lists every index the subbook carries together with
//! the normalization style each one was built with.

use log::{debug, warn};

use crate::eb::codec::jis;
use crate::eb::style::{IndexStyle, StyleFlag};
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{CharCode, DiscType, PAGE_SIZE};
use crate::eb::utils::{u16_at, u24_at, u32_at};

const RECORD_SIZE: usize = 16;
const MULTI_LABEL_SIZE: usize = 30;

/// Script class of a search word, selecting one of the word indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    Kana = 0,
    Kanji = 1,
    Alphabet = 2,
}

impl WordType {
    /// Classifies a JIS X 0208 word by the rows its characters come from.
    /// Symbols in row 1 are neutral; anything outside rows 1 to 5 is kanji.
    pub fn of_jisx0208(b: &[u8]) -> Self {
        let mut alphabet = false;
        let mut kana = false;
        for high in b.iter().step_by(2) {
            match high {
                0x23 => alphabet = true,
                0x24 | 0x25 => kana = true,
                0x21 => {}
                _ => return WordType::Kanji,
            }
        }
        match (alphabet, kana) {
            (true, false) => WordType::Alphabet,
            (false, true) => WordType::Kana,
            _ => WordType::Kanji,
        }
    }
}

/// Indexes declared on a subbook index page.
#[derive(Debug, Clone, Default)]
pub struct SubBookIndex {
    pub text: Option<IndexStyle>,
    pub menu: Option<IndexStyle>,
    pub copyright: Option<IndexStyle>,
    pub image_menu: Option<IndexStyle>,
    pub sound: Option<IndexStyle>,
    pub keyword: Option<IndexStyle>,
    pub cross: Option<IndexStyle>,
    /// Forward word indexes by [`WordType`].
    pub word: [Option<IndexStyle>; 3],
    /// Reversed word indexes by [`WordType`].
    pub endword: [Option<IndexStyle>; 3],
    pub multi: Vec<IndexStyle>,
    /// Page of the EPWING title page, 0 when absent.
    pub title_page: u64,
    /// EB discs store external fonts inside the text file. Start pages of the
    /// wide and narrow font of each size class.
    pub font_pages: [(Option<u64>, Option<u64>); 4],
}

fn decode_style(style: &mut IndexStyle, flags: u32) {
    style.katakana = StyleFlag::from_bits(flags >> 22, true);
    style.lower = StyleFlag::from_bits(flags >> 20, false);
    style.mark = if (flags >> 18) & 0x03 == 0 {
        StyleFlag::Delete
    } else {
        StyleFlag::AsIs
    };
    style.long_vowel = StyleFlag::from_bits(flags >> 16, false);
    style.double_consonant = StyleFlag::from_bits(flags >> 14, false);
    style.contracted_sound = StyleFlag::from_bits(flags >> 12, false);
    style.small_vowel = StyleFlag::from_bits(flags >> 10, false);
    style.voiced_consonant = StyleFlag::from_bits(flags >> 8, false);
    style.p_sound = StyleFlag::from_bits(flags >> 6, false);
}

/// Parses the subbook index page.
///
/// # Errors
/// Returns `Format` if the page declares more records than fit on it.
pub fn parse(b: &[u8], disc_type: DiscType, char_code: CharCode) -> Result<SubBookIndex> {
    let count = b[1] as usize;
    if count >= PAGE_SIZE as usize / RECORD_SIZE - 1 {
        return Err(EbError::Format(format!("Index page declares {} indexes", count)));
    }
    let global_avail = if b[4] > 0x02 { 0 } else { b[4] };

    let mut index = SubBookIndex::default();
    for i in 0..count {
        let off = RECORD_SIZE * (i + 1);
        let id = b[off];
        let start_page = u32_at(b, off + 2) as u64;
        let page_count = u32_at(b, off + 6) as u64;
        let mut style = IndexStyle {
            index_id: id,
            start_page,
            end_page: (start_page + page_count).saturating_sub(1),
            ..IndexStyle::default()
        };
        if char_code.is_latin() || id == 0x72 || id == 0x92 {
            style.space = StyleFlag::AsIs;
        }

        let avail = b[off + 10];
        if (global_avail == 0x00 && avail == 0x02) || global_avail == 0x02 {
            decode_style(&mut style, u24_at(b, off + 11));
        } else if id == 0x70 || id == 0x90 {
            style.set_all(StyleFlag::Convert);
            style.mark = StyleFlag::Delete;
        } else {
            style.set_all(StyleFlag::AsIs);
            style.lower = StyleFlag::Convert;
        }
        debug!(
            "Index {:#04x}: pages {}..={}, {:?}",
            id, style.start_page, style.end_page, style
        );

        match id {
            0x00 => index.text = Some(style),
            0x01 => index.menu = Some(style),
            0x02 => index.copyright = Some(style),
            0x10 => index.image_menu = Some(style),
            0x16 => {
                if disc_type == DiscType::Epwing {
                    index.title_page = style.start_page;
                }
            }
            0x21 | 0x22 => {
                if disc_type == DiscType::Eb {
                    warn!("Ignoring SEBXA compression index {:#04x}", id);
                }
            }
            0x70..=0x72 => index.endword[(id - 0x70) as usize] = Some(style),
            0x80 => index.keyword = Some(style),
            0x81 => index.cross = Some(style),
            0x90..=0x92 => index.word[(id - 0x90) as usize] = Some(style),
            0xd8 => index.sound = Some(style),
            0xf1..=0xf8 => {
                if disc_type == DiscType::Eb {
                    let slot = &mut index.font_pages[((id - 0xf1) / 2) as usize];
                    if (id - 0xf1) % 2 == 0 {
                        slot.0 = Some(style.start_page);
                    } else {
                        slot.1 = Some(style.start_page);
                    }
                }
            }
            0xff => index.multi.push(style),
            _ => warn!("Unknown index id {:#04x}", id),
        }
    }
    Ok(index)
}

/// Parses a multi search page into its entry styles.
///
/// Entries are matched verbatim, so every normalization field is as-is.
///
/// # Errors
/// Returns `Format` if the page has no entries or its records overrun it.
pub fn parse_multi(b: &[u8]) -> Result<Vec<IndexStyle>> {
    let count = u16_at(b, 0) as usize;
    if count == 0 {
        return Err(EbError::format("Multi search page has no entries"));
    }
    let overrun = || EbError::format("Multi search page overruns its page");

    let mut entries = Vec::with_capacity(count);
    let mut off = 16;
    for _ in 0..count {
        let head = b.get(off..off + 2 + MULTI_LABEL_SIZE).ok_or_else(overrun)?;
        let mut style = IndexStyle {
            index_id: 0,
            space: StyleFlag::AsIs,
            label: jis::jisx0208_to_string(&head[2..]),
            ..IndexStyle::default()
        };
        style.set_all(StyleFlag::AsIs);
        let sub_count = head[0] as usize;
        off += 2 + MULTI_LABEL_SIZE;

        for _ in 0..sub_count {
            let rec = b.get(off..off + RECORD_SIZE).ok_or_else(overrun)?;
            let id = rec[0];
            let page = u32_at(rec, 2) as u64;
            match id {
                0x71 | 0x91 | 0xa1 => {
                    if style.start_page == 0 || style.index_id == 0x71 {
                        style.index_id = id;
                        style.start_page = page;
                        style.end_page = (page + u32_at(rec, 6) as u64).saturating_sub(1);
                    }
                }
                0x01 => style.candidate_page = page,
                _ => debug!("Skipping multi entry record {:#04x}", id),
            }
            off += RECORD_SIZE;
        }
        entries.push(style);
    }
    Ok(entries)
}

/// Default title of multi search `index` (0-based).
pub fn multi_title(index: usize, latin: bool) -> String {
    let num = (index + 1).to_string();
    if latin {
        format!("Multi search {}", num)
    } else {
        format!("複合検索{}", jis::narrow_to_wide(&num))
    }
}

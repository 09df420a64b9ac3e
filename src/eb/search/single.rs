//! Lookup of one word in one index.
//!
//! Indexes are B-trees of 2048-byte pages. Upper pages hold fixed-width keys,
//! each the largest key of the page it points to. Leaf pages hold the words
//! with their text and heading positions, optionally grouped so that several
//! spellings share one canonical key.

use log::{debug, trace};

use super::{SearchResult, SearchType};
use crate::eb::codec::jis;
use crate::eb::compare;
use crate::eb::format::subbook_index::WordType;
use crate::eb::io::paged::PagedReader;
use crate::eb::style::{self, IndexStyle};
use crate::eb::subbook::SubBook;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{self, PAGE_SIZE};
use crate::eb::utils::{u16_at, u32_at};

const MAX_INDEX_DEPTH: usize = 6;
const PAGE: usize = PAGE_SIZE as usize;

fn is_leaf(id: u8) -> bool {
    id & 0x80 != 0
}

fn is_layer_end(id: u8) -> bool {
    id & 0x20 != 0
}

fn has_group_entry(id: u8) -> bool {
    id & 0x10 != 0
}

/// Iterates the entries of one index that match one word.
pub(crate) struct SingleWordSearcher<'a> {
    sub: &'a SubBook,
    style: &'a IndexStyle,
    kind: SearchType,
    latin: bool,
    /// The index is the kana index of its family and compares kana loosely.
    kana_index: bool,
    word: Vec<u8>,
    canonical: Vec<u8>,

    reader: PagedReader,
    cache: Box<[u8; PAGE]>,
    cache_page: u64,
    page: u64,
    page_id: u8,
    entry_length: usize,
    variable: bool,
    entry_count: usize,
    entry_index: usize,
    off: usize,

    in_group: bool,
    comparison: i32,
    keyword_heading: u64,
}

impl<'a> SingleWordSearcher<'a> {
    /// Prepares `word` for `style` and descends to the first candidate leaf.
    ///
    /// # Errors
    /// Returns `Format` if an index page is malformed or the tree is deeper
    /// than six levels.
    pub(crate) fn new(sub: &'a SubBook, style: &'a IndexStyle, kind: SearchType, word: &[u8]) -> Result<Self> {
        let latin = sub.char_code().is_latin();
        let kana_style = match kind {
            SearchType::Endword => sub.endword_style(WordType::Kana),
            SearchType::Word | SearchType::Exactword => sub.word_style(WordType::Kana),
            _ => None,
        };
        let kana_index = kana_style.is_some_and(|s| s.start_page == style.start_page);

        let mut searcher = Self {
            sub,
            style,
            kind,
            latin,
            kana_index,
            word: Vec::new(),
            canonical: Vec::new(),
            reader: sub.text_file().reader(),
            cache: Box::new([0u8; PAGE]),
            cache_page: 0,
            page: style.start_page,
            page_id: 0,
            entry_length: 0,
            variable: false,
            entry_count: 0,
            entry_index: 0,
            off: 0,
            in_group: false,
            comparison: -1,
            keyword_heading: 0,
        };
        searcher.set_word(word);
        searcher.search()?;
        Ok(searcher)
    }

    fn set_word(&mut self, word: &[u8]) {
        let mut canonical = word.to_vec();
        if self.latin {
            self.style.fix_word_latin(&mut canonical);
        } else {
            self.style.fix_word(&mut canonical);
        }
        let mut word = if self.style.index_id != 0x70 && self.style.index_id != 0x90 {
            canonical.clone()
        } else {
            word.to_vec()
        };
        if self.kind == SearchType::Endword {
            if self.latin {
                style::reverse_word_latin(&mut word);
                style::reverse_word_latin(&mut canonical);
            } else {
                style::reverse_word(&mut word);
                style::reverse_word(&mut canonical);
            }
        }
        if !self.latin {
            debug!(
                "Search word '{}', canonical '{}'",
                jis::jisx0208_to_string(&word),
                jis::jisx0208_to_string(&canonical)
            );
        }
        self.word = word;
        self.canonical = canonical;
    }

    fn load_page(&mut self, page: u64) -> Result<()> {
        self.reader.seek_page(page, 0)?;
        self.reader.read_exact(&mut self.cache[..])?;
        self.cache_page = page;
        Ok(())
    }

    fn read_page_header(&mut self) {
        self.page_id = self.cache[0];
        self.entry_length = self.cache[1] as usize;
        self.variable = self.entry_length == 0;
        self.entry_count = u16_at(&self.cache[..], 2) as usize;
        self.off = 4;
        debug!(
            "Index page {}: id {:#04x}, {} entries",
            self.page, self.page_id, self.entry_count
        );
    }

    fn malformed(&self) -> EbError {
        EbError::Format(format!(
            "Malformed index page {} (entry {} at offset {})",
            self.page, self.entry_index, self.off
        ))
    }

    fn search(&mut self) -> Result<()> {
        let mut depth = 0;
        loop {
            if depth == MAX_INDEX_DEPTH {
                return Err(EbError::Format(format!(
                    "Index at page {} is deeper than {} levels",
                    self.style.start_page, MAX_INDEX_DEPTH
                )));
            }
            self.load_page(self.page)?;
            self.read_page_header();
            if is_leaf(self.page_id) {
                break;
            }

            let mut next_page = self.page;
            self.entry_index = 0;
            while self.entry_index < self.entry_count {
                if self.off + self.entry_length + 4 > PAGE {
                    return Err(self.malformed());
                }
                let key_end = self.off + self.entry_length;
                let cmp = self.compare_pre(&self.cache[self.off..key_end]);
                self.off = key_end;
                if cmp <= 0 {
                    next_page = u32_at(&self.cache[..], self.off) as u64;
                    break;
                }
                self.off += 4;
                self.entry_index += 1;
            }
            if self.entry_index >= self.entry_count || next_page == self.page {
                self.comparison = -1;
                return Ok(());
            }
            self.page = next_page;
            depth += 1;
        }
        self.entry_index = 0;
        self.comparison = 1;
        self.in_group = false;
        Ok(())
    }

    fn refresh_cache(&mut self) -> Result<()> {
        if self.cache_page != self.page {
            self.load_page(self.page)?;
            if self.entry_index == 0 {
                self.read_page_header();
            }
        }
        Ok(())
    }

    /// Returns the next matching entry, or `None` once the index has moved
    /// past the word.
    pub(crate) fn next_result(&mut self) -> Result<Option<SearchResult<'a>>> {
        if self.comparison < 0 {
            return Ok(None);
        }
        loop {
            self.refresh_cache()?;
            if !is_leaf(self.page_id) {
                return Err(self.malformed());
            }
            let grouped = has_group_entry(self.page_id);
            while self.entry_index < self.entry_count {
                let result = if grouped {
                    self.grouped_entry()?
                } else {
                    self.single_entry()?
                };
                if result.is_some() {
                    return Ok(result);
                }
                if self.comparison < 0 {
                    return Ok(None);
                }
            }
            if is_layer_end(self.page_id) {
                self.comparison = -1;
                return Ok(None);
            }
            self.page += 1;
            self.entry_index = 0;
        }
    }

    /// Text and heading positions stored after a key.
    fn positions_at(&self, off: usize) -> (u64, u64) {
        let b = &self.cache[..];
        let text = models::position(u32_at(b, off) as u64, u16_at(b, off + 4) as u64);
        let heading = models::position(u32_at(b, off + 6) as u64, u16_at(b, off + 10) as u64);
        (text, heading)
    }

    fn single_entry(&mut self) -> Result<Option<SearchResult<'a>>> {
        if self.variable {
            if self.off + 1 > PAGE {
                return Err(self.malformed());
            }
            self.entry_length = self.cache[self.off] as usize;
            self.off += 1;
        }
        if self.off + self.entry_length + 12 > PAGE {
            return Err(self.malformed());
        }
        let key_end = self.off + self.entry_length;
        self.comparison = self.compare_single(&self.word, &self.cache[self.off..key_end]);
        self.off = key_end;

        let mut result = None;
        if self.comparison == 0 {
            let (text, heading) = self.positions_at(self.off);
            result = Some(SearchResult::new(self.sub, heading, text));
        }
        self.entry_index += 1;
        self.off += 12;
        Ok(result)
    }

    fn grouped_entry(&mut self) -> Result<Option<SearchResult<'a>>> {
        if self.off + 2 > PAGE {
            return Err(self.malformed());
        }
        let group_id = self.cache[self.off];
        let mut result = None;
        match group_id {
            0x00 => {
                self.entry_length = self.cache[self.off + 1] as usize;
                if self.off + self.entry_length + 14 > PAGE {
                    return Err(self.malformed());
                }
                let key = self.off + 2..self.off + 2 + self.entry_length;
                self.comparison = self.compare_single(&self.canonical, &self.cache[key]);
                self.off += self.entry_length + 2;
                if self.comparison == 0 {
                    let (text, heading) = self.positions_at(self.off);
                    result = Some(SearchResult::new(self.sub, heading, text));
                }
                self.off += 12;
                self.in_group = false;
            }
            0x80 => {
                self.entry_length = self.cache[self.off + 1] as usize;
                match self.kind {
                    SearchType::Keyword | SearchType::Cross => {
                        if self.off + self.entry_length + 12 > PAGE {
                            return Err(self.malformed());
                        }
                        let key = self.off + 6..self.off + 6 + self.entry_length;
                        self.comparison = self.compare_single(&self.word, &self.cache[key]);
                        self.off += self.entry_length + 6;
                        let b = &self.cache[..];
                        self.keyword_heading =
                            models::position(u32_at(b, self.off) as u64, u16_at(b, self.off + 4) as u64);
                        self.off += 6;
                    }
                    SearchType::Multi => {
                        if self.off + self.entry_length + 6 > PAGE {
                            return Err(self.malformed());
                        }
                        let key = self.off + 6..self.off + 6 + self.entry_length;
                        self.comparison = self.compare_single(&self.word, &self.cache[key]);
                        self.off += self.entry_length + 6;
                    }
                    _ => {
                        if self.off + self.entry_length + 4 > PAGE {
                            return Err(self.malformed());
                        }
                        let key = self.off + 4..self.off + 4 + self.entry_length;
                        self.comparison = self.compare_single(&self.canonical, &self.cache[key]);
                        self.off += self.entry_length + 4;
                    }
                }
                self.in_group = true;
            }
            0xc0 => match self.kind {
                SearchType::Keyword | SearchType::Cross => {
                    if self.off + 7 > PAGE {
                        return Err(self.malformed());
                    }
                    if self.comparison == 0 && self.in_group {
                        let b = &self.cache[..];
                        let text = models::position(u32_at(b, self.off + 1) as u64, u16_at(b, self.off + 5) as u64);
                        result = Some(SearchResult::new(self.sub, self.keyword_heading, text));
                        self.keyword_heading = self.sub.next_heading_position(self.keyword_heading)?;
                    }
                    self.off += 7;
                }
                SearchType::Multi => {
                    if self.off + 13 > PAGE {
                        return Err(self.malformed());
                    }
                    if self.comparison == 0 && self.in_group {
                        let (text, heading) = self.positions_at(self.off + 1);
                        result = Some(SearchResult::new(self.sub, heading, text));
                    }
                    self.off += 13;
                }
                _ => {
                    self.entry_length = self.cache[self.off + 1] as usize;
                    if self.off + self.entry_length + 14 > PAGE {
                        return Err(self.malformed());
                    }
                    let key = self.off + 2..self.off + 2 + self.entry_length;
                    let matched = self.comparison == 0
                        && self.in_group
                        && self.compare_group(&self.word, &self.cache[key]) == 0;
                    self.off += self.entry_length + 2;
                    if matched {
                        let (text, heading) = self.positions_at(self.off);
                        result = Some(SearchResult::new(self.sub, heading, text));
                    }
                    self.off += 12;
                }
            },
            _ => return Err(self.malformed()),
        }
        self.entry_index += 1;
        Ok(result)
    }

    /// Compares against an upper page key while descending.
    fn compare_pre(&self, key: &[u8]) -> i32 {
        let word = &self.canonical;
        let cmp = match self.kind {
            SearchType::Exactword => self.compare_text(word, key, true),
            SearchType::Multi if self.style.candidate_page != 0 => self.compare_text(word, key, true),
            _ => compare::compare_bytes(word, key, true),
        };
        trace!("Presearch comparison {} against {:02x?}", cmp, key);
        cmp
    }

    fn compare_text(&self, word: &[u8], key: &[u8], presearch: bool) -> i32 {
        if self.latin {
            compare::compare_latin(word, key, presearch)
        } else {
            compare::compare_jisx0208(word, key, presearch)
        }
    }

    /// Compares against a leaf entry.
    fn compare_single(&self, word: &[u8], key: &[u8]) -> i32 {
        let cmp = match self.kind {
            SearchType::Endword | SearchType::Word => {
                if !self.latin && self.kana_index {
                    compare::compare_kana_single(word, key, false)
                } else {
                    compare::compare_bytes(word, key, false)
                }
            }
            SearchType::Exactword => {
                if self.latin {
                    compare::compare_latin(word, key, false)
                } else if self.kana_index {
                    compare::compare_kana_single(word, key, true)
                } else {
                    compare::compare_jisx0208(word, key, false)
                }
            }
            SearchType::Keyword | SearchType::Cross => compare::compare_bytes(word, key, false),
            SearchType::Multi => {
                if self.style.candidate_page == 0 {
                    compare::compare_bytes(word, key, false)
                } else {
                    self.compare_text(word, key, false)
                }
            }
        };
        trace!("Entry comparison {} against {:02x?}", cmp, key);
        cmp
    }

    /// Compares against a member of an entry group.
    fn compare_group(&self, word: &[u8], key: &[u8]) -> i32 {
        let exact = match self.kind {
            SearchType::Exactword => true,
            SearchType::Multi => self.style.candidate_page != 0,
            _ => false,
        };
        match (self.latin, exact) {
            (true, true) => compare::compare_latin(word, key, false),
            (true, false) => compare::compare_bytes(word, key, false),
            (false, exact) => compare::compare_kana_group(word, key, exact),
        }
    }
}

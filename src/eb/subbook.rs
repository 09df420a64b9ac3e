//! One dictionary within a book.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::eb::book::BookContext;
use crate::eb::format::appendix::{SubAppendix, UnicodeMap};
use crate::eb::format::catalog::{CatalogEntry, DataFileName};
use crate::eb::format::font::ExtFont;
use crate::eb::format::subbook_index::{self, SubBookIndex, WordType};
use crate::eb::hook::reader::BookReader;
use crate::eb::hook::text::PlainTextHook;
use crate::eb::hook::Hook;
use crate::eb::io::file::{self, BookFile};
use crate::eb::search::{Candidate, CandidateHook, SearchType, Searcher};
use crate::eb::style::{self, IndexStyle};
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{self, CharCode, DiscType, FileFormat, FontType, GlyphWidth};

/// The narrow and wide font of one size class.
#[derive(Debug, Clone, Default)]
struct FontPair {
    narrow: Option<ExtFont>,
    wide: Option<ExtFont>,
}

impl FontPair {
    fn get(&self, width: GlyphWidth) -> Option<&ExtFont> {
        match width {
            GlyphWidth::Narrow => self.narrow.as_ref(),
            GlyphWidth::Wide => self.wide.as_ref(),
        }
    }
}

/// One multi search and its entry fields.
#[derive(Debug, Clone)]
struct MultiSearch {
    title: String,
    entries: Vec<IndexStyle>,
}

/// A subbook: its text file, the indexes declared on its index page and its
/// external fonts.
///
/// The character code is read from the owning book on every call, so
/// [`Book::set_char_code`](crate::Book::set_char_code) affects all subbooks.
pub struct SubBook {
    ctx: Arc<BookContext>,
    title: String,
    name: String,
    dir: PathBuf,
    text: BookFile,
    graphic: Option<BookFile>,
    sound: Option<BookFile>,
    index: SubBookIndex,
    multi: Vec<MultiSearch>,
    fonts: [FontPair; 4],
    font_index: AtomicUsize,
    appendix: Option<Arc<SubAppendix>>,
}

impl fmt::Debug for SubBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubBook")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("text", &self.text)
            .field("multi", &self.multi.len())
            .field("appendix", &self.appendix.is_some())
            .finish()
    }
}

impl fmt::Display for SubBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

fn open_data_file(dir: &Path, name: &DataFileName) -> Option<BookFile> {
    match BookFile::find(dir, &name.name, name.format) {
        Ok(Some(file)) => Some(file),
        Ok(None) => {
            warn!("{} not found in {}", name.name, dir.display());
            None
        }
        Err(e) => {
            warn!("Cannot open {}: {}", name.name, e);
            None
        }
    }
}

impl SubBook {
    /// Opens the subbook described by `entry`.
    ///
    /// # Errors
    /// Returns an error if the subbook directory or text file is missing, or
    /// its index page is malformed.
    pub(crate) fn open(ctx: Arc<BookContext>, entry: &CatalogEntry, appendix: Option<Arc<SubAppendix>>) -> Result<Self> {
        let dir = file::find_dir(&ctx.path, &entry.directory)?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.directory.clone());

        let (text, graphic, sound) = match ctx.disc_type {
            DiscType::Eb => {
                let text = BookFile::open_in(&dir, &entry.text.name, entry.text.format)?;
                (text.clone(), Some(text), None)
            }
            DiscType::Epwing => {
                let data = file::find_dir(&dir, "data")?;
                let text = BookFile::open_in(&data, &entry.text.name, entry.text.format)?;
                let graphic = match &entry.graphic {
                    Some(name) => open_data_file(&data, name),
                    None => Some(text.clone()),
                };
                let sound = match &entry.sound {
                    Some(name) => open_data_file(&data, name),
                    None => Some(text.clone()),
                };
                (text, graphic, sound)
            }
        };

        let char_code = ctx.char_code();
        let mut reader = text.reader();
        let page = reader.read_page(entry.index_page)?;
        let index = subbook_index::parse(&page, ctx.disc_type, char_code)?;

        let mut multi = Vec::with_capacity(index.multi.len());
        for (i, style) in index.multi.iter().enumerate() {
            let page = reader.read_page(style.start_page)?;
            let entries = subbook_index::parse_multi(&page)?;
            debug!("Multi search {} has {} entries", i, entries.len());
            multi.push(MultiSearch {
                title: subbook_index::multi_title(i, char_code.is_latin()),
                entries,
            });
        }

        let fonts = match ctx.disc_type {
            DiscType::Eb => Self::load_eb_fonts(&text, &index, char_code)?,
            DiscType::Epwing => Self::load_epwing_fonts(&dir, entry, char_code)?,
        };
        let font_index = FontType::ALL
            .iter()
            .position(|t| {
                let pair = &fonts[t.index()];
                pair.narrow.is_some() && pair.wide.is_some()
            })
            .or_else(|| {
                FontType::ALL.iter().position(|t| {
                    let pair = &fonts[t.index()];
                    pair.narrow.is_some() || pair.wide.is_some()
                })
            })
            .unwrap_or(0);

        info!(
            "Opened subbook {} '{}' ({:?} file, {} multi searches)",
            name,
            entry.title,
            text.format(),
            multi.len()
        );
        Ok(Self {
            ctx,
            title: entry.title.clone(),
            name,
            dir,
            text,
            graphic,
            sound,
            index,
            multi,
            fonts,
            font_index: AtomicUsize::new(font_index),
            appendix,
        })
    }

    fn load_eb_fonts(text: &BookFile, index: &SubBookIndex, char_code: CharCode) -> Result<[FontPair; 4]> {
        let mut fonts: [FontPair; 4] = Default::default();
        for font_type in FontType::ALL {
            let (wide, narrow) = index.font_pages[font_type.index()];
            let pair = &mut fonts[font_type.index()];
            if let Some(page) = wide {
                pair.wide = ExtFont::load(text.clone(), page, font_type, GlyphWidth::Wide, char_code.is_latin())?;
            }
            if let Some(page) = narrow {
                pair.narrow = ExtFont::load(text.clone(), page, font_type, GlyphWidth::Narrow, char_code.is_latin())?;
            }
        }
        Ok(fonts)
    }

    fn load_epwing_fonts(dir: &Path, entry: &CatalogEntry, char_code: CharCode) -> Result<[FontPair; 4]> {
        let mut fonts: [FontPair; 4] = Default::default();
        let gaiji = match file::find_dir(dir, "gaiji") {
            Ok(gaiji) => gaiji,
            Err(_) => {
                debug!("{} has no gaiji directory", dir.display());
                return Ok(fonts);
            }
        };
        let load = |name: &Option<String>, font_type: FontType, width: GlyphWidth| -> Result<Option<ExtFont>> {
            let Some(name) = name else {
                return Ok(None);
            };
            match BookFile::find(&gaiji, name, FileFormat::Plain)? {
                Some(file) => ExtFont::load(file, 1, font_type, width, char_code.is_latin()),
                None => {
                    warn!("Font file {} not found in {}", name, gaiji.display());
                    Ok(None)
                }
            }
        };
        for font_type in FontType::ALL {
            let i = font_type.index();
            fonts[i].narrow = load(&entry.narrow_fonts[i], font_type, GlyphWidth::Narrow)?;
            fonts[i].wide = load(&entry.wide_fonts[i], font_type, GlyphWidth::Wide)?;
        }
        Ok(fonts)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Name of the subbook directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn disc_type(&self) -> DiscType {
        self.ctx.disc_type
    }

    pub fn char_code(&self) -> CharCode {
        self.ctx.char_code()
    }

    pub fn text_file(&self) -> &BookFile {
        &self.text
    }

    pub fn graphic_file(&self) -> Option<&BookFile> {
        self.graphic.as_ref()
    }

    pub fn sound_file(&self) -> Option<&BookFile> {
        self.sound.as_ref()
    }

    pub fn appendix(&self) -> Option<Arc<SubAppendix>> {
        self.appendix.clone()
    }

    /// A plain text hook resolving external characters through this
    /// subbook's appendix.
    pub fn plain_text_hook(&self) -> PlainTextHook {
        PlainTextHook::new().with_appendix(self.appendix.clone())
    }

    /// Loads the Unicode map for this subbook: the first `*.map` file in
    /// `dir` (the book directory if `None`), else a bundled table.
    pub fn unicode_map(&self, dir: Option<&Path>) -> Result<UnicodeMap> {
        UnicodeMap::open(&self.title, Some(dir.unwrap_or(self.ctx.path.as_path())))
    }

    pub(crate) fn word_style(&self, kind: WordType) -> Option<&IndexStyle> {
        self.index.word[kind as usize].as_ref()
    }

    pub(crate) fn endword_style(&self, kind: WordType) -> Option<&IndexStyle> {
        self.index.endword[kind as usize].as_ref()
    }

    fn reader(&self) -> BookReader<'_> {
        BookReader::new(&self.text, self.ctx.disc_type, self.char_code(), self.appendix.as_deref())
    }

    // --- Text ---

    /// Renders the article at `pos` through `hook`.
    pub fn text<H: Hook + ?Sized>(&self, pos: u64, hook: &mut H) -> Result<H::Output> {
        self.reader().read_text(pos, hook)
    }

    pub fn heading<H: Hook + ?Sized>(&self, pos: u64, hook: &mut H) -> Result<H::Output> {
        self.reader().read_heading(pos, hook)
    }

    /// Position of the heading following the one at `pos`.
    pub fn next_heading_position(&self, pos: u64) -> Result<u64> {
        self.reader().next_heading_position(pos)
    }

    fn read_page_text<H: Hook + ?Sized>(&self, style: Option<&IndexStyle>, hook: &mut H) -> Result<Option<H::Output>> {
        match style.filter(|s| s.start_page != 0) {
            Some(style) => self.text(models::position(style.start_page, 0), hook).map(Some),
            None => Ok(None),
        }
    }

    /// Renders the menu, or returns `None` if the subbook has none.
    pub fn menu<H: Hook + ?Sized>(&self, hook: &mut H) -> Result<Option<H::Output>> {
        self.read_page_text(self.index.menu.as_ref(), hook)
    }

    pub fn image_menu<H: Hook + ?Sized>(&self, hook: &mut H) -> Result<Option<H::Output>> {
        self.read_page_text(self.index.image_menu.as_ref(), hook)
    }

    pub fn copyright<H: Hook + ?Sized>(&self, hook: &mut H) -> Result<Option<H::Output>> {
        self.read_page_text(self.index.copyright.as_ref(), hook)
    }

    // --- Capabilities ---

    fn has_page(style: Option<&IndexStyle>) -> bool {
        style.is_some_and(|s| s.start_page != 0)
    }

    pub fn has_menu(&self) -> bool {
        Self::has_page(self.index.menu.as_ref())
    }

    pub fn has_image_menu(&self) -> bool {
        Self::has_page(self.index.image_menu.as_ref())
    }

    pub fn has_copyright(&self) -> bool {
        Self::has_page(self.index.copyright.as_ref())
    }

    pub fn has_word_search(&self) -> bool {
        self.index.word.iter().flatten().any(|s| s.start_page > 0)
    }

    pub fn has_exactword_search(&self) -> bool {
        self.has_word_search()
    }

    pub fn has_endword_search(&self) -> bool {
        self.index.endword.iter().flatten().any(|s| s.start_page > 0)
    }

    pub fn has_keyword_search(&self) -> bool {
        Self::has_page(self.index.keyword.as_ref())
    }

    pub fn has_cross_search(&self) -> bool {
        Self::has_page(self.index.cross.as_ref())
    }

    pub fn has_multi_search(&self) -> bool {
        !self.multi.is_empty()
    }

    // --- Search ---

    /// Converts a search word to book bytes. `\XXXX` escapes (up to four hex
    /// digits) stand for external character codes; a backslash not followed
    /// by a hex digit is kept.
    pub fn unescape(&self, word: &str) -> Vec<u8> {
        unescape_word(word, self.char_code().is_latin())
    }

    fn pick_style<'s>(&self, styles: &'s [Option<IndexStyle>; 3], word: &[u8]) -> Option<&'s IndexStyle> {
        if self.char_code().is_latin() {
            return styles[WordType::Alphabet as usize].as_ref();
        }
        styles[WordType::of_jisx0208(word) as usize]
            .as_ref()
            .or(styles[WordType::Kanji as usize].as_ref())
    }

    fn search_single<'s>(
        &'s self,
        styles: &'s [Option<IndexStyle>; 3],
        kind: SearchType,
        word: &str,
    ) -> Result<Searcher<'s>> {
        if word.trim().is_empty() {
            return Ok(Searcher::empty());
        }
        let b = self.unescape(word);
        if b.is_empty() {
            return Ok(Searcher::empty());
        }
        match self.pick_style(styles, &b) {
            Some(style) => {
                debug!("{:?} search in index {:#04x} at page {}", kind, style.index_id, style.start_page);
                Searcher::single(self, style, kind, &b)
            }
            None => Ok(Searcher::empty()),
        }
    }

    /// Forward prefix search.
    pub fn search_word(&self, word: &str) -> Result<Searcher<'_>> {
        if !self.has_word_search() {
            return Ok(Searcher::empty());
        }
        self.search_single(&self.index.word, SearchType::Word, word)
    }

    /// Forward search matching whole entries only.
    pub fn search_exactword(&self, word: &str) -> Result<Searcher<'_>> {
        if !self.has_exactword_search() {
            return Ok(Searcher::empty());
        }
        self.search_single(&self.index.word, SearchType::Exactword, word)
    }

    /// Suffix search.
    pub fn search_endword(&self, word: &str) -> Result<Searcher<'_>> {
        if !self.has_endword_search() {
            return Ok(Searcher::empty());
        }
        self.search_single(&self.index.endword, SearchType::Endword, word)
    }

    fn search_words<'s>(
        &'s self,
        style: Option<&'s IndexStyle>,
        kind: SearchType,
        words: &[&str],
    ) -> Result<Searcher<'s>> {
        match style.filter(|s| s.start_page != 0) {
            Some(style) => {
                let words: Vec<Vec<u8>> = words.iter().map(|w| self.unescape(w)).collect();
                Searcher::multi_word(self, style, kind, &words)
            }
            None => Ok(Searcher::empty()),
        }
    }

    /// Articles carrying every one of `words` as a keyword.
    pub fn search_keyword(&self, words: &[&str]) -> Result<Searcher<'_>> {
        self.search_words(self.index.keyword.as_ref(), SearchType::Keyword, words)
    }

    pub fn search_cross(&self, words: &[&str]) -> Result<Searcher<'_>> {
        self.search_words(self.index.cross.as_ref(), SearchType::Cross, words)
    }

    fn multi_search(&self, index: usize) -> Result<&MultiSearch> {
        self.multi
            .get(index)
            .ok_or_else(|| EbError::InvalidArgument(format!("Illegal multi index: {}", index)))
    }

    fn multi_entry(&self, index: usize, entry: usize) -> Result<&IndexStyle> {
        self.multi_search(index)?
            .entries
            .get(entry)
            .ok_or_else(|| EbError::InvalidArgument(format!("Illegal entry index: {}", entry)))
    }

    /// Multi search `index`, with `words[i]` filling entry field `i`. Empty
    /// words leave their field unconstrained.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an unknown multi search or more words
    /// than it has entry fields.
    pub fn search_multi(&self, index: usize, words: &[&str]) -> Result<Searcher<'_>> {
        if !self.has_multi_search() {
            return Ok(Searcher::empty());
        }
        let multi = self.multi_search(index)?;
        if words.len() > multi.entries.len() {
            return Err(EbError::InvalidArgument(format!("Too many words: {}", words.len())));
        }
        let words: Vec<Vec<u8>> = words.iter().map(|w| self.unescape(w)).collect();
        Searcher::multi_entry(self, &multi.entries, &words)
    }

    // --- Multi search metadata ---

    pub fn multi_count(&self) -> usize {
        self.multi.len()
    }

    pub fn multi_title(&self, index: usize) -> Result<&str> {
        Ok(&self.multi_search(index)?.title)
    }

    pub fn multi_entry_count(&self, index: usize) -> Result<usize> {
        Ok(self.multi_search(index)?.entries.len())
    }

    pub fn multi_entry_label(&self, index: usize, entry: usize) -> Result<&str> {
        Ok(&self.multi_entry(index, entry)?.label)
    }

    pub fn has_multi_entry_candidate(&self, index: usize, entry: usize) -> Result<bool> {
        Ok(self.multi_entry(index, entry)?.candidate_page > 0)
    }

    /// Renders the candidate list of a multi search entry through `hook`, or
    /// returns `None` if the entry has none.
    pub fn candidate<H: Hook + ?Sized>(&self, index: usize, entry: usize, hook: &mut H) -> Result<Option<H::Output>> {
        let page = self.multi_entry(index, entry)?.candidate_page;
        if page == 0 {
            return Ok(None);
        }
        self.text(models::position(page, 0), hook).map(Some)
    }

    /// The candidate tree of a multi search entry; empty if it has none.
    pub fn candidates(&self, index: usize, entry: usize) -> Result<Vec<Candidate>> {
        let mut hook = CandidateHook::new(self);
        match self.candidate(index, entry, &mut hook)? {
            Some(list) => list,
            None => Ok(Vec::new()),
        }
    }

    // --- Fonts ---

    /// The selected font size class.
    pub fn font(&self) -> FontType {
        FontType::ALL[self.font_index.load(Ordering::Relaxed) % FontType::ALL.len()]
    }

    pub fn set_font(&self, font_type: FontType) {
        self.font_index.store(font_type.index(), Ordering::Relaxed);
    }

    pub fn has_font(&self, font_type: FontType, width: GlyphWidth) -> bool {
        self.fonts[font_type.index()].get(width).is_some()
    }

    pub fn ext_font(&self, font_type: FontType, width: GlyphWidth) -> Option<&ExtFont> {
        self.fonts[font_type.index()].get(width)
    }

    fn glyph(&self, width: GlyphWidth, code: u16) -> Result<Vec<u8>> {
        match self.ext_font(self.font(), width) {
            Some(font) => font.glyph(code),
            None => Ok(Vec::new()),
        }
    }

    /// Bitmap of narrow external character `code` in the selected font. Empty
    /// when the font is missing or the code is out of its range.
    pub fn narrow_font_glyph(&self, code: u16) -> Result<Vec<u8>> {
        self.glyph(GlyphWidth::Narrow, code)
    }

    pub fn wide_font_glyph(&self, code: u16) -> Result<Vec<u8>> {
        self.glyph(GlyphWidth::Wide, code)
    }
}

fn encode_segment(s: &str, latin: bool, out: &mut Vec<u8>) {
    out.extend(style::encode_word(s, latin));
}

/// Splits `word` at backslashes, turning `\XXXX` hex codes into two raw bytes.
pub(crate) fn unescape_word(word: &str, latin: bool) -> Vec<u8> {
    let key = word.trim();
    let mut out = Vec::with_capacity(key.len() * 2);
    let mut rest = key;
    while let Some(at) = rest.find('\\') {
        encode_segment(&rest[..at], latin, &mut out);
        let tail = &rest[at + 1..];
        let digits = tail
            .char_indices()
            .take(4)
            .take_while(|(_, c)| c.is_ascii_hexdigit())
            .count();
        if digits > 0 {
            let code = u16::from_str_radix(&tail[..digits], 16).unwrap_or(0);
            out.extend_from_slice(&code.to_be_bytes());
            rest = &tail[digits..];
        } else {
            out.push(b'\\');
            rest = tail;
        }
    }
    encode_segment(rest, latin, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_hex_codes() {
        assert_eq!(unescape_word(r"ab\a121c", true), vec![b'a', b'b', 0xa1, 0x21, b'c']);
        assert_eq!(unescape_word(r"\12", true), vec![0x00, 0x12]);
        assert_eq!(unescape_word(r"a\zz", true), vec![b'a', b'\\', b'z', b'z']);
        assert_eq!(unescape_word(r"  \b121  ", true), vec![0xb1, 0x21]);
    }

    #[test]
    fn test_unescape_jis() {
        assert_eq!(unescape_word("東京", false), vec![0x45, 0x6c, 0x35, 0x7e]);
        assert_eq!(
            unescape_word(r"東\a121", false),
            vec![0x45, 0x6c, 0xa1, 0x21]
        );
    }

    #[test]
    fn test_unescape_trailing_backslash() {
        assert_eq!(unescape_word("a\\", true), vec![b'a', b'\\']);
    }
}

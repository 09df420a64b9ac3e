//! Appendix data: alternate strings for external characters and stop codes.
//!
//! An appendix is a separate directory shaped like a book. Its catalog lists
//! one subappendix per subbook; each subappendix file maps external character
//! codes to a short replacement string and may override the stop code that
//! ends an article.
//!
//! [`UnicodeMap`] covers the other common source of replacements: a
//! tab-separated `.map` file distributed with a book.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use encoding_rs::{EUC_JP, SHIFT_JIS};
use log::{debug, info, warn};
use regex::Regex;

use super::catalog;
use super::font::CodeRange;
use crate::eb::io::file::{self, BookFile};
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{CharCode, DiscType, FileFormat, GlyphWidth};
use crate::eb::utils::{u16_at, u32_at};

const ALT_TEXT_SIZE: usize = 31;
const ALT_SLOT_SIZE: usize = ALT_TEXT_SIZE + 1;

fn width_index(width: GlyphWidth) -> usize {
    match width {
        GlyphWidth::Narrow => 0,
        GlyphWidth::Wide => 1,
    }
}

/// An opened appendix directory.
#[derive(Debug)]
pub struct Appendix {
    path: PathBuf,
    disc_type: DiscType,
    subs: Vec<Arc<SubAppendix>>,
}

impl Appendix {
    /// Opens an appendix directory and every subappendix its catalog lists.
    ///
    /// # Errors
    /// Returns an error if the catalog is missing or malformed, or a
    /// subappendix file is invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let catalog = catalog::load(&path, CharCode::Jisx0208)?;
        let subs = catalog
            .entries
            .iter()
            .map(|entry| SubAppendix::open(&path, catalog.disc_type, &entry.directory).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        info!("Opened appendix {} with {} subappendices", path.display(), subs.len());
        Ok(Self {
            path,
            disc_type: catalog.disc_type,
            subs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disc_type(&self) -> DiscType {
        self.disc_type
    }

    pub fn sub_appendix_count(&self) -> usize {
        self.subs.len()
    }

    pub fn sub_appendix(&self, index: usize) -> Option<Arc<SubAppendix>> {
        self.subs.get(index).cloned()
    }

    pub fn sub_appendices(&self) -> &[Arc<SubAppendix>] {
        &self.subs
    }
}

#[derive(Debug, Clone, Copy)]
struct AltTable {
    page: u64,
    range: CodeRange,
}

/// Appendix data for one subbook.
#[derive(Debug)]
pub struct SubAppendix {
    file: BookFile,
    char_code: CharCode,
    tables: [Option<AltTable>; 2],
    stop_code: Option<(u16, u16)>,
    cache: Mutex<HashMap<(usize, u16), String>>,
}

impl SubAppendix {
    /// Opens the subappendix stored in `directory` under the appendix root.
    ///
    /// # Errors
    /// Returns an error if the file is missing or its header is malformed.
    pub fn open(root: &Path, disc_type: DiscType, directory: &str) -> Result<Self> {
        let dir = file::find_dir(root, directory)?;
        let file = match disc_type {
            DiscType::Eb => BookFile::open_in(&dir, "appendix", FileFormat::Plain)?,
            DiscType::Epwing => {
                BookFile::open_in(&file::find_dir(&dir, "data")?, "furoku", FileFormat::Plain)?
            }
        };
        Self::load(file)
    }

    /// Parses the header of an appendix data file.
    ///
    /// # Errors
    /// Returns `Format` if the file does not start with the appendix signature
    /// or declares an invalid character range.
    pub fn load(file: BookFile) -> Result<Self> {
        let mut reader = file.reader();
        let mut header = [0u8; 64];
        reader.read_exact(&mut header)?;
        if header[0] != 0x00 || header[1] != 0x03 {
            return Err(EbError::Format(format!(
                "{} is not an appendix file",
                file.path().display()
            )));
        }
        let char_code = CharCode::try_from(u16_at(&header, 2)).unwrap_or_else(|_| {
            warn!("Unknown appendix character code, assuming JIS X 0208");
            CharCode::Jisx0208
        });

        let mut tables = [None, None];
        for (i, table) in tables.iter_mut().enumerate() {
            let b = &header[16 * (i + 1)..16 * (i + 2)];
            *table = CodeRange::new(u16_at(b, 10), u16_at(b, 12), char_code.is_latin())?.map(|range| AltTable {
                page: u32_at(b, 0) as u64,
                range,
            });
        }

        let mut stop_code = None;
        let stop_page = u32_at(&header, 48) as u64;
        if stop_page > 0 {
            let mut b = [0u8; 16];
            reader.seek_page(stop_page, 0)?;
            reader.read_exact(&mut b)?;
            if u16_at(&b, 0) != 0 {
                stop_code = Some((u16_at(&b, 2), u16_at(&b, 4)));
            }
        }
        debug!(
            "Appendix {}: narrow {:?}, wide {:?}, stop code {:?}",
            file.path().display(),
            tables[0].map(|t| t.range),
            tables[1].map(|t| t.range),
            stop_code
        );
        Ok(Self {
            file,
            char_code,
            tables,
            stop_code,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn char_code(&self) -> CharCode {
        self.char_code
    }

    pub fn has_narrow_alt(&self) -> bool {
        self.tables[0].is_some()
    }

    pub fn has_wide_alt(&self) -> bool {
        self.tables[1].is_some()
    }

    /// The stop code pair that ends an article, if the appendix overrides it.
    pub fn stop_code(&self) -> Option<(u16, u16)> {
        self.stop_code
    }

    pub fn is_stop_code(&self, code0: u16, code1: u16) -> bool {
        self.stop_code == Some((code0, code1))
    }

    pub fn narrow_alt(&self, code: u16) -> Result<String> {
        self.font_alt(GlyphWidth::Narrow, code)
    }

    pub fn wide_alt(&self, code: u16) -> Result<String> {
        self.font_alt(GlyphWidth::Wide, code)
    }

    /// Returns the replacement string of external character `code`.
    ///
    /// # Errors
    /// Returns `Lookup` when the appendix has no table for `width` or the code
    /// lies outside it, and propagates read errors.
    pub fn font_alt(&self, width: GlyphWidth, code: u16) -> Result<String> {
        let kind = width_index(width);
        let table = self.tables[kind]
            .ok_or_else(|| EbError::Lookup(format!("No {:?} alternate strings", width)))?;
        let index = table.range.index_of(code).ok_or_else(|| {
            EbError::Lookup(format!(
                "Code {:#06x} outside {:#06x}..={:#06x}",
                code, table.range.start, table.range.end
            ))
        })?;

        if let Some(alt) = self.cache.lock().map_err(|_| EbError::LockPoisoned)?.get(&(kind, code)) {
            return Ok(alt.clone());
        }

        let mut b = [0u8; ALT_TEXT_SIZE];
        let mut reader = self.file.reader();
        reader.seek_page(table.page, (index * ALT_SLOT_SIZE) as u64)?;
        reader.read_exact(&mut b)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        let (text, _, _) = EUC_JP.decode(&b[..end]);
        let alt = unescape_unicode(text.trim());

        self.cache
            .lock()
            .map_err(|_| EbError::LockPoisoned)?
            .insert((kind, code), alt.clone());
        Ok(alt)
    }
}

/// Expands `\uXXXX` and `\UXXXXXXXX` escapes. Malformed escapes are kept.
fn unescape_unicode(s: &str) -> String {
    let Ok(re) = Regex::new(r"\\u([0-9A-Fa-f]{4})|\\U([0-9A-Fa-f]{8})") else {
        return s.to_string();
    };
    re.replace_all(s, |caps: &regex::Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Replacement tables bundled for books known to ship without a map file,
/// keyed by subbook title.
const BUILTIN_MAPS: &[(&str, &[(u16, &str)])] = &[(
    "６ビ技実用英語　英和・和英６０２",
    &[(0xa221, "\u{00b0}"), (0xa222, "\\")],
)];

/// External character to Unicode replacements read from a `.map` file.
#[derive(Debug, Clone, Default)]
pub struct UnicodeMap {
    narrow: HashMap<u16, String>,
    wide: HashMap<u16, String>,
}

impl UnicodeMap {
    /// Loads the first `*.map` file in `dir`, falling back to a bundled table
    /// for `title`.
    ///
    /// # Errors
    /// Returns `Lookup` when neither source is available.
    pub fn open(title: &str, dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = dir {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                let is_map = path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("map"));
                if path.is_file() && is_map {
                    return Self::load(&path);
                }
            }
        }
        Self::builtin(title).ok_or_else(|| EbError::Lookup(format!("No unicode map for {}", title)))
    }

    /// The bundled table for a book title, if any.
    pub fn builtin(title: &str) -> Option<Self> {
        let (_, entries) = BUILTIN_MAPS.iter().find(|(sig, _)| *sig == title)?;
        let narrow = entries.iter().map(|&(code, s)| (code, s.to_string())).collect();
        Some(Self {
            narrow,
            wide: HashMap::new(),
        })
    }

    /// Reads a Shift_JIS encoded map file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let (text, _, had_errors) = SHIFT_JIS.decode(&bytes);
        if had_errors {
            warn!("{} contains bytes outside Shift_JIS", path.display());
        }
        let map = Self::parse(&text)?;
        info!(
            "Loaded unicode map {}: {} narrow, {} wide",
            path.display(),
            map.narrow.len(),
            map.wide.len()
        );
        Ok(map)
    }

    /// Parses map rows of the form `h|z XXXX <TAB> value [<TAB> text]`.
    ///
    /// A value is `uXXXX`, `UXXXXXXXX`, a comma-joined list of those and
    /// literals, or `-` to use the text column verbatim.
    pub fn parse(text: &str) -> Result<Self> {
        let row = Regex::new(r"^([hz])([0-9A-Fa-f]{4})[^\t]*\t([^\t]+)(?:\t([^\t]*))?")
            .map_err(|e| EbError::Format(e.to_string()))?;
        let item = Regex::new(r"^(?:u([0-9A-Fa-f]{4})|U([0-9A-Fa-f]{8}))$")
            .map_err(|e| EbError::Format(e.to_string()))?;

        let mut map = Self::default();
        for line in text.lines().filter(|l| !l.starts_with('#')) {
            let Some(caps) = row.captures(line) else {
                continue;
            };
            let Ok(code) = u16::from_str_radix(&caps[2], 16) else {
                continue;
            };
            let value = &caps[3];
            let replacement = if value.starts_with('u') || value.starts_with('U') {
                let mut s = String::new();
                for part in value.split(',') {
                    match item.captures(part) {
                        Some(c) => {
                            let hex = c.get(1).or_else(|| c.get(2)).map_or("", |m| m.as_str());
                            match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                                Some(ch) => s.push(ch),
                                None => warn!("Invalid code point {} in map row {}", part, line),
                            }
                        }
                        None => s.push_str(part),
                    }
                }
                s
            } else if value == "-" {
                match caps.get(4) {
                    Some(alt) => alt.as_str().to_string(),
                    None => continue,
                }
            } else {
                continue;
            };

            if &caps[1] == "z" {
                map.wide.insert(code, replacement);
            } else {
                map.narrow.insert(code, replacement);
            }
        }
        Ok(map)
    }

    pub fn narrow(&self, code: u16) -> Option<&str> {
        self.narrow.get(&code).map(String::as_str)
    }

    pub fn wide(&self, code: u16) -> Option<&str> {
        self.wide.get(&code).map(String::as_str)
    }

    /// Looks `code` up in the narrow table, then the wide table.
    pub fn get(&self, code: u16) -> Option<&str> {
        self.narrow(code).or_else(|| self.wide(code))
    }

    /// Looks `code` up in the table of the given width.
    pub fn get_width(&self, width: GlyphWidth, code: u16) -> Option<&str> {
        match width {
            GlyphWidth::Narrow => self.narrow(code),
            GlyphWidth::Wide => self.wide(code),
        }
    }
}

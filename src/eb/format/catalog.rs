//! Parsing of the book catalog and language files.
//!
//! The catalog lists the subbooks of a disc. EB discs carry a `catalog` with
//! 40-byte records, EPWING discs a `catalogs` with 164-byte records and an
//! optional second table of extension records naming alternate data files.

use std::path::Path;

use log::{debug, info, warn};

use crate::eb::codec::jis;
use crate::eb::io::file::BookFile;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{CharCode, DiscType, FileFormat};
use crate::eb::utils::{ascii_field, latin1_field, u16_at};

const HEADER_SIZE: usize = 16;
const DIRNAME_SIZE: usize = 8;
const EB_ENTRY_SIZE: usize = 40;
const EB_TITLE_SIZE: usize = 30;
const EPWING_ENTRY_SIZE: usize = 164;
const EPWING_TITLE_SIZE: usize = 80;

/// Titles of some JIS X 0208 books whose `language` file wrongly says
/// ISO 8859-1, as they read when decoded as Latin text.
const MISLABELLED_TITLES: [&str; 6] = [
    "%;%s%A%e%j!\\%S%8%M%9!\\%/%i%&%s",
    "8&5f<R!!?71QOBCf<-E5",
    "#E#B2J3X5;=QMQ8lBg<-E5",
    "#E#N#G!?#J#A#N!J!\\#F#R#E!K",
    "#E#N#G!?#J#A#N!J!\\#S#P#A!K",
    "%W%m%7!<%I1QOB!&OB1Q<-E5",
];

/// A data file named by a catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileName {
    pub name: String,
    pub format: FileFormat,
}

/// One subbook record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    /// Name of the subbook directory.
    pub directory: String,
    /// Page of the subbook index in the text file.
    pub index_page: u64,
    pub text: DataFileName,
    pub graphic: Option<DataFileName>,
    pub sound: Option<DataFileName>,
    /// Wide font file names by font size class (EPWING only).
    pub wide_fonts: [Option<String>; 4],
    /// Narrow font file names by font size class (EPWING only).
    pub narrow_fonts: [Option<String>; 4],
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub disc_type: DiscType,
    /// Catalog version. EB catalogs have none and report 0.
    pub version: u16,
    /// Character code after any correction for mislabelled titles.
    pub char_code: CharCode,
    pub entries: Vec<CatalogEntry>,
}

/// Reads the character code from the optional `language` file.
///
/// A missing or short file means JIS X 0208.
pub fn read_language(dir: &Path) -> Result<CharCode> {
    let Some(file) = BookFile::find(dir, "language", FileFormat::Plain)? else {
        return Ok(CharCode::Jisx0208);
    };
    let mut b = [0u8; HEADER_SIZE];
    let n = file.reader().read(&mut b)?;
    if n < b.len() {
        return Ok(CharCode::Jisx0208);
    }
    match CharCode::try_from(u16_at(&b, 0)) {
        Ok(code) => {
            debug!("language file declares {:?}", code);
            Ok(code)
        }
        Err(e) => {
            warn!("Ignoring language file: {}", e);
            Ok(CharCode::Jisx0208)
        }
    }
}

/// Locates and parses the catalog of the book in `dir`.
///
/// # Errors
/// Returns an `Io` error if neither `catalog` nor `catalogs` exists, and
/// `Format` if the catalog is malformed.
pub fn load(dir: &Path, char_code: CharCode) -> Result<Catalog> {
    let (file, disc_type) = match BookFile::find(dir, "catalog", FileFormat::Plain)? {
        Some(file) => (file, DiscType::Eb),
        None => (
            BookFile::open_in(dir, "catalogs", FileFormat::Plain)?,
            DiscType::Epwing,
        ),
    };
    let mut data = vec![0u8; file.size() as usize];
    file.reader().read_exact(&mut data)?;
    let catalog = parse(&data, disc_type, char_code)?;
    info!(
        "{} catalog {} lists {} subbooks",
        disc_type,
        file.path().display(),
        catalog.entries.len()
    );
    Ok(catalog)
}

fn record<'a>(data: &'a [u8], off: usize, size: usize) -> Result<&'a [u8]> {
    data.get(off..off + size).ok_or_else(|| {
        EbError::Format(format!(
            "Catalog truncated: record at {:#x} needs {} bytes, file has {}",
            off,
            size,
            data.len()
        ))
    })
}

/// Parses catalog bytes.
pub fn parse(data: &[u8], disc_type: DiscType, char_code: CharCode) -> Result<Catalog> {
    let header = record(data, 0, HEADER_SIZE)?;
    let count = u16_at(header, 0) as usize;
    if count == 0 {
        return Err(EbError::format("Catalog lists no subbooks"));
    }
    let mut catalog = Catalog {
        disc_type,
        version: 0,
        char_code,
        entries: Vec::with_capacity(count),
    };

    match disc_type {
        DiscType::Eb => {
            for i in 0..count {
                let b = record(data, HEADER_SIZE + i * EB_ENTRY_SIZE, EB_ENTRY_SIZE)?;
                let title = decode_title(&b[2..2 + EB_TITLE_SIZE], &mut catalog.char_code);
                let off = 2 + EB_TITLE_SIZE;
                catalog.entries.push(CatalogEntry {
                    title,
                    directory: ascii_field(&b[off..off + DIRNAME_SIZE]),
                    index_page: 1,
                    text: DataFileName {
                        name: "start".to_string(),
                        format: FileFormat::Plain,
                    },
                    graphic: None,
                    sound: None,
                    wide_fonts: Default::default(),
                    narrow_fonts: Default::default(),
                });
            }
        }
        DiscType::Epwing => {
            catalog.version = u16_at(header, 2);
            for i in 0..count {
                let b = record(data, HEADER_SIZE + i * EPWING_ENTRY_SIZE, EPWING_ENTRY_SIZE)?;
                let mut entry = parse_epwing_entry(b, &mut catalog.char_code);
                if catalog.version != 1 {
                    let ext = record(
                        data,
                        HEADER_SIZE + (count + i) * EPWING_ENTRY_SIZE,
                        EPWING_ENTRY_SIZE,
                    )?;
                    apply_extension(&mut entry, ext)?;
                }
                debug!(
                    "Subbook {}: '{}' in {}/, index page {}",
                    i, entry.title, entry.directory, entry.index_page
                );
                catalog.entries.push(entry);
            }
        }
    }
    Ok(catalog)
}

/// Decodes a title, switching `char_code` to JIS X 0208 when a Latin title is
/// recognized as mislabelled.
fn decode_title(b: &[u8], char_code: &mut CharCode) -> String {
    if !char_code.is_latin() {
        return jis::jisx0208_to_string(b);
    }
    let title = latin1_field(b);
    if MISLABELLED_TITLES.contains(&title.as_str()) {
        warn!("Title '{}' is JIS X 0208 mislabelled as ISO 8859-1", title);
        *char_code = CharCode::Jisx0208;
        let raw: Vec<u8> = title.chars().map(|c| c as u32 as u8).collect();
        return jis::jisx0208_to_string(&raw);
    }
    title
}

fn font_name(b: &[u8]) -> Option<String> {
    if b[0] != 0 && b[0] < 0x80 {
        Some(ascii_field(b))
    } else {
        None
    }
}

fn parse_epwing_entry(b: &[u8], char_code: &mut CharCode) -> CatalogEntry {
    let title = decode_title(&b[2..2 + EPWING_TITLE_SIZE], char_code);
    let mut off = 2 + EPWING_TITLE_SIZE;
    let directory = ascii_field(&b[off..off + DIRNAME_SIZE]);
    off += DIRNAME_SIZE;
    let index_page = u16_at(b, off + 4) as u64;
    off += 10;

    let mut wide_fonts: [Option<String>; 4] = Default::default();
    let mut narrow_fonts: [Option<String>; 4] = Default::default();
    for j in 0..4 {
        wide_fonts[j] = font_name(&b[off..off + DIRNAME_SIZE]);
        narrow_fonts[j] = font_name(&b[off + 32..off + 32 + DIRNAME_SIZE]);
        off += DIRNAME_SIZE;
    }

    CatalogEntry {
        title,
        directory,
        index_page,
        text: DataFileName {
            name: "honmon".to_string(),
            format: FileFormat::Plain,
        },
        graphic: None,
        sound: None,
        wide_fonts,
        narrow_fonts,
    }
}

/// Applies an EPWING extension record: alternate text file name and the
/// graphic and sound files selected by the data type field.
fn apply_extension(entry: &mut CatalogEntry, b: &[u8]) -> Result<()> {
    if b[4] == 0 {
        return Ok(());
    }
    entry.text = DataFileName {
        name: ascii_field(&b[4..4 + DIRNAME_SIZE]),
        format: FileFormat::try_from(b[55])?,
    };

    let data_type = u16_at(b, 41);
    let low = data_type & 0x03;
    let high = (data_type >> 8) & 0x03;
    let file_at = |name_off: usize, format_off: usize| -> Result<DataFileName> {
        Ok(DataFileName {
            name: ascii_field(&b[name_off..name_off + DIRNAME_SIZE]),
            format: FileFormat::try_from(b[format_off])?,
        })
    };

    if low == 0x02 {
        entry.graphic = Some(file_at(44, 54)?);
    } else if high == 0x02 {
        entry.graphic = Some(file_at(56, 53)?);
    }
    if low == 0x01 {
        entry.sound = Some(file_at(44, 54)?);
    } else if high == 0x01 {
        entry.sound = Some(file_at(56, 53)?);
    }
    Ok(())
}

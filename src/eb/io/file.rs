//! Locating and opening book files.
//!
//! Book media were mastered on case-insensitive file systems and are often
//! copied with their names upper-cased, lower-cased or compressed with EBZip,
//! so every lookup ignores case and accepts `NAME`, `NAME.org` or `NAME.ebz`.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use super::paged::{
    shared, BlockDecoder, EbzipDecoder, HuffmanDecoder, PagedReader, PlainDecoder, SharedHandle,
};
use crate::eb::codec::huffman::EpwingHuffman;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::FileFormat;

fn not_found(dir: &Path, name: &str) -> EbError {
    EbError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} not found in {}", name, dir.display()),
    ))
}

/// Finds a subdirectory of `dir` whose name matches `name` ignoring case.
///
/// # Errors
/// Returns an `Io` error of kind `NotFound` when there is no such directory.
pub fn find_dir(dir: &Path, name: &str) -> Result<PathBuf> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Ok(entry.path());
        }
    }
    Err(not_found(dir, name))
}

/// Finds a regular file `name` in `dir`, returning its path and the format
/// implied by its suffix (`default` for an exact match).
pub fn find_file(dir: &Path, name: &str, default: FileFormat) -> Result<Option<(PathBuf, FileFormat)>> {
    let org = format!("{}.org", name);
    let ebz = format!("{}.ebz", name);
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.eq_ignore_ascii_case(name) {
            return Ok(Some((entry.path(), default)));
        } else if file_name.eq_ignore_ascii_case(&org) {
            return Ok(Some((entry.path(), FileFormat::Plain)));
        } else if file_name.eq_ignore_ascii_case(&ebz) {
            return Ok(Some((entry.path(), FileFormat::Ebzip)));
        }
    }
    Ok(None)
}

/// An opened book data file.
///
/// Cloning is cheap; clones share the file handle and the parsed format
/// information.
#[derive(Clone)]
pub struct BookFile {
    path: PathBuf,
    format: FileFormat,
    handle: SharedHandle,
    decoder: Arc<dyn BlockDecoder>,
}

impl fmt::Debug for BookFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookFile")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("size", &self.decoder.size())
            .finish()
    }
}

impl BookFile {
    /// Opens `name` inside `dir`, if present.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or its
    /// compression header is invalid.
    pub fn find(dir: &Path, name: &str, default: FileFormat) -> Result<Option<Self>> {
        match find_file(dir, name, default)? {
            Some((path, format)) => Ok(Some(Self::open(path, format)?)),
            None => Ok(None),
        }
    }

    /// Opens `name` inside `dir`.
    ///
    /// # Errors
    /// Returns an `Io` error of kind `NotFound` when the file is missing.
    pub fn open_in(dir: &Path, name: &str, default: FileFormat) -> Result<Self> {
        Self::find(dir, name, default)?.ok_or_else(|| not_found(dir, name))
    }

    /// Opens a file at a known path with a known format.
    pub fn open(path: impl AsRef<Path>, format: FileFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let decoder: Arc<dyn BlockDecoder> = match format {
            FileFormat::Plain => Arc::new(PlainDecoder::new(&mut file)?),
            FileFormat::Ebzip => Arc::new(EbzipDecoder::new(&mut file)?),
            FileFormat::Epwing | FileFormat::Epwing6 => {
                Arc::new(HuffmanDecoder::new(EpwingHuffman::parse(&mut file, format)?))
            }
        };
        debug!(
            "Opened {} as {:?}, {} bytes",
            path.display(),
            format,
            decoder.size()
        );
        Ok(Self {
            path,
            format,
            handle: shared(file),
            decoder,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Logical size of the file contents.
    pub fn size(&self) -> u64 {
        self.decoder.size()
    }

    /// Returns a fresh reader positioned at the start of the file.
    pub fn reader(&self) -> PagedReader {
        PagedReader::new(self.handle.clone(), self.decoder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eb::codec::ebzip;

    #[test]
    fn test_case_insensitive_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("HONMON"), [1u8, 2, 3]).unwrap();
        fs::create_dir(dir.path().join("Data")).unwrap();

        let (path, format) = find_file(dir.path(), "honmon", FileFormat::Epwing).unwrap().unwrap();
        assert_eq!(path, dir.path().join("HONMON"));
        assert_eq!(format, FileFormat::Epwing);
        assert_eq!(find_dir(dir.path(), "DATA").unwrap(), dir.path().join("Data"));
        assert!(find_file(dir.path(), "start", FileFormat::Plain).unwrap().is_none());
        assert!(find_dir(dir.path(), "gaiji").is_err());
    }

    #[test]
    fn test_suffix_formats() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"catalog contents".repeat(10);
        fs::write(dir.path().join("catalogs.ebz"), ebzip::compress(&data, 6).unwrap()).unwrap();
        fs::write(dir.path().join("language.org"), [0u8, 1]).unwrap();

        let file = BookFile::open_in(dir.path(), "CATALOGS", FileFormat::Plain).unwrap();
        assert_eq!(file.format(), FileFormat::Ebzip);
        assert_eq!(file.size(), data.len() as u64);
        let mut b = vec![0u8; data.len()];
        file.reader().read_exact(&mut b).unwrap();
        assert_eq!(b, data);

        let lang = BookFile::open_in(dir.path(), "language", FileFormat::Plain).unwrap();
        assert_eq!(lang.format(), FileFormat::Plain);
        assert_eq!(lang.size(), 2);
    }
}

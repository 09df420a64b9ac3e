use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use log::{info, warn};

use super::format::appendix::Appendix;
use super::format::catalog;
use super::subbook::SubBook;
use super::types::error::{EbError, Result};
use super::types::models::{CharCode, DiscType};

/// State shared by a book and all of its subbooks.
#[derive(Debug)]
pub(crate) struct BookContext {
    pub(crate) path: PathBuf,
    pub(crate) disc_type: DiscType,
    pub(crate) version: u16,
    char_code: AtomicU16,
}

impl BookContext {
    pub(crate) fn char_code(&self) -> CharCode {
        CharCode::try_from(self.char_code.load(Ordering::Relaxed)).unwrap_or(CharCode::Jisx0208)
    }
}

/// An EB or EPWING book: a directory holding a catalog and one or more
/// subbooks.
#[derive(Debug)]
pub struct Book {
    ctx: Arc<BookContext>,
    subbooks: Vec<SubBook>,
}

impl Book {
    /// Open the book in directory `path`.
    ///
    /// The character code comes from the `language` file when present; the
    /// disc type from whether the catalog is named `catalog` (EB) or
    /// `catalogs` (EPWING).
    ///
    /// # Errors
    /// Returns an error if:
    /// - `path` is not a directory or has no catalog
    /// - The catalog or a subbook index page is malformed
    /// - A subbook text file is missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), None)
    }

    /// Open the book in `path` together with the appendix in `appendix`.
    /// Subappendix `i` is attached to subbook `i`.
    pub fn open_with_appendix(path: impl AsRef<Path>, appendix: impl AsRef<Path>) -> Result<Self> {
        let appendix = Appendix::open(appendix)?;
        Self::open_inner(path.as_ref(), Some(appendix))
    }

    fn open_inner(path: &Path, appendix: Option<Appendix>) -> Result<Self> {
        info!("Opening book: {}", path.display());
        if !path.is_dir() {
            return Err(EbError::InvalidArgument(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let char_code = catalog::read_language(path)?;
        let catalog = catalog::load(path, char_code)?;
        if catalog.char_code != char_code {
            info!("Character code corrected to {:?} by subbook title", catalog.char_code);
        }

        let ctx = Arc::new(BookContext {
            path: path.to_path_buf(),
            disc_type: catalog.disc_type,
            version: catalog.version,
            char_code: AtomicU16::new(catalog.char_code.to_u16()),
        });

        if let Some(appendix) = &appendix {
            if appendix.sub_appendix_count() < catalog.entries.len() {
                warn!(
                    "Appendix {} covers {} of {} subbooks",
                    appendix.path().display(),
                    appendix.sub_appendix_count(),
                    catalog.entries.len()
                );
            }
        }

        let subbooks = catalog
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let sub_appendix = appendix.as_ref().and_then(|a| a.sub_appendix(i));
                SubBook::open(Arc::clone(&ctx), entry, sub_appendix)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Opened {} book {} (version {}, {:?}) with {} subbooks",
            ctx.disc_type,
            path.display(),
            ctx.version,
            ctx.char_code(),
            subbooks.len()
        );
        Ok(Self { ctx, subbooks })
    }

    pub fn path(&self) -> &Path {
        &self.ctx.path
    }

    pub fn disc_type(&self) -> DiscType {
        self.ctx.disc_type
    }

    /// Catalog version; 0 for EB books.
    pub fn version(&self) -> u16 {
        self.ctx.version
    }

    pub fn char_code(&self) -> CharCode {
        self.ctx.char_code()
    }

    /// Switches how text of every subbook is decoded. Takes effect for
    /// searches and readers created afterwards.
    pub fn set_char_code(&self, char_code: CharCode) {
        info!("Character code set to {:?}", char_code);
        self.ctx.char_code.store(char_code.to_u16(), Ordering::Relaxed);
    }

    pub fn subbook_count(&self) -> usize {
        self.subbooks.len()
    }

    pub fn subbooks(&self) -> &[SubBook] {
        &self.subbooks
    }

    pub fn subbook(&self, index: usize) -> Option<&SubBook> {
        self.subbooks.get(index)
    }
}

//! # eb-reader
//!
//! A reader for EB and EPWING electronic dictionary books.
//!
//! Open a book directory, pick a subbook, search one of its indexes and render
//! the articles found through a [`Hook`]:
//!
//! ```no_run
//! use eb_reader::Book;
//!
//! let book = Book::open("/media/dict")?;
//! let sub = book.subbook(0).expect("book has a subbook");
//! for result in sub.search_word("dictionary")? {
//!     let result = result?;
//!     let mut hook = sub.plain_text_hook();
//!     println!("{}", result.heading(&mut hook)?);
//!     println!("{}", result.text(&mut hook)?);
//! }
//! # Ok::<(), eb_reader::EbError>(())
//! ```
//!
//! Data files may be stored plain, as EPWING Huffman compressed text, or in
//! the EBZip container; [`ebzip`] also compresses files into that container.
pub mod eb;

// Re-export the main types for convenience
pub use eb::{
    book::Book,
    codec::ebzip,
    hook::{text::PlainTextHook, Hook, NullHook},
    search::{Candidate, CandidateKind, SearchResult, Searcher},
    subbook::SubBook,
    types::error::{EbError, Result},
    types::models::{CharCode, DiscType, FileFormat, FontType, GlyphWidth},
};

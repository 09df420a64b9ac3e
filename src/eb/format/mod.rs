//! Parsers for the metadata files of a book.
//!
//! - [`catalog`]: the `catalog`/`catalogs` subbook list and the `language` file
//! - [`subbook_index`]: the index page at the head of each subbook text file
//! - [`appendix`]: appendix alternate strings, stop codes and Unicode map files
//! - [`font`]: external character fonts

pub mod appendix;
pub mod catalog;
pub mod font;
pub mod subbook_index;

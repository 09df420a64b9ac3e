//! EB and EPWING book reader.
//!
//! Layers, leaf first:
//! - [`types`]: errors and shared models
//! - [`codec`]: EBZip, EPWING Huffman and JIS text conversion
//! - [`io`]: file lookup and the page-addressed reader
//! - [`format`]: catalog, subbook index page, appendix and fonts
//! - [`style`] and [`compare`]: word normalization and key ordering
//! - [`search`]: index traversal
//! - [`hook`]: the escape sequence interpreter and its event sinks
//! - [`book`] and [`subbook`]: the public entry points

pub mod book;
pub mod codec;
pub mod compare;
pub mod format;
pub mod hook;
pub mod index_layer;
pub mod io;
pub mod search;
pub mod style;
pub mod subbook;
pub mod types;
pub mod utils;

pub use book::Book;
pub use subbook::SubBook;
pub use types::error::{EbError, Result};

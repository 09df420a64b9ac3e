//! File access layer: case-insensitive lookup and page-addressed reading.
//!
//! - [`file`]: locates `NAME`, `NAME.org` and `NAME.ebz` and opens them
//! - [`paged`]: the [`PagedReader`](paged::PagedReader) cursor and its block decoders

pub mod file;
pub mod paged;

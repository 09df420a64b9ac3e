//! Index search.
//!
//! A search walks one index (or several, for keyword, cross and multi search)
//! from its root page down to the leaf holding the word, then yields the
//! matching entries lazily through a [`Searcher`].

pub mod candidate;
mod multi;
mod single;

use std::fmt;

use crate::eb::hook::Hook;
use crate::eb::style::IndexStyle;
use crate::eb::subbook::SubBook;
use crate::eb::types::error::Result;

pub use candidate::{Candidate, CandidateHook, CandidateKind};
use multi::MultiWordSearcher;
use single::SingleWordSearcher;

/// The index family a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    /// Forward prefix search.
    Word,
    /// Forward search that must match the whole entry.
    Exactword,
    /// Backward search: the word and keys are reversed.
    Endword,
    Keyword,
    Cross,
    Multi,
}

/// One matching index entry: where its heading and article text start.
#[derive(Clone, Copy)]
pub struct SearchResult<'a> {
    sub: &'a SubBook,
    heading: u64,
    text: u64,
}

impl fmt::Debug for SearchResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResult")
            .field("subbook", &self.sub.name())
            .field("heading", &format_args!("{:#x}", self.heading))
            .field("text", &format_args!("{:#x}", self.text))
            .finish()
    }
}

impl<'a> SearchResult<'a> {
    pub(crate) fn new(sub: &'a SubBook, heading: u64, text: u64) -> Self {
        Self { sub, heading, text }
    }

    pub fn subbook(&self) -> &'a SubBook {
        self.sub
    }

    pub fn text_position(&self) -> u64 {
        self.text
    }

    pub fn heading_position(&self) -> u64 {
        self.heading
    }

    /// Renders the article through `hook`.
    pub fn text<H: Hook + ?Sized>(&self, hook: &mut H) -> Result<H::Output> {
        self.sub.text(self.text, hook)
    }

    /// Renders the heading through `hook`.
    pub fn heading<H: Hook + ?Sized>(&self, hook: &mut H) -> Result<H::Output> {
        self.sub.heading(self.heading, hook)
    }
}

enum Inner<'a> {
    Empty,
    Single(SingleWordSearcher<'a>),
    Multi(MultiWordSearcher<'a>),
}

/// Lazily yields the results of one search, in index key order.
///
/// The sequence is forward only. After an error it is exhausted.
pub struct Searcher<'a> {
    inner: Inner<'a>,
}

impl fmt::Debug for Searcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            Inner::Empty => "empty",
            Inner::Single(_) => "single",
            Inner::Multi(_) => "multi",
        };
        f.debug_struct("Searcher").field("kind", &kind).finish()
    }
}

impl<'a> Searcher<'a> {
    /// A searcher with no results.
    pub fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    pub(crate) fn single(sub: &'a SubBook, style: &'a IndexStyle, kind: SearchType, word: &[u8]) -> Result<Self> {
        let searcher = SingleWordSearcher::new(sub, style, kind, word)?;
        Ok(Self {
            inner: Inner::Single(searcher),
        })
    }

    pub(crate) fn multi_word(
        sub: &'a SubBook,
        style: &'a IndexStyle,
        kind: SearchType,
        words: &[Vec<u8>],
    ) -> Result<Self> {
        let searcher = MultiWordSearcher::new(sub, style, kind, words)?;
        Ok(Self {
            inner: Inner::Multi(searcher),
        })
    }

    pub(crate) fn multi_entry(sub: &'a SubBook, entries: &'a [IndexStyle], words: &[Vec<u8>]) -> Result<Self> {
        let searcher = MultiWordSearcher::with_entries(sub, entries, words)?;
        Ok(Self {
            inner: Inner::Multi(searcher),
        })
    }

    /// Returns the next result, or `None` when the search is exhausted.
    pub fn next_result(&mut self) -> Result<Option<SearchResult<'a>>> {
        let next = match &mut self.inner {
            Inner::Empty => Ok(None),
            Inner::Single(s) => s.next_result(),
            Inner::Multi(m) => m.next_result(),
        };
        if !matches!(next, Ok(Some(_))) {
            self.inner = Inner::Empty;
        }
        next
    }
}

impl<'a> Iterator for Searcher<'a> {
    type Item = Result<SearchResult<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_result().transpose()
    }
}

impl std::iter::FusedIterator for Searcher<'_> {}

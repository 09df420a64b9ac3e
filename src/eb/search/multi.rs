use log::debug;

use super::single::SingleWordSearcher;
use super::{SearchResult, SearchType};
use crate::eb::style::IndexStyle;
use crate::eb::subbook::SubBook;
use crate::eb::types::error::Result;

/// Intersects the results of several single word searches by text position.
///
/// Every component index is sorted by key, not by position, so the lagging
/// searchers are advanced until all of them agree on one article.
pub(crate) struct MultiWordSearcher<'a> {
    searchers: Vec<SingleWordSearcher<'a>>,
}

impl<'a> MultiWordSearcher<'a> {
    /// Searches every word in the same index (keyword and cross search).
    pub(crate) fn new(sub: &'a SubBook, style: &'a IndexStyle, kind: SearchType, words: &[Vec<u8>]) -> Result<Self> {
        let searchers = words
            .iter()
            .filter(|w| !w.is_empty())
            .map(|w| SingleWordSearcher::new(sub, style, kind, w))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { searchers })
    }

    /// Searches word `i` in entry index `i` of a multi search.
    pub(crate) fn with_entries(sub: &'a SubBook, entries: &'a [IndexStyle], words: &[Vec<u8>]) -> Result<Self> {
        let mut searchers = Vec::with_capacity(words.len());
        for (word, style) in words.iter().zip(entries) {
            if word.is_empty() {
                continue;
            }
            searchers.push(SingleWordSearcher::new(sub, style, SearchType::Multi, word)?);
        }
        Ok(Self { searchers })
    }

    pub(crate) fn next_result(&mut self) -> Result<Option<SearchResult<'a>>> {
        if self.searchers.is_empty() {
            return Ok(None);
        }
        let mut results = Vec::with_capacity(self.searchers.len());
        for searcher in &mut self.searchers {
            match searcher.next_result()? {
                Some(r) => results.push(r),
                None => return Ok(None),
            }
        }

        loop {
            let target = results.iter().map(SearchResult::text_position).max().unwrap_or(0);
            if results.iter().all(|r| r.text_position() == target) {
                debug!("Multi word match at {:#x}", target);
                return Ok(Some(results.swap_remove(0)));
            }
            for (searcher, result) in self.searchers.iter_mut().zip(results.iter_mut()) {
                while result.text_position() < target {
                    match searcher.next_result()? {
                        Some(r) => *result = r,
                        None => return Ok(None),
                    }
                }
            }
        }
    }
}

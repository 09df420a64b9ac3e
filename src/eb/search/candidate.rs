//! Candidate lists of multi search entries.

use std::sync::Arc;

use log::debug;

use crate::eb::format::appendix::SubAppendix;
use crate::eb::hook::text::PlainTextHook;
use crate::eb::hook::Hook;
use crate::eb::subbook::SubBook;
use crate::eb::types::error::{EbError, Result};

/// Nesting limit for candidate groups. Deeper lists point back into
/// themselves.
const MAX_CANDIDATE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Opens a further list.
    Group,
    /// A word that can be typed into the entry as is.
    Leaf,
}

/// One selectable value of a multi search entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub kind: CandidateKind,
    /// The list a group opens; always empty for a leaf. A group may have an
    /// empty list too.
    pub children: Vec<Candidate>,
}

impl Candidate {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: CandidateKind::Leaf,
            children: Vec::new(),
        }
    }

    pub fn group(label: impl Into<String>, children: Vec<Candidate>) -> Self {
        Self {
            label: label.into(),
            kind: CandidateKind::Group,
            children,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == CandidateKind::Group
    }
}

/// Collects the candidate tree of a multi search entry.
///
/// Only text between a candidate start and its end is kept. Group ends are
/// followed immediately by reading the list they point to.
pub struct CandidateHook<'a> {
    sub: &'a SubBook,
    depth: usize,
    label: PlainTextHook,
    collecting: bool,
    list: Vec<Candidate>,
    error: Option<EbError>,
}

impl<'a> CandidateHook<'a> {
    pub fn new(sub: &'a SubBook) -> Self {
        Self::nested(sub, 0)
    }

    fn nested(sub: &'a SubBook, depth: usize) -> Self {
        let appendix: Option<Arc<SubAppendix>> = sub.appendix();
        Self {
            sub,
            depth,
            label: PlainTextHook::new().with_appendix(appendix),
            collecting: false,
            list: Vec::new(),
            error: None,
        }
    }

    fn take_label(&mut self) -> String {
        self.collecting = false;
        self.label.output().trim().to_string()
    }
}

impl Hook for CandidateHook<'_> {
    type Output = Result<Vec<Candidate>>;

    fn clear(&mut self) {
        self.label.clear();
        self.collecting = false;
        self.list.clear();
        self.error = None;
    }

    fn output(&mut self) -> Result<Vec<Candidate>> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(std::mem::take(&mut self.list)),
        }
    }

    fn is_more_input(&self) -> bool {
        self.error.is_none()
    }

    fn append_text(&mut self, text: &str) {
        if self.collecting {
            self.label.append_text(text);
        }
    }

    fn append_gaiji(&mut self, code: u16) {
        if self.collecting {
            self.label.append_gaiji(code);
        }
    }

    fn begin_narrow(&mut self) {
        self.label.begin_narrow();
    }

    fn end_narrow(&mut self) {
        self.label.end_narrow();
    }

    fn begin_candidate(&mut self) {
        self.label.clear();
        self.collecting = true;
    }

    fn end_candidate_group(&mut self, pos: u64) {
        let label = self.take_label();
        if self.depth + 1 >= MAX_CANDIDATE_DEPTH {
            self.error = Some(EbError::Format(format!(
                "Candidate groups nested deeper than {} levels at {:#x}",
                MAX_CANDIDATE_DEPTH, pos
            )));
            return;
        }
        debug!("Candidate group '{}' continues at {:#x}", label, pos);
        let mut child = CandidateHook::nested(self.sub, self.depth + 1);
        match self.sub.text(pos, &mut child).and_then(|r| r) {
            Ok(children) => self.list.push(Candidate::group(label, children)),
            Err(e) => self.error = Some(e),
        }
    }

    fn end_candidate_leaf(&mut self) {
        let label = self.take_label();
        self.list.push(Candidate::leaf(label));
    }
}

//! Plain text rendering.

use std::sync::Arc;

use log::trace;

use super::Hook;
use crate::eb::codec::jis;
use crate::eb::format::appendix::{SubAppendix, UnicodeMap};
use crate::eb::types::models::GlyphWidth;
use crate::eb::utils::hex4;

/// Default cap on the number of lines rendered per article.
pub const DEFAULT_MAX_LINES: usize = 500;

/// Renders article text as a `String`.
///
/// Narrow regions are folded from full-width to ASCII forms. External
/// characters are replaced by their appendix string, then their Unicode map
/// entry, and otherwise by a `[GAIJI=n....]` or `[GAIJI=w....]` tag.
#[derive(Debug, Clone)]
pub struct PlainTextHook {
    appendix: Option<Arc<SubAppendix>>,
    unicode_map: Option<Arc<UnicodeMap>>,
    max_lines: usize,
    narrow: bool,
    lines: usize,
    buf: String,
}

impl Default for PlainTextHook {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainTextHook {
    pub fn new() -> Self {
        Self {
            appendix: None,
            unicode_map: None,
            max_lines: DEFAULT_MAX_LINES,
            narrow: false,
            lines: 0,
            buf: String::with_capacity(2048),
        }
    }

    /// Stops reading after `max_lines` line breaks.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_appendix(mut self, appendix: Option<Arc<SubAppendix>>) -> Self {
        self.appendix = appendix;
        self
    }

    pub fn with_unicode_map(mut self, map: Arc<UnicodeMap>) -> Self {
        self.unicode_map = Some(map);
        self
    }

    fn width(&self) -> GlyphWidth {
        if self.narrow {
            GlyphWidth::Narrow
        } else {
            GlyphWidth::Wide
        }
    }

    fn gaiji_text(&self, code: u16) -> Option<String> {
        let width = self.width();
        if let Some(appendix) = &self.appendix {
            match appendix.font_alt(width, code) {
                Ok(alt) if !alt.trim().is_empty() => return Some(alt),
                Ok(_) => {}
                Err(e) => trace!("No appendix string for {:04x}: {}", code, e),
            }
        }
        self.unicode_map
            .as_ref()
            .and_then(|map| map.get_width(width, code))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }
}

impl Hook for PlainTextHook {
    type Output = String;

    fn clear(&mut self) {
        self.buf.clear();
        self.narrow = false;
        self.lines = 0;
    }

    /// Takes the rendered text, leaving the buffer empty.
    fn output(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    fn is_more_input(&self) -> bool {
        self.lines < self.max_lines
    }

    fn append_text(&mut self, text: &str) {
        if self.narrow {
            self.buf.push_str(&jis::wide_to_narrow(text));
        } else {
            self.buf.push_str(text);
        }
    }

    fn append_gaiji(&mut self, code: u16) {
        match self.gaiji_text(code) {
            Some(alt) => self.buf.push_str(&alt),
            None => {
                let tag = if self.narrow { 'n' } else { 'w' };
                self.buf.push_str(&format!("[GAIJI={}{}]", tag, hex4(code)));
            }
        }
    }

    fn begin_narrow(&mut self) {
        self.narrow = true;
    }

    fn end_narrow(&mut self) {
        self.narrow = false;
    }

    fn new_line(&mut self) {
        self.buf.push('\n');
        self.lines += 1;
    }
}

//! Rendering of article text through caller-supplied event sinks.
//!
//! Book text is a stream of JIS (or Latin) characters interleaved with
//! `0x1f`-prefixed escape sequences. [`reader::BookReader`] interprets the
//! stream and reports every character and escape to a [`Hook`]; the hook
//! decides what, if anything, to build from them.
//!
//! - [`NullHook`] ignores every event.
//! - [`text::PlainTextHook`] renders plain text with gaiji placeholders.
//! - `CandidateHook` (in the search module) collects multi search candidates.

pub mod reader;
pub mod text;

/// Receiver of text rendering events.
///
/// Every event has a no-op default so implementations only override what
/// they care about. Begin and end events are not guaranteed to pair up;
/// implementations must tolerate an end without a begin.
#[allow(unused_variables)]
pub trait Hook {
    type Output;

    /// Resets accumulated state before a new article is read.
    fn clear(&mut self) {}

    /// Returns the result accumulated since the last [`clear`](Hook::clear).
    fn output(&mut self) -> Self::Output;

    /// Whether the reader should keep going. Checked after every event.
    fn is_more_input(&self) -> bool {
        true
    }

    /// Decoded text, usually one character.
    fn append_text(&mut self, text: &str) {}

    /// An external character. Its width class follows the narrow state.
    fn append_gaiji(&mut self, code: u16) {}

    fn begin_narrow(&mut self) {}
    fn end_narrow(&mut self) {}
    fn begin_unicode(&mut self) {}
    fn end_unicode(&mut self) {}
    fn begin_subscript(&mut self) {}
    fn end_subscript(&mut self) {}
    fn begin_superscript(&mut self) {}
    fn end_superscript(&mut self) {}
    fn set_indent(&mut self, indent: u16) {}
    fn new_line(&mut self) {}
    fn begin_no_new_line(&mut self) {}
    fn end_no_new_line(&mut self) {}
    fn begin_emphasis(&mut self) {}
    fn end_emphasis(&mut self) {}

    /// Start of a decorated run; `kind` is 1 for italic and 3 for bold.
    fn begin_decoration(&mut self, kind: u16) {}
    fn end_decoration(&mut self) {}

    fn begin_candidate(&mut self) {}
    /// End of a candidate that opens a further candidate list at `pos`.
    fn end_candidate_group(&mut self, pos: u64) {}
    /// End of a candidate that is a final choice.
    fn end_candidate_leaf(&mut self) {}

    fn begin_reference(&mut self) {}
    /// End of a cross reference to the article at `pos`.
    fn end_reference(&mut self, pos: u64) {}
    fn begin_keyword(&mut self) {}
    fn end_keyword(&mut self) {}

    /// Start of a monochrome bitmap; dimensions are 0 when not given.
    fn begin_mono_graphic(&mut self, width: u32, height: u32) {}
    fn end_mono_graphic(&mut self, pos: u64) {}
    fn begin_inline_color_graphic(&mut self, format: u16, pos: u64) {}
    fn end_inline_color_graphic(&mut self) {}
    fn begin_color_graphic(&mut self, format: u16, pos: u64) {}
    fn end_color_graphic(&mut self) {}
    fn begin_sound(&mut self, format: u16, start: u64, end: u64) {}
    fn end_sound(&mut self) {}
    fn begin_movie(&mut self, format: u16, width: u32, height: u32, filename: &str) {}
    fn end_movie(&mut self) {}
    fn begin_graphic_reference(&mut self, pos: u64) {}
    fn end_graphic_reference(&mut self) {}
    /// A graphic reference with no anchor text.
    fn set_graphic_reference(&mut self, pos: u64) {}
    fn begin_image_page(&mut self) {}
    fn end_image_page(&mut self) {}
    fn begin_clickable_area(&mut self, x: u32, y: u32, width: u32, height: u32, pos: u64) {}
    fn end_clickable_area(&mut self) {}
    fn begin_ebxac_gaiji(&mut self) {}
    fn end_ebxac_gaiji(&mut self) {}
}

/// A hook that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHook;

impl Hook for NullHook {
    type Output = ();

    fn output(&mut self) {}
}

//! The escape sequence interpreter.

use log::trace;

use super::{Hook, NullHook};
use crate::eb::codec::jis;
use crate::eb::format::appendix::SubAppendix;
use crate::eb::io::file::BookFile;
use crate::eb::io::paged::PagedReader;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{self, CharCode, DiscType, PAGE_SIZE};
use crate::eb::utils::{bcd2, bcd4, u16_at};

/// Default stop code escape, paired with the first keyword argument.
const AUTO_STOP_ESCAPE: u16 = 0x1f41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    /// Stops at the first newline.
    Heading,
}

/// Whether `op` closes a region opened by one of the skip escapes.
fn is_skip_terminator(op: u8) -> bool {
    matches!(op, 0x15 | 0x55..=0x5f | 0x69 | 0x6e | 0x90..=0xaf) || (op >= 0xe5 && op % 2 == 1)
}

/// A sliding window over the decoded text file.
struct Window {
    reader: PagedReader,
    start: u64,
    buf: Vec<u8>,
    len: usize,
    off: usize,
    consumed: u64,
}

impl Window {
    /// Makes at least `n` bytes available at the cursor.
    fn ensure(&mut self, n: usize) -> Result<()> {
        if self.off + n <= self.len {
            return Ok(());
        }
        self.buf.copy_within(self.off..self.len, 0);
        self.consumed += self.off as u64;
        self.len -= self.off;
        self.off = 0;
        while self.len < n {
            let read = self.reader.read(&mut self.buf[self.len..])?;
            if read == 0 {
                return Err(EbError::Format(format!(
                    "Text ends inside an escape sequence at {:#x}",
                    self.position()
                )));
            }
            self.len += read;
        }
        Ok(())
    }

    fn byte(&self, i: usize) -> u8 {
        self.buf[self.off + i]
    }

    fn u16(&self, i: usize) -> u16 {
        u16_at(&self.buf, self.off + i)
    }

    /// Reads a BCD page number and offset pair as an absolute position.
    fn bcd_position(&self, page_at: usize, offset_at: usize) -> u64 {
        models::position(
            bcd4(&self.buf, self.off + page_at) as u64,
            bcd2(&self.buf, self.off + offset_at) as u64,
        )
    }

    fn bcd2(&self, i: usize) -> u32 {
        bcd2(&self.buf, self.off + i)
    }

    fn bcd4(&self, i: usize) -> u32 {
        bcd4(&self.buf, self.off + i)
    }

    fn position(&self) -> u64 {
        self.start + self.consumed + self.off as u64
    }
}

/// Decodes the 8 JIS characters of a movie file name. Digits and letters are
/// allowed; the name ends at a space or NUL.
fn movie_name(w: &Window) -> Option<String> {
    let mut name = String::with_capacity(8);
    for i in 0..8 {
        let code = w.u16(22 + i * 2);
        let (high, low) = ((code >> 8) as u8, code as u8);
        match (high, low) {
            (0x21, 0x21) | (0x00, 0x00) => break,
            (0x23, b'0'..=b'9') | (0x23, b'a'..=b'z') => name.push(low as char),
            (0x23, b'A'..=b'Z') => name.push((low | 0x20) as char),
            _ => return None,
        }
    }
    (!name.is_empty()).then_some(name)
}

/// Reads article and heading text of one subbook, driving a [`Hook`].
#[derive(Debug, Clone, Copy)]
pub struct BookReader<'a> {
    file: &'a BookFile,
    disc_type: DiscType,
    char_code: CharCode,
    appendix: Option<&'a SubAppendix>,
}

impl<'a> BookReader<'a> {
    pub fn new(
        file: &'a BookFile,
        disc_type: DiscType,
        char_code: CharCode,
        appendix: Option<&'a SubAppendix>,
    ) -> Self {
        Self {
            file,
            disc_type,
            char_code,
            appendix,
        }
    }

    /// Renders the article at `pos`.
    ///
    /// # Errors
    /// Returns `Format` on an unknown escape sequence or text that ends inside
    /// one, and propagates read errors.
    pub fn read_text<H: Hook + ?Sized>(&self, pos: u64, hook: &mut H) -> Result<H::Output> {
        hook.clear();
        self.run(pos, Mode::Text, hook)?;
        Ok(hook.output())
    }

    /// Renders the heading at `pos`, up to its first newline.
    pub fn read_heading<H: Hook + ?Sized>(&self, pos: u64, hook: &mut H) -> Result<H::Output> {
        hook.clear();
        self.run(pos, Mode::Heading, hook)?;
        Ok(hook.output())
    }

    /// Position just past the heading at `pos`.
    pub fn next_heading_position(&self, pos: u64) -> Result<u64> {
        self.run(pos, Mode::Heading, &mut NullHook)
    }

    fn is_stop_code(&self, code0: u16, code1: u16, auto_stop: Option<u16>) -> bool {
        match self.appendix.and_then(SubAppendix::stop_code) {
            Some(stop) => stop == (code0, code1),
            None => code0 == AUTO_STOP_ESCAPE && Some(code1) == auto_stop,
        }
    }

    /// Width of the argument-bearing escapes whose layout differs between EB
    /// and EPWING discs.
    fn variable_width(&self, w: &Window) -> usize {
        if self.disc_type == DiscType::Eb && w.byte(2) >= 0x1f {
            2
        } else {
            4
        }
    }

    /// Interprets text from `pos` and returns the position where it stopped.
    fn run<H: Hook + ?Sized>(&self, pos: u64, mode: Mode, hook: &mut H) -> Result<u64> {
        let mut reader = self.file.reader();
        reader.seek(pos)?;
        let mut buf = vec![0u8; PAGE_SIZE as usize];
        let len = reader.read(&mut buf)?;
        if len == 0 {
            return Ok(pos);
        }
        let mut w = Window {
            reader,
            start: pos,
            buf,
            len,
            off: 0,
            consumed: 0,
        };

        let latin = self.char_code.is_latin();
        let mut skip_code: Option<u8> = None;
        let mut auto_stop: Option<u16> = None;
        let mut printable = false;
        let mut eof = false;

        while !eof {
            w.ensure(2)?;
            if w.byte(0) == 0x1f {
                let op = w.byte(1);
                let code = w.u16(0);
                match op {
                    0x02 => w.off += 2,
                    0x03 => eof = true,
                    0x04 => {
                        w.off += 2;
                        hook.begin_narrow();
                    }
                    0x05 => {
                        w.off += 2;
                        hook.end_narrow();
                    }
                    0x06 => {
                        w.off += 2;
                        hook.begin_subscript();
                    }
                    0x07 => {
                        w.off += 2;
                        hook.end_subscript();
                    }
                    0x09 => {
                        w.ensure(4)?;
                        if printable && mode == Mode::Text && self.is_stop_code(code, w.u16(2), auto_stop) {
                            eof = true;
                        } else {
                            hook.set_indent(w.u16(2));
                        }
                        w.off += 4;
                    }
                    0x0a => {
                        w.off += 2;
                        if mode == Mode::Heading {
                            eof = true;
                        } else {
                            hook.new_line();
                        }
                    }
                    0x0b => {
                        w.off += 2;
                        hook.begin_unicode();
                    }
                    0x0c => {
                        w.off += 2;
                        hook.end_unicode();
                    }
                    0x0e => {
                        w.off += 2;
                        hook.begin_superscript();
                    }
                    0x0f => {
                        w.off += 2;
                        hook.end_superscript();
                    }
                    0x10 => {
                        w.off += 2;
                        hook.begin_no_new_line();
                    }
                    0x11 => {
                        w.off += 2;
                        hook.end_no_new_line();
                    }
                    0x12 => {
                        w.off += 2;
                        hook.begin_emphasis();
                    }
                    0x13 => {
                        w.off += 2;
                        hook.end_emphasis();
                    }
                    0x14 => {
                        w.ensure(4)?;
                        w.off += 4;
                        skip_code = Some(0x15);
                    }
                    0x1c | 0x1d if self.char_code == CharCode::Jisx0208Gb2312 => {
                        w.off += 2;
                        if op == 0x1c {
                            hook.begin_ebxac_gaiji();
                        } else {
                            hook.end_ebxac_gaiji();
                        }
                    }
                    0x1a..=0x1f => {
                        w.ensure(4)?;
                        w.off += self.variable_width(&w);
                    }
                    0x32 => {
                        w.off += 2;
                        hook.begin_mono_graphic(0, 0);
                    }
                    0x39 => {
                        w.ensure(46)?;
                        if let Some(name) = movie_name(&w) {
                            hook.begin_movie(w.u16(2) >> 12, w.bcd2(10), w.bcd2(12), &name);
                        }
                        w.off += 46;
                    }
                    0x3c => {
                        w.ensure(20)?;
                        hook.begin_inline_color_graphic(w.u16(2) >> 12, w.bcd_position(14, 18));
                        w.off += 20;
                    }
                    0x35..=0x38 | 0x3a | 0x3b | 0x3d..=0x3f | 0x49 | 0x4e | 0x70..=0x8f => {
                        w.off += 2;
                        skip_code = Some(op + 0x20);
                    }
                    0x41 => {
                        w.ensure(4)?;
                        let arg = w.u16(2);
                        if printable && mode == Mode::Text && self.is_stop_code(code, arg, auto_stop) {
                            eof = true;
                        } else {
                            auto_stop.get_or_insert(arg);
                            hook.begin_keyword();
                        }
                        w.off += 4;
                    }
                    0x42 => {
                        w.ensure(4)?;
                        w.off += if w.byte(2) != 0x00 { 2 } else { 4 };
                        hook.begin_reference();
                    }
                    0x43 => {
                        w.off += 2;
                        hook.begin_candidate();
                    }
                    0x44 => {
                        w.ensure(12)?;
                        let (height, width) = (w.bcd4(4), w.bcd4(8));
                        if width > 0 && height > 0 {
                            hook.begin_mono_graphic(width, height);
                        }
                        w.off += 12;
                    }
                    0x45 => {
                        w.ensure(4)?;
                        w.off += if w.byte(2) != 0x1f { 4 } else { 6 };
                    }
                    0x4a => {
                        w.ensure(18)?;
                        hook.begin_sound(w.u16(2) & 0x0f, w.bcd_position(6, 10), w.bcd_position(12, 16));
                        w.off += 18;
                    }
                    0x4b => {
                        w.ensure(10)?;
                        let pos = w.bcd_position(2, 6);
                        w.off += 8;
                        if w.byte(0) == 0x1f && w.byte(1) == 0x6b {
                            w.off += 2;
                            eof = true;
                            hook.set_graphic_reference(pos);
                        } else {
                            hook.begin_graphic_reference(pos);
                        }
                    }
                    0x4c => {
                        w.ensure(4)?;
                        w.off += 4;
                        hook.begin_image_page();
                    }
                    0x4d => {
                        w.ensure(20)?;
                        hook.begin_color_graphic(w.u16(2) >> 12, w.bcd_position(14, 18));
                        w.off += 20;
                    }
                    0x4f => {
                        w.ensure(34)?;
                        hook.begin_clickable_area(
                            w.bcd2(8),
                            w.bcd2(10),
                            w.bcd2(12),
                            w.bcd2(14),
                            w.bcd_position(28, 32),
                        );
                        w.off += 34;
                    }
                    0x52 | 0x64 => {
                        w.ensure(8)?;
                        hook.end_mono_graphic(w.bcd_position(2, 6));
                        w.off += 8;
                    }
                    0x53 => {
                        w.ensure(10)?;
                        w.off += 10;
                    }
                    0x59 => {
                        w.off += 2;
                        hook.end_movie();
                    }
                    0x5c => {
                        w.off += 2;
                        hook.end_inline_color_graphic();
                    }
                    0x61 => {
                        w.off += 2;
                        hook.end_keyword();
                    }
                    0x62 => {
                        w.ensure(8)?;
                        hook.end_reference(w.bcd_position(2, 6));
                        w.off += 8;
                    }
                    0x63 => {
                        w.ensure(8)?;
                        if w.bcd4(2) == 0 && w.bcd2(6) == 0 {
                            hook.end_candidate_leaf();
                        } else {
                            hook.end_candidate_group(w.bcd_position(2, 6));
                        }
                        w.off += 8;
                    }
                    0x6a => {
                        w.off += 2;
                        hook.end_sound();
                    }
                    0x6b => {
                        w.off += 2;
                        hook.end_graphic_reference();
                    }
                    0x6c => {
                        w.off += 2;
                        eof = true;
                        hook.end_image_page();
                    }
                    0x6d => {
                        w.off += 2;
                        hook.end_color_graphic();
                    }
                    0x6f => {
                        w.off += 2;
                        hook.end_clickable_area();
                    }
                    0xe0 => {
                        w.ensure(4)?;
                        hook.begin_decoration(w.u16(2));
                        w.off += self.variable_width(&w);
                    }
                    0xe1 => {
                        w.off += 2;
                        hook.end_decoration();
                    }
                    0xe4..=0xfe if op % 2 == 0 => {
                        w.off += 2;
                        skip_code = Some(op + 1);
                    }
                    _ => {
                        if skip_code == Some(op) {
                            skip_code = None;
                        } else if !is_skip_terminator(op) {
                            return Err(EbError::Format(format!(
                                "Unknown escape sequence 1f {:02x} at {:#x}",
                                op,
                                w.position()
                            )));
                        }
                        w.off += 2;
                    }
                }
            } else if latin {
                printable = true;
                let ch = w.byte(0);
                if matches!(ch, 0x20..=0x7f | 0xa0..=0xff) {
                    if skip_code.is_none() {
                        hook.append_text(char::from(ch).encode_utf8(&mut [0u8; 4]));
                    }
                    w.off += 1;
                } else {
                    if skip_code.is_none() {
                        hook.append_gaiji(w.u16(0));
                    }
                    w.off += 2;
                }
            } else {
                printable = true;
                if skip_code.is_none() {
                    let (high, low) = (w.byte(0), w.byte(1));
                    let pair = &w.buf[w.off..w.off + 2];
                    match (high, low) {
                        (0x21..=0x7e, 0x21..=0x7e) => hook.append_text(&jis::jisx0208_to_string(pair)),
                        (0x21..=0x7e, 0xa1..=0xfe) => hook.append_text(&jis::gb2312_to_string(pair)),
                        (0xa1..=0xfe, 0x21..=0x7e) => hook.append_gaiji(w.u16(0)),
                        _ => trace!("Ignoring character {:02x}{:02x}", high, low),
                    }
                }
                w.off += 2;
            }
            if !hook.is_more_input() {
                break;
            }
        }
        Ok(w.position())
    }
}

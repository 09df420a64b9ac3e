//! Character set conversions between Rust strings and the raw double-byte
//! codes stored in books.
//!
//! Books store JIS X 0208 (and, for some Chinese titles, GB 2312) as 7-bit
//! byte pairs. Decoding adds the high bit back and runs the bytes through the
//! matching EUC decoder from `encoding_rs`.

use encoding_rs::{EUC_JP, GBK};

/// JIS X 0208 equivalents of printable ASCII `0x20..=0x7e`.
const ASCII_TO_JISX0208: [u16; 95] = [
    0x2121, 0x212a, 0x2149, 0x2174, 0x2170, 0x2173, 0x2175, 0x2147, //
    0x214a, 0x214b, 0x2176, 0x215c, 0x2124, 0x215d, 0x2125, 0x213f, //
    0x2330, 0x2331, 0x2332, 0x2333, 0x2334, 0x2335, 0x2336, 0x2337, //
    0x2338, 0x2339, 0x2127, 0x2128, 0x2163, 0x2161, 0x2164, 0x2129, //
    0x2177, 0x2341, 0x2342, 0x2343, 0x2344, 0x2345, 0x2346, 0x2347, //
    0x2348, 0x2349, 0x234a, 0x234b, 0x234c, 0x234d, 0x234e, 0x234f, //
    0x2350, 0x2351, 0x2352, 0x2353, 0x2354, 0x2355, 0x2356, 0x2357, //
    0x2358, 0x2359, 0x235a, 0x214e, 0x2140, 0x214f, 0x2130, 0x2132, //
    0x2146, 0x2361, 0x2362, 0x2363, 0x2364, 0x2365, 0x2366, 0x2367, //
    0x2368, 0x2369, 0x236a, 0x236b, 0x236c, 0x236d, 0x236e, 0x236f, //
    0x2370, 0x2371, 0x2372, 0x2373, 0x2374, 0x2375, 0x2376, 0x2377, //
    0x2378, 0x2379, 0x237a, 0x2150, 0x2143, 0x2151, 0x2141,
];

/// JIS X 0208 equivalents of half-width katakana `0xa0..=0xdf`.
const JISX0201_TO_JISX0208: [u16; 64] = [
    0x0000, 0x2123, 0x2156, 0x2157, 0x2122, 0x2126, 0x2572, 0x2521, //
    0x2523, 0x2525, 0x2527, 0x2529, 0x2563, 0x2565, 0x2567, 0x2543, //
    0x213c, 0x2522, 0x2524, 0x2526, 0x2528, 0x252a, 0x252b, 0x252d, //
    0x252f, 0x2531, 0x2533, 0x2535, 0x2537, 0x2539, 0x253b, 0x253d, //
    0x253f, 0x2541, 0x2544, 0x2546, 0x2548, 0x254a, 0x254b, 0x254c, //
    0x254d, 0x254e, 0x254f, 0x2552, 0x2555, 0x2558, 0x255b, 0x255e, //
    0x255f, 0x2560, 0x2561, 0x2562, 0x2564, 0x2566, 0x2568, 0x2569, //
    0x256a, 0x256b, 0x256c, 0x256d, 0x256f, 0x2573, 0x212b, 0x212c,
];

/// Returns the JIS X 0208 code for an ASCII code in `0x20..=0x7e`.
pub fn ascii_to_jisx0208(code: u8) -> Option<u16> {
    match code {
        0x20..=0x7e => Some(ASCII_TO_JISX0208[(code - 0x20) as usize]),
        _ => None,
    }
}

/// Returns the JIS X 0208 code for a half-width katakana byte in `0xa1..=0xdf`.
pub fn jisx0201_to_jisx0208(code: u8) -> Option<u16> {
    match code {
        0xa1..=0xdf => Some(JISX0201_TO_JISX0208[(code - 0xa0) as usize]),
        _ => None,
    }
}

fn trim_java(s: &str) -> &str {
    s.trim_matches(|c: char| c <= ' ')
}

/// Decodes raw JIS X 0208 bytes into a string.
///
/// NUL bytes pass through as U+0000 and are trimmed from both ends together with
/// whitespace, so fixed-width padded fields decode cleanly.
pub fn jisx0208_to_string(b: &[u8]) -> String {
    let buf: Vec<u8> = b.iter().map(|&c| if c != 0 { c | 0x80 } else { 0 }).collect();
    let (text, _, _) = EUC_JP.decode(&buf);
    trim_java(&text).to_string()
}

/// Decodes raw GB 2312 bytes (7-bit high byte, 8-bit low byte) into a string.
pub fn gb2312_to_string(b: &[u8]) -> String {
    let mut buf = Vec::with_capacity(b.len());
    for pair in b.chunks_exact(2) {
        if pair[0] != 0 {
            buf.push(pair[0] | 0x80);
            buf.push(pair[1]);
        } else {
            buf.extend_from_slice(&[0, 0]);
        }
    }
    let (text, _, _) = GBK.decode(&buf);
    trim_java(&text).to_string()
}

/// Encodes a search string as raw JIS X 0208 bytes.
///
/// Tabs become spaces; surrounding whitespace and ideographic spaces are
/// removed. ASCII and half-width katakana are widened to their JIS X 0208
/// counterparts. Returns an empty vector when any character has no JIS X 0208
/// representation.
pub fn string_to_jisx0208(s: &str) -> Vec<u8> {
    let replaced = s.replace('\t', " ");
    let trimmed = trim_java(&replaced).trim_matches('\u{3000}');
    if trimmed.is_empty() {
        return Vec::new();
    }

    let (euc, _, had_errors) = EUC_JP.encode(trimmed);
    if had_errors {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(euc.len() * 2);
    let mut i = 0;
    while i < euc.len() {
        let high = euc[i];
        let code = match high {
            0x20..=0x7e => ascii_to_jisx0208(high),
            0xa1..=0xfe => match euc.get(i + 1) {
                Some(&low @ 0xa1..=0xfe) => {
                    i += 1;
                    Some(((high as u16 & 0x7f) << 8) | (low as u16 & 0x7f))
                }
                _ => None,
            },
            0x8e => match euc.get(i + 1) {
                Some(&low) => {
                    i += 1;
                    jisx0201_to_jisx0208(low)
                }
                None => None,
            },
            _ => None,
        };
        match code {
            Some(c) => out.extend_from_slice(&c.to_be_bytes()),
            None => return Vec::new(),
        }
        i += 1;
    }
    out
}

/// Converts ASCII punctuation and alphanumerics to their full-width forms.
pub fn narrow_to_wide(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => '\u{3000}',
            '\'' => '\u{2019}',
            '"' => '\u{201d}',
            '\u{21}'..='\u{7e}' => char::from_u32(c as u32 + 0xfee0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Converts full-width forms back to ASCII.
pub fn wide_to_narrow(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{2019}' => '\'',
            '\u{2212}' => '-',
            '\u{201d}' => '"',
            '\u{301c}' | '\u{ffe3}' => '~',
            '\u{ff01}'..='\u{ff5e}' => char::from_u32(c as u32 - 0xfee0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_jisx0208() {
        let b = string_to_jisx0208("\u{3000}0\u{ff01}\u{ff71}\u{30a2}\u{3000}");
        assert_eq!(b, vec![0x23, 0x30, 0x21, 0x2a, 0x25, 0x22, 0x25, 0x22]);
    }

    #[test]
    fn test_string_to_jisx0208_rejects_unmappable() {
        assert!(string_to_jisx0208("abc\u{1f600}").is_empty());
        assert!(string_to_jisx0208(" \t ").is_empty());
    }

    #[test]
    fn test_ascii_to_jisx0208() {
        assert_eq!(ascii_to_jisx0208(b'1'), Some(0x2331));
        assert_eq!(ascii_to_jisx0208(b'a'), Some(0x2361));
        assert_eq!(ascii_to_jisx0208(b'z'), Some(0x237a));
        assert_eq!(ascii_to_jisx0208(b'A'), Some(0x2341));
        assert_eq!(ascii_to_jisx0208(b'Z'), Some(0x235a));
        assert_eq!(ascii_to_jisx0208(0x7f), None);
    }

    #[test]
    fn test_jisx0208_to_string() {
        let b = [0x45, 0x6c, 0x35, 0x7e, 0x00, 0x00];
        assert_eq!(jisx0208_to_string(&b), "東京");
        let title = [0x23, 0x54, 0x23, 0x45, 0x23, 0x53, 0x23, 0x54, 0, 0];
        assert_eq!(jisx0208_to_string(&title), "ＴＥＳＴ");
    }

    #[test]
    fn test_width_conversion() {
        assert_eq!(wide_to_narrow("Ｔｏｋｙｏ\u{3000}１"), "Tokyo 1");
        assert_eq!(narrow_to_wide("Tokyo 1"), "Ｔｏｋｙｏ\u{3000}１");
        assert_eq!(wide_to_narrow("東京"), "東京");
    }
}

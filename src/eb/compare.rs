//! Ordering of search words against index keys.
//!
//! Every function compares a normalized search `word` with an index `key`
//! and returns a signed distance: zero on a match, negative when the word
//! sorts before the key and positive after. Mismatches are not clamped to
//! `-1..=1`; the byte difference at the first differing position is returned.
//!
//! A NUL in the word ends it. In presearch mode a key that runs out before
//! the word does still matches, which is how index blocks are selected during
//! descent.

fn trailing_pad(key: &[u8], mut i: usize, is_pad: impl Fn(u8) -> bool) -> i32 {
    while i < key.len() && is_pad(key[i]) {
        i += 1;
    }
    i as i32 - key.len() as i32
}

/// Plain byte comparison, used for word type 0 keys.
pub fn compare_bytes(word: &[u8], key: &[u8], presearch: bool) -> i32 {
    for (i, &w) in word.iter().enumerate() {
        if i >= key.len() {
            return if presearch { 0 } else { w as i32 };
        }
        if w == 0 {
            return 0;
        }
        if w != key[i] {
            return w as i32 - key[i] as i32;
        }
    }
    0
}

fn compare_padded(word: &[u8], key: &[u8], presearch: bool, is_pad: impl Fn(u8) -> bool) -> i32 {
    for (i, &w) in word.iter().enumerate() {
        if i >= key.len() {
            return if presearch { 0 } else { w as i32 };
        }
        if w == 0 {
            return trailing_pad(key, i, &is_pad);
        }
        if w != key[i] {
            return w as i32 - key[i] as i32;
        }
    }
    if word.len() < key.len() {
        return trailing_pad(key, word.len(), &is_pad);
    }
    0
}

/// JIS X 0208 comparison. Trailing NULs in the key are ignored.
pub fn compare_jisx0208(word: &[u8], key: &[u8], presearch: bool) -> i32 {
    compare_padded(word, key, presearch, |b| b == 0)
}

/// ISO 8859-1 comparison. Trailing spaces and NULs in the key are ignored.
pub fn compare_latin(word: &[u8], key: &[u8], presearch: bool) -> i32 {
    compare_padded(word, key, presearch, |b| b == 0 || b == b' ')
}

fn is_kana(high: u8) -> bool {
    high == 0x24 || high == 0x25
}

fn code(high: u8, low: u8) -> i32 {
    ((high as i32) << 8) + low as i32
}

fn compare_kana(word: &[u8], key: &[u8], exact: bool, group: bool) -> i32 {
    let wlen = word.len();
    let klen = key.len();
    for i in (0..wlen).step_by(2) {
        if i >= klen {
            return word[i] as i32;
        }
        if word[i] == 0 {
            return if exact { -(key[i] as i32) } else { 0 };
        }
        if i + 1 >= wlen || i + 1 >= klen {
            return word[i] as i32 - key[i] as i32;
        }
        let (w0, w1) = (word[i], word[i + 1]);
        let (k0, k1) = (key[i], key[i + 1]);
        if is_kana(w0) && is_kana(k0) {
            // hiragana and katakana of the same sound are equal
            if w1 != k1 {
                return if group {
                    code(w0, w1) - code(k0, k1)
                } else {
                    w1 as i32 - k1 as i32
                };
            }
        } else if w0 != k0 || w1 != k1 {
            return code(w0, w1) - code(k0, k1);
        }
    }
    if wlen < klen && exact {
        return -(key[wlen] as i32);
    }
    0
}

/// Kana comparison where hiragana and katakana match each other and the
/// distance includes the high byte.
pub fn compare_kana_group(word: &[u8], key: &[u8], exact: bool) -> i32 {
    compare_kana(word, key, exact, true)
}

/// Kana comparison where hiragana and katakana match each other and the
/// distance is taken from the low byte only.
pub fn compare_kana_single(word: &[u8], key: &[u8], exact: bool) -> i32 {
    compare_kana(word, key, exact, false)
}

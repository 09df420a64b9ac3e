//! Writing of word indexes in the page layout the searcher reads.
//!
//! Words are laid out in leaf pages of variable length entries. Whenever a
//! leaf page fills up, its last word is promoted to the layer above, which
//! holds fixed width keys pointing at the page below. Upper layers roll over
//! the same way, so the tree grows a level each time its top page overflows.
//!
//! The writer only covers what fixtures need: one index at a time, no entry
//! groups.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

use super::codec::jis;
use super::types::error::{EbError, Result};
use super::types::models::{self, PAGE_SIZE};

const PAGE: usize = PAGE_SIZE as usize;
/// Page header: id, entry length, entry count.
const HEADER_LEN: usize = 4;
/// Length byte plus text and heading positions.
const LEAF_OVERHEAD: usize = 13;
/// Lower page number after each upper key.
const UPPER_OVERHEAD: usize = 4;

/// A normalized index key and the tag of the article it points to.
///
/// Words order by key bytes, shorter first on a common prefix, then by tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word {
    bytes: Vec<u8>,
    tag: String,
}

impl Word {
    /// # Errors
    /// Returns `InvalidArgument` for an empty key or one longer than a leaf
    /// entry can hold.
    pub fn new(bytes: impl Into<Vec<u8>>, tag: impl Into<String>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > u8::MAX as usize {
            return Err(EbError::InvalidArgument(format!(
                "Index key length {} out of range",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            tag: tag.into(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reference tag of the article this word leads to.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Ord for Word {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes
            .cmp(&other.bytes)
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for Word {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", jis::jisx0208_to_string(&self.bytes), self.tag)
    }
}

/// One entry of a layer: a word and the block of the layer below holding it.
/// In the leaf layer the block is the one the entry itself sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub word: Word,
    pub lower_block: u64,
}

/// One written page of a layer.
#[derive(Debug, Clone)]
struct Block {
    entries: Vec<Index>,
    word_length: usize,
    last: bool,
}

/// The block currently being filled at one level of the tree.
#[derive(Debug, Clone)]
pub struct IndexLayer {
    level: usize,
    block: u64,
    word_length: usize,
    block_length: usize,
    entries: Vec<Index>,
    written: Vec<Block>,
}

impl IndexLayer {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            block: 1,
            word_length: 0,
            block_length: HEADER_LEN,
            entries: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// 1-based number of the block being filled.
    pub fn block(&self) -> u64 {
        self.block
    }

    /// Widest key in the block, which sets the entry width of upper pages.
    pub fn word_length(&self) -> usize {
        self.word_length
    }

    /// Bytes the block takes when written as a leaf page.
    pub fn block_length(&self) -> usize {
        self.block_length
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> Option<&Index> {
        self.entries.last()
    }

    pub fn push(&mut self, index: Index) {
        self.block_length += index.word.len() + LEAF_OVERHEAD;
        self.word_length = self.word_length.max(index.word.len());
        self.entries.push(index);
    }

    /// Whether a leaf entry for `word` still fits the block.
    fn fits_leaf(&self, word: &Word) -> bool {
        self.block_length + word.len() + LEAF_OVERHEAD <= PAGE
    }

    /// Whether an upper entry for `word` fits, keeping room for the end
    /// sentinel.
    fn fits_upper(&self, word: &Word) -> bool {
        let width = self.word_length.max(word.len());
        (self.entries.len() + 2) * (width + UPPER_OVERHEAD) + HEADER_LEN <= PAGE
    }

    /// Moves the current entries to a written block and starts the next one.
    fn flush(&mut self, last: bool) {
        if self.entries.is_empty() {
            return;
        }
        trace!(
            "Layer {} block {}: {} entries",
            self.level,
            self.block,
            self.entries.len()
        );
        self.written.push(Block {
            entries: std::mem::take(&mut self.entries),
            word_length: self.word_length,
            last,
        });
        if !last {
            self.block += 1;
        }
        self.word_length = 0;
        self.block_length = HEADER_LEN;
    }
}

/// Builds the pages of one word index.
///
/// ```
/// use std::collections::BTreeSet;
/// use eb_reader::eb::index_layer::{IndexWriter, Word};
///
/// let mut words = BTreeSet::new();
/// words.insert(Word::new(b"TOKYO".to_vec(), "tokyo")?);
/// let mut writer = IndexWriter::new();
/// writer.write(&words)?;
/// let pages = writer.finish(10, |_| Some((0x800, 0x1000)))?;
/// assert_eq!(pages.len(), 2048);
/// # Ok::<(), eb_reader::EbError>(())
/// ```
#[derive(Debug, Default)]
pub struct IndexWriter {
    layers: Vec<IndexLayer>,
}

impl IndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lays out `words` in key order.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if called twice.
    pub fn write(&mut self, words: &BTreeSet<Word>) -> Result<()> {
        if !self.layers.is_empty() {
            return Err(EbError::InvalidArgument("Index already written".into()));
        }
        if words.is_empty() {
            return Ok(());
        }
        self.layers.push(IndexLayer::new(0));
        for word in words {
            if !self.layers[0].fits_leaf(word) {
                let upper = self.layers[0].last_index().cloned();
                self.layers[0].flush(false);
                if let Some(last) = upper {
                    self.add_upper(1, last)?;
                }
            }
            let leaf = &mut self.layers[0];
            let block = leaf.block;
            leaf.push(Index {
                word: word.clone(),
                lower_block: block,
            });
        }
        Ok(())
    }

    fn add_upper(&mut self, level: usize, index: Index) -> Result<()> {
        if self.layers.len() == level {
            self.layers.push(IndexLayer::new(level));
        }
        if !self.layers[level].fits_upper(&index.word) {
            let layer = &mut self.layers[level];
            let upper = layer.last_index().map(|last| Index {
                word: last.word.clone(),
                lower_block: layer.block,
            });
            layer.flush(false);
            if let Some(upper) = upper {
                self.add_upper(level + 1, upper)?;
            }
        }
        trace!("Layer {} gets {}", level, index.word);
        self.layers[level].push(index);
        Ok(())
    }

    /// Depth of the tree, 1 when everything fits one leaf page.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Closes every layer and serializes the tree.
    ///
    /// The root page goes to `start_page`, followed by the rest of each layer
    /// from the top down, so the leaf pages come last and are contiguous.
    /// `resolve` maps a word's tag to its `(text, heading)` positions.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if nothing was written or a tag does not
    /// resolve.
    pub fn finish<F>(mut self, start_page: u64, resolve: F) -> Result<Vec<u8>>
    where
        F: Fn(&str) -> Option<(u64, u64)>,
    {
        let last = self
            .layers
            .first()
            .and_then(IndexLayer::last_index)
            .cloned()
            .ok_or_else(|| EbError::InvalidArgument("Index has no words".into()))?;

        let mut level = 1;
        while level < self.layers.len() {
            let lower_block = self.layers[level - 1].block;
            self.add_upper(
                level,
                Index {
                    word: last.word.clone(),
                    lower_block,
                },
            )?;
            level += 1;
        }
        for layer in &mut self.layers {
            layer.flush(true);
        }

        let depth = self.layers.len();
        let mut base = vec![0u64; depth];
        let mut next = start_page;
        for level in (0..depth).rev() {
            base[level] = next;
            next += self.layers[level].written.len() as u64;
        }
        let page_count = (next - start_page) as usize;
        debug!(
            "Index of {} levels, {} pages from page {}",
            depth, page_count, start_page
        );

        let mut out = Vec::with_capacity(page_count * PAGE);
        for level in (0..depth).rev() {
            for (i, block) in self.layers[level].written.iter().enumerate() {
                let page = if level == 0 {
                    leaf_page(block, i == 0, &resolve)?
                } else {
                    upper_page(block, i == 0, base[level - 1])
                };
                out.extend_from_slice(&page);
            }
        }
        Ok(out)
    }
}

fn page_id(kind: u8, first: bool, last: bool) -> u8 {
    let mut id = kind;
    if first {
        id |= 0x40;
    }
    if last {
        id |= 0x20;
    }
    id
}

fn put_position(buf: &mut [u8], pos: u64) {
    BigEndian::write_u32(&mut buf[..4], models::page_of(pos) as u32);
    BigEndian::write_u16(&mut buf[4..6], models::offset_of(pos) as u16);
}

fn leaf_page<F>(block: &Block, first: bool, resolve: &F) -> Result<[u8; PAGE]>
where
    F: Fn(&str) -> Option<(u64, u64)>,
{
    let mut buf = [0u8; PAGE];
    buf[0] = page_id(0x80, first, block.last);
    BigEndian::write_u16(&mut buf[2..4], block.entries.len() as u16);
    let mut off = HEADER_LEN;
    for index in &block.entries {
        let word = &index.word;
        let (text, heading) = resolve(word.tag())
            .ok_or_else(|| EbError::InvalidArgument(format!("Unresolved reference: {}", word.tag())))?;
        buf[off] = word.len() as u8;
        off += 1;
        buf[off..off + word.len()].copy_from_slice(word.bytes());
        off += word.len();
        put_position(&mut buf[off..], text);
        put_position(&mut buf[off + 6..], heading);
        off += 12;
    }
    Ok(buf)
}

fn upper_page(block: &Block, first: bool, lower_base: u64) -> [u8; PAGE] {
    let mut buf = [0u8; PAGE];
    let width = block.word_length;
    buf[0] = page_id(0x00, first, block.last);
    buf[1] = width as u8;

    let sentinel = block
        .entries
        .last()
        .filter(|_| block.last)
        .map(|last| (vec![0xffu8; width], last.lower_block));
    let entries = block
        .entries
        .iter()
        .map(|index| (index.word.bytes().to_vec(), index.lower_block))
        .chain(sentinel);

    let mut count = 0u16;
    let mut off = HEADER_LEN;
    for (key, lower_block) in entries {
        buf[off..off + key.len()].copy_from_slice(&key);
        off += width;
        BigEndian::write_u32(&mut buf[off..off + 4], (lower_base + lower_block - 1) as u32);
        off += UPPER_OVERHEAD;
        count += 1;
    }
    BigEndian::write_u16(&mut buf[2..4], count);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eb::utils::{u16_at, u32_at};
    use proptest::prelude::*;

    fn words(n: usize, len: usize) -> BTreeSet<Word> {
        (0..n)
            .map(|i| {
                let key = format!("{:0width$}", i, width = len);
                Word::new(key.into_bytes(), format!("t{}", i)).unwrap()
            })
            .collect()
    }

    fn resolve(tag: &str) -> Option<(u64, u64)> {
        let n: u64 = tag[1..].parse().ok()?;
        Some((0x10000 + n * 16, 0x20000 + n * 16))
    }

    #[test]
    fn test_word_order() {
        let a = Word::new(b"AB".to_vec(), "2").unwrap();
        let b = Word::new(b"AB".to_vec(), "1").unwrap();
        let c = Word::new(b"A".to_vec(), "9").unwrap();
        let mut v = vec![a.clone(), b.clone(), c.clone()];
        v.sort();
        assert_eq!(v, vec![c, b, a]);
        assert!(Word::new(Vec::new(), "x").is_err());
    }

    #[test]
    fn test_layer_accounting() {
        let mut layer = IndexLayer::new(0);
        assert_eq!(layer.block(), 1);
        assert_eq!(layer.block_length(), 4);
        layer.push(Index {
            word: Word::new(b"ABC".to_vec(), "a").unwrap(),
            lower_block: 1,
        });
        assert_eq!(layer.block_length(), 4 + 3 + 13);
        layer.flush(false);
        assert_eq!(layer.block(), 2);
        assert_eq!(layer.block_length(), 4);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_single_leaf() {
        let mut writer = IndexWriter::new();
        writer.write(&words(3, 4)).unwrap();
        assert_eq!(writer.depth(), 1);
        let out = writer.finish(5, resolve).unwrap();
        assert_eq!(out.len(), PAGE);
        assert_eq!(out[0], 0x80 | 0x40 | 0x20);
        assert_eq!(out[1], 0);
        assert_eq!(u16_at(&out, 2), 3);
        assert_eq!(out[4], 4);
        assert_eq!(&out[5..9], b"0000");
        // t0 text at 0x10000: page 33, offset 0
        assert_eq!(u32_at(&out, 9), 33);
        assert_eq!(u16_at(&out, 13), 0);
        assert_eq!(u32_at(&out, 15), 65);
    }

    #[test]
    fn test_two_levels() {
        // 30 byte keys take 43 bytes per leaf entry: 47 entries per page
        let mut writer = IndexWriter::new();
        writer.write(&words(100, 30)).unwrap();
        assert_eq!(writer.depth(), 2);
        let out = writer.finish(10, resolve).unwrap();
        assert_eq!(out.len(), 4 * PAGE);

        let root = &out[..PAGE];
        assert_eq!(root[0], 0x40 | 0x20);
        assert_eq!(root[1], 30);
        // two promoted keys, the final key and the sentinel
        assert_eq!(u16_at(root, 2), 4);
        assert_eq!(u32_at(root, 4 + 30), 11);
        assert_eq!(u32_at(root, 4 + 34 + 30), 12);
        assert_eq!(u32_at(root, 4 + 3 * 34 + 30), 13);
        assert_eq!(&root[4 + 3 * 34..4 + 3 * 34 + 30], &[0xff; 30][..]);

        let leaves: Vec<u8> = out[PAGE..].chunks(PAGE).map(|p| p[0]).collect();
        assert_eq!(leaves, vec![0xc0, 0x80, 0xa0]);
    }

    #[test]
    fn test_unresolved_tag() {
        let mut writer = IndexWriter::new();
        writer.write(&words(1, 2)).unwrap();
        assert!(matches!(
            writer.finish(1, |_| None),
            Err(EbError::InvalidArgument(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_word_order_follows_bytes(a in proptest::collection::vec(1u8..=255, 1..8), b in proptest::collection::vec(1u8..=255, 1..8)) {
            let wa = Word::new(a.clone(), "t").unwrap();
            let wb = Word::new(b.clone(), "t").unwrap();
            prop_assert_eq!(wa.cmp(&wb), a.cmp(&b));
        }
    }
}

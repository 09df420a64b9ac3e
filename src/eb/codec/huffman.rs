//! Huffman decoding of EPWING compressed text files.
//!
//! An EPWING `HONMON` file may be stored as a sequence of Huffman-coded pages.
//! The file starts with a small header locating a page index and a frequency
//! table; the frequency table yields the leaves of a single code tree shared
//! by every page.

use std::io::{Read, Seek, SeekFrom};

use log::{debug, trace};

use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{FileFormat, PAGE_SIZE};
use crate::eb::utils;

const PAGE: usize = PAGE_SIZE as usize;
/// Bytes per page index record: a base position and sixteen page offsets.
const INDEX_RECORD_SIZE: u64 = 36;
/// Pages covered by one index record.
const PAGES_PER_RECORD: u64 = 16;

/// Value width of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Byte,
    Word,
    Long,
    /// End of page; the rest of the page is zero-filled.
    Eof,
}

/// A node of the code tree.
///
/// Internal nodes own both children. Bit 0 selects `left`, bit 1 selects `right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuffmanNode {
    Leaf {
        value: u32,
        kind: LeafKind,
        frequency: u32,
    },
    Internal {
        frequency: u32,
        left: Box<HuffmanNode>,
        right: Box<HuffmanNode>,
    },
}

impl HuffmanNode {
    pub fn leaf(value: u32, kind: LeafKind, frequency: u32) -> Self {
        HuffmanNode::Leaf {
            value,
            kind,
            frequency,
        }
    }

    pub fn frequency(&self) -> u32 {
        match self {
            HuffmanNode::Leaf { frequency, .. } | HuffmanNode::Internal { frequency, .. } => {
                *frequency
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, HuffmanNode::Leaf { .. })
    }

    /// Joins two subtrees. `one` is reached by bit 1, `zero` by bit 0.
    fn join(one: HuffmanNode, zero: HuffmanNode) -> Self {
        HuffmanNode::Internal {
            frequency: one.frequency().saturating_add(zero.frequency()),
            left: Box::new(zero),
            right: Box::new(one),
        }
    }
}

/// Index of the minimum frequency node; on ties the last one seen wins.
fn last_minimum(nodes: &[HuffmanNode]) -> usize {
    let mut n = 0;
    for (i, node) in nodes.iter().enumerate().skip(1) {
        if nodes[n].frequency() >= node.frequency() {
            n = i;
        }
    }
    n
}

/// Builds the code tree from the leaf list in file order.
///
/// The leaves are first sorted by descending frequency with a selection sort
/// that only displaces an earlier node for a strictly greater one. Then the two
/// lowest nodes are merged until one root remains, preferring the last equal
/// minimum. The first node removed in each round is reached by bit 1. This
/// reproduces the trees that existing books were encoded with.
///
/// # Errors
/// Returns `Decode` if `nodes` is empty.
pub fn build_tree(mut nodes: Vec<HuffmanNode>) -> Result<HuffmanNode> {
    if nodes.is_empty() {
        return Err(EbError::Decode("Huffman tree has no symbols".to_string()));
    }

    // Step 1: selection sort, descending
    let size = nodes.len();
    for i in 0..size.saturating_sub(1) {
        let mut n = i;
        for j in (i + 1)..size {
            if nodes[n].frequency() < nodes[j].frequency() {
                n = j;
            }
        }
        if n != i {
            nodes.swap(i, n);
        }
    }

    // Step 2: merge the two smallest nodes until one remains
    while nodes.len() > 1 {
        let first = nodes.remove(last_minimum(&nodes));
        let second = nodes.remove(last_minimum(&nodes));
        nodes.push(HuffmanNode::join(first, second));
    }
    nodes
        .pop()
        .ok_or_else(|| EbError::Decode("Huffman tree has no symbols".to_string()))
}

/// Bit reader over a byte stream, most significant bit first.
struct BitReader<'a, R: Read + ?Sized> {
    input: &'a mut R,
    buf: [u8; PAGE],
    len: usize,
    pos: usize,
    bit: u8,
}

impl<'a, R: Read + ?Sized> BitReader<'a, R> {
    fn new(input: &'a mut R) -> Self {
        Self {
            input,
            buf: [0; PAGE],
            len: 0,
            pos: 0,
            bit: 7,
        }
    }

    fn next_bit(&mut self) -> Result<u8> {
        if self.pos >= self.len {
            self.len = self.input.read(&mut self.buf)?;
            self.pos = 0;
            if self.len == 0 {
                return Err(EbError::Decode(
                    "Huffman bit stream ended before a leaf".to_string(),
                ));
            }
        }
        let bit = (self.buf[self.pos] >> self.bit) & 0x01;
        if self.bit > 0 {
            self.bit -= 1;
        } else {
            self.bit = 7;
            self.pos += 1;
        }
        Ok(bit)
    }
}

/// Decodes one page from `input` into `out`.
///
/// Multi-byte leaf values are written big-endian and truncated at the end of
/// the page. The end-of-page leaf zero-fills whatever remains.
///
/// # Errors
/// Returns `Decode` if the input runs out before the page is complete.
pub fn decode_page<R: Read + ?Sized>(root: &HuffmanNode, input: &mut R, out: &mut [u8]) -> Result<()> {
    let mut bits = BitReader::new(input);
    let mut filled = 0;
    while filled < out.len() {
        let mut node = root;
        let (value, kind) = loop {
            match node {
                HuffmanNode::Leaf { value, kind, .. } => break (*value, *kind),
                HuffmanNode::Internal { left, right, .. } => {
                    node = if bits.next_bit()? == 1 { right } else { left };
                }
            }
        };
        let be = value.to_be_bytes();
        let bytes = match kind {
            LeafKind::Eof => {
                out[filled..].fill(0);
                break;
            }
            LeafKind::Long => &be[..],
            LeafKind::Word => &be[2..],
            LeafKind::Byte => &be[3..],
        };
        let n = bytes.len().min(out.len() - filled);
        out[filled..filled + n].copy_from_slice(&bytes[..n]);
        filled += n;
    }
    Ok(())
}

/// Header and code tree of an EPWING Huffman file.
#[derive(Debug, Clone)]
pub struct EpwingHuffman {
    pub format: FileFormat,
    pub index_position: u64,
    pub index_size: u64,
    pub frequency_position: u64,
    pub frequency_size: u64,
    /// Size of the decoded data.
    pub file_size: u64,
    pub root: HuffmanNode,
}

impl EpwingHuffman {
    /// Reads the header, page index tail and frequency table of a Huffman file.
    ///
    /// # Errors
    /// Returns `Format` for undersized index or frequency tables and `Io` when
    /// the file is truncated.
    pub fn parse<R: Read + Seek + ?Sized>(input: &mut R, format: FileFormat) -> Result<Self> {
        let mut head = [0u8; 16];
        input.seek(SeekFrom::Start(0))?;
        input.read_exact(&mut head)?;
        let index_position = utils::u32_at(&head, 0) as u64;
        let index_size = utils::u32_at(&head, 4) as u64;
        let frequency_position = utils::u32_at(&head, 8) as u64;
        let frequency_size = utils::u32_at(&head, 12) as u64;
        if index_size < INDEX_RECORD_SIZE || frequency_size < 512 {
            return Err(EbError::Format(format!(
                "Invalid EPWING Huffman header: index size {}, frequency size {}",
                index_size, frequency_size
            )));
        }

        // Step 1: the logical size comes from the last index record
        let mut record = [0u8; INDEX_RECORD_SIZE as usize];
        let last = index_position + (index_size - INDEX_RECORD_SIZE) / INDEX_RECORD_SIZE * INDEX_RECORD_SIZE;
        input.seek(SeekFrom::Start(last))?;
        input.read_exact(&mut record)?;
        let mut file_size = index_size / INDEX_RECORD_SIZE * PAGES_PER_RECORD * PAGE_SIZE;
        for i in 1..PAGES_PER_RECORD {
            if utils::u16_at(&record, (i * 2 + 4) as usize) == 0 {
                file_size -= PAGE_SIZE * (PAGES_PER_RECORD - i);
                break;
            }
        }

        // Step 2: leaves from the frequency table
        let (leaf32, leaf16) = match format {
            FileFormat::Epwing6 => {
                let leaf16 = 0x400u64;
                let leaf32 = frequency_size.saturating_sub(leaf16 * 4 + 512) / 6;
                (leaf32, leaf16)
            }
            _ => (0, (frequency_size - 512) / 4),
        };
        let table_len = (leaf32 * 6 + leaf16 * 4 + 512) as usize;
        let mut table = vec![0u8; table_len];
        input.seek(SeekFrom::Start(frequency_position))?;
        input.read_exact(&mut table)?;

        let mut nodes = Vec::with_capacity(table_len / 2 + 1);
        let mut off = 0;
        for _ in 0..leaf32 {
            nodes.push(HuffmanNode::leaf(
                utils::u32_at(&table, off),
                LeafKind::Long,
                utils::u16_at(&table, off + 4) as u32,
            ));
            off += 6;
        }
        for _ in 0..leaf16 {
            nodes.push(HuffmanNode::leaf(
                utils::u16_at(&table, off) as u32,
                LeafKind::Word,
                utils::u16_at(&table, off + 2) as u32,
            ));
            off += 4;
        }
        for value in 0..256u32 {
            nodes.push(HuffmanNode::leaf(
                value,
                LeafKind::Byte,
                utils::u16_at(&table, off) as u32,
            ));
            off += 2;
        }
        nodes.push(HuffmanNode::leaf(256, LeafKind::Eof, 1));
        debug!(
            "EPWING Huffman file: {} bytes, {} long / {} word leaves",
            file_size, leaf32, leaf16
        );

        Ok(Self {
            format,
            index_position,
            index_size,
            frequency_position,
            frequency_size,
            file_size,
            root: build_tree(nodes)?,
        })
    }

    /// Decodes the page that contains logical position `pos`.
    pub fn read_page<R: Read + Seek + ?Sized>(&self, input: &mut R, pos: u64, out: &mut [u8]) -> Result<()> {
        let mut record = [0u8; INDEX_RECORD_SIZE as usize];
        let at = self.index_position + pos / (PAGE_SIZE * PAGES_PER_RECORD) * INDEX_RECORD_SIZE;
        input.seek(SeekFrom::Start(at))?;
        input.read_exact(&mut record)?;
        let slot = (4 + (pos / PAGE_SIZE % PAGES_PER_RECORD) * 2) as usize;
        let page_pos = utils::u32_at(&record, 0) as u64 + utils::u16_at(&record, slot) as u64;
        trace!("Huffman page for {:#x} at {:#x}", pos, page_pos);

        input.seek(SeekFrom::Start(page_pos))?;
        if self.format == FileFormat::Epwing6 {
            let mut flag = [0u8; 1];
            input.read_exact(&mut flag)?;
            if flag[0] != 0 {
                input.read_exact(out)?;
                return Ok(());
            }
        }
        decode_page(&self.root, input, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn sample_leaves() -> Vec<HuffmanNode> {
        vec![
            HuffmanNode::leaf(b'A' as u32, LeafKind::Byte, 2),
            HuffmanNode::leaf(b'B' as u32, LeafKind::Byte, 5),
            HuffmanNode::leaf(b'C' as u32, LeafKind::Byte, 3),
            HuffmanNode::leaf(b'D' as u32, LeafKind::Byte, 1),
            HuffmanNode::leaf(b'E' as u32, LeafKind::Byte, 1),
            HuffmanNode::leaf(256, LeafKind::Eof, 1),
        ]
    }

    /// Collects the bit path of every leaf value.
    fn codes(node: &HuffmanNode, prefix: Vec<u8>, out: &mut Vec<(u32, Vec<u8>)>) {
        match node {
            HuffmanNode::Leaf { value, .. } => out.push((*value, prefix)),
            HuffmanNode::Internal { left, right, .. } => {
                let mut l = prefix.clone();
                l.push(0);
                codes(left, l, out);
                let mut r = prefix;
                r.push(1);
                codes(right, r, out);
            }
        }
    }

    fn pack(bits: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; bits.len().div_ceil(8)];
        for (i, bit) in bits.iter().enumerate() {
            out[i / 8] |= bit << (7 - i % 8);
        }
        out
    }

    #[test]
    fn test_sample_tree_shape() {
        let root = build_tree(sample_leaves()).unwrap();
        assert_eq!(root.frequency(), 13);
        match &root {
            HuffmanNode::Internal { left, right, .. } => {
                let (leaf, inner) = if left.is_leaf() { (left, right) } else { (right, left) };
                assert_eq!(
                    **leaf,
                    HuffmanNode::leaf(b'B' as u32, LeafKind::Byte, 5)
                );
                assert!(!inner.is_leaf());
                assert_eq!(inner.frequency(), 8);
            }
            HuffmanNode::Leaf { .. } => panic!("root must be internal"),
        }
    }

    #[test]
    fn test_empty_tree() {
        assert!(matches!(build_tree(Vec::new()), Err(EbError::Decode(_))));
    }

    #[test]
    fn test_decode_page() {
        let root = build_tree(sample_leaves()).unwrap();
        let mut table = Vec::new();
        codes(&root, Vec::new(), &mut table);
        let code_of = |v: u32| table.iter().find(|(x, _)| *x == v).unwrap().1.clone();

        let mut bits = Vec::new();
        for v in [b'C', b'A', b'B'] {
            bits.extend(code_of(v as u32));
        }
        bits.extend(code_of(256));
        let packed = pack(&bits);

        let mut out = [0xffu8; 16];
        decode_page(&root, &mut Cursor::new(packed), &mut out).unwrap();
        assert_eq!(&out[..3], b"CAB");
        assert!(out[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_truncated_stream() {
        let root = build_tree(sample_leaves()).unwrap();
        let mut out = [0u8; 64];
        let result = decode_page(&root, &mut Cursor::new(Vec::new()), &mut out);
        assert!(matches!(result, Err(EbError::Decode(_))));
    }

    #[test]
    fn test_wide_leaf_truncated_at_page_end() {
        let root = build_tree(vec![
            HuffmanNode::leaf(0x2422, LeafKind::Word, 4),
            HuffmanNode::leaf(256, LeafKind::Eof, 1),
        ])
        .unwrap();
        let mut table = Vec::new();
        codes(&root, Vec::new(), &mut table);
        let word = table.iter().find(|(v, _)| *v == 0x2422).unwrap().1.clone();
        let bits: Vec<u8> = word.iter().chain(word.iter()).copied().collect();
        let mut out = [0u8; 3];
        decode_page(&root, &mut Cursor::new(pack(&bits)), &mut out).unwrap();
        assert_eq!(out, [0x24, 0x22, 0x24]);
    }

    proptest! {
        #[test]
        fn prop_root_frequency_is_sum(freqs in proptest::collection::vec(0u32..1000, 1..300)) {
            let total: u32 = freqs.iter().sum();
            let leaves = freqs
                .iter()
                .enumerate()
                .map(|(i, &f)| HuffmanNode::leaf(i as u32, LeafKind::Byte, f))
                .collect();
            let root = build_tree(leaves).unwrap();
            prop_assert_eq!(root.frequency(), total);
        }
    }
}

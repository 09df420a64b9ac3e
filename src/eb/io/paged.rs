//! Page-addressed reading of book data files.
//!
//! A [`PagedReader`] presents a data file as a flat byte stream no matter how
//! it is stored. The storage-specific work lives behind [`BlockDecoder`]: a
//! decoder knows the logical size of the file and how to materialize one
//! fixed-size block of it. The reader caches the last block it decoded.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::eb::codec::ebzip::{self, EbzipHeader};
use crate::eb::codec::huffman::EpwingHuffman;
use crate::eb::types::error::{EbError, Result};
use crate::eb::types::models::{self, PAGE_SIZE};

/// Seekable byte source backing a book file.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Handle shared by every reader opened on the same file.
pub type SharedHandle = Arc<Mutex<Box<dyn ReadSeek>>>;

/// Wraps a byte source into a [`SharedHandle`].
pub fn shared(source: impl ReadSeek + 'static) -> SharedHandle {
    Arc::new(Mutex::new(Box::new(source)))
}

/// Storage format specific block access.
pub trait BlockDecoder: Send + Sync + fmt::Debug {
    /// Logical (decoded) size of the file.
    fn size(&self) -> u64;

    /// Size of one decodable block.
    fn block_size(&self) -> usize;

    /// Decodes block `index` into `out`, which is exactly one block long.
    fn load_block(&self, source: &mut dyn ReadSeek, index: u64, out: &mut [u8]) -> Result<()>;
}

/// Uncompressed files.
#[derive(Debug)]
pub struct PlainDecoder {
    size: u64,
}

impl PlainDecoder {
    pub fn new(source: &mut dyn ReadSeek) -> Result<Self> {
        let size = source.seek(SeekFrom::End(0))?;
        Ok(Self { size })
    }
}

impl BlockDecoder for PlainDecoder {
    fn size(&self) -> u64 {
        self.size
    }

    fn block_size(&self) -> usize {
        PAGE_SIZE as usize
    }

    fn load_block(&self, source: &mut dyn ReadSeek, index: u64, out: &mut [u8]) -> Result<()> {
        source.seek(SeekFrom::Start(index * PAGE_SIZE))?;
        let mut filled = 0;
        while filled < out.len() {
            let n = source.read(&mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out[filled..].fill(0);
        Ok(())
    }
}

/// EBZip slice containers.
#[derive(Debug)]
pub struct EbzipDecoder {
    header: EbzipHeader,
}

impl EbzipDecoder {
    pub fn new(source: &mut dyn ReadSeek) -> Result<Self> {
        let mut b = [0u8; ebzip::HEADER_SIZE];
        source.seek(SeekFrom::Start(0))?;
        source
            .read_exact(&mut b)
            .map_err(|_| EbError::format("Truncated EBZip header"))?;
        Ok(Self {
            header: EbzipHeader::parse(&b)?,
        })
    }

    pub fn header(&self) -> &EbzipHeader {
        &self.header
    }
}

impl BlockDecoder for EbzipDecoder {
    fn size(&self) -> u64 {
        self.header.file_size
    }

    fn block_size(&self) -> usize {
        self.header.slice_size()
    }

    fn load_block(&self, source: &mut dyn ReadSeek, index: u64, out: &mut [u8]) -> Result<()> {
        let width = self.header.index_width();
        let mut entry = [0u8; 10];
        source.seek(SeekFrom::Start(self.header.index_position(index)))?;
        source
            .read_exact(&mut entry[..width * 2])
            .map_err(|_| EbError::format("Truncated EBZip slice index"))?;
        let (start, end) = ebzip::slice_bounds(&entry, width);
        if end <= start || end - start > out.len() as u64 {
            return Err(EbError::Format(format!(
                "Invalid EBZip slice {}: {:#x}..{:#x}",
                index, start, end
            )));
        }
        trace!("EBZip slice {} at {:#x}, {} bytes", index, start, end - start);

        let mut raw = vec![0u8; (end - start) as usize];
        source.seek(SeekFrom::Start(start))?;
        source
            .read_exact(&mut raw)
            .map_err(|_| EbError::format("Truncated EBZip slice"))?;
        ebzip::decode_slice(&raw, out)
    }
}

/// EPWING Huffman-compressed files.
#[derive(Debug)]
pub struct HuffmanDecoder {
    huffman: EpwingHuffman,
}

impl HuffmanDecoder {
    pub fn new(huffman: EpwingHuffman) -> Self {
        Self { huffman }
    }
}

impl BlockDecoder for HuffmanDecoder {
    fn size(&self) -> u64 {
        self.huffman.file_size
    }

    fn block_size(&self) -> usize {
        PAGE_SIZE as usize
    }

    fn load_block(&self, source: &mut dyn ReadSeek, index: u64, out: &mut [u8]) -> Result<()> {
        self.huffman.read_page(source, index * PAGE_SIZE, out)
    }
}

/// A cursor over the logical bytes of a book file.
///
/// Readers are cheap: each keeps its own position and block cache while the
/// underlying handle and decoder are shared.
pub struct PagedReader {
    handle: SharedHandle,
    decoder: Arc<dyn BlockDecoder>,
    pos: u64,
    cache: Vec<u8>,
    cache_block: Option<u64>,
}

impl fmt::Debug for PagedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedReader")
            .field("decoder", &self.decoder)
            .field("pos", &self.pos)
            .field("cache_block", &self.cache_block)
            .finish()
    }
}

impl PagedReader {
    pub fn new(handle: SharedHandle, decoder: Arc<dyn BlockDecoder>) -> Self {
        Self {
            handle,
            decoder,
            pos: 0,
            cache: Vec::new(),
            cache_block: None,
        }
    }

    /// Logical size of the file.
    pub fn size(&self) -> u64 {
        self.decoder.size()
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves to an absolute logical position.
    ///
    /// # Errors
    /// Returns `Format` if `pos` lies past the end of the file.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.size() {
            return Err(EbError::Format(format!(
                "Position {:#x} past end of file ({:#x} bytes)",
                pos,
                self.size()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Moves to `offset` within 1-based `page`.
    pub fn seek_page(&mut self, page: u64, offset: u64) -> Result<()> {
        self.seek(models::position(page, offset))
    }

    /// Reads up to `buf.len()` bytes, returning 0 at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        let block_size = self.decoder.block_size() as u64;
        let mut read = 0;
        while read < buf.len() && self.pos < size {
            let block = self.pos / block_size;
            self.fill_cache(block)?;
            let start = (self.pos % block_size) as usize;
            let n = (buf.len() - read)
                .min(block_size as usize - start)
                .min((size - self.pos) as usize);
            buf[read..read + n].copy_from_slice(&self.cache[start..start + n]);
            read += n;
            self.pos += n as u64;
        }
        Ok(read)
    }

    /// Fills `buf` completely.
    ///
    /// # Errors
    /// Returns `Format` if the file ends first.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.pos;
        let n = self.read(buf)?;
        if n < buf.len() {
            return Err(EbError::Format(format!(
                "Read of {} bytes at {:#x} past end of file",
                buf.len(),
                start
            )));
        }
        Ok(())
    }

    /// Reads one whole page.
    pub fn read_page(&mut self, page: u64) -> Result<[u8; PAGE_SIZE as usize]> {
        let mut b = [0u8; PAGE_SIZE as usize];
        self.seek_page(page, 0)?;
        self.read_exact(&mut b)?;
        Ok(b)
    }

    fn fill_cache(&mut self, block: u64) -> Result<()> {
        if self.cache_block == Some(block) {
            return Ok(());
        }
        self.cache.resize(self.decoder.block_size(), 0);
        self.cache_block = None;
        let mut source = self.handle.lock().map_err(|_| EbError::LockPoisoned)?;
        self.decoder.load_block(&mut **source, block, &mut self.cache)?;
        self.cache_block = Some(block);
        Ok(())
    }
}

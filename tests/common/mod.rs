//! Synthetic EPWING books for integration tests.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use eb_reader::eb::codec::jis;
use eb_reader::eb::index_layer::{IndexWriter, Word};
use eb_reader::ebzip;

pub const PAGE: usize = 2048;

/// Article text of the "Tokyo" entry: a narrow run of full-width Latin
/// letters, a newline, 東京 and a newline.
pub const TOKYO_TEXT: &[u8] = &[
    0x1f, 0x02, 0x1f, 0x04, 0x23, 0x54, 0x23, 0x6f, 0x23, 0x6b, 0x23, 0x79, 0x23, 0x6f, 0x1f, 0x05, 0x1f,
    0x0a, 0x45, 0x6c, 0x35, 0x7e, 0x1f, 0x0a, 0x1f, 0x03,
];

pub fn jis_text(s: &str) -> Vec<u8> {
    jis::string_to_jisx0208(s)
}

/// A heading: the word in JIS X 0208 followed by a newline escape.
pub fn heading(s: &str) -> Vec<u8> {
    let mut b = jis_text(s);
    b.extend_from_slice(&[0x1f, 0x0a]);
    b
}

/// A plain article: begin text, the lines, end text.
pub fn article(lines: &[&str]) -> Vec<u8> {
    let mut b = vec![0x1f, 0x02];
    for line in lines {
        b.extend(jis_text(line));
        b.extend_from_slice(&[0x1f, 0x0a]);
    }
    b.extend_from_slice(&[0x1f, 0x03]);
    b
}

fn position(page: usize, offset: usize) -> u64 {
    ((page - 1) * PAGE + offset) as u64
}

struct Record {
    id: u8,
    start: u32,
    count: u32,
}

/// Builds a subbook text file. Page 1 is the index page, written last.
pub struct TextFile {
    data: Vec<u8>,
    records: Vec<Record>,
    refs: HashMap<String, (u64, u64)>,
    text_start: Option<usize>,
}

impl Default for TextFile {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFile {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; PAGE],
            records: Vec::new(),
            refs: HashMap::new(),
            text_start: None,
        }
    }

    fn next_page(&self) -> usize {
        self.data.len() / PAGE + 1
    }

    /// Appends `bytes` on fresh pages and returns the first page.
    pub fn pages(&mut self, bytes: &[u8]) -> usize {
        let page = self.next_page();
        self.data.extend_from_slice(bytes);
        let pad = (PAGE - self.data.len() % PAGE) % PAGE;
        self.data.resize(self.data.len() + pad, 0);
        page
    }

    /// Adds an article on its own page: heading first, text right after.
    pub fn article(&mut self, tag: &str, heading: &[u8], text: &[u8]) -> (u64, u64) {
        let mut bytes = heading.to_vec();
        bytes.extend_from_slice(text);
        let page = self.pages(&bytes);
        self.text_start.get_or_insert(page);
        let pos = (position(page, heading.len()), position(page, 0));
        self.refs.insert(tag.to_string(), pos);
        pos
    }

    pub fn record(&mut self, id: u8, start: usize, count: usize) {
        self.records.push(Record {
            id,
            start: start as u32,
            count: count as u32,
        });
    }

    /// Writes the pages of an index of `(key, tag)` pairs, keys already in
    /// the form the index style produces. Returns the start page and count.
    pub fn index_pages(&mut self, words: &[(Vec<u8>, &str)]) -> (usize, usize) {
        let set: BTreeSet<Word> = words
            .iter()
            .map(|(key, tag)| Word::new(key.clone(), *tag).unwrap())
            .collect();
        let mut writer = IndexWriter::new();
        writer.write(&set).unwrap();
        let start = self.next_page();
        let refs = self.refs.clone();
        let pages = writer.finish(start as u64, |tag| refs.get(tag).copied()).unwrap();
        self.pages(&pages);
        (start, pages.len() / PAGE)
    }

    /// Writes an index and declares it on the index page.
    pub fn index(&mut self, id: u8, words: &[(Vec<u8>, &str)]) {
        let (start, count) = self.index_pages(words);
        self.record(id, start, count);
    }

    pub fn build(mut self) -> Vec<u8> {
        if let Some(start) = self.text_start {
            let count = self.next_page() - start;
            self.records.insert(
                0,
                Record {
                    id: 0x00,
                    start: start as u32,
                    count: count as u32,
                },
            );
        }
        let page = &mut self.data[..PAGE];
        page[1] = self.records.len() as u8;
        for (i, r) in self.records.iter().enumerate() {
            let off = 16 * (i + 1);
            page[off] = r.id;
            page[off + 2..off + 6].copy_from_slice(&r.start.to_be_bytes());
            page[off + 6..off + 10].copy_from_slice(&r.count.to_be_bytes());
        }
        self.data
    }
}

pub enum Storage {
    Plain,
    Ebzip,
}

pub struct Subbook {
    pub directory: &'static str,
    pub title: &'static str,
    pub text: Vec<u8>,
    pub storage: Storage,
    /// File name and contents of the 16-dot wide font.
    pub wide16: Option<(&'static str, Vec<u8>)>,
}

/// A 16-dot font file of `count` glyphs from 0xa121. Glyph `i` is filled
/// with byte `i + 1`.
pub fn font16(count: u16, glyph_size: usize) -> Vec<u8> {
    let mut b = vec![0u8; PAGE];
    b[10..12].copy_from_slice(&0xa121u16.to_be_bytes());
    b[12..14].copy_from_slice(&count.to_be_bytes());
    for i in 0..count as usize {
        b.extend(std::iter::repeat(i as u8 + 1).take(glyph_size));
    }
    let pad = (PAGE - b.len() % PAGE) % PAGE;
    b.resize(b.len() + pad, 0);
    b
}

/// Writes an EPWING book (version 1 catalog) into `root`.
pub fn write_epwing(root: &Path, subbooks: &[Subbook]) {
    let mut catalog = vec![0u8; 16 + 164 * subbooks.len()];
    catalog[0..2].copy_from_slice(&(subbooks.len() as u16).to_be_bytes());
    catalog[2..4].copy_from_slice(&1u16.to_be_bytes());
    for (i, sub) in subbooks.iter().enumerate() {
        let e = &mut catalog[16 + 164 * i..16 + 164 * (i + 1)];
        let title = jis_text(sub.title);
        e[2..2 + title.len()].copy_from_slice(&title);
        e[82..82 + sub.directory.len()].copy_from_slice(sub.directory.as_bytes());
        e[94..96].copy_from_slice(&1u16.to_be_bytes());
        if let Some((name, _)) = &sub.wide16 {
            e[100..100 + name.len()].copy_from_slice(name.as_bytes());
        }

        let data = root.join(sub.directory).join("DATA");
        fs::create_dir_all(&data).unwrap();
        match sub.storage {
            Storage::Plain => fs::write(data.join("HONMON"), &sub.text).unwrap(),
            Storage::Ebzip => fs::write(data.join("HONMON.ebz"), ebzip::compress(&sub.text, 6).unwrap()).unwrap(),
        }
        if let Some((name, font)) = &sub.wide16 {
            let gaiji = root.join(sub.directory).join("GAIJI");
            fs::create_dir_all(&gaiji).unwrap();
            fs::write(gaiji.join(name), font).unwrap();
        }
    }
    fs::write(root.join("CATALOGS"), catalog).unwrap();
}

/// The dictionary subbook used by most tests: an alphabet word index
/// (0x92), its reversed end word index (0x72), a kanji word index (0x91),
/// a keyword index, a menu and one multi search.
pub fn dictionary_text() -> Vec<u8> {
    let mut text = TextFile::new();
    text.article("tokyo", &heading("Ｔｏｋｙｏ"), TOKYO_TEXT);
    text.article("kyoto", &heading("Ｋｙｏｔｏ"), &article(&["Kyoto", "京都"]));
    text.article("osaka", &heading("Ｏｓａｋａ"), &article(&["Osaka", "大阪"]));

    // index styles default to upper-casing Latin letters
    text.index(
        0x92,
        &[
            (jis_text("ＴＯＫＹＯ"), "tokyo"),
            (jis_text("ＫＹＯＴＯ"), "kyoto"),
            (jis_text("ＯＳＡＫＡ"), "osaka"),
        ],
    );
    text.index(
        0x72,
        &[
            (jis_text("ＯＹＫＯＴ"), "tokyo"),
            (jis_text("ＯＴＯＹＫ"), "kyoto"),
            (jis_text("ＡＫＡＳＯ"), "osaka"),
        ],
    );
    text.index(
        0x91,
        &[
            (jis_text("東京"), "tokyo"),
            (jis_text("京都"), "kyoto"),
            (jis_text("大阪"), "osaka"),
        ],
    );
    text.index(
        0x80,
        &[
            (jis_text("東京"), "tokyo"),
            (jis_text("首都"), "tokyo"),
            (jis_text("古都"), "kyoto"),
        ],
    );
    let menu = text.pages(&article(&["Menu"]));
    text.record(0x01, menu, 1);
    add_multi_search(&mut text);
    text.build()
}

/// Packed BCD of `n` in `len` bytes.
pub fn bcd(n: u64, len: usize) -> Vec<u8> {
    let digits = format!("{:0width$}", n, width = len * 2);
    digits
        .as_bytes()
        .chunks(2)
        .map(|d| ((d[0] - b'0') << 4) | (d[1] - b'0'))
        .collect()
}

fn candidate(label: &str, target_page: Option<usize>) -> Vec<u8> {
    let mut b = vec![0x1f, 0x43];
    b.extend(jis_text(label));
    b.extend_from_slice(&[0x1f, 0x63]);
    match target_page {
        Some(page) => {
            b.extend(bcd(page as u64, 4));
            b.extend(bcd(0, 2));
        }
        None => b.extend_from_slice(&[0; 6]),
    }
    b.extend_from_slice(&[0x1f, 0x0a]);
    b
}

fn candidate_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut b = vec![0x1f, 0x02];
    for item in items {
        b.extend_from_slice(item);
    }
    b.extend_from_slice(&[0x1f, 0x03]);
    b
}

/// One multi search with two entries: a place name and a region. The
/// region entry has a candidate list with one nested group and one group
/// whose list is empty.
fn add_multi_search(text: &mut TextFile) {
    let (names, names_count) = text.index_pages(&[
        (jis_text("東京"), "tokyo"),
        (jis_text("京都"), "kyoto"),
        (jis_text("大阪"), "osaka"),
    ]);
    let (regions, regions_count) = text.index_pages(&[
        (jis_text("関東"), "tokyo"),
        (jis_text("関西"), "kyoto"),
        (jis_text("関西"), "osaka"),
    ]);

    let nested = text.pages(&candidate_list(&[candidate("関東", None), candidate("関西", None)]));
    let islands = text.pages(&candidate_list(&[]));
    let top = text.pages(&candidate_list(&[
        candidate("本州", Some(nested)),
        candidate("海外", None),
        candidate("離島", Some(islands)),
    ]));

    let mut page = vec![0u8; PAGE];
    page[0..2].copy_from_slice(&2u16.to_be_bytes());
    let mut off = 16;
    let entries = [("地名", names, names_count, None), ("地方", regions, regions_count, Some(top))];
    for (label, start, count, candidates) in entries {
        page[off] = if candidates.is_some() { 2 } else { 1 };
        let label = jis_text(label);
        page[off + 2..off + 2 + label.len()].copy_from_slice(&label);
        off += 32;
        page[off] = 0x91;
        page[off + 2..off + 6].copy_from_slice(&(start as u32).to_be_bytes());
        page[off + 6..off + 10].copy_from_slice(&(count as u32).to_be_bytes());
        off += 16;
        if let Some(candidates) = candidates {
            page[off] = 0x01;
            page[off + 2..off + 6].copy_from_slice(&(candidates as u32).to_be_bytes());
            off += 16;
        }
    }
    let multi = text.pages(&page);
    text.record(0xff, multi, 1);
}

/// A subbook with a copyright notice and no search indexes.
pub fn notice_text() -> Vec<u8> {
    let mut text = TextFile::new();
    text.article("notice", &heading("Ｎｏｔｉｃｅ"), &article(&["Sample"]));
    let copyright = text.pages(&article(&["Copyright"]));
    text.record(0x02, copyright, 1);
    text.build()
}

/// Full-width form of an ASCII word, as stored in JIS X 0208 headings.
pub fn full_width(s: &str) -> String {
    s.chars()
        .map(|c| char::from_u32(c as u32 + 0xfee0).unwrap_or(c))
        .collect()
}

/// Word `i` of the word list book, e.g. `WORD007`.
pub fn list_word(i: usize) -> String {
    format!("WORD{:03}", i)
}

/// A subbook with `count` articles and an alphabet word index large enough
/// to need upper index pages once `count` is in the hundreds.
pub fn word_list_text(count: usize) -> Vec<u8> {
    let mut text = TextFile::new();
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        let word = full_width(&list_word(i));
        let tag = list_word(i);
        text.article(&tag, &heading(&word), &article(&[tag.as_str()]));
        words.push((jis_text(&word), tag));
    }
    let words: Vec<(Vec<u8>, &str)> = words.iter().map(|(k, t)| (k.clone(), t.as_str())).collect();
    text.index(0x92, &words);
    text.build()
}

/// Writes a one-subbook book holding [`word_list_text`].
pub fn write_word_list_book(root: &Path, count: usize) {
    write_epwing(
        root,
        &[Subbook {
            directory: "WORDS",
            title: "単語帳",
            text: word_list_text(count),
            storage: Storage::Plain,
            wide16: None,
        }],
    );
}

/// Writes the two-subbook book: a notice subbook first, the dictionary
/// second.
pub fn write_sample_book(root: &Path, storage: Storage) {
    write_epwing(
        root,
        &[
            Subbook {
                directory: "NOTICE",
                title: "注意",
                text: notice_text(),
                storage: Storage::Plain,
                wide16: None,
            },
            Subbook {
                directory: "DICT",
                title: "地名辞典",
                text: dictionary_text(),
                storage,
                wide16: Some(("GA16FULL", font16(4, 32))),
            },
        ],
    );
}

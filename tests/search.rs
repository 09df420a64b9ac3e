mod common;

use std::collections::BTreeSet;

use common::Storage;
use eb_reader::eb::index_layer::{IndexWriter, Word};
use eb_reader::{Book, EbError, NullHook, SearchResult, Searcher, SubBook};
use tempfile::{tempdir, TempDir};

fn sample_book(storage: Storage) -> (TempDir, Book) {
    let dir = tempdir().unwrap();
    common::write_sample_book(dir.path(), storage);
    let book = Book::open(dir.path()).unwrap();
    (dir, book)
}

fn collect(searcher: Searcher<'_>) -> Vec<SearchResult<'_>> {
    searcher.collect::<Result<Vec<_>, EbError>>().unwrap()
}

fn texts(sub: &SubBook, results: &[SearchResult<'_>]) -> Vec<String> {
    results
        .iter()
        .map(|r| r.text(&mut sub.plain_text_hook()).unwrap())
        .collect()
}

fn headings(sub: &SubBook, results: &[SearchResult<'_>]) -> Vec<String> {
    results
        .iter()
        .map(|r| r.heading(&mut sub.plain_text_hook()).unwrap())
        .collect()
}

#[test]
fn test_word_search_in_second_subbook() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_word("Tokyo").unwrap());
    assert_eq!(results.len(), 1);
    assert_eq!(texts(dict, &results), ["Tokyo\n東京\n"]);
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);
    assert_eq!(results[0].subbook().name(), "DICT");
}

#[test]
fn test_word_search_ebzip() {
    let (_dir, book) = sample_book(Storage::Ebzip);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_word("Tokyo").unwrap());
    assert_eq!(texts(dict, &results), ["Tokyo\n東京\n"]);
}

#[test]
fn test_word_search_prefix() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_word("Kyo").unwrap());
    assert_eq!(headings(dict, &results), ["Ｋｙｏｔｏ"]);
    assert_eq!(texts(dict, &results), ["Ｋｙｏｔｏ\n京都\n"]);

    // keys are stored upper-cased
    let results = collect(dict.search_word("osa").unwrap());
    assert_eq!(headings(dict, &results), ["Ｏｓａｋａ"]);
}

#[test]
fn test_exactword_search() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    assert!(collect(dict.search_exactword("Tok").unwrap()).is_empty());

    let results = collect(dict.search_exactword("tokyo").unwrap());
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);
}

#[test]
fn test_endword_search() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_endword("kyo").unwrap());
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);

    let results = collect(dict.search_endword("ka").unwrap());
    assert_eq!(headings(dict, &results), ["Ｏｓａｋａ"]);
}

#[test]
fn test_kanji_word_search() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_word("東京").unwrap());
    assert_eq!(texts(dict, &results), ["Tokyo\n東京\n"]);

    let results = collect(dict.search_word("大").unwrap());
    assert_eq!(headings(dict, &results), ["Ｏｓａｋａ"]);
}

#[test]
fn test_no_match() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    assert!(collect(dict.search_word("Nagoya").unwrap()).is_empty());
    assert!(collect(dict.search_word("  ").unwrap()).is_empty());
    assert!(collect(dict.search_word("").unwrap()).is_empty());
    assert!(collect(dict.search_cross(&["Tokyo"]).unwrap()).is_empty());

    // the notice subbook has no word index
    let notice = book.subbook(0).unwrap();
    assert!(collect(notice.search_word("Tokyo").unwrap()).is_empty());
}

#[test]
fn test_searcher_is_fused() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let mut searcher = dict.search_word("Tokyo").unwrap();
    assert!(searcher.next_result().unwrap().is_some());
    assert!(searcher.next_result().unwrap().is_none());
    assert!(searcher.next().is_none());
    assert!(Searcher::empty().next().is_none());
}

#[test]
fn test_heading_positions() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_word("Tokyo").unwrap());
    let r = results[0];
    assert!(r.heading_position() < r.text_position());
    assert_eq!(dict.next_heading_position(r.heading_position()).unwrap(), r.text_position());

    // rendering through a hook that drops everything still succeeds
    r.text(&mut NullHook).unwrap();
}

#[test]
fn test_keyword_search() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    let results = collect(dict.search_keyword(&["首都"]).unwrap());
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);

    let results = collect(dict.search_keyword(&["東京", "首都"]).unwrap());
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);

    assert!(collect(dict.search_keyword(&["古都", "首都"]).unwrap()).is_empty());
}

#[test]
fn test_multi_search() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();

    let results = collect(dict.search_multi(0, &["", "関西"]).unwrap());
    assert_eq!(headings(dict, &results), ["Ｋｙｏｔｏ", "Ｏｓａｋａ"]);

    let results = collect(dict.search_multi(0, &["大阪", "関西"]).unwrap());
    assert_eq!(headings(dict, &results), ["Ｏｓａｋａ"]);

    assert!(collect(dict.search_multi(0, &["東京", "関西"]).unwrap()).is_empty());
}

#[test]
fn test_multi_search_arguments() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    assert!(matches!(dict.search_multi(1, &["東京"]), Err(EbError::InvalidArgument(_))));
    assert!(matches!(
        dict.search_multi(0, &["東京", "関東", "本州"]),
        Err(EbError::InvalidArgument(_))
    ));

    let notice = book.subbook(0).unwrap();
    assert!(collect(notice.search_multi(0, &["東京"]).unwrap()).is_empty());
}

#[test]
fn test_escaped_word() {
    let (_dir, book) = sample_book(Storage::Plain);
    let dict = book.subbook(1).unwrap();
    // 東 is 0x456c in JIS X 0208
    let results = collect(dict.search_word(r"\456c京").unwrap());
    assert_eq!(headings(dict, &results), ["Ｔｏｋｙｏ"]);
}

fn word_list_book(count: usize) -> (TempDir, Book) {
    let dir = tempdir().unwrap();
    common::write_word_list_book(dir.path(), count);
    let book = Book::open(dir.path()).unwrap();
    (dir, book)
}

#[test]
fn test_word_list_index_has_upper_pages() {
    let words: BTreeSet<Word> = (0..400)
        .map(|i| Word::new(common::jis_text(&common::full_width(&common::list_word(i))), common::list_word(i)).unwrap())
        .collect();
    let mut writer = IndexWriter::new();
    writer.write(&words).unwrap();
    assert!(writer.depth() >= 2);
}

#[test]
fn test_search_through_upper_index_pages() {
    let (_dir, book) = word_list_book(400);
    let sub = book.subbook(0).unwrap();

    for i in [0, 1, 74, 75, 199, 398, 399] {
        let word = common::list_word(i);
        let results = collect(sub.search_word(&word.to_lowercase()).unwrap());
        assert_eq!(headings(sub, &results), [common::full_width(&word)], "word {}", i);
    }

    let results = collect(sub.search_exactword("word250").unwrap());
    assert_eq!(texts(sub, &results), [format!("{}\n", common::full_width("WORD250"))]);

    assert!(collect(sub.search_word("word400").unwrap()).is_empty());
    assert!(collect(sub.search_word("word1995").unwrap()).is_empty());
    assert!(collect(sub.search_word("a").unwrap()).is_empty());
    assert!(collect(sub.search_word("zebra").unwrap()).is_empty());
}

#[test]
fn test_prefix_search_spans_leaf_pages() {
    let (_dir, book) = word_list_book(400);
    let sub = book.subbook(0).unwrap();

    let results = collect(sub.search_word("word0").unwrap());
    let expected: Vec<String> = (0..100).map(|i| common::full_width(&common::list_word(i))).collect();
    assert_eq!(headings(sub, &results), expected);

    let results = collect(sub.search_word("word").unwrap());
    assert_eq!(results.len(), 400);
}

//! Property checks for segmentation, merging and the encoding facade.
//!
//! Inputs come from a fixed corpus plus deterministic pseudo-random strings,
//! so failures are reproducible.

use vibe_budget::bpe::{approximate_merges, approximate_merges_with_cap, MAX_MERGE_PASSES};
use vibe_budget::{
    Encoding, EncodingConfig, MergeTable, Segmenter, FOUR_CLASS_PATTERN, LEGACY_PATTERN,
};

const CORPUS: &[&str] = &[
    "",
    " ",
    "\n\n\t  ",
    "!!!???",
    "hello world",
    "Test123!",
    "fn main() { println!(\"héllo\"); } // 42",
    "naïve café, São Paulo, Zürich",
    "中文混合English123文本",
    "emoji 🦀🎉 and ZWJ 👩‍💻",
    "snake_case and kebab-case and CamelCase",
    "١٢٣ arabic digits and ⅷ roman",
    "tabs\tand\r\nwindows newlines",
    "हिन्दी and cafe\u{301} with marks",
];

/// Small xorshift generator for reproducible strings.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn string(&mut self, len: usize) -> String {
        const POOL: &[char] = &[
            'a', 'b', 'e', 'h', 'l', 'o', 'r', 't', 'Z', '0', '7', ' ', ' ', '\n', '\t', '!', '_',
            '-', '{', '}', 'é', 'ß', 'ж', '中', '文', '🦀', '\u{301}', '\u{a0}',
        ];
        (0..len)
            .map(|_| POOL[(self.next() % POOL.len() as u64) as usize])
            .collect()
    }
}

fn inputs() -> Vec<String> {
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    let mut inputs: Vec<String> = CORPUS.iter().map(|s| s.to_string()).collect();
    for len in [1, 2, 3, 8, 33, 200] {
        for _ in 0..10 {
            inputs.push(rng.string(len));
        }
    }
    inputs
}

fn table(keys: &[&str]) -> MergeTable {
    MergeTable::from_pairs(keys.iter().enumerate().map(|(i, k)| (*k, i as u32 + 1)))
}

fn encoding_with(merges: &[&str]) -> Encoding {
    let config = EncodingConfig::new("props", FOUR_CLASS_PATTERN)
        .with_merges(merges.iter().enumerate().map(|(i, k)| (*k, i as u32 + 1)));
    Encoding::new(&config).unwrap()
}

const ENGLISH_MERGES: &[&str] = &[
    "er", "es", "ed", "th", "he", "in", "an", "ll", "lo", "or", "wo", "ld", "st", "é",
];

#[test]
fn test_segmentation_partitions_input() {
    for pattern in [FOUR_CLASS_PATTERN, LEGACY_PATTERN, "([broken"] {
        let segmenter = Segmenter::new(pattern);
        for text in inputs() {
            let chunks = segmenter.segment(&text);
            assert_eq!(chunks.concat(), text, "pattern {:?}", pattern);
            assert!(chunks.iter().all(|c| !c.is_empty()), "empty chunk in {:?}", text);
            assert_eq!(chunks.is_empty(), text.is_empty());
        }
    }
}

#[test]
fn test_unicode_classes() {
    let segmenter = Segmenter::new(FOUR_CLASS_PATTERN);
    assert_eq!(
        segmenter.segment("١٢٣ arabic digits and ⅷ roman"),
        vec!["١٢٣", " ", "arabic", " ", "digits", " ", "and", " ", "ⅷ", " ", "roman"]
    );
    assert_eq!(
        segmenter.segment("हिन्दी and cafe\u{301} with marks")[..3],
        ["हिन्दी", " ", "and"]
    );
    assert_eq!(segmenter.segment("3½"), vec!["3", "½"]);
}

#[test]
fn test_chunks_do_not_split_further() {
    let segmenter = Segmenter::new(FOUR_CLASS_PATTERN);
    for text in inputs() {
        for chunk in segmenter.segment(&text) {
            assert_eq!(segmenter.segment(chunk), vec![chunk], "in {:?}", text);
        }
    }
}

#[test]
fn test_adjacent_chunks_differ_in_class() {
    let segmenter = Segmenter::new(FOUR_CLASS_PATTERN);
    for text in inputs() {
        let chunks = segmenter.segment(&text);
        for pair in chunks.windows(2) {
            let joined = format!("{}{}", pair[0], pair[1]);
            assert_eq!(segmenter.segment(&joined).len(), 2, "{:?} merged", pair);
        }
    }
}

#[test]
fn test_merge_terminates_on_adversarial_tables() {
    let tables = [
        table(&["ab", "ba", "aa", "bb"]),
        table(&["aa"]),
        MergeTable::from_byte_pairs(
            (0..=255u8).flat_map(|a| (0..=255u8).map(move |b| ((a, b), a as u32 * 256 + b as u32))),
        ),
    ];
    let inputs = [
        "ab".repeat(50),
        "a".repeat(100),
        "abba".repeat(25),
        "🦀".repeat(25),
    ];

    for t in &tables {
        for input in &inputs {
            let outcome = approximate_merges(input.as_bytes(), t);
            assert!(outcome.passes <= MAX_MERGE_PASSES);
            assert!(!outcome.symbols.is_empty());
            assert!(outcome.symbols.len() <= input.len());
            assert!(outcome.symbols.len() >= input.len().div_ceil(2));
        }
    }
}

#[test]
fn test_pass_cap_reports_exhaustion() {
    // 1200 disjoint blocks, each needing its own pass: (low, high) pairs only,
    // so the high-low seams between blocks never match
    let pairs: Vec<((u8, u8), u32)> = (0..128u8)
        .flat_map(|low| (128..=255u8).map(move |high| (low, high)))
        .enumerate()
        .map(|(rank, pair)| (pair, rank as u32))
        .collect();
    let t = MergeTable::from_byte_pairs(pairs);

    let bytes: Vec<u8> = (0..1200usize)
        .flat_map(|i| [(i % 128) as u8, (128 + i / 128) as u8])
        .collect();

    let outcome = approximate_merges(&bytes, &t);
    assert!(outcome.exhausted);
    assert_eq!(outcome.passes, MAX_MERGE_PASSES);
    assert_eq!(outcome.symbols.len(), 2400 - MAX_MERGE_PASSES);

    let uncapped = approximate_merges_with_cap(&bytes, &t, 5000);
    assert!(!uncapped.exhausted);
    assert_eq!(uncapped.passes, 1200);
    assert_eq!(uncapped.symbols.len(), 1200);
}

#[test]
fn test_ascii_roundtrip_with_empty_table() {
    let encoding = encoding_with(&[]);
    let mut rng = Rng(42);
    for _ in 0..50 {
        let len = (rng.next() % 64) as usize;
        let text: String = (0..len)
            .map(|_| (0x20 + (rng.next() % 0x5f) as u8) as char)
            .collect();
        assert_eq!(encoding.decode(&encoding.encode(&text)), text);
    }
}

#[test]
fn test_roundtrip_with_merges() {
    let encoding = encoding_with(ENGLISH_MERGES);
    for text in inputs() {
        assert_eq!(encoding.decode(&encoding.encode(&text)), text);
    }
}

#[test]
fn test_merges_never_increase_count() {
    let baseline = encoding_with(&[]);
    for k in 1..=ENGLISH_MERGES.len() {
        let encoding = encoding_with(&ENGLISH_MERGES[..k]);
        for text in inputs() {
            assert!(
                encoding.count_tokens(&text) <= baseline.count_tokens(&text),
                "{} merges increased count for {:?}",
                k,
                text
            );
        }
    }
}

#[test]
fn test_count_matches_encode() {
    let encoding = encoding_with(ENGLISH_MERGES);
    for text in inputs() {
        assert_eq!(encoding.count_tokens(&text), encoding.encode(&text).len());
    }
}

#[test]
fn test_cache_does_not_change_results() {
    let merges: Vec<(&str, u32)> = ENGLISH_MERGES
        .iter()
        .enumerate()
        .map(|(i, k)| (*k, i as u32 + 1))
        .collect();
    let tiny = Encoding::new(
        &EncodingConfig::new("tiny", FOUR_CLASS_PATTERN).with_merges(merges.iter().copied()),
    )
    .unwrap()
    .with_cache_size(1);
    let large = encoding_with(ENGLISH_MERGES);

    for text in inputs() {
        assert_eq!(tiny.encode(&text), large.encode(&text));
        // second pass is served from the cache
        assert_eq!(large.encode(&text), tiny.encode(&text));
    }
}

#[test]
fn test_special_token_beats_merges() {
    let config = EncodingConfig::new("special", FOUR_CLASS_PATTERN)
        .with_merges([("he", 1), ("ll", 2)])
        .with_special_tokens([("hello", 99_999)]);
    let encoding = Encoding::new(&config).unwrap();

    assert_eq!(encoding.encode("hello"), vec![99_999]);
    assert_eq!(encoding.encode("say hello").last(), Some(&99_999));
    // Not a whole chunk, so merges apply
    assert_eq!(encoding.count_tokens("helloo"), 4);
}

#[test]
fn test_scenario_empty_input() {
    for encoding in [encoding_with(&[]), encoding_with(ENGLISH_MERGES)] {
        assert_eq!(encoding.count_tokens(""), 0);
    }
}

#[test]
fn test_scenario_hello_world_bytes() {
    let encoding = encoding_with(&[]);
    assert_eq!(encoding.base_vocabulary_start(), 256);
    assert_eq!(encoding.count_tokens("hello world"), 11);
}

#[test]
fn test_scenario_single_merge() {
    assert_eq!(encoding_with(&["he"]).count_tokens("hello"), 4);
    assert_eq!(encoding_with(&[]).count_tokens("hello"), 5);
}

#[test]
fn test_scenario_ascii_roundtrip() {
    let encoding = encoding_with(&[]);
    assert_eq!(encoding.decode(&encoding.encode("Test123!")), "Test123!");
}

#[test]
fn test_scenario_repeating_input_terminates() {
    let t = table(&["xy", "yx", "xx", "yy"]);
    let input = "xy".repeat(50);

    let outcome = approximate_merges(input.as_bytes(), &t);
    assert!(outcome.passes <= MAX_MERGE_PASSES);
    assert!(!outcome.exhausted);
    assert!(outcome.symbols.len() <= 100);
    assert_eq!(outcome.symbols.len(), 50);
}

//! Merge-rank and special-token tables.
//!
//! A [`MergeTable`] maps an adjacent byte pair to its merge rank. Keys arrive as
//! two-character strings (`"he"`, `"er"`), and a key is accepted only when its
//! UTF-8 form is exactly two bytes. This is wider than a two-character key:
//! a single two-byte character such as `"é"` is accepted too, and its bytes
//! `C3 A9` become the pair. Two-character keys with a non-ASCII character are
//! wider than two bytes and are skipped.
//!
//! Tables iterate in ascending rank. Equal ranks keep insertion order, or key
//! order when built from a sorted map.
//!
//! # Merge Table Format
//!
//! [`load_merge_table`] reads the same line shape as tiktoken vocab files, but
//! every token must decode to exactly two bytes:
//!
//! ```text
//! aGU= 1
//! ZXI= 2
//! ```
//!
//! Where `aGU=` decodes to `he` (rank 1) and `ZXI=` decodes to `er` (rank 2).

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors that can occur when loading merge tables.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("Invalid base64 encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Invalid line format: {0}")]
    ParseError(String),
    #[error("Line {line}: merge pair must be 2 bytes, got {width}")]
    PairWidth { line: usize, width: usize },
}

/// One byte-pair merge rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MergeEntry {
    pub pair: (u8, u8),
    pub rank: u32,
}

/// Immutable byte-pair merge table, iterated in ascending rank.
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    entries: Vec<MergeEntry>,
    positions: FxHashMap<(u8, u8), usize>,
}

/// Decode a merge key into its byte pair.
///
/// Returns `None` unless the key's UTF-8 encoding is exactly two bytes.
pub fn pair_key(key: &str) -> Option<(u8, u8)> {
    match key.as_bytes() {
        &[a, b] => Some((a, b)),
        _ => None,
    }
}

impl MergeTable {
    /// An empty table: encodings built with it run in byte-level-only mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from string keys and ranks.
    ///
    /// Keys that are not two UTF-8 bytes wide are skipped. A pair listed twice
    /// keeps its lowest rank.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: AsRef<str>,
    {
        let bytes = pairs.into_iter().filter_map(|(key, rank)| {
            let key = key.as_ref();
            match pair_key(key) {
                Some(pair) => Some((pair, rank)),
                None => {
                    tracing::debug!(key, rank, "skipping merge key that is not a byte pair");
                    None
                }
            }
        });
        Self::from_byte_pairs(bytes)
    }

    /// Build a table from raw byte pairs and ranks.
    pub fn from_byte_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = ((u8, u8), u32)>,
    {
        let mut best: FxHashMap<(u8, u8), (u32, usize)> = FxHashMap::default();
        for (inserted, (pair, rank)) in pairs.into_iter().enumerate() {
            best.entry(pair)
                .and_modify(|slot| {
                    if rank < slot.0 {
                        *slot = (rank, inserted);
                    }
                })
                .or_insert((rank, inserted));
        }

        let mut ordered: Vec<((u8, u8), u32, usize)> = best
            .into_iter()
            .map(|(pair, (rank, inserted))| (pair, rank, inserted))
            .collect();
        ordered.sort_by_key(|&(_, rank, inserted)| (rank, inserted));

        let entries: Vec<MergeEntry> = ordered
            .into_iter()
            .map(|(pair, rank, _)| MergeEntry { pair, rank })
            .collect();
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.pair, i))
            .collect();

        Self { entries, positions }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge rank of a pair, if present.
    pub fn rank(&self, pair: (u8, u8)) -> Option<u32> {
        self.positions.get(&pair).map(|&i| self.entries[i].rank)
    }

    /// Position of a pair in iteration order. Lower positions merge first.
    #[inline]
    pub fn position(&self, pair: (u8, u8)) -> Option<usize> {
        self.positions.get(&pair).copied()
    }

    pub fn contains(&self, pair: (u8, u8)) -> bool {
        self.positions.contains_key(&pair)
    }

    /// Entries in iteration (rank) order.
    pub fn iter(&self) -> impl Iterator<Item = &MergeEntry> {
        self.entries.iter()
    }
}

/// Reserved token strings and their IDs.
#[derive(Debug, Clone, Default)]
pub struct SpecialTokenTable {
    tokens: FxHashMap<String, u32>,
    by_id: FxHashMap<u32, String>,
}

impl SpecialTokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(token, id)` pairs. A later duplicate string replaces an earlier one.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        let tokens: FxHashMap<String, u32> =
            pairs.into_iter().map(|(k, id)| (k.into(), id)).collect();
        let by_id = tokens.iter().map(|(k, v)| (*v, k.clone())).collect();
        Self { tokens, by_id }
    }

    /// ID of an exact special-token string.
    #[inline]
    pub fn get(&self, token: &str) -> Option<u32> {
        self.tokens.get(token).copied()
    }

    /// Whether `id` is reserved for a special token.
    #[inline]
    pub fn contains_id(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// String for a special-token ID.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Load a merge table from raw bytes.
///
/// Format: `base64_pair rank\n` per line, blank lines ignored.
/// Example: `aGU= 1` (where "aGU=" decodes to "he")
pub fn load_merge_table(data: &[u8]) -> Result<MergeTable, VocabError> {
    let mut pairs = Vec::new();

    for (index, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let space_pos = line
            .iter()
            .rposition(|&b| b == b' ')
            .ok_or_else(|| VocabError::ParseError("Missing space separator".to_string()))?;

        let pair_b64 = &line[..space_pos];
        let rank_str = &line[space_pos + 1..];

        let pair = STANDARD.decode(pair_b64)?;
        let pair = match pair.as_slice() {
            &[a, b] => (a, b),
            other => {
                return Err(VocabError::PairWidth {
                    line: index + 1,
                    width: other.len(),
                })
            }
        };

        let rank_str = std::str::from_utf8(rank_str)
            .map_err(|_| VocabError::ParseError("Invalid UTF-8 in rank".to_string()))?;
        let rank: u32 = rank_str
            .trim()
            .parse()
            .map_err(|_| VocabError::ParseError(format!("Invalid rank: {}", rank_str)))?;

        pairs.push((pair, rank));
    }

    Ok(MergeTable::from_byte_pairs(pairs))
}

//! Byte-pair merge approximation.
//!
//! This is not a trained BPE vocabulary walk. A chunk starts as raw UTF-8 bytes
//! and each pass picks the first [`MergeTable`] entry (in rank order) that occurs
//! anywhere in the sequence. Every non-overlapping occurrence of that pair is then
//! collapsed, scanning left to right, and the next pass starts from the beginning.
//!
//! Only raw bytes take part in a pair. A merged symbol never merges again, so each
//! pass shortens the sequence by at least one and the loop always terminates. The
//! pass cap ([`MAX_MERGE_PASSES`]) still bounds the work. Reaching it is normal
//! termination: the partially merged sequence is returned with
//! [`MergeOutcome::exhausted`] set.
//!
//! # Symbol Space
//!
//! - `0..=255`: an unmerged byte
//! - `256 + a * 256 + b`: the merge of bytes `a` and `b` (see [`merged_symbol`])
//!
//! The encoding layer adds its base vocabulary offset to both ranges.

use super::vocab::MergeTable;

/// Upper bound on merge passes per chunk.
pub const MAX_MERGE_PASSES: usize = 1000;

/// Number of symbols reserved for raw bytes.
pub const BYTE_SYMBOLS: u32 = 256;

/// Largest symbol [`merged_symbol`] can produce.
pub const MAX_MERGED_SYMBOL: u32 = BYTE_SYMBOLS + 255 * 256 + 255;

/// Result of approximating merges over one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Byte and merged-pair symbols, in order.
    pub symbols: Vec<u32>,
    /// Passes that applied a merge.
    pub passes: usize,
    /// True when the pass cap stopped the loop before the table ran dry.
    pub exhausted: bool,
}

/// Symbol for the merge of bytes `a` and `b`.
#[inline]
pub const fn merged_symbol(a: u8, b: u8) -> u32 {
    BYTE_SYMBOLS + (a as u32) * 256 + b as u32
}

/// Inverse of [`merged_symbol`]. `None` for raw-byte symbols and out-of-range values.
#[inline]
pub const fn split_merged_symbol(symbol: u32) -> Option<(u8, u8)> {
    if symbol < BYTE_SYMBOLS || symbol > MAX_MERGED_SYMBOL {
        return None;
    }
    let offset = symbol - BYTE_SYMBOLS;
    Some(((offset / 256) as u8, (offset % 256) as u8))
}

/// Approximate merges over `bytes` with the default pass cap.
pub fn approximate_merges(bytes: &[u8], table: &MergeTable) -> MergeOutcome {
    approximate_merges_with_cap(bytes, table, MAX_MERGE_PASSES)
}

/// Approximate merges over `bytes`, applying at most `max_passes` merge passes.
pub fn approximate_merges_with_cap(
    bytes: &[u8],
    table: &MergeTable,
    max_passes: usize,
) -> MergeOutcome {
    let mut symbols: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();

    if symbols.len() <= 1 || table.is_empty() {
        return MergeOutcome {
            symbols,
            passes: 0,
            exhausted: false,
        };
    }

    let mut passes = 0;
    let mut scratch = Vec::with_capacity(symbols.len());

    loop {
        let Some((a, b)) = first_present_pair(&symbols, table) else {
            return MergeOutcome {
                symbols,
                passes,
                exhausted: false,
            };
        };

        if passes == max_passes {
            tracing::trace!(
                passes,
                remaining = symbols.len(),
                "merge pass cap reached, returning partial result"
            );
            return MergeOutcome {
                symbols,
                passes,
                exhausted: true,
            };
        }

        merge_all(&symbols, (a, b), &mut scratch);
        std::mem::swap(&mut symbols, &mut scratch);
        passes += 1;
    }
}

/// The table entry with the lowest position among adjacent raw-byte pairs.
///
/// Equivalent to walking the table in order and stopping at the first entry that
/// occurs, but costs one pass over the sequence instead of one per entry.
fn first_present_pair(symbols: &[u32], table: &MergeTable) -> Option<(u8, u8)> {
    let mut best: Option<(usize, (u8, u8))> = None;

    for window in symbols.windows(2) {
        let (Some(a), Some(b)) = (as_byte(window[0]), as_byte(window[1])) else {
            continue;
        };
        if let Some(pos) = table.position((a, b)) {
            if best.map_or(true, |(p, _)| pos < p) {
                best = Some((pos, (a, b)));
                if pos == 0 {
                    break;
                }
            }
        }
    }

    best.map(|(_, pair)| pair)
}

/// Replace every non-overlapping occurrence of `pair`, left to right.
fn merge_all(symbols: &[u32], pair: (u8, u8), out: &mut Vec<u32>) {
    out.clear();
    let (a, b) = (pair.0 as u32, pair.1 as u32);
    let merged = merged_symbol(pair.0, pair.1);

    let mut i = 0;
    while i < symbols.len() {
        if i + 1 < symbols.len() && symbols[i] == a && symbols[i + 1] == b {
            out.push(merged);
            i += 2;
        } else {
            out.push(symbols[i]);
            i += 1;
        }
    }
}

#[inline]
fn as_byte(symbol: u32) -> Option<u8> {
    u8::try_from(symbol).ok()
}

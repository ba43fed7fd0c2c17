use aho_corasick::{AhoCorasick, MatchKind};
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use thiserror::Error;

use super::bpe::{approximate_merges, split_merged_symbol, BYTE_SYMBOLS, MAX_MERGED_SYMBOL};
use super::segmenter::Segmenter;
use super::vocab::{MergeTable, SpecialTokenTable, VocabError};

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Encoding \"{name}\" not found. Available encodings: {available}")]
    UnknownEncoding { name: String, available: String },
    #[error("Special token {token:?} has ID {id}, which lies in the byte/merge ID space")]
    SpecialTokenCollision { token: String, id: u32 },
    #[error("Base vocabulary start {0} leaves no room for merged token IDs")]
    BaseOutOfRange(u32),
    #[error("Invalid encoding config: {0}")]
    ConfigError(#[from] serde_json::Error),
    #[error("Vocabulary error: {0}")]
    VocabError(#[from] VocabError),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
}

/// Default base vocabulary start (byte 0 maps to this ID).
pub const DEFAULT_BASE_VOCABULARY_START: u32 = 256;

/// Default cache size for encoded chunks
pub const DEFAULT_CACHE_SIZE: usize = 4096;

fn default_base_vocabulary_start() -> u32 {
    DEFAULT_BASE_VOCABULARY_START
}

/// Serializable configuration for one named encoding.
///
/// Field names follow the JSON shape `{name, segmentationPattern, mergeTable,
/// specialTokens, baseVocabularyStart?}`. Any other key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncodingConfig {
    pub name: String,
    pub segmentation_pattern: String,
    #[serde(default)]
    pub merge_table: BTreeMap<String, u32>,
    #[serde(default)]
    pub special_tokens: BTreeMap<String, u32>,
    #[serde(default = "default_base_vocabulary_start")]
    pub base_vocabulary_start: u32,
}

impl EncodingConfig {
    /// A byte-level-only configuration: no merges, no special tokens.
    pub fn new(name: impl Into<String>, segmentation_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segmentation_pattern: segmentation_pattern.into(),
            merge_table: BTreeMap::new(),
            special_tokens: BTreeMap::new(),
            base_vocabulary_start: DEFAULT_BASE_VOCABULARY_START,
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, EncodingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_merges<I, K>(mut self, merges: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        self.merge_table
            .extend(merges.into_iter().map(|(k, rank)| (k.into(), rank)));
        self
    }

    pub fn with_special_tokens<I, K>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        self.special_tokens
            .extend(tokens.into_iter().map(|(k, id)| (k.into(), id)));
        self
    }

    pub fn with_base_vocabulary_start(mut self, start: u32) -> Self {
        self.base_vocabulary_start = start;
        self
    }
}

/// Read-only metadata about an encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingInfo {
    pub name: String,
    pub pattern: String,
    pub vocab_size: usize,
    pub special_tokens_count: usize,
}

/// Token IDs paired with a display string for each token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenizedText {
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
}

struct CachedChunk {
    bytes: Box<[u8]>,
    symbols: Vec<u32>,
}

/// Approximate byte-level encoding: segmentation, merge table and special tokens
/// bound together.
///
/// # ID Layout
///
/// - special tokens: the IDs given in the special-token table
/// - unmerged byte `b`: `base_vocabulary_start + b`
/// - merged pair `(a, b)`: `base_vocabulary_start + 256 + a * 256 + b`
///
/// Construction rejects special-token IDs that fall in either of the last two
/// ranges, so the three never collide.
///
/// # Caching
///
/// Merge results are memoized per chunk in an LRU cache. The cache never changes
/// what `encode` returns; it only avoids recomputing repeated identifiers and
/// whitespace runs in source files.
///
/// # Batch Encoding
///
/// [`encode_batch`](Self::encode_batch) and
/// [`count_tokens_batch`](Self::count_tokens_batch) parallelize across texts with
/// Rayon. A single text is always processed sequentially.
pub struct Encoding {
    name: String,
    segmenter: Segmenter,
    merges: MergeTable,
    special_tokens: SpecialTokenTable,
    special_token_strings: Vec<String>,
    special_matcher: Option<AhoCorasick>,
    base_vocabulary_start: u32,
    chunk_cache: Mutex<LruCache<u64, CachedChunk>>,
    cache_size: usize,
}

impl Encoding {
    /// Build an encoding from its configuration.
    ///
    /// Empty merge and special-token tables are valid. An invalid segmentation
    /// pattern does not fail construction; the encoding then treats every input
    /// as one chunk.
    ///
    /// # Errors
    /// Fails if a special-token ID lies in the byte or merged-pair ID range, or if
    /// the base vocabulary start is too large for the merged range to fit in `u32`.
    pub fn new(config: &EncodingConfig) -> Result<Self, EncodingError> {
        let merges = MergeTable::from_pairs(
            config
                .merge_table
                .iter()
                .map(|(key, &rank)| (key.as_str(), rank)),
        );
        let special_tokens = SpecialTokenTable::from_pairs(
            config
                .special_tokens
                .iter()
                .map(|(token, &id)| (token.clone(), id)),
        );

        Self::from_parts(
            &config.name,
            Segmenter::new(&config.segmentation_pattern),
            merges,
            special_tokens,
            config.base_vocabulary_start,
        )
    }

    /// Build an encoding from already constructed tables.
    pub fn from_parts(
        name: &str,
        segmenter: Segmenter,
        merges: MergeTable,
        special_tokens: SpecialTokenTable,
        base_vocabulary_start: u32,
    ) -> Result<Self, EncodingError> {
        if base_vocabulary_start > u32::MAX - MAX_MERGED_SYMBOL {
            return Err(EncodingError::BaseOutOfRange(base_vocabulary_start));
        }

        for (token, id) in special_tokens.iter() {
            let collides = id
                .checked_sub(base_vocabulary_start)
                .is_some_and(|offset| {
                    offset < BYTE_SYMBOLS
                        || split_merged_symbol(offset).is_some_and(|pair| merges.contains(pair))
                });
            if collides {
                return Err(EncodingError::SpecialTokenCollision {
                    token: token.to_string(),
                    id,
                });
            }
        }

        let mut special_token_strings: Vec<String> =
            special_tokens.iter().map(|(k, _)| k.to_string()).collect();
        special_token_strings.sort();
        let special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            // Leftmost-longest so "<|fim|>" never shadows "<|fim_prefix|>"
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&special_token_strings)?,
            )
        };

        tracing::debug!(
            name,
            merges = merges.len(),
            special_tokens = special_tokens.len(),
            base_vocabulary_start,
            fallback_segmentation = segmenter.is_fallback(),
            "built encoding"
        );

        Ok(Self {
            name: name.to_string(),
            segmenter,
            merges,
            special_tokens,
            special_token_strings,
            special_matcher,
            base_vocabulary_start,
            chunk_cache: Mutex::new(new_chunk_cache(DEFAULT_CACHE_SIZE)),
            cache_size: DEFAULT_CACHE_SIZE,
        })
    }

    /// Set the chunk cache capacity (default [`DEFAULT_CACHE_SIZE`]).
    ///
    /// Replaces the cache, so previously cached chunks are dropped. A capacity
    /// of zero is treated as one.
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.chunk_cache = Mutex::new(new_chunk_cache(cache_size));
        self.cache_size = cache_size;
        self
    }

    /// Switch the segmentation backend to PCRE2.
    ///
    /// # Errors
    /// Returns an error if the `pcre2` feature is not enabled.
    #[cfg(feature = "pcre2")]
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, EncodingError> {
        let pattern = self.segmenter.pattern().to_string();
        self.segmenter = if use_pcre2 {
            Segmenter::new_pcre2(&pattern)
        } else {
            Segmenter::new(&pattern)
        };
        Ok(self)
    }

    /// Switch to PCRE2 backend (stub when feature not enabled).
    #[cfg(not(feature = "pcre2"))]
    pub fn pcre2(self, use_pcre2: bool) -> Result<Self, EncodingError> {
        if use_pcre2 {
            Err(EncodingError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.segmenter.pattern()
    }

    pub fn base_vocabulary_start(&self) -> u32 {
        self.base_vocabulary_start
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    pub fn merge_table(&self) -> &MergeTable {
        &self.merges
    }

    pub fn special_tokens(&self) -> &SpecialTokenTable {
        &self.special_tokens
    }

    /// Compute a fast hash for a byte slice to use as an LRU cache key.
    #[inline]
    fn hash_slice(slice: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        slice.hash(&mut hasher);
        hasher.finish()
    }

    /// Run `f` over the merge symbols of one chunk, consulting the cache.
    fn with_chunk_symbols<R>(&self, bytes: &[u8], f: impl FnOnce(&[u32]) -> R) -> R {
        // Nothing to merge: the symbols are the bytes themselves
        if bytes.len() <= 1 || self.merges.is_empty() {
            let symbols: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();
            return f(&symbols);
        }

        let hash = Self::hash_slice(bytes);
        if let Ok(mut cache) = self.chunk_cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                if *cached.bytes == *bytes {
                    return f(&cached.symbols);
                }
            }
        }

        let outcome = approximate_merges(bytes, &self.merges);
        let result = f(&outcome.symbols);

        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.put(
                hash,
                CachedChunk {
                    bytes: bytes.into(),
                    symbols: outcome.symbols,
                },
            );
        }

        result
    }

    /// Encode one chunk, appending its IDs to `out`.
    fn encode_chunk_into(&self, chunk: &str, out: &mut Vec<u32>) {
        if let Some(id) = self.special_tokens.get(chunk) {
            out.push(id);
            return;
        }

        let base = self.base_vocabulary_start;
        self.with_chunk_symbols(chunk.as_bytes(), |symbols| {
            out.extend(symbols.iter().map(|&s| base + s));
        });
    }

    fn chunk_token_count(&self, chunk: &str) -> usize {
        if self.special_tokens.get(chunk).is_some() {
            return 1;
        }
        self.with_chunk_symbols(chunk.as_bytes(), <[u32]>::len)
    }

    /// Encode text to token IDs.
    ///
    /// A chunk that exactly equals a special-token string becomes that token's ID.
    /// Special tokens embedded in a longer chunk are not recognised here; see
    /// [`encode_with_special`](Self::encode_with_special).
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut result = Vec::with_capacity(text.len());
        for (start, end) in self.segmenter.spans(text) {
            self.encode_chunk_into(&text[start..end], &mut result);
        }
        result
    }

    /// Encode text, recognising special tokens anywhere in the input.
    ///
    /// Special tokens are matched leftmost-longest; the text between them is
    /// encoded with [`encode`](Self::encode).
    pub fn encode_with_special(&self, text: &str) -> Vec<u32> {
        let Some(ref special_matcher) = self.special_matcher else {
            return self.encode(text);
        };

        let mut result = Vec::new();
        let mut last_end = 0;

        for m in special_matcher.find_iter(text) {
            let start = m.start();
            let end = m.end();

            if start > last_end {
                result.extend(self.encode(&text[last_end..start]));
            }

            let token_str = &self.special_token_strings[m.pattern().as_usize()];
            if let Some(id) = self.special_tokens.get(token_str) {
                result.push(id);
            }

            last_end = end;
        }

        if last_end < text.len() {
            result.extend(self.encode(&text[last_end..]));
        }

        result
    }

    /// Number of tokens [`encode`](Self::encode) would produce, without building
    /// the ID vector.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.segmenter
            .spans(text)
            .into_iter()
            .map(|(start, end)| self.chunk_token_count(&text[start..end]))
            .sum()
    }

    /// Encode text and render each token for display.
    ///
    /// Each display string decodes that single token on its own, so a token
    /// holding part of a multi-byte character renders as U+FFFD.
    pub fn encode_with_tokens(&self, text: &str) -> TokenizedText {
        let ids = self.encode(text);
        let tokens = ids
            .iter()
            .map(|&id| {
                if let Some(special) = self.special_tokens.token(id) {
                    return special.to_string();
                }
                let mut bytes = Vec::with_capacity(2);
                self.push_token_bytes(id, &mut bytes);
                String::from_utf8_lossy(&bytes).into_owned()
            })
            .collect();
        TokenizedText { ids, tokens }
    }

    /// Append the bytes of one non-special token to `out`.
    ///
    /// Returns `false` for special-token IDs, IDs below the base vocabulary start,
    /// and merged IDs whose pair is not in this encoding's merge table.
    pub fn push_token_bytes(&self, id: u32, out: &mut Vec<u8>) -> bool {
        if self.special_tokens.contains_id(id) {
            return false;
        }
        let Some(offset) = id.checked_sub(self.base_vocabulary_start) else {
            return false;
        };

        if let Ok(byte) = u8::try_from(offset) {
            out.push(byte);
            return true;
        }

        match split_merged_symbol(offset) {
            Some((a, b)) if self.merges.contains((a, b)) => {
                out.extend_from_slice(&[a, b]);
                true
            }
            _ => false,
        }
    }

    /// Decode token IDs back to bytes, dropping IDs that do not map to bytes.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8> {
        let mut result = Vec::with_capacity(tokens.len() * 2);
        for &token in tokens {
            self.push_token_bytes(token, &mut result);
        }
        result
    }

    /// Decode token IDs to a string.
    ///
    /// Special-token IDs and IDs outside the byte/merge range are skipped.
    /// Malformed UTF-8 in the resulting byte stream is dropped.
    pub fn decode(&self, tokens: &[u32]) -> String {
        utf8_drop_invalid(&self.decode_bytes(tokens))
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch count tokens for multiple texts in parallel.
    pub fn count_tokens_batch(&self, texts: &[String]) -> Vec<usize> {
        texts
            .par_iter()
            .map(|text| self.count_tokens(text))
            .collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Vec<String> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Number of distinct token IDs: 256 bytes, one per merge, one per special token.
    ///
    /// The base vocabulary start only shifts IDs, so it does not add to the size.
    pub fn vocab_size(&self) -> usize {
        BYTE_SYMBOLS as usize + self.merges.len() + self.special_tokens.len()
    }

    /// Name, pattern, vocabulary size and special-token count.
    ///
    /// `vocab_size` counts token IDs the encoding can emit (see
    /// [`vocab_size`](Self::vocab_size)). It is not `merges + 256 +
    /// base_vocabulary_start`, which would grow with the offset alone.
    pub fn info(&self) -> EncodingInfo {
        EncodingInfo {
            name: self.name.clone(),
            pattern: self.pattern().to_string(),
            vocab_size: self.vocab_size(),
            special_tokens_count: self.special_tokens.len(),
        }
    }

    /// Clear the chunk cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.clear();
        }
    }

    /// Get the current cache size.
    pub fn cache_len(&self) -> usize {
        self.chunk_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Maximum number of chunks the cache holds.
    pub fn cache_capacity(&self) -> usize {
        self.cache_size.max(1)
    }
}

fn new_chunk_cache(cache_size: usize) -> LruCache<u64, CachedChunk> {
    LruCache::new(NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN))
}

impl Clone for Encoding {
    fn clone(&self) -> Self {
        // Create a new empty cache (caches are not shared)
        Self {
            name: self.name.clone(),
            segmenter: self.segmenter.clone(),
            merges: self.merges.clone(),
            special_tokens: self.special_tokens.clone(),
            special_token_strings: self.special_token_strings.clone(),
            special_matcher: self.special_matcher.clone(),
            base_vocabulary_start: self.base_vocabulary_start,
            chunk_cache: Mutex::new(new_chunk_cache(self.cache_size)),
            cache_size: self.cache_size,
        }
    }
}

impl std::fmt::Debug for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoding")
            .field("name", &self.name)
            .field("segmenter", &self.segmenter)
            .field("merges", &self.merges.len())
            .field("special_tokens", &self.special_tokens.len())
            .field("base_vocabulary_start", &self.base_vocabulary_start)
            .finish()
    }
}

/// Build a string from `bytes`, skipping every invalid or truncated UTF-8 sequence.
pub(crate) fn utf8_drop_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = err.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
}

//! Core approximate tokenization engine.
//!
//! Text flows through three stages:
//!
//! - [`segmenter`]: splits text into letter, digit, symbol and whitespace runs
//! - [`bpe`]: collapses each chunk's bytes with a small byte-pair merge table
//! - [`Encoding`]: binds a pattern, merge table and special tokens into an
//!   encoder/decoder with an LRU chunk cache and Rayon batch methods
//!
//! Around them:
//!
//! - [`vocab`]: merge and special-token tables, plus the merge-file loader
//! - [`pretrained`]: the built-in encodings
//! - [`EncodingRegistry`]: model name to cached encoding
//! - [`StreamingDecoder`]: UTF-8 safe token-by-token decoding
//! - [`counter`]: the [`TokenCounter`] trait and table-free estimators
//!
//! # Performance Notes
//!
//! - **FxHashMap**: merge-pair and special-token lookups
//! - **Aho-Corasick**: special tokens anywhere in the text in one pass
//! - **LRU Cache**: repeated identifiers skip the merge loop
//! - **PCRE2 with JIT**: optional segmentation backend (`pcre2` feature)

pub mod bpe;
pub mod counter;
pub mod encoding;
pub mod pretrained;
pub mod registry;
pub mod segmenter;
mod streaming;
pub mod vocab;

pub use bpe::{approximate_merges, merged_symbol, MergeOutcome, MAX_MERGE_PASSES};
pub use counter::{
    counter_or_fallback, CharacterEstimator, ContentAwareEstimator, ContentType, TokenCounter,
};
pub use encoding::{Encoding, EncodingConfig, EncodingError, EncodingInfo, TokenizedText};
pub use pretrained::{from_pretrained, PretrainedEncoding};
pub use registry::{resolve_model, EncodingRegistry, ModelMatch};
pub use segmenter::{Segmenter, FOUR_CLASS_PATTERN, LEGACY_PATTERN};
pub use streaming::StreamingDecoder;
pub use vocab::{load_merge_table, MergeTable, SpecialTokenTable, VocabError};

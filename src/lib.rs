//! vibe-budget - approximate byte-level token counting for cost estimation.
//!
//! Counts tokens the way a BPE tokenizer would, without a trained vocabulary:
//! text is segmented into letter/digit/symbol/whitespace runs and each run's
//! UTF-8 bytes are collapsed with a small table of frequent byte pairs. The
//! result is deterministic and lands in the right order of magnitude for
//! pricing, but does not reproduce any provider's token IDs.
//!
//! ```rust
//! use vibe_budget::EncodingRegistry;
//!
//! let registry = EncodingRegistry::new();
//! let encoding = registry.encoding_for_model("gpt-4").unwrap();
//!
//! let ids = encoding.encode("hello world");
//! assert_eq!(encoding.decode(&ids), "hello world");
//! assert_eq!(encoding.count_tokens("hello world"), ids.len());
//! ```

pub mod core;

pub use crate::core::{
    bpe, counter, counter_or_fallback, encoding, from_pretrained, pretrained, registry,
    resolve_model, segmenter, vocab, CharacterEstimator, ContentAwareEstimator, ContentType,
    Encoding, EncodingConfig, EncodingError, EncodingInfo, EncodingRegistry, MergeTable,
    ModelMatch, PretrainedEncoding, Segmenter, SpecialTokenTable, StreamingDecoder,
    TokenCounter, TokenizedText, FOUR_CLASS_PATTERN, LEGACY_PATTERN,
};

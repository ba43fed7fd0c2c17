//! Built-in approximate encodings.
//!
//! These are named after the vocabularies they stand in for, but none of them
//! carries a trained vocabulary. Each one is a short merge list of frequent
//! English letter pairs, sized so token counts land in the right order of
//! magnitude:
//! - `o200k_base` - GPT-4o family, base vocabulary at 0
//! - `cl100k_base` - GPT-4, GPT-3.5, Claude and most current models (the baseline)
//! - `p50k_base` - Codex and text-davinci-002/003
//! - `r50k_base` - GPT-2 and the original GPT-3 models
//!
//! # Example
//!
//! ```rust
//! use vibe_budget::pretrained::from_pretrained;
//!
//! let encoding = from_pretrained("cl100k_base").unwrap();
//! assert_eq!(encoding.count_tokens("hello"), 3);
//! ```

use super::encoding::{Encoding, EncodingConfig, EncodingError};
use super::segmenter::{FOUR_CLASS_PATTERN, LEGACY_PATTERN};

/// Special tokens shared by the o200k, cl100k and p50k encodings.
pub const COMMON_SPECIAL_TOKENS: &[(&str, u32)] = &[
    ("<|endoftext|>", 200049),
    ("<|startoftext|>", 200050),
    ("<|endofprompt|>", 200048),
    ("<|fim_prefix|>", 200019),
    ("<|fim_middle|>", 200020),
    ("<|fim_suffix|>", 200021),
    ("<|repo_name|>", 200017),
    ("<|file_sep|>", 200018),
    ("<|step|>", 200016),
    ("<|time|>", 200015),
];

/// r50k_base only knows the end-of-text marker.
pub const R50K_SPECIAL_TOKENS: &[(&str, u32)] = &[("<|endoftext|>", 50256)];

const P50K_MERGES: &[&str] = &[
    "er", "es", "ed", "ly", "of", "to", "in", "is", "it", "he", "as", "at", "re", "ve", "ll",
    "nt", "st",
];

const O200K_MERGES: &[&str] = &[
    "er", "es", "ed", "ly", "of", "to", "in", "is", "it", "he", "as", "at", "re", "ve", "ll",
    "nt", "st", "nd", "ng", "tt", "ss", "oo",
];

const CL100K_MERGES: &[&str] = &[
    "er", "es", "ed", "ly", "of", "to", "in", "is", "it", "he", "as", "at", "re", "ve", "ll",
    "nt", "st", "nd", "ng", "tt", "ss", "oo", "be", "or", "an", "en", "al", "te", "ce", "de",
    "se", "le",
];

/// Supported built-in encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PretrainedEncoding {
    /// GPT-4o family
    O200kBase,
    /// GPT-4, GPT-3.5-turbo, Claude, Gemini, Llama, Mistral, Grok
    Cl100kBase,
    /// Codex, text-davinci-002/003
    P50kBase,
    /// GPT-2, text-davinci-001, curie, babbage, ada
    R50kBase,
}

impl PretrainedEncoding {
    /// All built-in encodings, in listing order.
    pub const ALL: [Self; 4] = [
        Self::O200kBase,
        Self::Cl100kBase,
        Self::P50kBase,
        Self::R50kBase,
    ];

    /// Parse encoding name from string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "o200k_base" => Some(Self::O200kBase),
            "cl100k_base" => Some(Self::Cl100kBase),
            "p50k_base" => Some(Self::P50kBase),
            "r50k_base" => Some(Self::R50kBase),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::O200kBase => "o200k_base",
            Self::Cl100kBase => "cl100k_base",
            Self::P50kBase => "p50k_base",
            Self::R50kBase => "r50k_base",
        }
    }

    /// Get all supported encoding names.
    pub fn supported_names() -> &'static [&'static str] {
        &["o200k_base", "cl100k_base", "p50k_base", "r50k_base"]
    }

    /// The configuration this encoding is built from.
    pub fn config(self) -> EncodingConfig {
        EncodingConfig::new(self.name(), pattern(self))
            .with_merges(
                merges(self)
                    .iter()
                    .enumerate()
                    .map(|(i, &pair)| (pair, i as u32 + 1)),
            )
            .with_special_tokens(special_tokens(self).iter().copied())
            .with_base_vocabulary_start(base_vocabulary_start(self))
    }

    pub fn build(self) -> Result<Encoding, EncodingError> {
        Encoding::new(&self.config())
    }
}

impl std::fmt::Display for PretrainedEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Create a built-in encoding by name.
///
/// # Supported Names
/// - `o200k_base`
/// - `cl100k_base`
/// - `p50k_base`
/// - `r50k_base`
pub fn from_pretrained(name: &str) -> Result<Encoding, EncodingError> {
    let encoding =
        PretrainedEncoding::from_name(name).ok_or_else(|| EncodingError::UnknownEncoding {
            name: name.to_string(),
            available: PretrainedEncoding::supported_names().join(", "),
        })?;

    encoding.build()
}

/// Get the segmentation pattern for an encoding.
pub fn pattern(encoding: PretrainedEncoding) -> &'static str {
    match encoding {
        PretrainedEncoding::O200kBase | PretrainedEncoding::Cl100kBase => FOUR_CLASS_PATTERN,
        PretrainedEncoding::P50kBase | PretrainedEncoding::R50kBase => LEGACY_PATTERN,
    }
}

/// Merge pairs in rank order (rank = position + 1).
pub fn merges(encoding: PretrainedEncoding) -> &'static [&'static str] {
    match encoding {
        PretrainedEncoding::O200kBase => O200K_MERGES,
        PretrainedEncoding::Cl100kBase => CL100K_MERGES,
        PretrainedEncoding::P50kBase | PretrainedEncoding::R50kBase => P50K_MERGES,
    }
}

pub fn special_tokens(encoding: PretrainedEncoding) -> &'static [(&'static str, u32)] {
    match encoding {
        PretrainedEncoding::R50kBase => R50K_SPECIAL_TOKENS,
        _ => COMMON_SPECIAL_TOKENS,
    }
}

/// Offset added to raw byte values.
pub fn base_vocabulary_start(encoding: PretrainedEncoding) -> u32 {
    match encoding {
        PretrainedEncoding::O200kBase | PretrainedEncoding::R50kBase => 0,
        PretrainedEncoding::Cl100kBase | PretrainedEncoding::P50kBase => 256,
    }
}

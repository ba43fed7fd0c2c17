//! Model name to encoding lookup, with a per-registry cache of built encodings.
//!
//! Model names resolve in three steps:
//! 1. exact match against [`MODEL_TO_ENCODING`]
//! 2. prefix overlap: the longest known pattern the model name starts with,
//!    otherwise the first pattern (in table order) that starts with the model name
//! 3. [`BASELINE_ENCODING`], with a warning
//!
//! Names are lowercased and a leading `provider/` segment is removed first, so
//! `"OpenAI/GPT-4o"` resolves like `"gpt-4o"`.

use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::encoding::{Encoding, EncodingError};
use super::pretrained::PretrainedEncoding;

/// Encoding used when a model name matches nothing.
pub const BASELINE_ENCODING: PretrainedEncoding = PretrainedEncoding::Cl100kBase;

/// Known model names and the encoding each one uses.
pub const MODEL_TO_ENCODING: &[(&str, PretrainedEncoding)] = &[
    // GPT-4
    ("gpt-4", PretrainedEncoding::Cl100kBase),
    ("gpt-4-turbo", PretrainedEncoding::Cl100kBase),
    ("gpt-4o", PretrainedEncoding::O200kBase),
    ("gpt-4o-mini", PretrainedEncoding::O200kBase),
    ("gpt-4-32k", PretrainedEncoding::Cl100kBase),
    // GPT-3.5
    ("gpt-3.5-turbo", PretrainedEncoding::Cl100kBase),
    ("gpt-3.5-turbo-16k", PretrainedEncoding::Cl100kBase),
    // Claude
    ("claude-3-opus", PretrainedEncoding::Cl100kBase),
    ("claude-3-sonnet", PretrainedEncoding::Cl100kBase),
    ("claude-3-5-sonnet", PretrainedEncoding::Cl100kBase),
    ("claude-3-haiku", PretrainedEncoding::Cl100kBase),
    ("claude-2", PretrainedEncoding::Cl100kBase),
    ("claude-2.1", PretrainedEncoding::Cl100kBase),
    // Gemini
    ("gemini-1.5-pro", PretrainedEncoding::Cl100kBase),
    ("gemini-1.5-flash", PretrainedEncoding::Cl100kBase),
    ("gemini-pro", PretrainedEncoding::Cl100kBase),
    // Codex
    ("code-davinci-002", PretrainedEncoding::P50kBase),
    ("code-davinci-001", PretrainedEncoding::P50kBase),
    ("code-cushman-001", PretrainedEncoding::P50kBase),
    // Davinci
    ("text-davinci-003", PretrainedEncoding::P50kBase),
    ("text-davinci-002", PretrainedEncoding::P50kBase),
    ("text-davinci-001", PretrainedEncoding::R50kBase),
    ("text-davinci", PretrainedEncoding::P50kBase),
    // Curie, Babbage, Ada
    ("text-curie-001", PretrainedEncoding::R50kBase),
    ("text-babbage-001", PretrainedEncoding::R50kBase),
    ("text-ada-001", PretrainedEncoding::R50kBase),
    ("gpt-2", PretrainedEncoding::R50kBase),
    // Llama
    ("llama-2", PretrainedEncoding::Cl100kBase),
    ("llama-3", PretrainedEncoding::Cl100kBase),
    ("llama-3.1", PretrainedEncoding::Cl100kBase),
    ("llama-3.2", PretrainedEncoding::Cl100kBase),
    // Mistral
    ("mistral", PretrainedEncoding::Cl100kBase),
    ("mistral-large", PretrainedEncoding::Cl100kBase),
    // Grok
    ("grok-2", PretrainedEncoding::Cl100kBase),
    ("grok-1", PretrainedEncoding::Cl100kBase),
];

/// How a model name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMatch {
    Exact(PretrainedEncoding),
    Prefix(PretrainedEncoding),
    Default(PretrainedEncoding),
}

impl ModelMatch {
    pub fn encoding(self) -> PretrainedEncoding {
        match self {
            Self::Exact(e) | Self::Prefix(e) | Self::Default(e) => e,
        }
    }
}

fn normalize_model(model: &str) -> String {
    let lowered = model.trim().to_lowercase();
    match lowered.rsplit_once('/') {
        Some((_, base)) => base.to_string(),
        None => lowered,
    }
}

/// Resolve a model name to an encoding without building anything.
pub fn resolve_model(model: &str) -> ModelMatch {
    let base = normalize_model(model);

    if base.is_empty() {
        tracing::warn!(model, encoding = %BASELINE_ENCODING, "empty model name, using baseline encoding");
        return ModelMatch::Default(BASELINE_ENCODING);
    }

    if let Some(&(_, encoding)) = MODEL_TO_ENCODING.iter().find(|(name, _)| *name == base) {
        return ModelMatch::Exact(encoding);
    }

    // "gpt-4o-2024-08-06" should land on "gpt-4o", not "gpt-4"
    let extends_known = MODEL_TO_ENCODING
        .iter()
        .filter(|(name, _)| base.starts_with(name))
        .max_by_key(|(name, _)| name.len());
    if let Some(&(_, encoding)) = extends_known {
        return ModelMatch::Prefix(encoding);
    }

    if let Some(&(_, encoding)) = MODEL_TO_ENCODING
        .iter()
        .find(|(name, _)| name.starts_with(base.as_str()))
    {
        return ModelMatch::Prefix(encoding);
    }

    tracing::warn!(model, encoding = %BASELINE_ENCODING, "unknown model, using baseline encoding");
    ModelMatch::Default(BASELINE_ENCODING)
}

/// Names of all built-in encodings.
pub fn list_encodings() -> Vec<&'static str> {
    PretrainedEncoding::supported_names().to_vec()
}

/// Names of all models in the lookup table.
pub fn list_models() -> Vec<&'static str> {
    MODEL_TO_ENCODING.iter().map(|(name, _)| *name).collect()
}

/// Builds encodings on first use and hands out shared references afterwards.
///
/// Safe to share between threads. Two threads asking for the same encoding at
/// the same time may both build it; the first one stored wins and the other
/// copy is dropped, so callers always see a fully built encoding.
#[derive(Default)]
pub struct EncodingRegistry {
    cache: RwLock<FxHashMap<PretrainedEncoding, Arc<Encoding>>>,
}

impl EncodingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a built-in encoding by name.
    ///
    /// # Errors
    /// [`EncodingError::UnknownEncoding`] listing the available names.
    pub fn get_encoding(&self, name: &str) -> Result<Arc<Encoding>, EncodingError> {
        let encoding =
            PretrainedEncoding::from_name(name).ok_or_else(|| EncodingError::UnknownEncoding {
                name: name.to_string(),
                available: list_encodings().join(", "),
            })?;
        self.get(encoding)
    }

    pub fn get(&self, encoding: PretrainedEncoding) -> Result<Arc<Encoding>, EncodingError> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(&encoding) {
                return Ok(Arc::clone(cached));
            }
        }

        let built = Arc::new(encoding.build()?);
        tracing::debug!(encoding = %encoding, "cached encoding");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(encoding).or_insert(built)))
    }

    /// Get the encoding a model uses, falling back to [`BASELINE_ENCODING`].
    pub fn encoding_for_model(&self, model: &str) -> Result<Arc<Encoding>, EncodingError> {
        self.get(resolve_model(model).encoding())
    }

    /// Drop every cached encoding. Encodings already handed out stay valid.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of encodings currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EncodingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingRegistry")
            .field("cached", &self.cached_len())
            .finish()
    }
}

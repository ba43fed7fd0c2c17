//! Token counters.
//!
//! [`Encoding`] is the accurate counter. The estimators here need no tables at
//! all and exist for when an encoding cannot be built: the caller picks one
//! explicitly, typically through [`counter_or_fallback`].

use std::sync::Arc;

use super::encoding::{Encoding, EncodingError};

/// Characters per token assumed by the plain character estimate.
pub const CHARS_PER_TOKEN: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        texts.iter().map(|text| self.count(text)).collect()
    }
}

impl TokenCounter for Encoding {
    fn count(&self, text: &str) -> usize {
        self.count_tokens(text)
    }

    fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        self.count_tokens_batch(texts)
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for Arc<T> {
    fn count(&self, text: &str) -> usize {
        (**self).count(text)
    }

    fn count_batch(&self, texts: &[String]) -> Vec<usize> {
        (**self).count_batch(texts)
    }
}

/// Tokens for `chars` characters, rounding up.
pub fn chars_to_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Characters covered by `tokens` tokens.
pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    English,
    Code,
    Cjk,
    /// Lowest tokens-per-character ratio, for upper-bound budgeting.
    Conservative,
}

const CODE_INDICATORS: &[&str] = &[
    "function", "const", "let", "var", "class", "import", "export", "return", "=>", "{", "}",
    "()",
];

impl ContentType {
    /// Tokens per character.
    pub fn ratio(self) -> f64 {
        match self {
            Self::English => 0.25,
            Self::Code => 0.30,
            Self::Cjk => 0.75,
            Self::Conservative => 0.20,
        }
    }

    /// Classify text as CJK, code or English.
    ///
    /// Any CJK ideograph or kana makes the text CJK. Otherwise it is code when
    /// more than two distinct code indicators (keywords, braces, arrows) appear.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_cjk) {
            return Self::Cjk;
        }

        let lower = text.to_lowercase();
        let score = CODE_INDICATORS
            .iter()
            .filter(|indicator| lower.contains(*indicator))
            .count();

        if score > 2 {
            Self::Code
        } else {
            Self::English
        }
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3040}'..='\u{309f}' | '\u{30a0}'..='\u{30ff}')
}

/// Fixed characters-per-token estimate.
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}

impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(CHARS_PER_TOKEN as f64)
    }

    pub fn with_ratio(chars_per_token: f64) -> Self {
        Self { chars_per_token }
    }
}

impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Estimate scaled by content type, detected per text unless fixed.
#[derive(Debug, Clone, Default)]
pub struct ContentAwareEstimator {
    content_type: Option<ContentType>,
}

impl ContentAwareEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use `content_type` instead of detecting it.
    pub fn with_content_type(content_type: ContentType) -> Self {
        Self {
            content_type: Some(content_type),
        }
    }
}

impl TokenCounter for ContentAwareEstimator {
    fn count(&self, text: &str) -> usize {
        let content_type = self
            .content_type
            .unwrap_or_else(|| ContentType::detect(text));
        (text.chars().count() as f64 * content_type.ratio()).ceil() as usize
    }
}

/// Use the encoding if it was built, otherwise a [`CharacterEstimator`].
pub fn counter_or_fallback<E>(encoding: Result<E, EncodingError>) -> Arc<dyn TokenCounter>
where
    E: TokenCounter + 'static,
{
    match encoding {
        Ok(encoding) => Arc::new(encoding),
        Err(err) => {
            tracing::warn!(error = %err, "encoding unavailable, estimating tokens from character count");
            Arc::new(CharacterEstimator::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::EncodingConfig;
    use crate::core::segmenter::FOUR_CLASS_PATTERN;

    #[test]
    fn test_chars_tokens_conversion() {
        assert_eq!(chars_to_tokens(0), 0);
        assert_eq!(chars_to_tokens(1), 1);
        assert_eq!(chars_to_tokens(8), 2);
        assert_eq!(chars_to_tokens(9), 3);
        assert_eq!(tokens_to_chars(3), 12);
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(ContentType::detect("你好世界"), ContentType::Cjk);
        assert_eq!(ContentType::detect("カタカナ"), ContentType::Cjk);
        assert_eq!(
            ContentType::detect("export const f = () => { return 1 }"),
            ContentType::Code
        );
        assert_eq!(
            ContentType::detect("The quick brown fox jumps."),
            ContentType::English
        );
        // one indicator is not enough
        assert_eq!(ContentType::detect("let me think"), ContentType::English);
    }

    #[test]
    fn test_character_estimator() {
        let estimator = CharacterEstimator::new();
        assert_eq!(estimator.count(""), 0);
        assert_eq!(estimator.count("hello world"), 3);
        // counts characters, not bytes
        assert_eq!(estimator.count("éééé"), 1);
        assert_eq!(CharacterEstimator::with_ratio(2.0).count("abcd"), 2);
    }

    #[test]
    fn test_content_aware_estimator() {
        let estimator = ContentAwareEstimator::new();
        assert_eq!(estimator.count("abcdefgh"), 2);
        assert_eq!(estimator.count("你好世界"), 3);

        let conservative = ContentAwareEstimator::with_content_type(ContentType::Conservative);
        assert_eq!(conservative.count("abcdefghij"), 2);
    }

    #[test]
    fn test_encoding_is_counter() {
        let encoding = Encoding::new(&EncodingConfig::new("bytes", FOUR_CLASS_PATTERN)).unwrap();
        let counter: &dyn TokenCounter = &encoding;
        assert_eq!(counter.count("hello world"), 11);
        assert_eq!(
            counter.count_batch(&["ab".to_string(), "abc".to_string()]),
            vec![2, 3]
        );
    }

    #[test]
    fn test_counter_or_fallback() {
        let config = EncodingConfig::new("bytes", FOUR_CLASS_PATTERN);
        let counter = counter_or_fallback(Encoding::new(&config));
        assert_eq!(counter.count("hello world"), 11);

        let broken = EncodingConfig::new("broken", FOUR_CLASS_PATTERN)
            .with_special_tokens([("<|x|>", 300)]);
        let counter = counter_or_fallback(Encoding::new(&broken));
        assert_eq!(counter.count("hello world"), 3);
    }
}

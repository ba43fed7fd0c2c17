//! Four-class text segmentation.
//!
//! Text is split into maximal runs of letters, digits, "other" symbols and
//! whitespace. The classes are alternatives of one regular pattern, tried in that
//! order at every position, so the leftmost-first semantics of the engine give the
//! left-to-right scan with no backtracking across chunk boundaries.
//!
//! Any text the pattern does not cover becomes a chunk of its own, so the chunks
//! always concatenate back to the input. If the pattern cannot be compiled, or the
//! engine fails while matching, the whole input is returned as a single chunk.

use regex::Regex;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

/// Letters, digits, other symbols, whitespace.
///
/// Letters are alphabetic characters plus combining marks, so a vowel sign or
/// a decomposed accent stays with its word. Digits are decimal digits only;
/// `½` and `Ⅷ` fall elsewhere. The four classes together cover every
/// character, so no gap chunks occur.
pub const FOUR_CLASS_PATTERN: &str =
    r"[\p{Alphabetic}\p{M}]+|\p{Nd}+|[^\s\p{Alphabetic}\p{M}\p{Nd}]+|\s+";

/// ASCII-letter variant of [`FOUR_CLASS_PATTERN`] used by the older encodings.
///
/// Non-ASCII letters and `_` are not matched by any class; each run of them is
/// emitted as a gap chunk.
pub const LEGACY_PATTERN: &str = r"[a-zA-Z]+|\d+|[^\s\w]+|\s+";

/// Regex backend enum for switching between regex (default) and PCRE2 (optional)
enum RegexBackend {
    Regex(Box<Regex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

impl RegexBackend {
    /// Match spans as (start, end) byte offsets, or `None` if the engine failed.
    fn find_iter(&self, text: &str) -> Option<Vec<(usize, usize)>> {
        match self {
            RegexBackend::Regex(regex) => Some(
                regex
                    .find_iter(text)
                    .map(|m| (m.start(), m.end()))
                    .collect(),
            ),
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(regex) => regex
                .find_iter(text.as_bytes())
                .map(|m| m.map(|m| (m.start(), m.end())))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| {
                    tracing::warn!(error = %err, "PCRE2 match failed, using whole-text chunk");
                })
                .ok(),
        }
    }
}

/// Splits text into chunks according to a segmentation pattern.
pub struct Segmenter {
    pattern: String,
    backend: Option<RegexBackend>,
}

impl Segmenter {
    /// Compile `pattern` with the default backend.
    ///
    /// Never fails. An invalid pattern leaves the segmenter in fallback mode,
    /// where every input is a single chunk.
    pub fn new(pattern: &str) -> Self {
        let backend = match Regex::new(pattern) {
            Ok(regex) => Some(RegexBackend::Regex(Box::new(regex))),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "segmentation pattern rejected, using whole-text chunks");
                None
            }
        };

        Self {
            pattern: pattern.to_string(),
            backend,
        }
    }

    /// Compile `pattern` with PCRE2 (JIT when available).
    #[cfg(feature = "pcre2")]
    pub fn new_pcre2(pattern: &str) -> Self {
        let mut regex_builder = pcre2::bytes::RegexBuilder::new();
        regex_builder.jit_if_available(true);
        regex_builder.utf(true);
        regex_builder.ucp(true);

        let backend = match regex_builder.build(pattern) {
            Ok(regex) => Some(RegexBackend::Pcre2(regex)),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "PCRE2 rejected segmentation pattern, using whole-text chunks");
                None
            }
        };

        Self {
            pattern: pattern.to_string(),
            backend,
        }
    }

    #[cfg(feature = "pcre2")]
    fn rebuild_pcre2(&self) -> Self {
        Self::new_pcre2(&self.pattern)
    }

    #[cfg(not(feature = "pcre2"))]
    fn rebuild_pcre2(&self) -> Self {
        Self::new(&self.pattern)
    }

    /// The pattern source this segmenter was built from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when the pattern failed to compile.
    pub fn is_fallback(&self) -> bool {
        self.backend.is_none()
    }

    /// Whether this segmenter runs on PCRE2.
    pub fn is_pcre2(&self) -> bool {
        match &self.backend {
            #[cfg(feature = "pcre2")]
            Some(RegexBackend::Pcre2(_)) => true,
            _ => false,
        }
    }

    /// Chunk spans as (start, end) byte offsets covering `text` with no gaps.
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        let Some(matches) = self.backend.as_ref().and_then(|b| b.find_iter(text)) else {
            return vec![(0, text.len())];
        };

        let mut spans = Vec::with_capacity(matches.len() + 1);
        let mut last_end = 0;

        for (start, end) in matches {
            // Patterns that can match the empty string yield zero-width hits
            if start == end {
                continue;
            }
            if start > last_end {
                spans.push((last_end, start));
            }
            spans.push((start, end));
            last_end = end;
        }

        if last_end < text.len() {
            spans.push((last_end, text.len()));
        }

        spans
    }

    /// Split `text` into chunks.
    pub fn segment<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.spans(text)
            .into_iter()
            .map(|(start, end)| &text[start..end])
            .collect()
    }
}

impl Clone for Segmenter {
    fn clone(&self) -> Self {
        if self.is_pcre2() {
            self.rebuild_pcre2()
        } else {
            Self::new(&self.pattern)
        }
    }
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("pattern", &self.pattern)
            .field("fallback", &self.is_fallback())
            .field("pcre2", &self.is_pcre2())
            .finish()
    }
}

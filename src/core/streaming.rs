//! UTF-8 safe streaming decoder for token-by-token output.
//!
//! A merged token holds at most two bytes, so a multi-byte character is
//! usually spread over several tokens. The decoder buffers the bytes of an
//! incomplete character and only emits complete, valid UTF-8.
//!
//! Concatenating every emitted string and the final [`StreamingDecoder::flush`]
//! gives the same text as [`Encoding::decode`] over the whole token list.

use super::encoding::{utf8_drop_invalid, Encoding};

/// A streaming decoder that handles incomplete UTF-8 sequences across token boundaries.
///
/// # Example
///
/// ```
/// use vibe_budget::{pretrained::from_pretrained, StreamingDecoder};
///
/// let encoding = from_pretrained("cl100k_base").unwrap();
/// let mut decoder = StreamingDecoder::new(&encoding);
///
/// let mut text = String::new();
/// for token_id in encoding.encode("héllo") {
///     if let Some(chunk) = decoder.add_token(token_id) {
///         text.push_str(&chunk);
///     }
/// }
/// text.push_str(&decoder.flush());
/// assert_eq!(text, "héllo");
/// ```
pub struct StreamingDecoder<'a> {
    encoding: &'a Encoding,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    pub fn new(encoding: &'a Encoding) -> Self {
        Self {
            encoding,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any complete UTF-8 characters.
    ///
    /// Returns `None` when the token adds no bytes (special or unknown IDs) or
    /// the buffered bytes are still an incomplete character.
    pub fn add_token(&mut self, token_id: u32) -> Option<String> {
        if !self.encoding.push_token_bytes(token_id, &mut self.buffer) {
            return None;
        }
        self.extract_complete_utf8()
    }

    /// Add multiple tokens at once and return complete UTF-8 characters.
    pub fn add_tokens(&mut self, token_ids: &[u32]) -> Option<String> {
        for &token_id in token_ids {
            self.encoding.push_token_bytes(token_id, &mut self.buffer);
        }
        self.extract_complete_utf8()
    }

    /// Flush any remaining buffered bytes.
    ///
    /// A trailing incomplete sequence is dropped, as in [`Encoding::decode`].
    pub fn flush(&mut self) -> String {
        let result = utf8_drop_invalid(&self.buffer);
        self.buffer.clear();
        result
    }

    /// Reset the decoder state, discarding any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the complete prefix of the buffer.
    ///
    /// Invalid bytes are dropped. A trailing sequence that could still be
    /// completed by the next token stays in the buffer.
    fn extract_complete_utf8(&mut self) -> Option<String> {
        let mut out = String::new();

        loop {
            let (valid, invalid) = match std::str::from_utf8(&self.buffer) {
                Ok(_) => (self.buffer.len(), None),
                Err(err) => (err.valid_up_to(), Some(err.error_len())),
            };
            out.push_str(std::str::from_utf8(&self.buffer[..valid]).unwrap_or_default());

            match invalid {
                None => {
                    self.buffer.clear();
                    break;
                }
                Some(Some(len)) => {
                    self.buffer.drain(..valid + len);
                }
                Some(None) => {
                    self.buffer.drain(..valid);
                    break;
                }
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::EncodingConfig;
    use crate::core::segmenter::FOUR_CLASS_PATTERN;

    fn make_test_encoding() -> Encoding {
        let config = EncodingConfig::new("test", FOUR_CLASS_PATTERN)
            .with_merges([("he", 1), ("é", 2)])
            .with_special_tokens([("<|endoftext|>", 100_000)]);
        Encoding::new(&config).unwrap()
    }

    fn byte(b: u8) -> u32 {
        256 + b as u32
    }

    #[test]
    fn test_simple_ascii() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        assert_eq!(decoder.add_token(byte(b'H')), Some("H".to_string()));
        assert_eq!(decoder.add_token(byte(b'i')), Some("i".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_merged_two_byte_char() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        let ids = encoding.encode("é");
        assert_eq!(ids.len(), 1);
        assert_eq!(decoder.add_token(ids[0]), Some("é".to_string()));
    }

    #[test]
    fn test_multi_byte_split() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        // "世" in UTF-8 is: 0xE4 0xB8 0x96
        assert_eq!(decoder.add_token(byte(0xE4)), None);
        assert!(decoder.has_pending());
        assert_eq!(decoder.pending_bytes(), 1);

        assert_eq!(decoder.add_token(byte(0xB8)), None);
        assert_eq!(decoder.pending_bytes(), 2);

        assert_eq!(decoder.add_token(byte(0x96)), Some("世".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_flush_drops_incomplete() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        decoder.add_token(byte(0xE4));
        decoder.add_token(byte(0xB8));

        assert_eq!(decoder.flush(), "");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_invalid_byte_dropped_mid_stream() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        assert_eq!(
            decoder.add_tokens(&[byte(b'a'), byte(0xFF), byte(b'b')]),
            Some("ab".to_string())
        );
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_special_and_unknown_ids_add_nothing() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        assert_eq!(decoder.add_token(100_000), None);
        assert_eq!(decoder.add_token(3), None);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_reset() {
        let encoding = make_test_encoding();
        let mut decoder = StreamingDecoder::new(&encoding);

        decoder.add_token(byte(0xE4));
        assert!(decoder.has_pending());

        decoder.reset();
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_stream_matches_decode() {
        let encoding = make_test_encoding();
        let text = "hello 世界, café<|endoftext|>!";
        let ids = encoding.encode_with_special(text);

        let mut decoder = StreamingDecoder::new(&encoding);
        let mut streamed = String::new();
        for &id in &ids {
            if let Some(chunk) = decoder.add_token(id) {
                streamed.push_str(&chunk);
            }
        }
        streamed.push_str(&decoder.flush());

        assert_eq!(streamed, encoding.decode(&ids));
        assert_eq!(streamed, "hello 世界, café!");
    }
}

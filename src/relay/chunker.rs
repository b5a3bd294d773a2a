//! Size-threshold re-chunking of a streamed byte body.
//!
//! Bytes arrive in whatever pieces the network hands us. [`ChunkBuffer`]
//! decodes them as UTF-8 incrementally, holding back an incomplete trailing
//! sequence until the rest of it arrives, and releases the accumulated text
//! once it reaches the threshold. A released chunk is the whole buffer, so it
//! may be larger than the threshold.

/// Accumulates decoded text and releases it in chunks of at least
/// `threshold` UTF-8 bytes.
#[derive(Debug)]
pub struct ChunkBuffer {
    threshold: usize,
    /// Decoded text not yet released.
    text: String,
    /// Leading bytes of a multi-byte sequence split across reads (at most 3).
    partial: Vec<u8>,
}

impl ChunkBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            text: String::with_capacity(threshold * 2),
            partial: Vec::with_capacity(4),
        }
    }

    /// Feed a piece of the body. Returns a chunk once the buffered text has
    /// reached the threshold.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        if self.partial.is_empty() {
            self.decode(bytes);
        } else {
            let mut joined = std::mem::take(&mut self.partial);
            joined.extend_from_slice(bytes);
            self.decode(&joined);
        }

        if self.text.len() >= self.threshold {
            Some(std::mem::take(&mut self.text))
        } else {
            None
        }
    }

    /// End of body: release whatever is left, if anything. A dangling
    /// incomplete sequence is replaced with U+FFFD. The buffer is empty
    /// afterwards.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial.is_empty() {
            self.partial.clear();
            self.text.push(char::REPLACEMENT_CHARACTER);
        }
        if self.text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.text))
        }
    }

    /// Number of decoded bytes currently held.
    pub fn buffered(&self) -> usize {
        self.text.len()
    }

    fn decode(&mut self, mut input: &[u8]) {
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    // `valid_up_to` marks a verified prefix; this never fails.
                    self.text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        // Truncated sequence at the end of the input.
                        None => {
                            self.partial.extend_from_slice(rest);
                            return;
                        }
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                    }
                }
            }
        }
    }
}

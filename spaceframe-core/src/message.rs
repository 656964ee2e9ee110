//! Two-part messages on reference-counted chunks.
//!
//! A message is a routing **header** plus a payload **body**. Both parts are
//! `bytes::Bytes` chunks, so cloning a message bumps reference counts instead
//! of copying payload data; the chunk is freed exactly when the last clone
//! drops. Patterns that need addressing (request ids, bus hop lists) encode
//! it as big-endian `u32` words in the header, outermost word first.

use bytes::{BufMut, Bytes, BytesMut};

/// Size in bytes of one routing header word.
pub const HEADER_WORD: usize = 4;

/// A whole message as it travels between a socket and its pipes.
///
/// # Examples
///
/// ```
/// use spaceframe_core::message::Message;
///
/// let msg = Message::from_body("hello");
/// assert_eq!(msg.body().as_ref(), b"hello");
/// assert!(msg.header().is_empty());
/// ```
///
/// ```
/// # use spaceframe_core::message::Message;
/// // Routing envelopes are stacks of u32 words, outermost first.
/// let mut msg = Message::from_body("payload");
/// msg.push_header_word(0x8000_0001);
/// msg.push_header_word(7);
/// assert_eq!(msg.pop_header_word(), Some(7));
/// assert_eq!(msg.pop_header_word(), Some(0x8000_0001));
/// assert_eq!(msg.pop_header_word(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Bytes,
    body: Bytes,
}

impl Message {
    /// Create an empty message (empty header, empty body).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            header: Bytes::new(),
            body: Bytes::new(),
        }
    }

    /// Create a message from a body chunk; the header starts empty.
    ///
    /// Accepts anything convertible to `Bytes`, so `Vec<u8>`, `&'static str`
    /// and existing chunks all transfer ownership without copying.
    #[must_use]
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        Self {
            header: Bytes::new(),
            body: body.into(),
        }
    }

    /// Create a message borrowing a static byte region.
    #[must_use]
    pub const fn from_static(body: &'static [u8]) -> Self {
        Self {
            header: Bytes::new(),
            body: Bytes::from_static(body),
        }
    }

    /// Assemble a message from explicit header and body chunks.
    #[must_use]
    pub const fn with_header(header: Bytes, body: Bytes) -> Self {
        Self { header, body }
    }

    /// The routing header.
    #[must_use]
    pub const fn header(&self) -> &Bytes {
        &self.header
    }

    /// The payload body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// True when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Header plus body length; what queue accounting and message-size
    /// limits measure.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// Consume the message, keeping only the body chunk.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Replace the header wholesale.
    pub fn set_header(&mut self, header: Bytes) {
        self.header = header;
    }

    /// Drop the routing header.
    pub fn clear_header(&mut self) {
        self.header = Bytes::new();
    }

    /// Prepend one word to the routing envelope.
    pub fn push_header_word(&mut self, word: u32) {
        let mut buf = BytesMut::with_capacity(HEADER_WORD + self.header.len());
        buf.put_u32(word);
        buf.extend_from_slice(&self.header);
        self.header = buf.freeze();
    }

    /// Remove and return the outermost envelope word, if any.
    ///
    /// Returns `None` on an empty or short header; a header whose length is
    /// not a multiple of the word size yields its whole words and then stops.
    pub fn pop_header_word(&mut self) -> Option<u32> {
        if self.header.len() < HEADER_WORD {
            return None;
        }
        let word = u32::from_be_bytes([
            self.header[0],
            self.header[1],
            self.header[2],
            self.header[3],
        ]);
        self.header = self.header.slice(HEADER_WORD..);
        Some(word)
    }

    /// Read the outermost envelope word without consuming it.
    #[must_use]
    pub fn peek_header_word(&self) -> Option<u32> {
        if self.header.len() < HEADER_WORD {
            return None;
        }
        Some(u32::from_be_bytes([
            self.header[0],
            self.header[1],
            self.header[2],
            self.header[3],
        ]))
    }

    /// Number of whole envelope words in the header.
    #[must_use]
    pub fn header_word_count(&self) -> usize {
        self.header.len() / HEADER_WORD
    }

    /// Iterate the envelope words, outermost first.
    pub fn header_words(&self) -> impl Iterator<Item = u32> + '_ {
        self.header
            .chunks_exact(HEADER_WORD)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
    }
}

impl From<Bytes> for Message {
    fn from(body: Bytes) -> Self {
        Self::from_body(body)
    }
}

impl From<Vec<u8>> for Message {
    fn from(body: Vec<u8>) -> Self {
        Self::from_body(body)
    }
}

impl From<&'static str> for Message {
    fn from(body: &'static str) -> Self {
        Self::from_static(body.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message() {
        let msg = Message::new();
        assert!(msg.is_empty());
        assert_eq!(msg.wire_size(), 0);
        assert_eq!(msg.header_word_count(), 0);
    }

    #[test]
    fn body_ownership_is_shared_on_clone() {
        let chunk = Bytes::from(vec![1u8; 1024]);
        let msg = Message::from_body(chunk.clone());
        let copy = msg.clone();

        // Same underlying chunk, not a copy.
        assert_eq!(copy.body().as_ptr(), chunk.as_ptr());
        drop(msg);
        assert_eq!(copy.body().as_ref(), &[1u8; 1024][..]);
    }

    #[test]
    fn envelope_push_pop_is_lifo() {
        let mut msg = Message::from_body("x");
        msg.push_header_word(1);
        msg.push_header_word(2);
        msg.push_header_word(3);

        assert_eq!(msg.header_word_count(), 3);
        assert_eq!(msg.header_words().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(msg.pop_header_word(), Some(3));
        assert_eq!(msg.pop_header_word(), Some(2));
        assert_eq!(msg.pop_header_word(), Some(1));
        assert_eq!(msg.pop_header_word(), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut msg = Message::from_body("x");
        msg.push_header_word(42);
        assert_eq!(msg.peek_header_word(), Some(42));
        assert_eq!(msg.header_word_count(), 1);
        assert_eq!(msg.pop_header_word(), Some(42));
    }

    #[test]
    fn short_header_yields_no_words() {
        let msg = Message::with_header(Bytes::from_static(&[0x01, 0x02]), Bytes::new());
        assert_eq!(msg.header_word_count(), 0);
        assert_eq!(msg.peek_header_word(), None);
    }

    #[test]
    fn wire_size_counts_both_parts() {
        let mut msg = Message::from_body("12345");
        msg.push_header_word(9);
        assert_eq!(msg.wire_size(), 9);
        assert_eq!(msg.len(), 5);
    }
}

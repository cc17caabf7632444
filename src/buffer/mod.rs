//! Buffer management for session output

mod ansi;

pub use ansi::{strip_ansi, AnsiFilter};

use bytes::BytesMut;

/// Initial capacity reserved for a session buffer.
const INITIAL_CAPACITY: usize = 8192;

/// Which part of the accumulated output a match scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep all output and scan from the start of the buffer on every call.
    ///
    /// Repeated matches of the same pattern return the same occurrence.
    #[default]
    RetainAll,

    /// Keep all output, but start each scan after the end of the previous
    /// successful match.
    ConsumeMatched,
}

/// Accumulated output of a session.
///
/// Content only grows until [`OutputBuffer::clear`] is called. Bytes are
/// stored raw; strings handed to callers are decoded lossily.
#[derive(Debug)]
pub struct OutputBuffer {
    buffer: BytesMut,
    matched_position: usize,
    filter: Option<AnsiFilter>,
}

impl OutputBuffer {
    /// Create an empty buffer, optionally stripping ANSI escape sequences
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            matched_position: 0,
            filter: strip_ansi.then(AnsiFilter::new),
        }
    }

    /// Append data to the buffer
    pub fn append(&mut self, data: &[u8]) {
        match &mut self.filter {
            Some(filter) => {
                let cleaned = filter.feed(data);
                self.buffer.extend_from_slice(&cleaned);
            }
            None => self.buffer.extend_from_slice(data),
        }
    }

    /// Get the buffer as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Offset where a scan starts under `policy`
    pub fn scan_start(&self, policy: RetentionPolicy) -> usize {
        match policy {
            RetentionPolicy::RetainAll => 0,
            RetentionPolicy::ConsumeMatched => self.matched_position,
        }
    }

    /// Bytes from `start` to the end of the buffer
    pub fn since(&self, start: usize) -> &[u8] {
        &self.buffer[start.min(self.buffer.len())..]
    }

    /// Mark a position as matched
    pub fn mark_matched(&mut self, end_position: usize) {
        self.matched_position = end_position.min(self.buffer.len());
    }

    /// Get the current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been accumulated
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the matched position
    #[cfg(test)]
    pub fn matched_position(&self) -> usize {
        self.matched_position
    }

    /// Lossy text of `start..end`
    pub fn text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.buffer.len());
        let start = start.min(end);
        String::from_utf8_lossy(&self.buffer[start..end]).into_owned()
    }

    /// Drop everything accumulated so far.
    ///
    /// Offsets reported by later matches restart at zero.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.matched_position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_buffer() {
        let buffer = OutputBuffer::new(false);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.matched_position(), 0);
    }

    #[test]
    fn test_multiple_appends() {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(b"Hello ");
        buffer.append(b"World");
        assert_eq!(buffer.len(), 11);
        assert_eq!(buffer.as_bytes(), b"Hello World");
    }

    #[test]
    fn test_scan_start_follows_policy() {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(b"Hello World");
        buffer.mark_matched(6);

        assert_eq!(buffer.scan_start(RetentionPolicy::RetainAll), 0);
        assert_eq!(buffer.scan_start(RetentionPolicy::ConsumeMatched), 6);
        assert_eq!(buffer.since(6), b"World");
    }

    #[test]
    fn test_mark_matched_is_clamped() {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(b"abc");
        buffer.mark_matched(10);
        assert_eq!(buffer.matched_position(), 3);
    }

    #[test]
    fn test_text_is_lossy() {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(b"ok\xFFok");
        assert_eq!(buffer.text(0, 5), "ok\u{FFFD}ok");
        assert_eq!(buffer.text(4, 100), "k");
        assert_eq!(buffer.text(9, 2), "");
    }

    #[test]
    fn test_clear() {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(b"Hello");
        buffer.mark_matched(3);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.matched_position(), 0);
    }

    #[test]
    fn test_strip_ansi_enabled() {
        let mut buffer = OutputBuffer::new(true);
        buffer.append(b"Hello \x1b[31mRed\x1b[0m World");
        assert_eq!(buffer.as_bytes(), b"Hello Red World");
    }

    #[test]
    fn test_strip_ansi_across_appends() {
        let mut buffer = OutputBuffer::new(true);
        buffer.append(b"Hello \x1b[3");
        buffer.append(b"1mRed\x1b");
        buffer.append(b"[0m");
        assert_eq!(buffer.as_bytes(), b"Hello Red");
    }

    #[test]
    fn test_strip_ansi_disabled() {
        let mut buffer = OutputBuffer::new(false);
        let data = b"Hello \x1b[31mRed\x1b[0m World";
        buffer.append(data);
        assert_eq!(buffer.as_bytes(), data);
    }

    proptest! {
        #[test]
        fn prop_content_only_grows(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut buffer = OutputBuffer::new(false);
            let mut expected = Vec::new();
            for chunk in &chunks {
                let before = buffer.as_bytes().to_vec();
                buffer.append(chunk);
                prop_assert!(buffer.as_bytes().starts_with(&before));
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(buffer.as_bytes(), expected.as_slice());
        }
    }
}

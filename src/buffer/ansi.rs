//! ANSI escape sequence stripping

/// Where the filter is inside an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    /// Saw ESC
    Escape,
    /// Inside `ESC [`, until a final byte (0x40..=0x7E)
    Csi,
    /// Inside `ESC ]`, until BEL or `ESC \`
    Osc,
    /// Saw ESC inside an OSC
    OscEscape,
    /// Saw `ESC (` or `ESC )`, one designator byte follows
    Charset,
}

/// Streaming ANSI escape sequence stripper.
///
/// Output arrives in arbitrary chunks, so a sequence may start in one read
/// and end in the next. The filter keeps its position between calls to
/// [`AnsiFilter::feed`].
#[derive(Debug, Clone)]
pub struct AnsiFilter {
    state: State,
}

impl Default for AnsiFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiFilter {
    /// Create a filter in the ground state
    pub fn new() -> Self {
        Self {
            state: State::Ground,
        }
    }

    /// Strip escape sequences from `data`, returning the remaining bytes
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(data.len());

        for &byte in data {
            self.state = match self.state {
                State::Ground if byte == 0x1b => State::Escape,
                State::Ground => {
                    result.push(byte);
                    State::Ground
                }
                State::Escape => match byte {
                    b'[' => State::Csi,
                    b']' => State::Osc,
                    b'(' | b')' => State::Charset,
                    _ => State::Ground,
                },
                State::Csi if (0x40..=0x7e).contains(&byte) => State::Ground,
                State::Csi => State::Csi,
                State::Osc => match byte {
                    0x07 => State::Ground,
                    0x1b => State::OscEscape,
                    _ => State::Osc,
                },
                State::OscEscape if byte == b'\\' => State::Ground,
                State::OscEscape => State::Osc,
                State::Charset => State::Ground,
            };
        }

        result
    }
}

/// Strip ANSI escape sequences from a complete byte slice
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    AnsiFilter::new().feed(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_csi() {
        let input = b"Hello \x1b[31mred\x1b[0m world";
        assert_eq!(strip_ansi(input), b"Hello red world");
    }

    #[test]
    fn test_strip_osc() {
        let input = b"Hello \x1b]0;Title\x07 world";
        assert_eq!(strip_ansi(input), b"Hello  world");
    }

    #[test]
    fn test_strip_osc_with_string_terminator() {
        let input = b"a\x1b]2;x\x1b\\b";
        assert_eq!(strip_ansi(input), b"ab");
    }

    #[test]
    fn test_charset_selection() {
        assert_eq!(strip_ansi(b"\x1b(Bplain"), b"plain");
    }

    #[test]
    fn test_non_letter_final_byte() {
        assert_eq!(strip_ansi(b"x\x1b[2~y\x1b[@z"), b"xyz");
    }

    #[test]
    fn test_no_ansi() {
        assert_eq!(strip_ansi(b"Hello world"), b"Hello world");
    }

    #[test]
    fn test_multiple_sequences() {
        let input = b"\x1b[1mBold\x1b[0m and \x1b[4munderline\x1b[0m";
        assert_eq!(strip_ansi(input), b"Bold and underline");
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut filter = AnsiFilter::new();
        let mut out = filter.feed(b"ab\x1b");
        out.extend(filter.feed(b"[1;3"));
        out.extend(filter.feed(b"2mcd\x1b]0;t"));
        out.extend(filter.feed(b"itle\x07ef"));
        assert_eq!(out, b"abcdef");
    }
}

//! Lossy line reading for child-process pipes.

use std::io::{self, BufRead};

/// Yields `\n`-terminated lines with the terminator (and a preceding `\r`)
/// removed. Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(Some(String::from_utf8_lossy(&self.buf[..end]).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    fn collect(bytes: &[u8]) -> Vec<String> {
        let mut reader = LineReader::new(Cursor::new(bytes.to_vec()));
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn strips_terminators_and_keeps_last_partial_line() {
        assert_eq!(collect(b"a\r\nb\n\nc"), vec!["a", "b", "", "c"]);
        assert!(collect(b"").is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(collect(b"ok \xff\n"), vec!["ok \u{fffd}"]);
    }

    proptest! {
        #[test]
        fn line_count_matches_newlines(text in "[a-z\n]{0,64}") {
            let lines = collect(text.as_bytes());
            let newlines = text.matches('\n').count();
            let expected = if text.is_empty() || text.ends_with('\n') { newlines } else { newlines + 1 };
            prop_assert_eq!(lines.len(), expected);
        }
    }
}

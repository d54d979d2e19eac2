//! Offset to line/character conversion.

/// Zero-based line and character. Characters count Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub character: usize,
}

/// Byte offsets of every line start in a text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of `offset` in `text`; out-of-range offsets clamp to the end.
    pub fn line_col(&self, text: &str, offset: usize) -> LineCol {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        LineCol {
            line,
            character: text[line_start..offset].chars().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let text = "ab\ncd\n\nef";
        let index = LineIndex::new(text);

        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_col(text, 0), LineCol { line: 0, character: 0 });
        assert_eq!(index.line_col(text, 4), LineCol { line: 1, character: 1 });
        assert_eq!(index.line_col(text, 6), LineCol { line: 2, character: 0 });
        assert_eq!(index.line_col(text, 8), LineCol { line: 3, character: 1 });
        assert_eq!(index.line_col(text, 100), LineCol { line: 3, character: 2 });
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "const é = 'ü';";
        let index = LineIndex::new(text);
        // Byte 11 is the opening quote, after the two-byte 'é'
        assert_eq!(index.line_col(text, 11), LineCol { line: 0, character: 10 });
    }
}

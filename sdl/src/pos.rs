use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A position in a source file. Lines and columns are 1-based; columns count
/// characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

/// A half-open span of source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceRange {
    pub filename: Arc<str>,
    pub start: Pos,
    pub end: Pos,
}

impl SourceRange {
    pub fn new(filename: Arc<str>, start: Pos, end: Pos) -> Self {
        SourceRange {
            filename,
            start,
            end,
        }
    }

    /// The range covering `self` through the end of `other`.
    pub fn to(&self, other: &SourceRange) -> SourceRange {
        SourceRange {
            filename: self.filename.clone(),
            start: self.start,
            end: other.end,
        }
    }

    /// Byte offsets, for codespan-reporting labels.
    pub fn bytes(&self) -> Range<usize> {
        self.start.byte..self.end.byte
    }

    /// True for ranges built by code rather than read from a file.
    pub fn is_synthetic(&self) -> bool {
        self.start.line == 0
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{},{}-{}",
                self.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{},{}-{},{}",
                self.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

/// Maps byte offsets of one source text to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            source,
            line_starts,
        }
    }

    pub fn pos(&self, byte: usize) -> Pos {
        let byte = byte.min(self.source.len());
        let line = match self.line_starts.binary_search(&byte) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let start = self.line_starts[line];
        let column = self.source[start..byte].chars().count() + 1;
        Pos {
            line: line + 1,
            column,
            byte,
        }
    }

    pub fn range(&self, filename: &Arc<str>, span: Range<usize>) -> SourceRange {
        SourceRange::new(filename.clone(), self.pos(span.start), self.pos(span.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_range_display() {
        let src = "\ntable \"bar\" {\n  refs = [table]\n}\n";
        let index = LineIndex::new(src);
        let start = src.find("refs").unwrap();
        let end = src.find(']').unwrap() + 1;
        let range = index.range(&Arc::from(""), start..end);
        assert_eq!(range.to_string(), ":3,3-17");
    }

    #[test]
    fn multi_line_range_display() {
        let src = "a {\n}\n";
        let index = LineIndex::new(src);
        let range = index.range(&Arc::from("main.hcl"), 0..5);
        assert_eq!(range.to_string(), "main.hcl:1,1-2,2");
    }

    #[test]
    fn columns_count_characters() {
        let src = "s = \"é\" x";
        let index = LineIndex::new(src);
        let byte = src.find('x').unwrap();
        assert_eq!(index.pos(byte).column, 9);
    }
}

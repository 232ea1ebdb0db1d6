use std::ops::Range;

use crate::ast::TokenPos;

/// A highlighted byte range in one file's source text.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub const fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Create an empty span that highlights nothing.
    pub const fn empty() -> Self {
        Self { start: 0, length: 0 }
    }

    /// The single character a token position points at.
    pub const fn at(pos: &TokenPos) -> Self {
        Self::new(pos.offset, 1)
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The span as a range, shrunk to fit a source of `len` bytes.
    /// `annotate-snippets` panics on ranges past the end of its slice.
    pub fn clamped(&self, len: usize) -> Range<usize> {
        let start = self.start.min(len);
        let end = (self.start + self.length).min(len);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FileId;

    #[test]
    fn at_token() {
        let pos = TokenPos::new(FileId::new(0), 3, 7, 42);
        assert_eq!(Span::at(&pos), Span::new(42, 1));
        assert!(!Span::at(&pos).is_empty());
        assert!(Span::empty().is_empty());
    }

    #[test]
    fn clamping() {
        assert_eq!(Span::new(2, 4).clamped(10), 2..6);
        assert_eq!(Span::new(8, 4).clamped(10), 8..10);
        assert_eq!(Span::new(12, 4).clamped(10), 10..10);
    }
}

//! Dense node labels and the code-to-label index

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Dense zero-based node label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeLabel(pub usize);

impl NodeLabel {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reverse lookup from natural code to label.
///
/// Labels are assigned in row order starting at `offset`, one per row. A
/// code repeated in later rows still resolves to its first label.
/// Unknown codes resolve to `None`.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    by_code: HashMap<String, NodeLabel>,
    offset: usize,
    len: usize,
}

impl LabelIndex {
    pub fn from_codes<I, S>(codes: I, offset: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_code = HashMap::new();
        let mut len = 0;
        for (row, code) in codes.into_iter().enumerate() {
            by_code
                .entry(code.as_ref().to_string())
                .or_insert(NodeLabel(offset + row));
            len = row + 1;
        }
        Self { by_code, offset, len }
    }

    pub fn lookup(&self, code: &str) -> Option<NodeLabel> {
        self.by_code.get(code).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Labels this index hands out
    pub fn labels(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_row_order() {
        let index = LabelIndex::from_codes(["100", "200", "300"], 0);
        assert_eq!(index.lookup("100"), Some(NodeLabel(0)));
        assert_eq!(index.lookup("300"), Some(NodeLabel(2)));
        assert_eq!(index.lookup("999"), None);
        assert_eq!(index.labels(), 0..3);
    }

    #[test]
    fn offset_continues_numbering() {
        let index = LabelIndex::from_codes(vec!["a".to_string(), "b".to_string()], 3);
        assert_eq!(index.lookup("b"), Some(NodeLabel(4)));
        assert_eq!(index.labels(), 3..5);
    }

    #[test]
    fn repeated_code_keeps_first_label() {
        let index = LabelIndex::from_codes(["x", "y", "x"], 0);
        assert_eq!(index.lookup("x"), Some(NodeLabel(0)));
        assert_eq!(index.len(), 3);
    }
}

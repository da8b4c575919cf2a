//
// patch.rs
//
// Composable change sets describing buffer edits that have not yet been
// applied to the virtual file set
//
// Offsets and lengths count chars (Unicode scalar values), matching ropey.
//

use ropey::Rope;
use serde::{Deserialize, Serialize};

use crate::error::PatchError;

/// A single operation in a change set, walking the old document left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Keep `n` chars of the old document
    Retain(usize),
    /// Remove `n` chars of the old document
    Delete(usize),
    /// Insert text at the current position
    Insert(String),
}

/// A positional replacement, in coordinates valid when replacements are
/// applied one after another in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: usize,
    pub to: usize,
    pub text: String,
}

/// An ordered, composable description of text edits against a document of
/// length [`ChangeSet::len`].
///
/// Operations are kept in canonical form: adjacent operations of the same kind
/// are merged, empty operations are dropped, and an insertion always precedes
/// a deletion at the same position. Two change sets that describe the same
/// edit therefore compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct ChangeSet {
    ops: Vec<Op>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `s` after `n` chars
fn split_chars(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    }
}

impl ChangeSet {
    /// An identity change set for a document of `len` chars
    pub fn empty(len: usize) -> Self {
        let mut set = ChangeSet::default();
        set.retain(len);
        set
    }

    /// A change set replacing `from..to` with `text` in a document of `doc_len` chars
    pub fn replace(doc_len: usize, from: usize, to: usize, text: &str) -> Result<Self, PatchError> {
        if from > to || to > doc_len {
            return Err(PatchError::Malformed(format!(
                "range {from}..{to} outside document of length {doc_len}"
            )));
        }
        let mut set = ChangeSet::default();
        set.retain(from);
        set.insert(text);
        set.delete(to - from);
        set.retain(doc_len - to);
        Ok(set)
    }

    /// Operations in canonical order
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Length of the document this change set applies to
    pub fn len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                Op::Retain(n) | Op::Delete(n) => *n,
                Op::Insert(_) => 0,
            })
            .sum()
    }

    /// Length of the document after applying this change set
    pub fn new_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                Op::Retain(n) => *n,
                Op::Delete(_) => 0,
                Op::Insert(s) => char_len(s),
            })
            .sum()
    }

    /// True when applying this change set leaves the document untouched
    pub fn is_empty(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, Op::Retain(_)))
    }

    /// Total chars deleted plus total chars inserted
    pub fn affected_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                Op::Retain(_) => 0,
                Op::Delete(n) => *n,
                Op::Insert(s) => char_len(s),
            })
            .sum()
    }

    fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(Op::Retain(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Op::Retain(n));
        }
    }

    fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(Op::Delete(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Op::Delete(n));
        }
    }

    fn insert(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        let len = self.ops.len();
        match self.ops.last_mut() {
            Some(Op::Insert(last)) => last.push_str(s),
            Some(Op::Delete(_)) => {
                // Keep insert-before-delete order
                if len >= 2 {
                    if let Op::Insert(prev) = &mut self.ops[len - 2] {
                        prev.push_str(s);
                        return;
                    }
                }
                self.ops.insert(len - 1, Op::Insert(s.to_string()));
            }
            _ => self.ops.push(Op::Insert(s.to_string())),
        }
    }

    /// Compose `self` with `next`, yielding a change set equivalent to applying
    /// `self` and then `next`.
    ///
    /// `next` must apply to the document `self` produces.
    pub fn compose(&self, next: &ChangeSet) -> Result<ChangeSet, PatchError> {
        if self.new_len() != next.len() {
            return Err(PatchError::LengthMismatch {
                expected: self.new_len(),
                actual: next.len(),
            });
        }

        let mut result = ChangeSet::default();
        let mut iter_a = self.ops.iter().cloned();
        let mut iter_b = next.ops.iter().cloned();
        let mut op_a = iter_a.next();
        let mut op_b = iter_b.next();

        loop {
            match (op_a.take(), op_b.take()) {
                (None, None) => break,
                (Some(Op::Delete(n)), b) => {
                    result.delete(n);
                    op_a = iter_a.next();
                    op_b = b;
                }
                (a, Some(Op::Insert(s))) => {
                    result.insert(&s);
                    op_a = a;
                    op_b = iter_b.next();
                }
                (None, Some(_)) | (Some(_), None) => {
                    return Err(PatchError::LengthMismatch {
                        expected: self.new_len(),
                        actual: next.len(),
                    });
                }
                (Some(Op::Retain(i)), Some(Op::Retain(j))) => {
                    let n = i.min(j);
                    result.retain(n);
                    op_a = if i > n { Some(Op::Retain(i - n)) } else { iter_a.next() };
                    op_b = if j > n { Some(Op::Retain(j - n)) } else { iter_b.next() };
                }
                (Some(Op::Retain(i)), Some(Op::Delete(j))) => {
                    let n = i.min(j);
                    result.delete(n);
                    op_a = if i > n { Some(Op::Retain(i - n)) } else { iter_a.next() };
                    op_b = if j > n { Some(Op::Delete(j - n)) } else { iter_b.next() };
                }
                (Some(Op::Insert(s)), Some(Op::Retain(j))) => {
                    let len = char_len(&s);
                    let n = len.min(j);
                    let (head, tail) = split_chars(&s, n);
                    result.insert(head);
                    op_a = if len > n { Some(Op::Insert(tail.to_string())) } else { iter_a.next() };
                    op_b = if j > n { Some(Op::Retain(j - n)) } else { iter_b.next() };
                }
                (Some(Op::Insert(s)), Some(Op::Delete(j))) => {
                    // Text inserted by `self` and deleted by `next` cancels out
                    let len = char_len(&s);
                    let n = len.min(j);
                    let (_, tail) = split_chars(&s, n);
                    op_a = if len > n { Some(Op::Insert(tail.to_string())) } else { iter_a.next() };
                    op_b = if j > n { Some(Op::Delete(j - n)) } else { iter_b.next() };
                }
            }
        }

        Ok(result)
    }

    /// The edits as positional replacements to apply in order.
    ///
    /// Each replacement's `from`/`to` refer to the document as it stands after
    /// all earlier replacements have been applied.
    pub fn replacements(&self) -> Vec<Replacement> {
        let mut out = Vec::new();
        let mut pos = 0;
        let mut pending: Option<Replacement> = None;

        for op in &self.ops {
            match op {
                Op::Retain(n) => {
                    if let Some(r) = pending.take() {
                        pos = r.from + char_len(&r.text);
                        out.push(r);
                    }
                    pos += n;
                }
                Op::Insert(s) => {
                    let r = pending.get_or_insert_with(|| Replacement {
                        from: pos,
                        to: pos,
                        text: String::new(),
                    });
                    r.text.push_str(s);
                }
                Op::Delete(n) => {
                    let r = pending.get_or_insert_with(|| Replacement {
                        from: pos,
                        to: pos,
                        text: String::new(),
                    });
                    r.to += n;
                }
            }
        }
        if let Some(r) = pending {
            out.push(r);
        }
        out
    }

    /// Apply this change set to a rope in place
    pub fn apply_to_rope(&self, rope: &mut Rope) -> Result<(), PatchError> {
        if rope.len_chars() != self.len() {
            return Err(PatchError::LengthMismatch {
                expected: self.len(),
                actual: rope.len_chars(),
            });
        }
        let mut pos = 0;
        for op in &self.ops {
            match op {
                Op::Retain(n) => pos += n,
                Op::Delete(n) => rope.remove(pos..pos + n),
                Op::Insert(s) => {
                    rope.insert(pos, s);
                    pos += char_len(s);
                }
            }
        }
        Ok(())
    }

    /// Apply this change set to a string
    pub fn apply(&self, text: &str) -> Result<String, PatchError> {
        let mut rope = Rope::from_str(text);
        self.apply_to_rope(&mut rope)?;
        Ok(rope.to_string())
    }
}

// ============================================================================
// Wire format
// ============================================================================
//
// A JSON array where a number `n` retains `n` chars, `[n]` deletes `n` chars
// and `[n, "line", ...]` replaces `n` chars with the lines joined by "\n".

impl From<ChangeSet> for serde_json::Value {
    fn from(set: ChangeSet) -> Self {
        let mut out = Vec::new();
        let mut pending: Option<(usize, String)> = None;

        let flush = |pending: &mut Option<(usize, String)>, out: &mut Vec<serde_json::Value>| {
            if let Some((deleted, text)) = pending.take() {
                let mut entry = vec![serde_json::Value::from(deleted)];
                if !text.is_empty() {
                    entry.extend(text.split('\n').map(serde_json::Value::from));
                }
                out.push(serde_json::Value::Array(entry));
            }
        };

        for op in set.ops {
            match op {
                Op::Retain(n) => {
                    flush(&mut pending, &mut out);
                    out.push(serde_json::Value::from(n));
                }
                Op::Delete(n) => pending.get_or_insert_with(|| (0, String::new())).0 += n,
                Op::Insert(s) => pending.get_or_insert_with(|| (0, String::new())).1.push_str(&s),
            }
        }
        flush(&mut pending, &mut out);
        serde_json::Value::Array(out)
    }
}

impl TryFrom<serde_json::Value> for ChangeSet {
    type Error = PatchError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let items = value
            .as_array()
            .ok_or_else(|| PatchError::Malformed("expected an array".to_string()))?;

        let mut set = ChangeSet::default();
        for item in items {
            match item {
                serde_json::Value::Number(n) => {
                    let n = n
                        .as_u64()
                        .ok_or_else(|| PatchError::Malformed(format!("invalid retain length {n}")))?;
                    set.retain(n as usize);
                }
                serde_json::Value::Array(parts) => {
                    let (first, lines) = parts
                        .split_first()
                        .ok_or_else(|| PatchError::Malformed("empty replacement".to_string()))?;
                    let deleted = first.as_u64().ok_or_else(|| {
                        PatchError::Malformed(format!("invalid replacement length {first}"))
                    })?;
                    if !lines.is_empty() {
                        let lines = lines
                            .iter()
                            .map(|l| {
                                l.as_str().ok_or_else(|| {
                                    PatchError::Malformed(format!("non-string line {l}"))
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        set.insert(&lines.join("\n"));
                    }
                    set.delete(deleted as usize);
                }
                other => {
                    return Err(PatchError::Malformed(format!("unexpected element {other}")));
                }
            }
        }
        Ok(set)
    }
}

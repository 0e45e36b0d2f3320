//! Immutable, length-tracked instruction sequences.
//!
//! A [`CodeSeq`] is a persistent rope of [`Instr`]s. Every operation takes
//! sequences by value and returns a new one, so once a sub-sequence has been
//! built and measured its length can no longer change. Branch distances
//! computed from that length therefore stay valid however the sequence is
//! embedded afterwards.

use std::rc::Rc;

use crate::bytecode::op::{INSTR_WIDTH, Instr};

enum Node {
    Leaf(Instr),
    Join(Vec<Rc<Node>>),
}

impl Drop for Node {
    // A sequence grown one instruction at a time is a left-deep chain, so the
    // default recursive drop would use stack proportional to its length.
    fn drop(&mut self) {
        let Node::Join(children) = self else {
            return;
        };
        let mut pending = std::mem::take(children);
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(child) {
                if let Node::Join(grandchildren) = &mut node {
                    pending.append(grandchildren);
                }
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct CodeSeq {
    root: Option<Rc<Node>>,
    len: usize,
}

impl CodeSeq {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(instr: Instr) -> Self {
        Self {
            root: Some(Rc::new(Node::Leaf(instr))),
            len: 1,
        }
    }

    pub fn from_instrs(instrs: impl IntoIterator<Item = Instr>) -> Self {
        instrs
            .into_iter()
            .fold(Self::empty(), |seq, instr| seq.push(instr))
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.len * INSTR_WIDTH
    }

    /// `self` followed by `other`, in constant time.
    pub fn concat(self, other: CodeSeq) -> CodeSeq {
        match (self.root, other.root) {
            (None, root) => CodeSeq {
                root,
                len: other.len,
            },
            (root, None) => CodeSeq { root, len: self.len },
            (Some(a), Some(b)) => CodeSeq {
                root: Some(Rc::new(Node::Join(vec![a, b]))),
                len: self.len + other.len,
            },
        }
    }

    pub fn push(self, instr: Instr) -> CodeSeq {
        self.concat(CodeSeq::single(instr))
    }

    pub fn prepend(self, instr: Instr) -> CodeSeq {
        CodeSeq::single(instr).concat(self)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self.root.iter().map(|rc| rc.as_ref()).collect(),
        }
    }

    pub fn to_vec(&self) -> Vec<Instr> {
        let mut out = Vec::with_capacity(self.len);
        out.extend(self.iter());
        out
    }
}

/// In-order traversal of a [`CodeSeq`].
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl Iterator for Iter<'_> {
    type Item = Instr;

    fn next(&mut self) -> Option<Instr> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Leaf(instr) => return Some(*instr),
                Node::Join(children) => {
                    self.stack.extend(children.iter().rev().map(|rc| rc.as_ref()));
                }
            }
        }
        None
    }
}

impl<'a> IntoIterator for &'a CodeSeq {
    type Item = Instr;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl PartialEq for CodeSeq {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for CodeSeq {}

impl std::fmt::Debug for CodeSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

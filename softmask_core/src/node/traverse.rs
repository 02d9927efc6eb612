// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Iterators over tree topology.

use super::MaskTree;
use super::id::{INVALID, NodeId};

/// Iterator over the direct element children of a node, in sibling order.
///
/// Returned by [`MaskTree::children`].
#[derive(Debug)]
pub struct Children<'t> {
    tree: &'t MaskTree,
    cursor: u32,
}

impl<'t> Children<'t> {
    pub(crate) fn new(tree: &'t MaskTree, first: u32) -> Self {
        Self {
            tree,
            cursor: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == INVALID {
            return None;
        }
        let idx = self.cursor;
        self.cursor = self.tree.next_sibling[idx as usize];
        self.tree.handle(idx)
    }
}

/// Iterator over a node's strict element ancestors, nearest first.
#[derive(Debug)]
pub struct Ancestors<'t> {
    tree: &'t MaskTree,
    cursor: u32,
}

impl<'t> Ancestors<'t> {
    pub(crate) fn new(tree: &'t MaskTree, start: u32) -> Self {
        Self {
            tree,
            cursor: tree.parent[start as usize],
        }
    }
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == INVALID {
            return None;
        }
        let idx = self.cursor;
        self.cursor = self.tree.parent[idx as usize];
        self.tree.handle(idx)
    }
}

impl MaskTree {
    /// Returns an iterator over the strict ancestors of `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        self.validate(id);
        Ancestors::new(self, id.idx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::MaskTree;
    use alloc::vec::Vec;

    #[test]
    fn children_in_insertion_order() {
        let mut tree = MaskTree::new();
        let p = tree.create_node();
        let a = tree.create_node();
        let b = tree.create_node();
        let c = tree.create_node();
        tree.add_child(p, a);
        tree.add_child(p, b);
        tree.add_child(p, c);

        let kids: Vec<_> = tree.children(p).collect();
        assert_eq!(kids, alloc::vec![a, b, c]);
    }

    #[test]
    fn children_after_middle_removal() {
        let mut tree = MaskTree::new();
        let p = tree.create_node();
        let a = tree.create_node();
        let b = tree.create_node();
        let c = tree.create_node();
        tree.add_child(p, a);
        tree.add_child(p, b);
        tree.add_child(p, c);
        tree.remove_from_parent(b);

        let kids: Vec<_> = tree.children(p).collect();
        assert_eq!(kids, alloc::vec![a, c]);
    }

    #[test]
    fn ancestors_nearest_first() {
        let mut tree = MaskTree::new();
        let root = tree.create_node();
        let mid = tree.create_node();
        let leaf = tree.create_node();
        tree.add_child(root, mid);
        tree.add_child(mid, leaf);

        let chain: Vec<_> = tree.ancestors(leaf).collect();
        assert_eq!(chain, alloc::vec![mid, root]);
        assert_eq!(tree.root_of(leaf), root);
    }
}

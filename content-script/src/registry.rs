//! Node-keyed association tables.
//!
//! Keys are node handles, never positions in a scan. Entries for nodes that
//! left the document are dropped by [`NodeTable::sweep`], which the session
//! runs at the start of every reconciliation pass and after mutation batches
//! that only removed nodes.

use std::collections::HashMap;
use std::hash::Hash;

use crate::dom::HostDom;

#[derive(Debug, Clone)]
pub struct NodeTable<N, V> {
    entries: HashMap<N, V>,
}

impl<N: Eq + Hash, V> Default for NodeTable<N, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<N: Eq + Hash, V> NodeTable<N, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &N) -> Option<&V> {
        self.entries.get(node)
    }

    pub fn contains(&self, node: &N) -> bool {
        self.entries.contains_key(node)
    }

    pub fn insert(&mut self, node: N, value: V) -> Option<V> {
        self.entries.insert(node, value)
    }

    pub fn remove(&mut self, node: &N) -> Option<V> {
        self.entries.remove(node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries whose node is no longer in the document. Returns how many were dropped.
    pub fn sweep<D>(&mut self, dom: &D) -> usize
    where
        D: HostDom<Node = N>,
    {
        let before = self.entries.len();
        self.entries.retain(|node, _| dom.is_connected(node));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    #[test]
    fn sweep_drops_detached_nodes_only() {
        let mut dom = MemoryDom::new();
        let body = dom.body_node();
        let kept = dom.element(body, "div");
        let gone = dom.element(body, "div");

        let mut table = NodeTable::new();
        table.insert(kept, "kept");
        table.insert(gone, "gone");

        dom.remove(gone);
        assert_eq!(table.sweep(&dom), 1);
        assert_eq!(table.get(&kept), Some(&"kept"));
        assert!(!table.contains(&gone));
    }
}

//! # Índice da árvore de fusões
//!
//! Colaborador somente-leitura: para cada entrada da árvore fornece
//! (id do nó, snapshot, id do descendente, id da top leaf) e, por snapshot,
//! a lista de entradas em ordem de índice estrutural.
//!
//! Ponteiros seguem a convenção `índice = id − 1`, tanto para descendentes
//! quanto para top leaves. O índice estrutural de um nó no seu snapshot é
//! `node_id − 1`.
//!
//! ## Layout depth-first
//!
//! ```text
//!  entrada:   0     1     2     3     4
//!             D ─── P ─── P' ── Q ─── Q'
//!             │     main branch │  merging branch
//!             └── top leaf(D) = P'
//! ```
//!
//! Um progenitor é principal sse seu índice de entrada ≤ top leaf do
//! descendente; os ramos secundários vêm depois da top leaf.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::ids::{NodeIndex, Snapshot};

/// Uma entrada da árvore de fusões
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Id do nó no catálogo (1-based dentro do snapshot)
    pub node_id: i64,
    pub snapshot: i64,
    /// Id (índice + 1) da entrada descendente; ≤ 0 se não houver
    pub descendant_id: i64,
    /// Id (índice + 1) da top leaf do ramo principal
    pub top_leaf_id: i64,
}

impl TreeEntry {
    pub fn node_index(&self) -> Option<NodeIndex> {
        pointer_to_index(self.node_id)
    }

    pub fn descendant_entry(&self) -> Option<usize> {
        pointer_to_index(self.descendant_id)
    }

    pub fn top_leaf_entry(&self) -> Option<usize> {
        pointer_to_index(self.top_leaf_id)
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        usize::try_from(self.snapshot).ok()
    }
}

fn pointer_to_index(id: i64) -> Option<usize> {
    if id > 0 { usize::try_from(id - 1).ok() } else { None }
}

/// Acesso somente-leitura à árvore
pub trait TreeIndex {
    /// Número de snapshots cobertos pela árvore
    fn num_snapshots(&self) -> usize;

    /// Índices de entrada do snapshot, em ordem de índice estrutural
    fn snapshot_entries(&self, snapshot: Snapshot) -> &[usize];

    fn entry(&self, index: usize) -> Option<TreeEntry>;

    fn num_entries(&self) -> usize;

    fn node_count(&self, snapshot: Snapshot) -> usize {
        self.snapshot_entries(snapshot).len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ÁRVORE EM COLUNAS
// ═══════════════════════════════════════════════════════════════════════════

/// Árvore de fusões em formato colunar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergerTree {
    node_id: Vec<i64>,
    snapshot: Vec<i64>,
    descendant_id: Vec<i64>,
    top_leaf_id: Vec<i64>,
    /// Por snapshot, os índices de entrada dos seus nós
    snapshots: Vec<Vec<usize>>,
}

impl MergerTree {
    pub fn from_columns(
        node_id: Vec<i64>,
        snapshot: Vec<i64>,
        descendant_id: Vec<i64>,
        top_leaf_id: Vec<i64>,
        snapshots: Vec<Vec<usize>>,
    ) -> TraceResult<Self> {
        let tree = Self {
            node_id,
            snapshot,
            descendant_id,
            top_leaf_id,
            snapshots,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Parse JSON (formato de `to_json_string`)
    pub fn from_json_str(content: &str) -> TraceResult<Self> {
        let tree: Self = serde_json::from_str(content)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn from_file(path: &Path) -> TraceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceError::InvalidTree(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> TraceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Valida apenas a forma das colunas; a consistência semântica é
    /// verificada pelo atribuidor snapshot a snapshot
    fn validate(&self) -> TraceResult<()> {
        let n = self.node_id.len();
        if self.snapshot.len() != n || self.descendant_id.len() != n || self.top_leaf_id.len() != n {
            return Err(TraceError::InvalidTree(format!(
                "column lengths differ (node_id {}, snapshot {}, descendant_id {}, top_leaf_id {})",
                n,
                self.snapshot.len(),
                self.descendant_id.len(),
                self.top_leaf_id.len()
            )));
        }
        if let Some(bad) = self.snapshots.iter().flatten().find(|&&entry| entry >= n) {
            return Err(TraceError::InvalidTree(format!(
                "snapshot list references entry {} of {}",
                bad, n
            )));
        }
        Ok(())
    }
}

impl TreeIndex for MergerTree {
    fn num_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    fn snapshot_entries(&self, snapshot: Snapshot) -> &[usize] {
        self.snapshots.get(snapshot).map(Vec::as_slice).unwrap_or(&[])
    }

    fn entry(&self, index: usize) -> Option<TreeEntry> {
        Some(TreeEntry {
            node_id: *self.node_id.get(index)?,
            snapshot: *self.snapshot.get(index)?,
            descendant_id: *self.descendant_id.get(index)?,
            top_leaf_id: *self.top_leaf_id.get(index)?,
        })
    }

    fn num_entries(&self) -> usize {
        self.node_id.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════

/// Referência a um nó durante a construção
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub snapshot: Snapshot,
    pub index: NodeIndex,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    descendant: NodeRef,
    main: bool,
}

/// Constrói uma [`MergerTree`] depth-first a partir de ligações
/// progenitor → descendente, derivando os ids de top leaf
///
/// ```
/// use galflow_core::tree::{MergerTreeBuilder, TreeIndex};
///
/// let mut builder = MergerTreeBuilder::new(2);
/// let a = builder.add_node(0);
/// let b = builder.add_node(1);
/// builder.link_main(a, b);
/// let tree = builder.build().unwrap();
/// assert_eq!(tree.node_count(1), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MergerTreeBuilder {
    links: Vec<Vec<Option<Link>>>,
}

impl MergerTreeBuilder {
    pub fn new(num_snapshots: usize) -> Self {
        Self {
            links: vec![Vec::new(); num_snapshots],
        }
    }

    pub fn add_node(&mut self, snapshot: Snapshot) -> NodeRef {
        if snapshot >= self.links.len() {
            self.links.resize(snapshot + 1, Vec::new());
        }
        let nodes = &mut self.links[snapshot];
        nodes.push(None);
        NodeRef {
            snapshot,
            index: nodes.len() - 1,
        }
    }

    pub fn add_nodes(&mut self, snapshot: Snapshot, count: usize) -> Vec<NodeRef> {
        (0..count).map(|_| self.add_node(snapshot)).collect()
    }

    /// Liga `progenitor` ao ramo principal de `descendant`
    pub fn link_main(&mut self, progenitor: NodeRef, descendant: NodeRef) -> &mut Self {
        self.set_link(progenitor, descendant, true)
    }

    /// Liga `progenitor` como ramo secundário (fusão) de `descendant`
    pub fn link_merging(&mut self, progenitor: NodeRef, descendant: NodeRef) -> &mut Self {
        self.set_link(progenitor, descendant, false)
    }

    fn set_link(&mut self, progenitor: NodeRef, descendant: NodeRef, main: bool) -> &mut Self {
        if let Some(slot) = self
            .links
            .get_mut(progenitor.snapshot)
            .and_then(|nodes| nodes.get_mut(progenitor.index))
        {
            *slot = Some(Link { descendant, main });
        }
        self
    }

    fn contains(&self, node: NodeRef) -> bool {
        self.links
            .get(node.snapshot)
            .is_some_and(|nodes| node.index < nodes.len())
    }

    pub fn build(&self) -> TraceResult<MergerTree> {
        // Progenitores por nó: principal primeiro, depois fusões em ordem de inserção
        let mut progenitors: Vec<Vec<Vec<NodeRef>>> =
            self.links.iter().map(|nodes| vec![Vec::new(); nodes.len()]).collect();
        let mut has_main: HashSet<NodeRef> = HashSet::new();
        let mut roots = Vec::new();

        for (snapshot, nodes) in self.links.iter().enumerate() {
            for (index, link) in nodes.iter().enumerate() {
                let node = NodeRef { snapshot, index };
                let Some(link) = link else {
                    roots.push(node);
                    continue;
                };
                let desc = link.descendant;
                if !self.contains(desc) {
                    return Err(TraceError::InvalidTree(format!("{:?} links to unknown {:?}", node, desc)));
                }
                if desc.snapshot <= snapshot {
                    return Err(TraceError::InvalidTree(format!(
                        "{:?} links backwards in time to {:?}",
                        node, desc
                    )));
                }
                let list = &mut progenitors[desc.snapshot][desc.index];
                if link.main {
                    if !has_main.insert(desc) {
                        return Err(TraceError::InvalidTree(format!("{:?} has two main progenitors", desc)));
                    }
                    list.insert(0, node);
                } else {
                    list.push(node);
                }
            }
        }

        // Pré-ordem iterativa: ramo principal contíguo a partir de cada nó
        let mut entry_of: Vec<Vec<usize>> = self.links.iter().map(|nodes| vec![0; nodes.len()]).collect();
        let mut order = Vec::new();
        let mut stack: Vec<NodeRef> = roots.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            entry_of[node.snapshot][node.index] = order.len();
            order.push(node);
            stack.extend(progenitors[node.snapshot][node.index].iter().rev());
        }

        // Top leaf: segue progenitores principais até o início do ramo
        let mut top_leaf: Vec<Vec<usize>> = entry_of.clone();
        for snapshot in 0..self.links.len() {
            for index in 0..self.links[snapshot].len() {
                if let Some(&first) = progenitors[snapshot][index].first() {
                    if has_main.contains(&NodeRef { snapshot, index }) {
                        top_leaf[snapshot][index] = top_leaf[first.snapshot][first.index];
                    }
                }
            }
        }

        let mut node_id = Vec::with_capacity(order.len());
        let mut snapshot_col = Vec::with_capacity(order.len());
        let mut descendant_id = Vec::with_capacity(order.len());
        let mut top_leaf_id = Vec::with_capacity(order.len());
        for node in &order {
            node_id.push(node.index as i64 + 1);
            snapshot_col.push(node.snapshot as i64);
            descendant_id.push(
                self.links[node.snapshot][node.index]
                    .map_or(-1, |link| entry_of[link.descendant.snapshot][link.descendant.index] as i64 + 1),
            );
            top_leaf_id.push(top_leaf[node.snapshot][node.index] as i64 + 1);
        }

        MergerTree::from_columns(node_id, snapshot_col, descendant_id, top_leaf_id, entry_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_convention() {
        let entry = TreeEntry { node_id: 3, snapshot: 1, descendant_id: 0, top_leaf_id: 5 };
        assert_eq!(entry.node_index(), Some(2));
        assert_eq!(entry.descendant_entry(), None);
        assert_eq!(entry.top_leaf_entry(), Some(4));

        let negative = TreeEntry { descendant_id: -1, ..entry };
        assert_eq!(negative.descendant_entry(), None);
    }

    #[test]
    fn test_column_length_mismatch() {
        let err = MergerTree::from_columns(vec![1], vec![0, 0], vec![-1], vec![1], vec![vec![0]]);
        assert!(matches!(err, Err(TraceError::InvalidTree(_))));
    }

    #[test]
    fn test_builder_main_branch_layout() {
        let mut builder = MergerTreeBuilder::new(3);
        let d = builder.add_node(2);
        let p = builder.add_node(1);
        let q = builder.add_node(1);
        let pp = builder.add_node(0);
        builder.link_main(p, d).link_merging(q, d).link_main(pp, p);
        let tree = builder.build().unwrap();

        let entry = |node: NodeRef| tree.snapshot_entries(node.snapshot)[node.index];
        let d_entry = tree.entry(entry(d)).unwrap();
        let top = d_entry.top_leaf_entry().unwrap();

        assert_eq!(top, entry(pp));
        assert!(entry(p) <= top);
        assert!(entry(q) > top);
        assert_eq!(tree.entry(entry(q)).unwrap().descendant_entry(), Some(entry(d)));
    }

    #[test]
    fn test_builder_node_ids_follow_index() {
        let mut builder = MergerTreeBuilder::new(1);
        builder.add_nodes(0, 3);
        let tree = builder.build().unwrap();
        let ids: Vec<i64> = tree
            .snapshot_entries(0)
            .iter()
            .map(|&e| tree.entry(e).unwrap().node_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_builder_rejects_two_main_progenitors() {
        let mut builder = MergerTreeBuilder::new(2);
        let a = builder.add_node(0);
        let b = builder.add_node(0);
        let d = builder.add_node(1);
        builder.link_main(a, d).link_main(b, d);
        assert!(matches!(builder.build(), Err(TraceError::InvalidTree(_))));
    }

    #[test]
    fn test_builder_rejects_backward_link() {
        let mut builder = MergerTreeBuilder::new(2);
        let a = builder.add_node(1);
        let b = builder.add_node(0);
        builder.link_main(a, b);
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut builder = MergerTreeBuilder::new(2);
        let a = builder.add_node(0);
        let b = builder.add_node(1);
        builder.link_main(a, b);
        let tree = builder.build().unwrap();

        let json = tree.to_json_string().unwrap();
        let back = MergerTree::from_json_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}

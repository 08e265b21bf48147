//! # Atribuidor de identificadores
//!
//! Percorre os snapshots em ordem temporal. Para cada snapshot:
//!
//! 1. nós sem identificador recebem o próximo valor do contador global,
//!    em ordem de índice estrutural;
//! 2. a tabela é resolvida (nenhum nó sem identificador);
//! 3. cada descendente é resolvido pelo ponteiro da árvore;
//! 4. progenitores principais propagam o identificador para o slot do
//!    descendente (tabela materializada sob demanda na janela);
//! 5. o [`SnapshotLinkage`] é emitido.
//!
//! A janela de tabelas pendentes é indexada por snapshot e nunca se estende
//! além do maior skip observado.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{TraceError, TraceResult};
use crate::ids::{IdCounter, NodeIndex, ObjectId, Snapshot};
use crate::linkage::{LinkClass, SnapshotLinkage};
use crate::table::{IdentifierTable, PendingTable, TableMeta};
use crate::tree::TreeIndex;

/// Resultado do processamento de um snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedSnapshot {
    pub table: IdentifierTable,
    pub linkage: SnapshotLinkage,
}

/// Classe do nó e posição resolvida do descendente
#[derive(Debug, Clone, Copy)]
struct NodeLink {
    class: LinkClass,
    descendant: Option<(Snapshot, NodeIndex)>,
}

/// Atribuidor de identificadores persistentes
pub struct IdentifierAssigner<'t, T: TreeIndex + ?Sized> {
    tree: &'t T,
    num_snapshots: usize,
    counter: IdCounter,
    pending: BTreeMap<Snapshot, PendingTable>,
    next_snapshot: Snapshot,
    max_window: usize,
}

impl<'t, T: TreeIndex + ?Sized> IdentifierAssigner<'t, T> {
    /// Cria atribuidor cobrindo todos os snapshots da árvore
    pub fn new(tree: &'t T) -> Self {
        Self::with_num_snapshots(tree, tree.num_snapshots())
    }

    /// Cria atribuidor limitado aos primeiros `num_snapshots`
    pub fn with_num_snapshots(tree: &'t T, num_snapshots: usize) -> Self {
        Self {
            tree,
            num_snapshots: num_snapshots.min(tree.num_snapshots()),
            counter: IdCounter::new(),
            pending: BTreeMap::new(),
            next_snapshot: 0,
            max_window: 0,
        }
    }

    pub fn num_snapshots(&self) -> usize {
        self.num_snapshots
    }

    pub fn next_snapshot(&self) -> Snapshot {
        self.next_snapshot
    }

    pub fn counter(&self) -> &IdCounter {
        &self.counter
    }

    /// Tabelas futuras atualmente materializadas
    pub fn window_len(&self) -> usize {
        self.pending.len()
    }

    /// Maior janela observada durante a execução
    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Processa o próximo snapshot; `None` quando todos foram processados
    pub fn step(&mut self) -> TraceResult<Option<AssignedSnapshot>> {
        let snapshot = self.next_snapshot;
        if snapshot >= self.num_snapshots {
            return Ok(None);
        }

        let tree = self.tree;
        let entries = tree.snapshot_entries(snapshot);
        let num_nodes = entries.len();

        let mut pending = self
            .pending
            .remove(&snapshot)
            .unwrap_or_else(|| PendingTable::with_len(num_nodes));
        if pending.len() != num_nodes {
            return Err(TraceError::structural(
                snapshot,
                format!("table sized {} for {} nodes", pending.len(), num_nodes),
            ));
        }

        let first_new = self.counter.next_id();
        let fresh = pending.fill_unassigned(&mut self.counter)?;
        let ids = pending.resolve(snapshot)?;
        let meta = TableMeta {
            snapshot,
            max_object_id: self.counter.max_assigned(),
            first_new_object_id: first_new,
        };
        info!(
            snapshot,
            nodes = num_nodes,
            new = fresh,
            max_id = ?meta.max_object_id,
            first_new_id = first_new,
            "Assigned object IDs"
        );

        self.next_snapshot += 1;

        if num_nodes == 0 {
            return Ok(Some(AssignedSnapshot {
                table: IdentifierTable::new(meta, ids),
                linkage: SnapshotLinkage::empty(snapshot),
            }));
        }

        let links = self.classify(snapshot, entries)?;
        self.propagate_main_progenitors(snapshot, &ids, &links)?;

        let classes: Vec<LinkClass> = links.iter().map(|link| link.class).collect();
        Ok(Some(AssignedSnapshot {
            table: IdentifierTable::new(meta, ids),
            linkage: SnapshotLinkage::from_classes(snapshot, &classes),
        }))
    }

    /// Resolve descendentes e classifica cada nó
    fn classify(&self, snapshot: Snapshot, entries: &[usize]) -> TraceResult<Vec<NodeLink>> {
        let tree = self.tree;
        let mut links = Vec::with_capacity(entries.len());

        for (node, &entry_index) in entries.iter().enumerate() {
            let entry = tree
                .entry(entry_index)
                .ok_or_else(|| TraceError::structural(snapshot, format!("entry {} missing", entry_index)))?;
            if entry.snapshot() != Some(snapshot) {
                return Err(TraceError::structural(
                    snapshot,
                    format!("entry {} reports snapshot {}", entry_index, entry.snapshot),
                ));
            }
            if entry.node_index() != Some(node) {
                return Err(TraceError::structural(
                    snapshot,
                    format!("node ids not contiguous: position {} has id {}", node, entry.node_id),
                ));
            }

            let Some(desc_index) = entry.descendant_entry() else {
                links.push(NodeLink { class: LinkClass::Fading, descendant: None });
                continue;
            };
            let desc = tree.entry(desc_index).ok_or_else(|| {
                TraceError::structural(snapshot, format!("descendant entry {} outside tree", desc_index))
            })?;
            let desc_snapshot = desc
                .snapshot()
                .filter(|&s| s > snapshot && s < tree.num_snapshots())
                .ok_or_else(|| {
                    TraceError::structural(
                        snapshot,
                        format!("node {} has descendant in snapshot {}", node, desc.snapshot),
                    )
                })?;
            let desc_node = desc
                .node_index()
                .filter(|&n| n < tree.node_count(desc_snapshot))
                .ok_or_else(|| {
                    TraceError::structural(
                        snapshot,
                        format!("descendant of node {} has invalid id {}", node, desc.node_id),
                    )
                })?;
            let top_leaf = desc
                .top_leaf_entry()
                .filter(|&t| t < tree.num_entries())
                .ok_or_else(|| {
                    TraceError::structural(snapshot, format!("descendant entry {} has no valid top leaf", desc_index))
                })?;

            let skip = desc_snapshot - snapshot;
            let class = if entry_index <= top_leaf {
                if skip == 1 {
                    LinkClass::Surviving
                } else {
                    LinkClass::Skipping { skip }
                }
            } else {
                LinkClass::Merging {
                    target_snapshot: desc_snapshot,
                    target_node: desc_node,
                }
            };
            links.push(NodeLink {
                class,
                descendant: Some((desc_snapshot, desc_node)),
            });
        }

        Ok(links)
    }

    /// Escreve os identificadores dos progenitores principais nas tabelas
    /// dos descendentes
    fn propagate_main_progenitors(
        &mut self,
        snapshot: Snapshot,
        ids: &[ObjectId],
        links: &[NodeLink],
    ) -> TraceResult<()> {
        let tree = self.tree;
        let mut by_target: BTreeMap<Snapshot, Vec<(NodeIndex, ObjectId)>> = BTreeMap::new();

        for (node, link) in links.iter().enumerate() {
            if !matches!(link.class, LinkClass::Surviving | LinkClass::Skipping { .. }) {
                continue;
            }
            if let Some((target_snapshot, target_node)) = link.descendant {
                by_target.entry(target_snapshot).or_default().push((target_node, ids[node]));
            }
        }

        debug!(
            snapshot,
            descendant_snapshots = ?by_target.keys().collect::<Vec<_>>(),
            main_progenitors = by_target.values().map(Vec::len).sum::<usize>(),
            nodes = links.len(),
            "Marking main descendants"
        );

        // Descendentes além do fim da execução não recebem tabela
        for (target_snapshot, writes) in by_target.range(..self.num_snapshots) {
            let target_snapshot = *target_snapshot;
            let table = self
                .pending
                .entry(target_snapshot)
                .or_insert_with(|| PendingTable::with_len(tree.node_count(target_snapshot)));
            for &(target_node, id) in writes {
                table.inherit(target_node, id).map_err(|_| TraceError::DuplicateTarget {
                    snapshot,
                    target_snapshot,
                    target_node,
                })?;
            }
        }

        self.max_window = self.max_window.max(self.pending.len());
        Ok(())
    }
}

impl<T: TreeIndex + ?Sized> Iterator for IdentifierAssigner<'_, T> {
    type Item = TraceResult<AssignedSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{MergerTree, MergerTreeBuilder};

    #[test]
    fn test_new_ids_in_index_order() {
        let mut builder = MergerTreeBuilder::new(1);
        builder.add_nodes(0, 3);
        let tree = builder.build().unwrap();

        let mut assigner = IdentifierAssigner::new(&tree);
        let snap = assigner.step().unwrap().unwrap();
        assert_eq!(snap.table.ids(), &[0, 1, 2]);
        assert_eq!(snap.table.meta().max_object_id, Some(2));
        assert_eq!(snap.table.meta().first_new_object_id, 0);
        assert_eq!(snap.linkage.fading(), &[0, 1, 2]);
        assert!(assigner.step().unwrap().is_none());
    }

    #[test]
    fn test_main_progenitor_propagates_id() {
        let mut builder = MergerTreeBuilder::new(2);
        let a = builder.add_node(0);
        let b = builder.add_node(0);
        let new = builder.add_node(1);
        let a1 = builder.add_node(1);
        builder.link_main(a, a1).link_merging(b, a1);
        let tree = builder.build().unwrap();

        let snaps: Vec<_> = IdentifierAssigner::new(&tree).collect::<TraceResult<_>>().unwrap();
        assert_eq!(snaps[0].table.ids(), &[0, 1]);
        assert_eq!(snaps[0].linkage.surviving(), &[0]);
        assert_eq!(snaps[0].linkage.merging(), &[1]);
        assert_eq!(
            snaps[0].linkage.class(1),
            Some(LinkClass::Merging { target_snapshot: 1, target_node: a1.index })
        );
        // nó novo recebe id 2; a1 herda 0
        assert_eq!(snaps[1].table.get(new.index), Some(2));
        assert_eq!(snaps[1].table.get(a1.index), Some(0));
        assert_eq!(snaps[1].table.meta().first_new_object_id, 2);
    }

    #[test]
    fn test_skip_window() {
        let mut builder = MergerTreeBuilder::new(4);
        let a = builder.add_node(0);
        builder.add_node(1);
        let a3 = builder.add_node(3);
        builder.add_node(2);
        builder.link_main(a, a3);
        let tree = builder.build().unwrap();

        let mut assigner = IdentifierAssigner::new(&tree);
        let first = assigner.step().unwrap().unwrap();
        assert_eq!(first.linkage.class(0), Some(LinkClass::Skipping { skip: 3 }));
        assert_eq!(assigner.window_len(), 1);

        let rest: Vec<_> = assigner.by_ref().collect::<TraceResult<_>>().unwrap();
        assert_eq!(rest[2].table.ids(), &[0]);
        assert_eq!(assigner.window_len(), 0);
    }

    #[test]
    fn test_duplicate_target_is_fatal() {
        // D (snap 1) com dois progenitores dentro do ramo principal
        let tree = MergerTree::from_columns(
            vec![1, 1, 2],
            vec![1, 0, 0],
            vec![-1, 1, 1],
            vec![3, 2, 3],
            vec![vec![1, 2], vec![0]],
        )
        .unwrap();
        let err = IdentifierAssigner::new(&tree).step().unwrap_err();
        assert!(matches!(
            err,
            TraceError::DuplicateTarget { snapshot: 0, target_snapshot: 1, target_node: 0 }
        ));
    }

    #[test]
    fn test_snapshot_mismatch_is_fatal() {
        let tree = MergerTree::from_columns(vec![1], vec![2], vec![-1], vec![1], vec![vec![0]]).unwrap();
        let err = IdentifierAssigner::new(&tree).step().unwrap_err();
        assert!(matches!(err, TraceError::StructuralInconsistency { snapshot: 0, .. }));
    }

    #[test]
    fn test_non_contiguous_node_ids_are_fatal() {
        let tree = MergerTree::from_columns(
            vec![1, 3],
            vec![0, 0],
            vec![-1, -1],
            vec![1, 2],
            vec![vec![0, 1]],
        )
        .unwrap();
        assert!(IdentifierAssigner::new(&tree).step().is_err());
    }

    #[test]
    fn test_descendant_in_same_snapshot_is_fatal() {
        let tree = MergerTree::from_columns(
            vec![1, 2],
            vec![0, 0],
            vec![2, -1],
            vec![1, 2],
            vec![vec![0, 1]],
        )
        .unwrap();
        assert!(matches!(
            IdentifierAssigner::new(&tree).step(),
            Err(TraceError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    fn test_empty_snapshot_short_circuits() {
        let mut builder = MergerTreeBuilder::new(3);
        builder.add_node(0);
        builder.add_node(2);
        let tree = builder.build().unwrap();

        let snaps: Vec<_> = IdentifierAssigner::new(&tree).collect::<TraceResult<_>>().unwrap();
        assert!(snaps[1].table.is_empty());
        assert_eq!(snaps[1].linkage.num_nodes(), 0);
        assert_eq!(snaps[1].table.meta().max_object_id, Some(0));
        assert_eq!(snaps[1].table.meta().first_new_object_id, 1);
        assert_eq!(snaps[2].table.ids(), &[1]);
    }

    #[test]
    fn test_capped_run_keeps_links_past_the_end() {
        let mut builder = MergerTreeBuilder::new(3);
        let a = builder.add_node(0);
        let a1 = builder.add_node(1);
        let a2 = builder.add_node(2);
        builder.link_main(a, a1).link_main(a1, a2);
        let tree = builder.build().unwrap();

        let mut assigner = IdentifierAssigner::with_num_snapshots(&tree, 2);
        let snaps: Vec<_> = assigner.by_ref().collect::<TraceResult<_>>().unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].linkage.class(0), Some(LinkClass::Surviving));
        assert_eq!(assigner.window_len(), 0);
        assert_eq!(assigner.counter().assigned(), 1);
    }
}

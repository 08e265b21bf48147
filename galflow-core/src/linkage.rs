//! Ligações de um snapshot para os seguintes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::ids::{NodeIndex, Snapshot};

/// Classificação da ligação de um nó ao seu descendente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkClass {
    /// Sem descendente
    Fading,
    /// Progenitor principal no snapshot seguinte
    Surviving,
    /// Progenitor principal `skip` snapshots à frente (`skip > 1`)
    Skipping { skip: usize },
    /// Ramo secundário do descendente
    Merging {
        target_snapshot: Snapshot,
        target_node: NodeIndex,
    },
}

/// Partição dos nós de um snapshot em {fading, surviving, skipping, merging}
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLinkage {
    snapshot: Snapshot,
    fading: Vec<NodeIndex>,
    surviving: Vec<NodeIndex>,
    skipping: Vec<NodeIndex>,
    merging: Vec<NodeIndex>,
    merge_target_nodes: Vec<NodeIndex>,
    merge_target_snapshots: Vec<Snapshot>,
    /// Por nó: snapshot do descendente − snapshot atual (`None` para fading)
    skip_counts: Vec<Option<usize>>,
}

impl SnapshotLinkage {
    /// Linkage de um snapshot vazio
    pub fn empty(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    /// Monta a partição a partir da classe de cada nó, em ordem de índice
    pub fn from_classes(snapshot: Snapshot, classes: &[LinkClass]) -> Self {
        let mut linkage = Self::empty(snapshot);
        linkage.skip_counts.reserve(classes.len());
        for (node, class) in classes.iter().enumerate() {
            let skip = match *class {
                LinkClass::Fading => {
                    linkage.fading.push(node);
                    None
                }
                LinkClass::Surviving => {
                    linkage.surviving.push(node);
                    Some(1)
                }
                LinkClass::Skipping { skip } => {
                    linkage.skipping.push(node);
                    Some(skip)
                }
                LinkClass::Merging { target_snapshot, target_node } => {
                    linkage.merging.push(node);
                    linkage.merge_target_nodes.push(target_node);
                    linkage.merge_target_snapshots.push(target_snapshot);
                    Some(target_snapshot.saturating_sub(snapshot))
                }
            };
            linkage.skip_counts.push(skip);
        }
        linkage
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub fn num_nodes(&self) -> usize {
        self.skip_counts.len()
    }

    pub fn fading(&self) -> &[NodeIndex] {
        &self.fading
    }

    pub fn surviving(&self) -> &[NodeIndex] {
        &self.surviving
    }

    pub fn skipping(&self) -> &[NodeIndex] {
        &self.skipping
    }

    pub fn merging(&self) -> &[NodeIndex] {
        &self.merging
    }

    pub fn skip_count(&self, node: NodeIndex) -> Option<usize> {
        self.skip_counts.get(node).copied().flatten()
    }

    /// Maior skip do snapshot (`None` se todos os nós desaparecem)
    pub fn max_skip(&self) -> Option<usize> {
        self.skip_counts.iter().flatten().copied().max()
    }

    /// Fusões: (nó, snapshot alvo, nó alvo)
    pub fn mergers(&self) -> impl Iterator<Item = (NodeIndex, Snapshot, NodeIndex)> + '_ {
        self.merging
            .iter()
            .zip(&self.merge_target_snapshots)
            .zip(&self.merge_target_nodes)
            .map(|((&node, &snapshot), &target)| (node, snapshot, target))
    }

    /// Fusões agrupadas por snapshot alvo, em ordem crescente
    pub fn mergers_by_target(&self) -> BTreeMap<Snapshot, Vec<(NodeIndex, NodeIndex)>> {
        let mut grouped: BTreeMap<Snapshot, Vec<(NodeIndex, NodeIndex)>> = BTreeMap::new();
        for (node, snapshot, target) in self.mergers() {
            grouped.entry(snapshot).or_default().push((node, target));
        }
        grouped
    }

    /// Classe de um nó
    pub fn class(&self, node: NodeIndex) -> Option<LinkClass> {
        if node >= self.num_nodes() {
            return None;
        }
        if let Ok(pos) = self.merging.binary_search(&node) {
            return Some(LinkClass::Merging {
                target_snapshot: self.merge_target_snapshots[pos],
                target_node: self.merge_target_nodes[pos],
            });
        }
        Some(match self.skip_counts[node] {
            None => LinkClass::Fading,
            Some(1) => LinkClass::Surviving,
            Some(skip) => LinkClass::Skipping { skip },
        })
    }

    /// Verifica que cada nó pertence a exatamente um conjunto e que os
    /// skips são coerentes com a classe
    pub fn validate(&self, num_nodes: usize) -> TraceResult<()> {
        let corrupt = |detail: String| TraceError::CorruptRecord {
            kind: "linkage".into(),
            snapshot: self.snapshot,
            detail,
        };
        if self.num_nodes() != num_nodes {
            return Err(corrupt(format!("{} skip counts for {} nodes", self.num_nodes(), num_nodes)));
        }
        if self.merge_target_nodes.len() != self.merging.len()
            || self.merge_target_snapshots.len() != self.merging.len()
        {
            return Err(corrupt("merge targets do not match merging nodes".into()));
        }

        let mut owner = vec![0u8; num_nodes];
        for set in [&self.fading, &self.surviving, &self.skipping, &self.merging] {
            if !set.windows(2).all(|w| w[0] < w[1]) {
                return Err(corrupt("node sets must be strictly increasing".into()));
            }
            for &node in set.iter() {
                let slot = owner
                    .get_mut(node)
                    .ok_or_else(|| corrupt(format!("node {} out of range", node)))?;
                *slot += 1;
            }
        }
        if let Some(node) = owner.iter().position(|&count| count != 1) {
            return Err(corrupt(format!("node {} is not classified exactly once", node)));
        }

        for (node, snapshot, _) in self.mergers() {
            if snapshot <= self.snapshot || self.skip_counts[node] != Some(snapshot - self.snapshot) {
                return Err(corrupt(format!("merging node {} has inconsistent target snapshot", node)));
            }
        }
        let skip_ok = self.fading.iter().all(|&n| self.skip_counts[n].is_none())
            && self.surviving.iter().all(|&n| self.skip_counts[n] == Some(1))
            && self.skipping.iter().all(|&n| self.skip_counts[n].is_some_and(|k| k > 1));
        if !skip_ok {
            return Err(corrupt("skip counts disagree with classification".into()));
        }
        Ok(())
    }
}

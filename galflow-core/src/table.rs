//! Tabelas de identificadores por snapshot

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::ids::{IdCounter, NodeIndex, ObjectId, Snapshot, absent_id_as_negative};

/// Metadados de uma tabela de identificadores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub snapshot: Snapshot,
    /// Maior identificador atribuído até este snapshot (inclusive)
    #[serde(with = "absent_id_as_negative")]
    pub max_object_id: Option<ObjectId>,
    /// Primeiro identificador introduzido neste snapshot
    pub first_new_object_id: ObjectId,
}

impl TableMeta {
    /// Total de identificadores existentes até este snapshot
    pub fn total_ids(&self) -> usize {
        self.max_object_id.map_or(0, |max| max as usize + 1)
    }

    /// Identificadores introduzidos neste snapshot
    pub fn new_ids(&self) -> Range<ObjectId> {
        let end = self.max_object_id.map_or(0, |max| max + 1);
        self.first_new_object_id.min(end)..end
    }
}

/// Tabela resolvida: índice do nó → identificador
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierTable {
    #[serde(flatten)]
    meta: TableMeta,
    ids: Vec<ObjectId>,
}

impl IdentifierTable {
    pub fn new(meta: TableMeta, ids: Vec<ObjectId>) -> Self {
        Self { meta, ids }
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn snapshot(&self) -> Snapshot {
        self.meta.snapshot
    }

    pub fn get(&self, node: NodeIndex) -> Option<ObjectId> {
        self.ids.get(node).copied()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Itera pares (nó, identificador)
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, ObjectId)> + '_ {
        self.ids.iter().copied().enumerate()
    }

    /// Verifica invariantes após leitura do store
    pub fn validate(&self) -> TraceResult<()> {
        let total = self.meta.total_ids();
        if let Some((node, id)) = self.iter().find(|&(_, id)| id as usize >= total) {
            return Err(TraceError::CorruptRecord {
                kind: "identifier table".into(),
                snapshot: self.snapshot(),
                detail: format!("node {} carries id {} beyond max {:?}", node, id, self.meta.max_object_id),
            });
        }
        let mut seen = vec![false; total];
        for (node, id) in self.iter() {
            if std::mem::replace(&mut seen[id as usize], true) {
                return Err(TraceError::CorruptRecord {
                    kind: "identifier table".into(),
                    snapshot: self.snapshot(),
                    detail: format!("id {} repeated at node {}", id, node),
                });
            }
        }
        Ok(())
    }
}

/// Tabela em construção; pode receber identificadores herdados antes do
/// seu snapshot ser processado
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingTable {
    slots: Vec<Option<ObjectId>>,
}

impl PendingTable {
    pub(crate) fn with_len(len: usize) -> Self {
        Self { slots: vec![None; len] }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Escreve identificador herdado de um progenitor principal.
    /// Retorna o ocupante anterior se o slot já estava escrito.
    pub(crate) fn inherit(&mut self, node: NodeIndex, id: ObjectId) -> Result<(), Option<ObjectId>> {
        match self.slots.get_mut(node) {
            Some(slot) => match *slot {
                None => {
                    *slot = Some(id);
                    Ok(())
                }
                Some(existing) => Err(Some(existing)),
            },
            None => Err(None),
        }
    }

    /// Atribui novos identificadores aos slots vazios, em ordem de índice
    pub(crate) fn fill_unassigned(&mut self, counter: &mut IdCounter) -> TraceResult<usize> {
        let mut fresh = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.is_none()) {
            *slot = Some(counter.allocate()?);
            fresh += 1;
        }
        Ok(fresh)
    }

    pub(crate) fn resolve(self, snapshot: Snapshot) -> TraceResult<Vec<ObjectId>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(node, slot)| slot.ok_or(TraceError::UnassignedIdentifier { snapshot, node }))
            .collect()
    }
}

//! Índice reverso: identificador → índice do nó num snapshot

use serde::{Deserialize, Serialize};

use crate::ids::{NodeIndex, ObjectId, Snapshot, absent_id_as_negative};
use crate::table::IdentifierTable;

/// Para cada identificador atribuído na execução, o nó que o representa no
/// snapshot (ausente se o objeto não aparece nele)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseIndex {
    snapshot: Snapshot,
    num_nodes: usize,
    /// Maior identificador presente no snapshot
    #[serde(with = "absent_id_as_negative")]
    max_object_id: Option<ObjectId>,
    total_ids: usize,
    #[serde(with = "absent_as_negative")]
    entries: Vec<Option<NodeIndex>>,
}

impl ReverseIndex {
    /// Deriva o índice a partir da tabela do snapshot
    pub fn build(table: &IdentifierTable, total_ids: usize) -> Self {
        let len = total_ids.max(table.meta().total_ids());
        let mut entries = vec![None; len];
        for (node, id) in table.iter() {
            entries[id as usize] = Some(node);
        }
        Self {
            snapshot: table.snapshot(),
            num_nodes: table.len(),
            max_object_id: table.ids().iter().copied().max(),
            total_ids: len,
            entries,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn max_object_id(&self) -> Option<ObjectId> {
        self.max_object_id
    }

    pub fn total_ids(&self) -> usize {
        self.total_ids
    }

    pub fn node_of(&self, id: ObjectId) -> Option<NodeIndex> {
        self.entries.get(id as usize).copied().flatten()
    }

    pub fn entries(&self) -> &[Option<NodeIndex>] {
        &self.entries
    }

    /// Pares (identificador, nó) presentes no snapshot
    pub fn present(&self) -> impl Iterator<Item = (ObjectId, NodeIndex)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(id, node)| node.map(|node| (id as ObjectId, node)))
    }
}

/// Codifica ausência como `-1`, como nas tabelas em disco
mod absent_as_negative {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ids::NodeIndex;

    pub fn serialize<S>(entries: &[Option<NodeIndex>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(entries.iter().map(|entry| entry.map_or(-1, |node| node as i64)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Option<NodeIndex>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<i64>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|code| usize::try_from(code).ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableMeta;

    fn table() -> IdentifierTable {
        let meta = TableMeta { snapshot: 3, max_object_id: Some(5), first_new_object_id: 5 };
        IdentifierTable::new(meta, vec![4, 0, 5])
    }

    #[test]
    fn test_round_trip_with_table() {
        let table = table();
        let reverse = ReverseIndex::build(&table, 8);
        assert_eq!(reverse.total_ids(), 8);
        for (node, id) in table.iter() {
            assert_eq!(reverse.node_of(id), Some(node));
        }
        assert_eq!(reverse.node_of(1), None);
        assert_eq!(reverse.node_of(7), None);
        assert_eq!(reverse.node_of(99), None);
        assert_eq!(reverse.max_object_id(), Some(5));
        assert_eq!(reverse.present().count(), 3);
    }

    #[test]
    fn test_negative_encoding() {
        let reverse = ReverseIndex::build(&table(), 6);
        let json = serde_json::to_value(&reverse).unwrap();
        assert_eq!(json["entries"], serde_json::json!([1, -1, -1, -1, 0, 2]));

        let back: ReverseIndex = serde_json::from_value(json).unwrap();
        assert_eq!(back, reverse);
    }
}

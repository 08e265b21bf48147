//! Store em memória

use std::collections::BTreeMap;

use crate::error::{TraceError, TraceResult};
use crate::ids::Snapshot;
use crate::linkage::SnapshotLinkage;
use crate::propagator::CarrierMap;
use crate::reverse::ReverseIndex;
use crate::table::IdentifierTable;

use super::{RecordKind, TracingStore};

/// Store mantido inteiramente em memória
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    identifiers: BTreeMap<Snapshot, IdentifierTable>,
    linkage: BTreeMap<Snapshot, SnapshotLinkage>,
    carriers: BTreeMap<Snapshot, CarrierMap>,
    reverse: BTreeMap<Snapshot, ReverseIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Número de registros de um tipo
    pub fn record_count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Identifiers => self.identifiers.len(),
            RecordKind::Linkage => self.linkage.len(),
            RecordKind::Carriers => self.carriers.len(),
            RecordKind::ReverseIndex => self.reverse.len(),
        }
    }
}

fn fetch<T: Clone>(map: &BTreeMap<Snapshot, T>, kind: RecordKind, snapshot: Snapshot) -> TraceResult<T> {
    map.get(&snapshot).cloned().ok_or_else(|| TraceError::MissingRecord {
        kind: kind.to_string(),
        snapshot,
    })
}

impl TracingStore for MemoryStore {
    fn write_identifiers(&mut self, table: &IdentifierTable) -> TraceResult<()> {
        self.identifiers.insert(table.snapshot(), table.clone());
        Ok(())
    }

    fn read_identifiers(&self, snapshot: Snapshot) -> TraceResult<IdentifierTable> {
        fetch(&self.identifiers, RecordKind::Identifiers, snapshot)
    }

    fn write_linkage(&mut self, linkage: &SnapshotLinkage) -> TraceResult<()> {
        self.linkage.insert(linkage.snapshot(), linkage.clone());
        Ok(())
    }

    fn read_linkage(&self, snapshot: Snapshot) -> TraceResult<SnapshotLinkage> {
        fetch(&self.linkage, RecordKind::Linkage, snapshot)
    }

    fn write_carriers(&mut self, carriers: &CarrierMap) -> TraceResult<()> {
        self.carriers.insert(carriers.snapshot(), carriers.clone());
        Ok(())
    }

    fn read_carriers(&self, snapshot: Snapshot) -> TraceResult<CarrierMap> {
        fetch(&self.carriers, RecordKind::Carriers, snapshot)
    }

    fn write_reverse_index(&mut self, reverse: &ReverseIndex) -> TraceResult<()> {
        self.reverse.insert(reverse.snapshot(), reverse.clone());
        Ok(())
    }

    fn read_reverse_index(&self, snapshot: Snapshot) -> TraceResult<ReverseIndex> {
        fetch(&self.reverse, RecordKind::ReverseIndex, snapshot)
    }

    fn snapshot_count(&self) -> TraceResult<usize> {
        Ok((0usize..).take_while(|s| self.identifiers.contains_key(s)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableMeta;

    #[test]
    fn test_missing_record() {
        let store = MemoryStore::new();
        let err = store.read_linkage(4).unwrap_err();
        assert!(matches!(err, TraceError::MissingRecord { snapshot: 4, .. }));
        assert_eq!(store.snapshot_count().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_count_is_contiguous() {
        let mut store = MemoryStore::new();
        for snapshot in [0, 1, 3] {
            let meta = TableMeta { snapshot, max_object_id: None, first_new_object_id: 0 };
            store.write_identifiers(&IdentifierTable::new(meta, Vec::new())).unwrap();
        }
        assert_eq!(store.snapshot_count().unwrap(), 2);
        assert_eq!(store.record_count(RecordKind::Identifiers), 3);
    }
}

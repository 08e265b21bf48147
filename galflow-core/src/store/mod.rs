//! # 📁 Store — Persistência das tabelas de rastreamento
//!
//! Colaborador de armazenamento do pipeline. Cada snapshot produz quatro
//! registros:
//!
//! | Registro | Conteúdo |
//! |----------|----------|
//! | `ObjIDs` | nó → identificador, com max id e primeiro id novo |
//! | `Linkage` | nós fading / surviving / skipping / merging, alvos, skips |
//! | `CarrierIDs` | identificador → carrier (FADED = −10, padding = −1) |
//! | `VRIndices` | identificador → nó (−1 se ausente) |
//!
//! A fase de atribuição escreve `ObjIDs` e `Linkage`; a fase de carriers os
//! lê de volta e escreve `CarrierIDs` e `VRIndices`.

mod json;
mod memory;

pub use json::{JsonStore, StoreOptions};
pub use memory::MemoryStore;

use std::fmt;

use crate::error::TraceResult;
use crate::ids::Snapshot;
use crate::linkage::SnapshotLinkage;
use crate::propagator::CarrierMap;
use crate::reverse::ReverseIndex;
use crate::table::IdentifierTable;

/// Tipo de registro persistido
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Identifiers,
    Linkage,
    Carriers,
    ReverseIndex,
}

impl RecordKind {
    pub fn all() -> [RecordKind; 4] {
        [
            RecordKind::Identifiers,
            RecordKind::Linkage,
            RecordKind::Carriers,
            RecordKind::ReverseIndex,
        ]
    }

    /// Grupo (diretório) do registro
    pub fn group(&self) -> &'static str {
        match self {
            RecordKind::Identifiers => "ObjIDs",
            RecordKind::Linkage => "Linkage",
            RecordKind::Carriers => "MergeLists",
            RecordKind::ReverseIndex => "VRIndices",
        }
    }

    /// Nome do dataset por snapshot
    pub fn dataset_name(&self, snapshot: Snapshot) -> String {
        let prefix = match self {
            RecordKind::Identifiers => "ObjIDs",
            RecordKind::Linkage => "Linkage",
            RecordKind::Carriers => "CarrierIDs",
            RecordKind::ReverseIndex => "VRIndices",
        };
        format!("{}_{:04}", prefix, snapshot)
    }

    /// Descrição gravada junto ao dataset
    pub fn description(&self, snapshot: Snapshot) -> String {
        match self {
            RecordKind::Identifiers => format!(
                "ObjID list. It gives, for each halo in snapshot {snapshot}, the persistent \
                 identifier (ObjID) of this galaxy across snapshots. These identifiers are \
                 unique in each snapshot, but in general not dense, since some ObjIDs do not \
                 exist in snapshot {snapshot}."
            ),
            RecordKind::Linkage => format!(
                "Descendant links of the haloes in snapshot {snapshot}: fading, surviving, \
                 skipping and merging node indices, merge targets and skip counts."
            ),
            RecordKind::Carriers => format!(
                "Carrier of each galaxy in snapshot {snapshot}, i.e. the ObjID of the galaxy it \
                 is part of. Independent galaxies carry their own ObjID, faded ones are -10 and \
                 ObjIDs not yet assigned by snapshot {snapshot} are -1. Use \
                 VRIndices/VRIndices_{snapshot:04} to find the halo index of a carrier."
            ),
            RecordKind::ReverseIndex => format!(
                "Reverse ObjID list. It gives, for each ObjID assigned in the run, the halo \
                 index corresponding to it in snapshot {snapshot}. Galaxies that are not \
                 identified in snapshot {snapshot} are assigned -1."
            ),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Identifiers => "identifier table",
            RecordKind::Linkage => "linkage",
            RecordKind::Carriers => "carrier map",
            RecordKind::ReverseIndex => "reverse index",
        };
        f.write_str(name)
    }
}

/// Colaborador de armazenamento
pub trait TracingStore {
    fn write_identifiers(&mut self, table: &IdentifierTable) -> TraceResult<()>;
    fn read_identifiers(&self, snapshot: Snapshot) -> TraceResult<IdentifierTable>;

    fn write_linkage(&mut self, linkage: &SnapshotLinkage) -> TraceResult<()>;
    fn read_linkage(&self, snapshot: Snapshot) -> TraceResult<SnapshotLinkage>;

    fn write_carriers(&mut self, carriers: &CarrierMap) -> TraceResult<()>;
    fn read_carriers(&self, snapshot: Snapshot) -> TraceResult<CarrierMap>;

    fn write_reverse_index(&mut self, reverse: &ReverseIndex) -> TraceResult<()>;
    fn read_reverse_index(&self, snapshot: Snapshot) -> TraceResult<ReverseIndex>;

    /// Número de snapshots consecutivos (a partir de 0) com tabela de
    /// identificadores
    fn snapshot_count(&self) -> TraceResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names() {
        assert_eq!(RecordKind::Carriers.dataset_name(7), "CarrierIDs_0007");
        assert_eq!(RecordKind::Identifiers.group(), "ObjIDs");
        assert_eq!(RecordKind::ReverseIndex.to_string(), "reverse index");
    }

    #[test]
    fn test_descriptions_mention_snapshot() {
        for kind in RecordKind::all() {
            assert!(kind.description(12).contains("12"));
        }
    }
}

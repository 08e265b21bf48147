//! Pipeline em duas fases
//!
//! ```text
//! MergerTree ──▶ IdentifierAssigner ──▶ ObjIDs + Linkage ──▶ store
//!                                                              │
//! store ──▶ CarrierPropagator ──▶ CarrierIDs + VRIndices ──▶ store
//! ```
//!
//! A segunda fase precisa do total de identificadores da execução, que só é
//! conhecido depois que a primeira termina. Qualquer erro interrompe a
//! execução; snapshots já persistidos permanecem no store.

use serde::Serialize;
use tracing::info;

use crate::assigner::IdentifierAssigner;
use crate::config::TracerConfig;
use crate::error::TraceResult;
use crate::propagator::{CarrierPropagator, CarrierStats};
use crate::store::TracingStore;
use crate::tree::TreeIndex;

/// Resumo da fase de atribuição
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssignSummary {
    pub snapshots: usize,
    /// Identificadores atribuídos na execução
    pub total_ids: usize,
    /// Maior número de tabelas pendentes simultâneas
    pub max_window: usize,
    pub empty_snapshots: usize,
}

/// Resumo da fase de carriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropagateSummary {
    pub snapshots: usize,
    pub total_ids: usize,
    /// Maior número de mapas de carriers simultâneos
    pub max_window: usize,
    /// Contagens do último snapshot
    pub final_stats: Option<CarrierStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub assign: AssignSummary,
    pub propagate: PropagateSummary,
}

/// Driver das duas fases
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    num_snapshots: Option<usize>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processa apenas os primeiros `num_snapshots` snapshots
    pub fn with_num_snapshots(mut self, num_snapshots: usize) -> Self {
        self.num_snapshots = Some(num_snapshots);
        self
    }

    pub fn from_config(config: &TracerConfig) -> Self {
        Self {
            num_snapshots: config.run.num_snapshots,
        }
    }

    pub fn num_snapshots(&self) -> Option<usize> {
        self.num_snapshots
    }

    /// Fase 1: tabelas de identificadores e linkage de todos os snapshots
    pub fn assign_all<T, S>(&self, tree: &T, store: &mut S) -> TraceResult<AssignSummary>
    where
        T: TreeIndex + ?Sized,
        S: TracingStore + ?Sized,
    {
        let mut assigner = match self.num_snapshots {
            Some(num) => IdentifierAssigner::with_num_snapshots(tree, num),
            None => IdentifierAssigner::new(tree),
        };
        info!(snapshots = assigner.num_snapshots(), "Assigning object IDs");

        let mut empty_snapshots = 0;
        while let Some(assigned) = assigner.step()? {
            if assigned.table.is_empty() {
                empty_snapshots += 1;
            }
            store.write_identifiers(&assigned.table)?;
            store.write_linkage(&assigned.linkage)?;
        }

        let summary = AssignSummary {
            snapshots: assigner.num_snapshots(),
            total_ids: assigner.counter().assigned(),
            max_window: assigner.max_window(),
            empty_snapshots,
        };
        info!(
            total_ids = summary.total_ids,
            max_window = summary.max_window,
            "Finished assigning object IDs"
        );
        Ok(summary)
    }

    /// Fase 2: mapas de carriers e índices reversos a partir do store
    ///
    /// Como na fase 1, o limite de snapshots é truncado ao que o store contém.
    pub fn propagate_all<S>(&self, store: &mut S) -> TraceResult<PropagateSummary>
    where
        S: TracingStore + ?Sized,
    {
        let available = store.snapshot_count()?;
        self.propagate_snapshots(store, self.num_snapshots.map(|num| num.min(available)))
    }

    fn propagate_snapshots<S>(&self, store: &mut S, num_snapshots: Option<usize>) -> TraceResult<PropagateSummary>
    where
        S: TracingStore + ?Sized,
    {
        let mut propagator = CarrierPropagator::for_store(store, num_snapshots)?;
        let mut final_stats = None;
        while let Some(stats) = propagator.step(store)? {
            final_stats = Some(stats);
        }

        let summary = PropagateSummary {
            snapshots: propagator.num_snapshots(),
            total_ids: propagator.total_ids(),
            max_window: propagator.max_window(),
            final_stats,
        };
        info!(
            snapshots = summary.snapshots,
            max_window = summary.max_window,
            "Finished carrier propagation"
        );
        Ok(summary)
    }

    /// As duas fases em sequência
    pub fn run<T, S>(&self, tree: &T, store: &mut S) -> TraceResult<RunSummary>
    where
        T: TreeIndex + ?Sized,
        S: TracingStore + ?Sized,
    {
        let assign = self.assign_all(tree, store)?;
        let propagate = self.propagate_snapshots(store, Some(assign.snapshots))?;
        Ok(RunSummary { assign, propagate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Carrier;
    use crate::store::{MemoryStore, RecordKind};
    use crate::tree::MergerTreeBuilder;

    fn chain_tree() -> crate::tree::MergerTree {
        let mut builder = MergerTreeBuilder::new(4);
        let mut prev = builder.add_node(0);
        for snapshot in 1..4 {
            let next = builder.add_node(snapshot);
            builder.link_main(prev, next);
            builder.add_node(snapshot);
            prev = next;
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_run_persists_every_record() {
        let mut store = MemoryStore::new();
        let summary = Tracer::new().run(&chain_tree(), &mut store).unwrap();

        assert_eq!(summary.assign.snapshots, 4);
        assert_eq!(summary.assign.total_ids, 4);
        assert_eq!(summary.propagate.total_ids, 4);
        for kind in RecordKind::all() {
            assert_eq!(store.record_count(kind), 4);
        }
        let last = summary.propagate.final_stats.unwrap();
        assert_eq!(last.snapshot, 3);
        assert_eq!(last.independent, 2);
        assert_eq!(last.faded, 2);
    }

    #[test]
    fn test_num_snapshots_limits_both_phases() {
        let mut store = MemoryStore::new();
        let summary = Tracer::new().with_num_snapshots(2).run(&chain_tree(), &mut store).unwrap();

        assert_eq!(summary.assign.snapshots, 2);
        assert_eq!(summary.assign.total_ids, 2);
        assert_eq!(store.record_count(RecordKind::Carriers), 2);
        let carriers = store.read_carriers(1).unwrap();
        assert_eq!(carriers.carriers(), &[Carrier::Object(0), Carrier::Object(1)]);
    }

    #[test]
    fn test_cap_beyond_tree_processes_whole_tree() {
        let mut builder = MergerTreeBuilder::new(2);
        let a = builder.add_node(0);
        let b = builder.add_node(1);
        builder.link_main(a, b);
        let tree = builder.build().unwrap();

        let mut store = MemoryStore::new();
        let summary = Tracer::new().with_num_snapshots(5).run(&tree, &mut store).unwrap();
        assert_eq!(summary.assign.snapshots, 2);
        assert_eq!(summary.propagate.snapshots, 2);
        assert_eq!(store.record_count(RecordKind::Carriers), 2);
        assert_eq!(store.read_carriers(1).unwrap().carriers(), &[Carrier::Object(0)]);

        let again = Tracer::new().with_num_snapshots(79).propagate_all(&mut store).unwrap();
        assert_eq!(again.snapshots, 2);
    }

    #[test]
    fn test_from_config() {
        let config = TracerConfig::from_str("[run]\nnum_snapshots = 3").unwrap();
        assert_eq!(Tracer::from_config(&config).num_snapshots(), Some(3));
    }
}

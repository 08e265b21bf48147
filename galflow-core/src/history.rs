//! Histórico de um identificador ao longo dos snapshots (apenas para frente)

use serde::Serialize;

use crate::error::TraceResult;
use crate::ids::{Carrier, NodeIndex, ObjectId, Snapshot};
use crate::store::TracingStore;

/// Estado de um identificador num snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub snapshot: Snapshot,
    /// Nó do próprio objeto (`None` se ausente ou em skip)
    pub node: Option<NodeIndex>,
    pub carrier: Carrier,
    /// Nó do carrier no snapshot, quando presente
    pub carrier_node: Option<NodeIndex>,
}

/// Segue `id` desde o snapshot em que foi atribuído até o fim da execução
/// ou até desaparecer (FADED é absorvente, então a história termina aí)
///
/// Identificadores nunca atribuídos produzem uma história vazia.
pub fn trace_object<S: TracingStore + ?Sized>(store: &S, id: ObjectId) -> TraceResult<Vec<TraceStep>> {
    let mut steps = Vec::new();
    for snapshot in 0..store.snapshot_count()? {
        let carrier = store.read_carriers(snapshot)?.get(id);
        if carrier.is_unresolved() {
            continue;
        }
        let reverse = store.read_reverse_index(snapshot)?;
        steps.push(TraceStep {
            snapshot,
            node: reverse.node_of(id),
            carrier,
            carrier_node: carrier.object().and_then(|c| reverse.node_of(c)),
        });
        if carrier.is_faded() {
            break;
        }
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Tracer;
    use crate::store::MemoryStore;
    use crate::tree::MergerTreeBuilder;

    #[test]
    fn test_trace_merged_object() {
        // b sobrevive um snapshot e se funde em a
        let mut builder = MergerTreeBuilder::new(4);
        let a0 = builder.add_node(0);
        let b0 = builder.add_node(0);
        let a1 = builder.add_node(1);
        let b1 = builder.add_node(1);
        let a2 = builder.add_node(2);
        builder.add_node(3);
        builder.link_main(a0, a1).link_main(b0, b1).link_main(a1, a2).link_merging(b1, a2);
        let mut store = MemoryStore::new();
        Tracer::new().run(&builder.build().unwrap(), &mut store).unwrap();

        let history = trace_object(&store, 1).unwrap();
        let carriers: Vec<_> = history.iter().map(|step| step.carrier).collect();
        assert_eq!(
            carriers,
            vec![Carrier::Object(1), Carrier::Object(1), Carrier::Object(0), Carrier::Faded]
        );
        assert_eq!(history[1].node, Some(1));
        assert_eq!(history[2].node, None);
        assert_eq!(history[2].carrier_node, Some(0));
    }

    #[test]
    fn test_unknown_object_has_no_history() {
        let mut builder = MergerTreeBuilder::new(1);
        builder.add_node(0);
        let mut store = MemoryStore::new();
        Tracer::new().run(&builder.build().unwrap(), &mut store).unwrap();
        assert!(trace_object(&store, 7).unwrap().is_empty());
    }
}

//! # Propagador de carriers
//!
//! Mantém, por snapshot, o mapa denso identificador → carrier e o avança de
//! `s` para os snapshots seguintes:
//!
//! ```text
//!   s            s+1          s+2          t = s+k
//! ┌──────┐     ┌──────┐     ┌──────┐     ┌──────┐
//! │FADED │ ──▶ │FADED │     │      │     │      │   1. sentinela absorvente
//! │fading│ ──▶ │FADED │     │      │     │      │   2. fading + passageiros
//! │surv. │ ──▶ │ c    │     │      │     │      │   3. sobrevivência (h = 1)
//! │skip k│ ──▶ │ c    │ ──▶ │ c    │ ──▶ │ c    │   4. skip (h = k)
//! │merge │ ──▶ │ c    │ ──▶ │ c    │ ──▶ │ dest │   5. fusão em t (h = k−1)
//! └──────┘     └──────┘     └──────┘     └──────┘
//! ```
//!
//! As regras escrevem em slots disjuntos: cada carrier pertence a um único
//! nó em `s`, e a fusão é a única escrita no snapshot alvo de um nó que se
//! funde. Antes de persistir o mapa de `s`, nenhum slot pode estar
//! `Unresolved`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TraceError, TraceResult};
use crate::ids::{Carrier, ObjectId, Snapshot, absent_id_as_negative};
use crate::linkage::{LinkClass, SnapshotLinkage};
use crate::reverse::ReverseIndex;
use crate::store::{RecordKind, TracingStore};
use crate::table::IdentifierTable;

// ═══════════════════════════════════════════════════════════════════════════
// CARRIER MAP
// ═══════════════════════════════════════════════════════════════════════════

/// Mapa de carriers persistido de um snapshot
///
/// O vetor cobre todos os identificadores da execução; posições além dos
/// identificadores existentes no snapshot ficam `Unresolved` (`-1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierMap {
    snapshot: Snapshot,
    /// Maior identificador existente até o snapshot
    #[serde(with = "absent_id_as_negative")]
    max_object_id: Option<ObjectId>,
    carriers: Vec<Carrier>,
}

impl CarrierMap {
    /// Completa `live` até `total_ids` com `Unresolved`
    pub fn padded(snapshot: Snapshot, live: &[Carrier], total_ids: usize) -> Self {
        let mut carriers = live.to_vec();
        if carriers.len() < total_ids {
            carriers.resize(total_ids, Carrier::Unresolved);
        }
        Self {
            snapshot,
            max_object_id: live.len().checked_sub(1).map(|max| max as ObjectId),
            carriers,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub fn max_object_id(&self) -> Option<ObjectId> {
        self.max_object_id
    }

    pub fn carriers(&self) -> &[Carrier] {
        &self.carriers
    }

    /// Carrier de `id` (identificadores fora do mapa são `Unresolved`)
    pub fn get(&self, id: ObjectId) -> Carrier {
        self.carriers.get(id as usize).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.carriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carriers.is_empty()
    }

    pub fn stats(&self) -> CarrierStats {
        let mut stats = CarrierStats {
            snapshot: self.snapshot,
            independent: 0,
            merged: 0,
            faded: 0,
            absent: 0,
        };
        for (id, carrier) in self.carriers.iter().enumerate() {
            match *carrier {
                Carrier::Object(c) if c as usize == id => stats.independent += 1,
                Carrier::Object(_) => stats.merged += 1,
                Carrier::Faded => stats.faded += 1,
                Carrier::Unresolved => stats.absent += 1,
            }
        }
        stats
    }
}

/// Contagens de um mapa de carriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CarrierStats {
    pub snapshot: Snapshot,
    /// Carregam a si mesmos
    pub independent: usize,
    /// Carregados por outro objeto
    pub merged: usize,
    pub faded: usize,
    /// Ainda não atribuídos neste snapshot
    pub absent: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// SCRATCH
// ═══════════════════════════════════════════════════════════════════════════

/// Destino de um identificador carregado por um nó de `s`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Fade,
    /// Mantém o carrier em `s+1 ..= s+horizon`
    Hold { horizon: usize },
}

/// Mapa temporário indexado por identificador, zerado antes de cada uso
#[derive(Debug)]
struct Scratch<T> {
    slots: Vec<Option<T>>,
}

impl<T: Copy> Scratch<T> {
    fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn reset(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, None);
    }

    fn mark(&mut self, id: ObjectId, value: T) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    fn get(&self, id: ObjectId) -> Option<T> {
        self.slots.get(id as usize).copied().flatten()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPAGATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Avança os mapas de carriers snapshot a snapshot sobre um store que já
/// contém as tabelas de identificadores e o linkage
#[derive(Debug)]
pub struct CarrierPropagator {
    num_snapshots: usize,
    total_ids: usize,
    next_snapshot: Snapshot,
    tables: BTreeMap<Snapshot, IdentifierTable>,
    /// Janela de mapas vivos, do snapshot atual até o horizonte de skip
    carriers: BTreeMap<Snapshot, Vec<Carrier>>,
    fates: Scratch<Fate>,
    destinations: Scratch<ObjectId>,
    max_window: usize,
}

impl CarrierPropagator {
    pub fn new(num_snapshots: usize, total_ids: usize) -> Self {
        Self {
            num_snapshots,
            total_ids,
            next_snapshot: 0,
            tables: BTreeMap::new(),
            carriers: BTreeMap::new(),
            fates: Scratch::new(),
            destinations: Scratch::new(),
            max_window: 0,
        }
    }

    /// Dimensiona a execução a partir do store: total de identificadores =
    /// maior identificador do último snapshot + 1
    pub fn for_store<S: TracingStore + ?Sized>(store: &S, num_snapshots: Option<usize>) -> TraceResult<Self> {
        let available = store.snapshot_count()?;
        let num = num_snapshots.unwrap_or(available);
        if num > available {
            return Err(TraceError::MissingRecord {
                kind: RecordKind::Identifiers.to_string(),
                snapshot: available,
            });
        }
        let total_ids = match num.checked_sub(1) {
            Some(last) => store.read_identifiers(last)?.meta().total_ids(),
            None => 0,
        };
        info!(snapshots = num, total_ids, "Setting up carrier propagation");
        Ok(Self::new(num, total_ids))
    }

    pub fn num_snapshots(&self) -> usize {
        self.num_snapshots
    }

    pub fn total_ids(&self) -> usize {
        self.total_ids
    }

    pub fn next_snapshot(&self) -> Snapshot {
        self.next_snapshot
    }

    /// Mapas atualmente materializados
    pub fn window_len(&self) -> usize {
        self.carriers.len()
    }

    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Processa o próximo snapshot: verifica e persiste seu mapa, avança os
    /// carriers para os snapshots seguintes e persiste o índice reverso
    pub fn step<S: TracingStore + ?Sized>(&mut self, store: &mut S) -> TraceResult<Option<CarrierStats>> {
        let snapshot = self.next_snapshot;
        if snapshot >= self.num_snapshots {
            return Ok(None);
        }

        self.load_table(store, snapshot)?;
        let linkage = store.read_linkage(snapshot)?;
        if linkage.snapshot() != snapshot {
            return Err(TraceError::CorruptRecord {
                kind: RecordKind::Linkage.to_string(),
                snapshot,
                detail: format!("record belongs to snapshot {}", linkage.snapshot()),
            });
        }
        let num_nodes = self.table(snapshot)?.len();
        linkage.validate(num_nodes)?;

        let last = self.num_snapshots - 1;
        let horizon = linkage.max_skip().unwrap_or(1).max(1);
        for target in snapshot..=(snapshot + horizon).min(last) {
            self.materialize(store, target)?;
        }
        self.max_window = self.max_window.max(self.carriers.len());

        let current = self
            .carriers
            .remove(&snapshot)
            .ok_or_else(|| TraceError::structural(snapshot, "carrier map not materialized"))?;
        info!(
            snapshot,
            nodes = num_nodes,
            objects = current.len(),
            "Propagating carriers"
        );
        if let Some(object) = current.iter().position(|c| c.is_unresolved()) {
            return Err(TraceError::UnresolvedCarrier {
                snapshot,
                object: object as ObjectId,
            });
        }
        if current.len() > self.total_ids {
            return Err(TraceError::structural(
                snapshot,
                format!("{} identifiers exceed the run total of {}", current.len(), self.total_ids),
            ));
        }

        let map = CarrierMap::padded(snapshot, &current, self.total_ids);
        store.write_carriers(&map)?;

        if snapshot < last {
            self.advance(snapshot, &current, &linkage)?;
        }

        let table = self
            .tables
            .remove(&snapshot)
            .ok_or_else(|| TraceError::structural(snapshot, "identifier table not loaded"))?;
        store.write_reverse_index(&ReverseIndex::build(&table, self.total_ids))?;

        self.next_snapshot += 1;
        Ok(Some(map.stats()))
    }

    fn table(&self, snapshot: Snapshot) -> TraceResult<&IdentifierTable> {
        self.tables
            .get(&snapshot)
            .ok_or_else(|| TraceError::structural(snapshot, "identifier table not loaded"))
    }

    fn load_table<S: TracingStore + ?Sized>(&mut self, store: &S, snapshot: Snapshot) -> TraceResult<()> {
        if self.tables.contains_key(&snapshot) {
            return Ok(());
        }
        let table = store.read_identifiers(snapshot)?;
        if table.snapshot() != snapshot {
            return Err(TraceError::CorruptRecord {
                kind: RecordKind::Identifiers.to_string(),
                snapshot,
                detail: format!("record belongs to snapshot {}", table.snapshot()),
            });
        }
        table.validate()?;
        self.tables.insert(snapshot, table);
        Ok(())
    }

    /// Cria o mapa de `snapshot`: identificadores novos carregam a si
    /// mesmos, os demais ficam `Unresolved`
    fn materialize<S: TracingStore + ?Sized>(&mut self, store: &S, snapshot: Snapshot) -> TraceResult<()> {
        if self.carriers.contains_key(&snapshot) {
            return Ok(());
        }
        self.load_table(store, snapshot)?;
        let meta = *self.table(snapshot)?.meta();
        let mut carriers = vec![Carrier::Unresolved; meta.total_ids()];
        for id in meta.new_ids() {
            carriers[id as usize] = Carrier::Object(id);
        }
        debug!(snapshot, objects = carriers.len(), "Materialized carrier map");
        self.carriers.insert(snapshot, carriers);
        Ok(())
    }

    fn advance(&mut self, snapshot: Snapshot, current: &[Carrier], linkage: &SnapshotLinkage) -> TraceResult<()> {
        let skips = self.mark_fates(snapshot, current.len(), linkage)?;
        let (faded, fading, held) = self.carry_forward(snapshot, current)?;
        debug!(
            snapshot,
            fading = linkage.fading().len(),
            carried_into_fade = fading,
            already_faded = faded,
            held,
            skips = ?skips,
            "Advanced carriers"
        );
        self.redirect_mergers(snapshot, current, linkage)
    }

    /// Destino de cada identificador de nó em `s`; devolve a contagem de skips
    fn mark_fates(
        &mut self,
        snapshot: Snapshot,
        len: usize,
        linkage: &SnapshotLinkage,
    ) -> TraceResult<BTreeMap<usize, usize>> {
        let table = self
            .tables
            .get(&snapshot)
            .ok_or_else(|| TraceError::structural(snapshot, "identifier table not loaded"))?;
        self.fates.reset(len);
        let mut skips: BTreeMap<usize, usize> = BTreeMap::new();
        for (node, id) in table.iter() {
            let Some(class) = linkage.class(node) else { continue };
            if let LinkClass::Skipping { skip } = class {
                *skips.entry(skip).or_default() += 1;
            }
            if let Some(fate) = fate_of(snapshot, class) {
                self.fates.mark(id, fate);
            }
        }
        Ok(skips)
    }

    /// Regras 1 a 4 a partir de `fates`; devolve (já extintos, extintos agora, mantidos)
    fn carry_forward(&mut self, snapshot: Snapshot, current: &[Carrier]) -> TraceResult<(usize, usize, usize)> {
        let last = self.num_snapshots - 1;
        let mut faded = 0usize;
        let mut fading = 0usize;
        let mut held = 0usize;
        for (id, carrier) in current.iter().enumerate() {
            let id = id as ObjectId;
            match *carrier {
                Carrier::Faded => {
                    write_carrier(&mut self.carriers, snapshot + 1, id, Carrier::Faded)?;
                    faded += 1;
                }
                Carrier::Object(c) => match self.fates.get(c) {
                    Some(Fate::Fade) => {
                        write_carrier(&mut self.carriers, snapshot + 1, id, Carrier::Faded)?;
                        fading += 1;
                    }
                    Some(Fate::Hold { horizon }) => {
                        for target in snapshot + 1..=(snapshot + horizon).min(last) {
                            write_carrier(&mut self.carriers, target, id, Carrier::Object(c))?;
                        }
                        held += 1;
                    }
                    // Carrier em skip: slots seguintes já escritos
                    None => {}
                },
                Carrier::Unresolved => {
                    return Err(TraceError::UnresolvedCarrier { snapshot, object: id });
                }
            }
        }
        Ok((faded, fading, held))
    }

    /// Regra 5: redireciona os passageiros de cada fusão no snapshot alvo
    fn redirect_mergers(&mut self, snapshot: Snapshot, current: &[Carrier], linkage: &SnapshotLinkage) -> TraceResult<()> {
        let table = self
            .tables
            .get(&snapshot)
            .ok_or_else(|| TraceError::structural(snapshot, "identifier table not loaded"))?;
        let last = self.num_snapshots - 1;
        for (target, mergers) in linkage.mergers_by_target() {
            if target > last {
                continue;
            }
            let target_table = self
                .tables
                .get(&target)
                .ok_or_else(|| TraceError::structural(target, "identifier table not loaded"))?;
            self.destinations.reset(current.len());
            for &(node, target_node) in &mergers {
                let id = table
                    .get(node)
                    .ok_or_else(|| TraceError::structural(snapshot, format!("merging node {} has no identifier", node)))?;
                let dest = target_table.get(target_node).ok_or_else(|| {
                    TraceError::structural(target, format!("merge target node {} does not exist", target_node))
                })?;
                self.destinations.mark(id, dest);
            }

            let mut redirected = 0usize;
            for (id, carrier) in current.iter().enumerate() {
                if let Some(dest) = carrier.object().and_then(|c| self.destinations.get(c)) {
                    write_carrier(&mut self.carriers, target, id as ObjectId, Carrier::Object(dest))?;
                    redirected += 1;
                }
            }
            debug!(snapshot, target, merging = mergers.len(), redirected, "Redirected merged carriers");
        }
        Ok(())
    }
}

/// Sobrevivência é o skip geral com horizonte 1; uma fusão mantém o carrier
/// até o snapshot anterior ao alvo, cujo slot pertence à fusão
fn fate_of(snapshot: Snapshot, class: LinkClass) -> Option<Fate> {
    match class {
        LinkClass::Fading => Some(Fate::Fade),
        LinkClass::Surviving => Some(Fate::Hold { horizon: 1 }),
        LinkClass::Skipping { skip } => Some(Fate::Hold { horizon: skip }),
        LinkClass::Merging { target_snapshot, .. } => {
            let horizon = target_snapshot.saturating_sub(snapshot + 1);
            (horizon > 0).then_some(Fate::Hold { horizon })
        }
    }
}

fn write_carrier(
    window: &mut BTreeMap<Snapshot, Vec<Carrier>>,
    snapshot: Snapshot,
    id: ObjectId,
    carrier: Carrier,
) -> TraceResult<()> {
    let slot = window
        .get_mut(&snapshot)
        .ok_or_else(|| TraceError::structural(snapshot, "carrier write to a snapshot outside the window"))?
        .get_mut(id as usize)
        .ok_or_else(|| TraceError::structural(snapshot, format!("object {} does not exist yet", id)))?;
    *slot = carrier;
    Ok(())
}

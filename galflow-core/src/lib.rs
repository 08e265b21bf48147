//! # 🌌 galflow-core — Identidade persistente de galáxias
//!
//! Rastreia objetos físicos (galáxias) ao longo de uma série de catálogos
//! de halos ("snapshots") ligados por uma merger tree. Produz:
//!
//! - um identificador persistente (ObjID) por objeto, estável através da
//!   reindexação estrutural entre snapshots;
//! - por snapshot, um mapa identificador → carrier: o próprio objeto se
//!   independente, o parceiro de fusão se fundido, ou FADED se extinto.
//!
//! ## Arquitetura
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Tracer                               │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  Fase 1: IdentifierAssigner                           │  │
//! │  │  TreeIndex → IdentifierTable + SnapshotLinkage        │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  Fase 2: CarrierPropagator                            │  │
//! │  │  store → CarrierMap + ReverseIndex                    │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  TracingStore: MemoryStore | JsonStore                │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exemplo
//!
//! ```
//! use galflow_core::{Carrier, MemoryStore, MergerTreeBuilder, Tracer, TracingStore};
//!
//! let mut builder = MergerTreeBuilder::new(2);
//! let a = builder.add_node(0);
//! let b = builder.add_node(0);
//! let c = builder.add_node(1);
//! builder.link_main(a, c).link_merging(b, c);
//! let tree = builder.build()?;
//!
//! let mut store = MemoryStore::new();
//! Tracer::new().run(&tree, &mut store)?;
//!
//! let carriers = store.read_carriers(1)?;
//! assert_eq!(carriers.get(1), Carrier::Object(0));
//! # Ok::<(), galflow_core::TraceError>(())
//! ```

pub mod assigner;
pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod linkage;
pub mod pipeline;
pub mod propagator;
pub mod reverse;
pub mod store;
pub mod table;
pub mod tree;

pub use assigner::{AssignedSnapshot, IdentifierAssigner};
pub use config::{LoggingConfig, OutputConfig, RunConfig, TracerConfig};
pub use error::{TraceError, TraceResult};
pub use history::{TraceStep, trace_object};
pub use ids::{Carrier, FADED_CODE, IdCounter, NodeIndex, ObjectId, Snapshot, UNRESOLVED_CODE};
pub use linkage::{LinkClass, SnapshotLinkage};
pub use pipeline::{AssignSummary, PropagateSummary, RunSummary, Tracer};
pub use propagator::{CarrierMap, CarrierPropagator, CarrierStats};
pub use reverse::ReverseIndex;
pub use store::{JsonStore, MemoryStore, RecordKind, StoreOptions, TracingStore};
pub use table::{IdentifierTable, TableMeta};
pub use tree::{MergerTree, MergerTreeBuilder, NodeRef, TreeEntry, TreeIndex};

/// Versão do crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

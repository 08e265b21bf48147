//! Erros de rastreamento

use thiserror::Error;

use crate::ids::{NodeIndex, ObjectId, Snapshot};

/// Resultado de operações de rastreamento
pub type TraceResult<T> = Result<T, TraceError>;

/// Erros fatais e de armazenamento do pipeline
///
/// Todo erro interrompe a execução inteira: não há retry nem modo parcial.
/// Snapshots já persistidos permanecem no store.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Árvore inconsistente com o snapshot esperado
    #[error("Structural inconsistency in snapshot {snapshot}: {detail}")]
    StructuralInconsistency { snapshot: Snapshot, detail: String },

    /// Nó sem identificador após a atribuição
    #[error("Node {node} in snapshot {snapshot} has no identifier after assignment")]
    UnassignedIdentifier { snapshot: Snapshot, node: NodeIndex },

    /// Dois progenitores principais apontam para o mesmo descendente
    #[error(
        "Duplicate main-progenitor target (snapshot {snapshot} -> node {target_node} in snapshot {target_snapshot})"
    )]
    DuplicateTarget {
        snapshot: Snapshot,
        target_snapshot: Snapshot,
        target_node: NodeIndex,
    },

    /// Carrier não resolvido após a transição
    #[error("Carrier of object {object} is unresolved in snapshot {snapshot}")]
    UnresolvedCarrier { snapshot: Snapshot, object: ObjectId },

    /// Contador global esgotado
    #[error("Identifier counter overflow")]
    IdentifierOverflow,

    /// Árvore de entrada malformada (colunas, ponteiros do builder)
    #[error("Invalid merger tree: {0}")]
    InvalidTree(String),

    /// Registro ausente no store
    #[error("Missing {kind} record for snapshot {snapshot}")]
    MissingRecord { kind: String, snapshot: Snapshot },

    /// Registro presente mas inválido
    #[error("Corrupt {kind} record for snapshot {snapshot}: {detail}")]
    CorruptRecord {
        kind: String,
        snapshot: Snapshot,
        detail: String,
    },

    /// Configuração inválida
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Erro de I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erro de serialização JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceError {
    pub(crate) fn structural(snapshot: Snapshot, detail: impl Into<String>) -> Self {
        TraceError::StructuralInconsistency {
            snapshot,
            detail: detail.into(),
        }
    }

    /// Indica violação de consistência da árvore ou do rastreamento
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            TraceError::StructuralInconsistency { .. }
                | TraceError::UnassignedIdentifier { .. }
                | TraceError::DuplicateTarget { .. }
                | TraceError::UnresolvedCarrier { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceError::DuplicateTarget {
            snapshot: 3,
            target_snapshot: 5,
            target_node: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("Duplicate main-progenitor target"));
        assert!(msg.contains("node 12 in snapshot 5"));
    }

    #[test]
    fn test_consistency_classification() {
        assert!(TraceError::UnresolvedCarrier { snapshot: 0, object: 1 }.is_consistency_violation());
        assert!(TraceError::structural(2, "bad").is_consistency_violation());
        assert!(!TraceError::Config("x".into()).is_consistency_violation());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TraceError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}

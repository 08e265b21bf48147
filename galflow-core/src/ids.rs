//! Identificadores persistentes, contador global e valores de carrier

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};

/// Identificador persistente de um objeto físico (galáxia)
pub type ObjectId = u32;

/// Índice estrutural denso (0-based) de um nó dentro do seu snapshot
pub type NodeIndex = usize;

/// Número do snapshot
pub type Snapshot = usize;

/// Código em disco de um carrier não resolvido (também usado como padding)
pub const UNRESOLVED_CODE: i64 = -1;

/// Código em disco de um objeto extinto
pub const FADED_CODE: i64 = -10;

// ═══════════════════════════════════════════════════════════════════════════
// CARRIER
// ═══════════════════════════════════════════════════════════════════════════

/// Objeto que subsume um identificador num snapshot
///
/// `Faded` é absorvente: uma vez extinto, o identificador permanece extinto
/// em todos os snapshots seguintes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Carrier {
    /// Ainda sem valor (slot recém-materializado)
    #[default]
    Unresolved,
    /// Objeto desapareceu sem descendente
    Faded,
    /// Carregado por este identificador (ele próprio, se independente)
    Object(ObjectId),
}

impl Carrier {
    /// Codificação numérica compatível com as tabelas em disco
    pub fn encode(self) -> i64 {
        match self {
            Carrier::Unresolved => UNRESOLVED_CODE,
            Carrier::Faded => FADED_CODE,
            Carrier::Object(id) => i64::from(id),
        }
    }

    pub fn decode(code: i64) -> Result<Self, InvalidCarrierCode> {
        match code {
            UNRESOLVED_CODE => Ok(Carrier::Unresolved),
            FADED_CODE => Ok(Carrier::Faded),
            n => ObjectId::try_from(n)
                .map(Carrier::Object)
                .map_err(|_| InvalidCarrierCode(n)),
        }
    }

    pub fn object(self) -> Option<ObjectId> {
        match self {
            Carrier::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_faded(self) -> bool {
        self == Carrier::Faded
    }

    pub fn is_unresolved(self) -> bool {
        self == Carrier::Unresolved
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Carrier::Unresolved => write!(f, "unresolved"),
            Carrier::Faded => write!(f, "faded"),
            Carrier::Object(id) => write!(f, "{}", id),
        }
    }
}

impl From<Carrier> for i64 {
    fn from(carrier: Carrier) -> Self {
        carrier.encode()
    }
}

impl TryFrom<i64> for Carrier {
    type Error = InvalidCarrierCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Carrier::decode(code)
    }
}

/// Código numérico sem significado de carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCarrierCode(pub i64);

impl fmt::Display for InvalidCarrierCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid carrier code {}", self.0)
    }
}

impl std::error::Error for InvalidCarrierCode {}

/// `Option<ObjectId>` em disco: ausente é `-1`
pub(crate) mod absent_id_as_negative {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{ObjectId, UNRESOLVED_CODE};

    pub fn serialize<S>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(id.map_or(UNRESOLVED_CODE, i64::from))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<ObjectId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match i64::deserialize(deserializer)? {
            UNRESOLVED_CODE => Ok(None),
            code => ObjectId::try_from(code)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid object id {}", code))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTADOR GLOBAL
// ═══════════════════════════════════════════════════════════════════════════

/// Contador global monotônico de identificadores
///
/// Único estado mutável compartilhado entre fases; avançado apenas pelo
/// atribuidor, uma vez por execução.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdCounter {
    next: ObjectId,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Próximo identificador a ser emitido
    pub fn next_id(&self) -> ObjectId {
        self.next
    }

    /// Total de identificadores já emitidos
    pub fn assigned(&self) -> usize {
        self.next as usize
    }

    /// Maior identificador emitido (`None` antes da primeira atribuição)
    pub fn max_assigned(&self) -> Option<ObjectId> {
        self.next.checked_sub(1)
    }

    /// Emite um novo identificador
    pub fn allocate(&mut self) -> TraceResult<ObjectId> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(TraceError::IdentifierOverflow)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_encoding() {
        assert_eq!(Carrier::Unresolved.encode(), -1);
        assert_eq!(Carrier::Faded.encode(), -10);
        assert_eq!(Carrier::Object(42).encode(), 42);
        assert_eq!(Carrier::decode(-10), Ok(Carrier::Faded));
        assert_eq!(Carrier::decode(7), Ok(Carrier::Object(7)));
        assert_eq!(Carrier::decode(-3), Err(InvalidCarrierCode(-3)));
    }

    #[test]
    fn test_carrier_serde_numeric() {
        let carriers = vec![Carrier::Object(0), Carrier::Faded, Carrier::Unresolved];
        let json = serde_json::to_string(&carriers).unwrap();
        assert_eq!(json, "[0,-10,-1]");

        let back: Vec<Carrier> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, carriers);
        assert!(serde_json::from_str::<Carrier>("-5").is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct MaxId {
        #[serde(with = "absent_id_as_negative")]
        max_object_id: Option<ObjectId>,
    }

    #[test]
    fn test_absent_id_is_negative_on_disk() {
        let json = serde_json::to_string(&MaxId { max_object_id: None }).unwrap();
        assert_eq!(json, r#"{"max_object_id":-1}"#);
        let back: MaxId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_object_id, None);

        let back: MaxId = serde_json::from_str(r#"{"max_object_id":4}"#).unwrap();
        assert_eq!(back.max_object_id, Some(4));
        assert!(serde_json::from_str::<MaxId>(r#"{"max_object_id":-7}"#).is_err());
    }

    #[test]
    fn test_counter_monotonic() {
        let mut counter = IdCounter::new();
        assert_eq!(counter.max_assigned(), None);
        assert_eq!(counter.allocate().unwrap(), 0);
        assert_eq!(counter.allocate().unwrap(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.max_assigned(), Some(1));
        assert_eq!(counter.assigned(), 2);
    }

    #[test]
    fn test_counter_overflow() {
        let mut counter = IdCounter { next: ObjectId::MAX };
        assert!(matches!(counter.allocate(), Err(TraceError::IdentifierOverflow)));
    }
}

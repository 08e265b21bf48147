//! Store em diretório de arquivos JSON
//!
//! ```text
//! <root>/
//!   ObjIDs/ObjIDs_0000.json
//!   Linkage/Linkage_0000.json
//!   MergeLists/CarrierIDs_0000.json
//!   VRIndices/VRIndices_0000.json
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{TraceError, TraceResult};
use crate::ids::Snapshot;
use crate::linkage::SnapshotLinkage;
use crate::propagator::CarrierMap;
use crate::reverse::ReverseIndex;
use crate::table::IdentifierTable;

use super::{RecordKind, TracingStore};

/// Opções de criação do store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// JSON indentado (arquivos maiores)
    pub pretty: bool,
    /// Move uma saída anterior para `<dir>.old` antes de escrever
    pub backup_existing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            backup_existing: true,
        }
    }
}

/// Dataset gravado: descrição legível + registro
#[derive(Serialize)]
struct Dataset<'a, T: Serialize> {
    description: String,
    #[serde(flatten)]
    record: &'a T,
}

/// Store persistido num diretório
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
    pretty: bool,
}

impl JsonStore {
    /// Cria o diretório de saída para uma nova execução
    pub fn create(root: impl AsRef<Path>, options: StoreOptions) -> TraceResult<Self> {
        let root = root.as_ref().to_path_buf();
        if options.backup_existing && root.exists() {
            let backup = backup_path(&root)?;
            if backup.exists() {
                fs::remove_dir_all(&backup)?;
            }
            fs::rename(&root, &backup)?;
            info!(from = %root.display(), to = %backup.display(), "Moved previous output aside");
        }
        Self::with_groups(root, options.pretty)
    }

    /// Abre uma saída existente (ex.: para a fase de carriers)
    pub fn open(root: impl AsRef<Path>) -> TraceResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TraceError::Config(format!(
                "No tracing output at {}",
                root.display()
            )));
        }
        Self::with_groups(root, false)
    }

    fn with_groups(root: PathBuf, pretty: bool) -> TraceResult<Self> {
        for kind in RecordKind::all() {
            fs::create_dir_all(root.join(kind.group()))?;
        }
        Ok(Self { root, pretty })
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, kind: RecordKind, snapshot: Snapshot) -> PathBuf {
        self.root
            .join(kind.group())
            .join(format!("{}.json", kind.dataset_name(snapshot)))
    }

    /// Escreve via arquivo temporário + rename; registros anteriores do
    /// mesmo snapshot são substituídos
    fn write<T: Serialize>(&self, kind: RecordKind, snapshot: Snapshot, record: &T) -> TraceResult<()> {
        let path = self.record_path(kind, snapshot);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let dataset = Dataset {
                description: kind.description(snapshot),
                record,
            };
            if self.pretty {
                serde_json::to_writer_pretty(&mut writer, &dataset)?;
            } else {
                serde_json::to_writer(&mut writer, &dataset)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "Wrote {}", kind);
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, kind: RecordKind, snapshot: Snapshot) -> TraceResult<T> {
        let path = self.record_path(kind, snapshot);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TraceError::MissingRecord {
                    kind: kind.to_string(),
                    snapshot,
                });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|e| TraceError::CorruptRecord {
            kind: kind.to_string(),
            snapshot,
            detail: e.to_string(),
        })
    }
}

fn backup_path(root: &Path) -> TraceResult<PathBuf> {
    let name = root.file_name().ok_or_else(|| {
        TraceError::Config(format!("Cannot back up output directory {}", root.display()))
    })?;
    let mut backup = name.to_os_string();
    backup.push(".old");
    Ok(root.with_file_name(backup))
}

impl TracingStore for JsonStore {
    fn write_identifiers(&mut self, table: &IdentifierTable) -> TraceResult<()> {
        self.write(RecordKind::Identifiers, table.snapshot(), table)
    }

    fn read_identifiers(&self, snapshot: Snapshot) -> TraceResult<IdentifierTable> {
        self.read(RecordKind::Identifiers, snapshot)
    }

    fn write_linkage(&mut self, linkage: &SnapshotLinkage) -> TraceResult<()> {
        self.write(RecordKind::Linkage, linkage.snapshot(), linkage)
    }

    fn read_linkage(&self, snapshot: Snapshot) -> TraceResult<SnapshotLinkage> {
        self.read(RecordKind::Linkage, snapshot)
    }

    fn write_carriers(&mut self, carriers: &CarrierMap) -> TraceResult<()> {
        self.write(RecordKind::Carriers, carriers.snapshot(), carriers)
    }

    fn read_carriers(&self, snapshot: Snapshot) -> TraceResult<CarrierMap> {
        self.read(RecordKind::Carriers, snapshot)
    }

    fn write_reverse_index(&mut self, reverse: &ReverseIndex) -> TraceResult<()> {
        self.write(RecordKind::ReverseIndex, reverse.snapshot(), reverse)
    }

    fn read_reverse_index(&self, snapshot: Snapshot) -> TraceResult<ReverseIndex> {
        self.read(RecordKind::ReverseIndex, snapshot)
    }

    fn snapshot_count(&self) -> TraceResult<usize> {
        Ok((0usize..)
            .take_while(|&s| self.record_path(RecordKind::Identifiers, s).is_file())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableMeta;
    use tempfile::TempDir;

    fn table(snapshot: Snapshot) -> IdentifierTable {
        let meta = TableMeta { snapshot, max_object_id: Some(2), first_new_object_id: 1 };
        IdentifierTable::new(meta, vec![0, 2, 1])
    }

    #[test]
    fn test_identifiers_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonStore::create(dir.path().join("out"), StoreOptions::default()).unwrap();
        store.write_identifiers(&table(3)).unwrap();

        let path = store.record_path(RecordKind::Identifiers, 3);
        assert!(path.ends_with("ObjIDs/ObjIDs_0003.json"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"description\""));
        assert!(raw.contains("\"first_new_object_id\":1"));

        assert_eq!(store.read_identifiers(3).unwrap(), table(3));
    }

    #[test]
    fn test_missing_and_corrupt_records() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::create(dir.path().join("out"), StoreOptions::default()).unwrap();
        assert!(matches!(store.read_linkage(0), Err(TraceError::MissingRecord { .. })));

        std::fs::write(store.record_path(RecordKind::Linkage, 0), "{ not json").unwrap();
        assert!(matches!(store.read_linkage(0), Err(TraceError::CorruptRecord { .. })));
    }

    #[test]
    fn test_backup_existing_output() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tracing");
        let mut store = JsonStore::create(&root, StoreOptions::default()).unwrap();
        store.write_identifiers(&table(0)).unwrap();

        let fresh = JsonStore::create(&root, StoreOptions::default()).unwrap();
        assert_eq!(fresh.snapshot_count().unwrap(), 0);
        assert!(dir.path().join("tracing.old/ObjIDs/ObjIDs_0000.json").is_file());
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(JsonStore::open(dir.path().join("nope")), Err(TraceError::Config(_))));
    }

    #[test]
    fn test_snapshot_count() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonStore::create(dir.path(), StoreOptions { pretty: true, backup_existing: false }).unwrap();
        store.write_identifiers(&table(0)).unwrap();
        store.write_identifiers(&table(1)).unwrap();
        assert_eq!(store.snapshot_count().unwrap(), 2);
    }
}

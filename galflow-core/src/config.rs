//! Configuração de execução (galflow.toml)
//!
//! ```toml
//! [run]
//! num_snapshots = 79
//!
//! [output]
//! dir = "tracing"
//! pretty = false
//! backup_existing = true
//!
//! [logging]
//! filter = "galflow=info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::store::StoreOptions;

/// Configuração completa de uma execução
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Seção `[run]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Limita a execução aos primeiros snapshots (padrão: todos os da árvore)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_snapshots: Option<usize>,
}

/// Seção `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Diretório das tabelas de rastreamento
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// JSON indentado
    #[serde(default)]
    pub pretty: bool,

    /// Move uma saída anterior para `<dir>.old`
    #[serde(default = "default_backup")]
    pub backup_existing: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            pretty: false,
            backup_existing: default_backup(),
        }
    }
}

impl OutputConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            pretty: self.pretty,
            backup_existing: self.backup_existing,
        }
    }
}

/// Seção `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Diretiva de filtro do `tracing-subscriber` (`GALFLOW_LOG` tem precedência)
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tracing")
}

fn default_backup() -> bool {
    true
}

fn default_filter() -> String {
    "galflow=info".to_string()
}

impl TracerConfig {
    /// Parse a partir de TOML
    pub fn from_str(content: &str) -> TraceResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TraceError::Config(format!("Failed to parse galflow.toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Carrega de um arquivo
    pub fn from_file(path: &Path) -> TraceResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TraceError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Serializa para TOML
    pub fn to_string(&self) -> TraceResult<String> {
        toml::to_string_pretty(self).map_err(|e| TraceError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> TraceResult<()> {
        if self.run.num_snapshots == Some(0) {
            return Err(TraceError::Config("run.num_snapshots must be at least 1".into()));
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(TraceError::Config("output.dir must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = TracerConfig::from_str("").unwrap();
        assert_eq!(config, TracerConfig::default());
        assert_eq!(config.output.dir, PathBuf::from("tracing"));
        assert!(config.output.backup_existing);
        assert_eq!(config.logging.filter, "galflow=info");
        assert_eq!(config.run.num_snapshots, None);
    }

    #[test]
    fn test_partial_sections() {
        let config = TracerConfig::from_str(
            r#"
[run]
num_snapshots = 79

[output]
pretty = true
"#,
        )
        .unwrap();
        assert_eq!(config.run.num_snapshots, Some(79));
        assert!(config.output.pretty);
        assert!(config.output.backup_existing);
        assert_eq!(config.output.store_options(), StoreOptions { pretty: true, backup_existing: true });
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(TracerConfig::from_str("[run]\nnum_snapshots = 0"), Err(TraceError::Config(_))));
        assert!(matches!(TracerConfig::from_str("[output\n"), Err(TraceError::Config(_))));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("galflow.toml");
        let mut config = TracerConfig::default();
        config.run.num_snapshots = Some(12);
        config.logging.filter = "galflow=debug".into();
        std::fs::write(&path, config.to_string().unwrap()).unwrap();

        assert_eq!(TracerConfig::from_file(&path).unwrap(), config);
        assert!(TracerConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}

//! Run configuration
//!
//! One YAML file describes an ingestion or network run. Command-line flags
//! override whatever the file sets.

use crate::flow::{FlowOptions, Stratification, Window};
use crate::ingest::SourceKind;
use crate::storage::DEFAULT_BATCH_SIZE;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Window needs both a start and an end date")]
    IncompleteWindow,

    #[error(transparent)]
    Flow(#[from] crate::flow::FlowError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where decoded source files are read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub input_dir: PathBuf,
    /// Extension of decoded files, without the dot
    pub extension: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { input_dir: PathBuf::from("."), extension: "jsonl".into() }
    }
}

/// Named stratification modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StratifyMode {
    #[default]
    None,
    Diagnosis,
    Chapters,
    Procedure,
}

impl std::str::FromStr for StratifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(StratifyMode::None),
            "diagnosis" | "cid" => Ok(StratifyMode::Diagnosis),
            "chapters" | "chapter" => Ok(StratifyMode::Chapters),
            "procedure" | "proc" => Ok(StratifyMode::Procedure),
            other => Err(format!("unknown stratification '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Only ingest files of this type
    pub source_type: Option<SourceKind>,
    pub warehouse_dir: PathBuf,
    pub batch_size: usize,
    pub verbose: bool,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub diag_depth: usize,
    pub proc_depth: usize,
    pub stratify: StratifyMode,
    /// Keep or drop self-edges; unset uses each network's default
    pub self_edges: Option<bool>,
    pub source: SourceConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_type: None,
            warehouse_dir: default_warehouse_dir(),
            batch_size: DEFAULT_BATCH_SIZE,
            verbose: false,
            window_start: None,
            window_end: None,
            diag_depth: 0,
            proc_depth: Stratification::MIN_PROCEDURE_DEPTH,
            stratify: StratifyMode::None,
            self_edges: None,
            source: SourceConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Load `path` when given, else the defaults
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// The window, when both ends are set
    pub fn window(&self) -> ConfigResult<Option<Window>> {
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => Ok(Some(Window::new(start, end)?)),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteWindow),
        }
    }

    /// Stratification with its depth clamped to the valid range
    pub fn stratification(&self) -> Stratification {
        match self.stratify {
            StratifyMode::None => Stratification::None,
            StratifyMode::Diagnosis => Stratification::diagnosis(self.diag_depth),
            StratifyMode::Chapters => Stratification::Chapters,
            StratifyMode::Procedure => Stratification::procedure(self.proc_depth),
        }
    }

    pub fn flow_options(&self) -> ConfigResult<FlowOptions> {
        Ok(FlowOptions {
            stratification: self.stratification(),
            self_edges: self.self_edges,
            window: self.window()?,
        })
    }

    /// Database file of a warehouse under `warehouse_dir`
    pub fn warehouse_path(&self, warehouse: crate::schema::Warehouse) -> PathBuf {
        self.warehouse_dir.join(warehouse.file_name())
    }
}

/// `<data dir>/opensus`, falling back to `~/.local/share/opensus`
pub fn default_warehouse_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("opensus")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Warehouse;

    #[test]
    fn defaults_without_file() {
        let config = RunConfig::load_or_default(None).unwrap();
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.stratification(), Stratification::None);
        assert_eq!(config.window().unwrap(), None);
        assert!(config.warehouse_dir.ends_with("opensus"));
    }

    #[test]
    fn parses_yaml_overrides() {
        let config = RunConfig::from_yaml(
            r#"
source_type: RD
warehouse_dir: /tmp/wh
batch_size: 50
verbose: true
window_start: 2020-01-01
window_end: 2020-01-31
stratify: diagnosis
diag_depth: 7
self_edges: false
source:
  input_dir: /data/decoded
"#,
        )
        .unwrap();

        assert_eq!(config.source_type, Some(SourceKind::Rd));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.stratification(), Stratification::Diagnosis { depth: 4 });
        assert_eq!(config.source.extension, "jsonl");
        assert_eq!(
            config.warehouse_path(Warehouse::Admissions),
            PathBuf::from("/tmp/wh/admissions.db")
        );
        let window = config.window().unwrap().unwrap();
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());
        assert_eq!(config.flow_options().unwrap().self_edges, Some(false));
    }

    #[test]
    fn half_open_window_is_rejected() {
        let config = RunConfig::from_yaml("window_start: 2020-01-01\n").unwrap();
        assert!(matches!(config.window(), Err(ConfigError::IncompleteWindow)));
    }

    #[test]
    fn unknown_field_type_is_a_yaml_error() {
        assert!(matches!(
            RunConfig::from_yaml("batch_size: many\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}

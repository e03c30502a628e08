use crate::baseline::MetricKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Values a test case exposes to the baseline comparisons.
pub trait Case {
    /// Directory the simulation ran in (holds the coupler logs).
    fn run_dir(&self) -> PathBuf;

    /// Coupling framework of the case, e.g. `mct` or `nuopc`.
    fn comp_interface(&self) -> String;

    fn baseline_root(&self) -> PathBuf;

    /// Baseline name, relative to the baseline root (may contain `/`).
    fn baseline_name(&self) -> String;

    /// Allowed relative deviation for `kind`; `None` means "use the default".
    fn tolerance(&self, kind: MetricKind) -> Option<f64>;
}

/// Top-level case configuration loaded from a TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct CaseConfig {
    pub case: CaseSection,
    pub baseline: BaselineConfig,
    pub tolerance: ToleranceConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaseSection {
    pub run_dir: PathBuf,
    pub comp_interface: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub root: PathBuf,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ToleranceConfig {
    pub throughput: Option<f64>,
    pub memory: Option<f64>,
}

// --- Default implementations ---

impl Default for CaseSection {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("run"),
            comp_interface: "mct".to_string(),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("baselines"),
            name: String::new(),
        }
    }
}

impl CaseConfig {
    /// Load a case configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

impl Case for CaseConfig {
    fn run_dir(&self) -> PathBuf {
        self.case.run_dir.clone()
    }

    fn comp_interface(&self) -> String {
        self.case.comp_interface.clone()
    }

    fn baseline_root(&self) -> PathBuf {
        self.baseline.root.clone()
    }

    fn baseline_name(&self) -> String {
        self.baseline.name.clone()
    }

    fn tolerance(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Throughput => self.tolerance.throughput,
            MetricKind::Memory => self.tolerance.memory,
        }
    }
}

/// Errors loading a case configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

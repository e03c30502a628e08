//! Baseline files: one scalar per metric, stored as plain text.
//!
//! A baseline file holds either a decimal value or the sentinel `-1`
//! ("no baseline recorded"). Throughput and memory read the sentinel
//! differently: a missing throughput baseline is `None`, a missing memory
//! baseline is a `0.0` floor.

use crate::extract;
use crate::fs::FileSystem;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// On-disk marker for "no valid baseline recorded".
pub const NO_BASELINE: &str = "-1";

pub const TPUT_FILE: &str = "cpl-tput.log";
pub const MEM_FILE: &str = "cpl-mem.log";

/// Which performance metric a baseline or comparison is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Throughput,
    Memory,
}

impl MetricKind {
    /// Baseline file name for this metric.
    pub fn file_name(self) -> &'static str {
        match self {
            MetricKind::Throughput => TPUT_FILE,
            MetricKind::Memory => MEM_FILE,
        }
    }

    /// Short tag used in verdict lines.
    pub fn tag(self) -> &'static str {
        match self {
            MetricKind::Throughput => "TPUTCOMP",
            MetricKind::Memory => "MEMCOMP",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Throughput => write!(f, "throughput"),
            MetricKind::Memory => write!(f, "memory"),
        }
    }
}

/// Read the raw value of a baseline file.
///
/// `None` for empty content, the sentinel, any negative value, or content
/// that is not a finite number.
fn read_baseline_value(fs: &dyn FileSystem, path: &Path) -> Result<Option<f64>, BaselineError> {
    let mut text = String::new();
    fs.open(path)
        .and_then(|mut r| r.read_to_string(&mut text))
        .map_err(|e| BaselineError::from_io(path, e))?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_finite() => {
            tracing::warn!(
                path = %path.display(),
                content = trimmed,
                "baseline value is not finite, treating as no baseline"
            );
            Ok(None)
        }
        Ok(v) if v < 0.0 => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                content = trimmed,
                "baseline file is not a number, treating as no baseline"
            );
            Ok(None)
        }
    }
}

/// Read a throughput baseline. Empty or sentinel content is `None`.
pub fn read_baseline_tput(fs: &dyn FileSystem, path: &Path) -> Result<Option<f64>, BaselineError> {
    read_baseline_value(fs, path)
}

/// Read a memory baseline. Empty or sentinel content is `0.0`.
pub fn read_baseline_mem(fs: &dyn FileSystem, path: &Path) -> Result<f64, BaselineError> {
    Ok(read_baseline_value(fs, path)?.unwrap_or(0.0))
}

fn write_baseline_value(
    fs: &dyn FileSystem,
    baseline_dir: &Path,
    kind: MetricKind,
    value: Option<f64>,
) -> Result<PathBuf, BaselineError> {
    fs.create_dir_all(baseline_dir)
        .map_err(|e| BaselineError::from_io(baseline_dir, e))?;

    let path = baseline_dir.join(kind.file_name());
    let content = match value {
        Some(v) => v.to_string(),
        None => NO_BASELINE.to_string(),
    };
    fs.write(&path, &content)
        .map_err(|e| BaselineError::from_io(&path, e))?;

    tracing::info!(path = %path.display(), %kind, value = %content, "wrote baseline");
    Ok(path)
}

/// Record the last memory sample of `log_path` as the memory baseline.
pub fn write_baseline_mem(
    fs: &dyn FileSystem,
    baseline_dir: &Path,
    log_path: &Path,
) -> Result<PathBuf, BaselineError> {
    let last = extract::get_mem_usage(fs, log_path)
        .last()
        .map(|&(_, mem)| mem);
    write_baseline_value(fs, baseline_dir, MetricKind::Memory, last)
}

/// Record the throughput of `log_path` as the throughput baseline.
pub fn write_baseline_tput(
    fs: &dyn FileSystem,
    baseline_dir: &Path,
    log_path: &Path,
) -> Result<PathBuf, BaselineError> {
    let tput = extract::get_throughput(fs, log_path);
    write_baseline_value(fs, baseline_dir, MetricKind::Throughput, tput)
}

/// Errors reading or writing baseline files.
#[derive(Debug)]
pub enum BaselineError {
    /// The baseline file does not exist.
    NotFound { path: PathBuf },
    /// Any other I/O failure.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BaselineError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            BaselineError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            BaselineError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl std::fmt::Display for BaselineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaselineError::NotFound { path } => {
                write!(f, "baseline file not found: {}", path.display())
            }
            BaselineError::Io { path, source } => {
                write!(f, "baseline I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for BaselineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BaselineError::NotFound { .. } => None,
            BaselineError::Io { source, .. } => Some(source),
        }
    }
}

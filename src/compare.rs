//! Baseline comparison for coupler throughput and memory usage.
//!
//! Each comparison locates the latest coupler log, extracts the current
//! value, reads the stored baseline and checks the relative difference
//! against the case tolerance.
//!
//! Sign conventions:
//! - throughput: `diff = (baseline - current) / baseline`
//! - memory:     `diff = (current - baseline) / max(baseline, 1.0)`
//!
//! Both are rounded to three decimals; a value passes when `|diff| < tolerance`.

use crate::baseline::{self, BaselineError, MetricKind};
use crate::config::Case;
use crate::extract;
use crate::fs::FileSystem;
use crate::locate;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Tolerance used when the case does not set one.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Memory series shorter than this are too noisy to compare.
pub const MIN_MEMORY_SAMPLES: usize = 4;

/// Outcome of comparing one metric against its baseline.
///
/// `below_tolerance` and `diff` are `None` exactly when either the baseline
/// or the current value is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub kind: MetricKind,
    pub below_tolerance: Option<bool>,
    pub diff: Option<f64>,
    pub tolerance: f64,
    pub baseline: Option<f64>,
    pub current: Option<f64>,
}

impl ComparisonResult {
    fn unavailable(
        kind: MetricKind,
        tolerance: f64,
        baseline: Option<f64>,
        current: Option<f64>,
    ) -> Self {
        Self {
            kind,
            below_tolerance: None,
            diff: None,
            tolerance,
            baseline,
            current,
        }
    }

    fn compared(kind: MetricKind, tolerance: f64, baseline: f64, current: f64, diff: f64) -> Self {
        let diff = round3(diff);
        Self {
            kind,
            below_tolerance: Some(diff.abs() < tolerance),
            diff: Some(diff),
            tolerance,
            baseline: Some(baseline),
            current: Some(current),
        }
    }

    /// True when a comparison was made and it exceeded the tolerance.
    pub fn is_regression(&self) -> bool {
        self.below_tolerance == Some(false)
    }
}

impl std::fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |v| v.to_string());
        match (self.below_tolerance, self.diff) {
            (Some(below), Some(diff)) => write!(
                f,
                "{}: {} diff {} {} tolerance {} (baseline {}, current {})",
                self.kind.tag(),
                self.kind,
                diff,
                if below { "within" } else { "exceeds" },
                self.tolerance,
                fmt_opt(self.baseline),
                fmt_opt(self.current),
            ),
            _ => write!(
                f,
                "{}: {} comparison unavailable (baseline {}, current {})",
                self.kind.tag(),
                self.kind,
                fmt_opt(self.baseline),
                fmt_opt(self.current),
            ),
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Directory holding the baselines for this case.
pub fn baseline_dir(case: &dyn Case) -> PathBuf {
    case.baseline_root().join(case.baseline_name())
}

fn tolerance(case: &dyn Case, kind: MetricKind) -> f64 {
    case.tolerance(kind).unwrap_or(DEFAULT_TOLERANCE)
}

fn latest_log(fs: &dyn FileSystem, case: &dyn Case) -> Option<PathBuf> {
    locate::get_latest_cpl_logs(fs, case).into_iter().next()
}

/// Compare the latest run's throughput against the throughput baseline.
///
/// A missing baseline file yields a fully unknown result (current value
/// withheld). An empty or sentinel baseline still reports the current value.
pub fn compare_throughput(
    fs: &dyn FileSystem,
    case: &dyn Case,
) -> Result<ComparisonResult, BaselineError> {
    let kind = MetricKind::Throughput;
    let tolerance = tolerance(case, kind);
    let baseline_file = baseline_dir(case).join(kind.file_name());

    let current = latest_log(fs, case).and_then(|log| extract::get_throughput(fs, &log));

    let baseline = match baseline::read_baseline_tput(fs, &baseline_file) {
        Ok(b) => b,
        Err(BaselineError::NotFound { path }) => {
            tracing::info!(path = %path.display(), "no throughput baseline file");
            return Ok(ComparisonResult::unavailable(kind, tolerance, None, None));
        }
        Err(e) => return Err(e),
    };

    let result = match (baseline, current) {
        (None, current) => ComparisonResult::unavailable(kind, tolerance, None, current),
        (Some(baseline), None) => {
            ComparisonResult::unavailable(kind, tolerance, Some(baseline), None)
        }
        (Some(baseline), Some(current)) => {
            // A zero baseline carries no scale to compare against.
            let diff = if baseline == 0.0 {
                0.0
            } else {
                (baseline - current) / baseline
            };
            ComparisonResult::compared(kind, tolerance, baseline, current, diff)
        }
    };
    tracing::debug!(?result, "throughput comparison");
    Ok(result)
}

/// Compare the latest run's memory usage against the memory baseline.
///
/// The current value is the last memory sample, and only counts when the
/// log holds at least [`MIN_MEMORY_SAMPLES`] samples.
pub fn compare_memory(
    fs: &dyn FileSystem,
    case: &dyn Case,
) -> Result<ComparisonResult, BaselineError> {
    let kind = MetricKind::Memory;
    let tolerance = tolerance(case, kind);
    let baseline_file = baseline_dir(case).join(kind.file_name());

    let samples = latest_log(fs, case)
        .map(|log| extract::get_mem_usage(fs, &log))
        .unwrap_or_default();
    let current = if samples.len() >= MIN_MEMORY_SAMPLES {
        samples.last().map(|&(_, mem)| mem)
    } else {
        tracing::debug!(samples = samples.len(), "not enough memory samples to compare");
        None
    };

    let baseline = match baseline::read_baseline_mem(fs, &baseline_file) {
        Ok(b) => b,
        Err(BaselineError::NotFound { path }) => {
            tracing::info!(path = %path.display(), "no memory baseline file");
            return Ok(ComparisonResult::unavailable(kind, tolerance, None, None));
        }
        Err(e) => return Err(e),
    };

    let result = match current {
        None => ComparisonResult::unavailable(kind, tolerance, Some(baseline), None),
        Some(current) => ComparisonResult::compared(
            kind,
            tolerance,
            baseline,
            current,
            (current - baseline) / baseline.max(1.0),
        ),
    };
    tracing::debug!(?result, "memory comparison");
    Ok(result)
}

/// Record throughput and memory baselines from the latest coupler log.
///
/// Returns the baseline directory written, or `None` when the run has no
/// coupler log (nothing is written).
pub fn record_baselines(
    fs: &dyn FileSystem,
    case: &dyn Case,
) -> Result<Option<PathBuf>, BaselineError> {
    let Some(log) = latest_log(fs, case) else {
        tracing::warn!(run_dir = %case.run_dir().display(), "no coupler log to record baselines from");
        return Ok(None);
    };
    let dir = baseline_dir(case);
    record_from_log(fs, &dir, &log)?;
    Ok(Some(dir))
}

fn record_from_log(fs: &dyn FileSystem, dir: &Path, log: &Path) -> Result<(), BaselineError> {
    baseline::write_baseline_tput(fs, dir, log)?;
    baseline::write_baseline_mem(fs, dir, log)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseConfig;
    use crate::extract::tests::CPLLOG;
    use crate::fs::{MemFs, OsFs};
    use tempfile::tempdir;

    const BASELINE_NAME: &str = "master/ERIO.ne30_g16_rx1.A.docker_gnu";

    struct MockCase {
        tolerance: Option<f64>,
    }

    impl Case for MockCase {
        fn run_dir(&self) -> PathBuf {
            PathBuf::from("/case/run")
        }
        fn comp_interface(&self) -> String {
            "mct".to_string()
        }
        fn baseline_root(&self) -> PathBuf {
            PathBuf::from("/baselines")
        }
        fn baseline_name(&self) -> String {
            BASELINE_NAME.to_string()
        }
        fn tolerance(&self, _kind: MetricKind) -> Option<f64> {
            self.tolerance
        }
    }

    fn case(tolerance: Option<f64>) -> MockCase {
        MockCase { tolerance }
    }

    fn tput_baseline_path() -> PathBuf {
        PathBuf::from("/baselines").join(BASELINE_NAME).join("cpl-tput.log")
    }

    fn mem_baseline_path() -> PathBuf {
        PathBuf::from("/baselines").join(BASELINE_NAME).join("cpl-mem.log")
    }

    /// Run directory with a log reporting throughput 504.
    fn tput_fs() -> MemFs {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", "tput: 504\n");
        fs
    }

    fn mem_log(values: &[f64]) -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("memory_write: model date = {} 0 memory = {v} MB\n", i + 1))
            .collect()
    }

    fn mem_fs(values: &[f64]) -> MemFs {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", mem_log(values));
        fs
    }

    #[test]
    fn test_compare_throughput_no_baseline_file() {
        let fs = tput_fs();
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, None);
        assert_eq!(result.diff, None);
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, None);
        assert_eq!(result.current, None);
    }

    #[test]
    fn test_compare_throughput_no_baseline() {
        let fs = tput_fs();
        fs.insert(tput_baseline_path(), "-1");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, None);
        assert_eq!(result.diff, None);
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, None);
        assert_eq!(result.current, Some(504.0));
    }

    #[test]
    fn test_compare_throughput_no_tolerance() {
        let fs = tput_fs();
        fs.insert(tput_baseline_path(), "500");
        let result = compare_throughput(&fs, &case(None)).unwrap();

        assert_eq!(result.below_tolerance, Some(true));
        assert_eq!(result.diff, Some(-0.008));
        assert_eq!(result.tolerance, 0.1);
        assert_eq!(result.baseline, Some(500.0));
        assert_eq!(result.current, Some(504.0));
    }

    #[test]
    fn test_compare_throughput() {
        let fs = tput_fs();
        fs.insert(tput_baseline_path(), "500");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, Some(true));
        assert_eq!(result.diff, Some(-0.008));
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, Some(500.0));
        assert_eq!(result.current, Some(504.0));
        assert!(!result.is_regression());
    }

    #[test]
    fn test_compare_throughput_regression() {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", "tput: 400\n");
        fs.insert(tput_baseline_path(), "500");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.diff, Some(0.2));
        assert_eq!(result.below_tolerance, Some(false));
        assert!(result.is_regression());
    }

    #[test]
    fn test_compare_throughput_no_log() {
        let fs = MemFs::new();
        fs.insert(tput_baseline_path(), "500");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, None);
        assert_eq!(result.diff, None);
        assert_eq!(result.baseline, Some(500.0));
        assert_eq!(result.current, None);
    }

    #[test]
    fn test_compare_memory_zero_baseline() {
        let fs = mem_fs(&[1000.0, 1001.0, 1002.0, 1003.0]);
        fs.insert(mem_baseline_path(), "-1");
        let result = compare_memory(&fs, &case(Some(0.05))).unwrap();

        // Denominator floored at 1.0: an empty memory baseline fails here.
        // CIME's Python baselines reported diff 0.0 and passed for this case.
        assert_eq!(result.diff, Some(1003.0));
        assert_eq!(result.below_tolerance, Some(false));
        assert_eq!(result.baseline, Some(0.0));
        assert_eq!(result.current, Some(1003.0));
    }

    #[test]
    fn test_compare_throughput_zero_baseline() {
        let fs = tput_fs();
        fs.insert(tput_baseline_path(), "0");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.diff, Some(0.0));
        assert_eq!(result.below_tolerance, Some(true));
        assert_eq!(result.baseline, Some(0.0));
        assert_eq!(result.current, Some(504.0));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["diff"], 0.0);
        assert_eq!(json["below_tolerance"], true);
    }

    #[test]
    fn test_compare_throughput_zero_baseline_and_current() {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", "tput: 0\n");
        fs.insert(tput_baseline_path(), "0");
        let result = compare_throughput(&fs, &case(None)).unwrap();

        assert_eq!(result.diff, Some(0.0));
        assert_eq!(result.below_tolerance, Some(true));
    }

    #[test]
    fn test_unreadable_baseline_propagates_error() {
        let dir = tempdir().unwrap();
        let run_dir = dir.path().join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("cpl.log"), CPLLOG).unwrap();

        // Directories where the baseline files should be: reads fail, but
        // not with NotFound.
        let baseline_dir = dir.path().join("baselines").join(BASELINE_NAME);
        std::fs::create_dir_all(baseline_dir.join("cpl-tput.log")).unwrap();
        std::fs::create_dir_all(baseline_dir.join("cpl-mem.log")).unwrap();

        let mut config = CaseConfig::default();
        config.case.run_dir = run_dir;
        config.baseline.root = dir.path().join("baselines");
        config.baseline.name = BASELINE_NAME.to_string();

        let err = compare_throughput(&OsFs, &config).unwrap_err();
        assert!(matches!(err, BaselineError::Io { .. }), "got {err}");
        let err = compare_memory(&OsFs, &config).unwrap_err();
        assert!(matches!(err, BaselineError::Io { .. }), "got {err}");
    }

    #[test]
    fn test_compare_memory_not_enough_samples() {
        let fs = mem_fs(&[1000.0, 1001.0]);
        fs.insert(mem_baseline_path(), "1000.0");
        let result = compare_memory(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, None);
        assert_eq!(result.diff, None);
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, Some(1000.0));
        assert_eq!(result.current, None);
    }

    #[test]
    fn test_compare_memory_no_baseline_file() {
        let fs = mem_fs(&[1000.0, 1001.0, 1002.0, 1003.0]);
        let result = compare_memory(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, None);
        assert_eq!(result.diff, None);
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, None);
        assert_eq!(result.current, None);
    }

    #[test]
    fn test_compare_memory_no_tolerance() {
        let fs = mem_fs(&[1000.0, 1001.0, 1002.0, 1003.0]);
        fs.insert(mem_baseline_path(), "1000.0");
        let result = compare_memory(&fs, &case(None)).unwrap();

        assert_eq!(result.below_tolerance, Some(true));
        assert_eq!(result.diff, Some(0.003));
        assert_eq!(result.tolerance, 0.1);
        assert_eq!(result.baseline, Some(1000.0));
        assert_eq!(result.current, Some(1003.0));
    }

    #[test]
    fn test_compare_memory() {
        let fs = mem_fs(&[1000.0, 1001.0, 1002.0, 1003.0]);
        fs.insert(mem_baseline_path(), "1000.0");
        let result = compare_memory(&fs, &case(Some(0.05))).unwrap();

        assert_eq!(result.below_tolerance, Some(true));
        assert_eq!(result.diff, Some(0.003));
        assert_eq!(result.tolerance, 0.05);
        assert_eq!(result.baseline, Some(1000.0));
        assert_eq!(result.current, Some(1003.0));
    }

    #[test]
    fn test_compare_memory_decrease_uses_absolute_diff() {
        let fs = mem_fs(&[900.0, 850.0, 820.0, 800.0]);
        fs.insert(mem_baseline_path(), "1000");
        let result = compare_memory(&fs, &case(Some(0.1))).unwrap();

        assert_eq!(result.diff, Some(-0.2));
        assert_eq!(result.below_tolerance, Some(false));
    }

    #[test]
    fn test_compare_memory_from_coupler_log() {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", CPLLOG);
        fs.insert(mem_baseline_path(), "1673.89");
        let result = compare_memory(&fs, &case(None)).unwrap();

        assert_eq!(result.diff, Some(0.0));
        assert_eq!(result.below_tolerance, Some(true));
    }

    #[test]
    fn test_record_baselines() {
        let fs = MemFs::new();
        fs.insert("/case/run/cpl.log", CPLLOG);

        let dir = record_baselines(&fs, &case(None)).unwrap();

        assert_eq!(dir, Some(PathBuf::from("/baselines").join(BASELINE_NAME)));
        assert_eq!(fs.contents(&tput_baseline_path()).as_deref(), Some("719.635"));
        assert_eq!(fs.contents(&mem_baseline_path()).as_deref(), Some("1673.89"));

        let tput = compare_throughput(&fs, &case(None)).unwrap();
        assert_eq!(tput.diff, Some(0.0));
        assert_eq!(tput.below_tolerance, Some(true));
    }

    #[test]
    fn test_record_baselines_without_log() {
        let fs = MemFs::new();
        assert_eq!(record_baselines(&fs, &case(None)).unwrap(), None);
        assert!(fs.contents(&tput_baseline_path()).is_none());
    }

    #[test]
    fn test_display_verdicts() {
        let fs = tput_fs();
        fs.insert(tput_baseline_path(), "500");
        let result = compare_throughput(&fs, &case(Some(0.05))).unwrap();
        assert_eq!(
            result.to_string(),
            "TPUTCOMP: throughput diff -0.008 within tolerance 0.05 (baseline 500, current 504)"
        );

        let fs = mem_fs(&[1.0]);
        fs.insert(mem_baseline_path(), "1000");
        let result = compare_memory(&fs, &case(None)).unwrap();
        assert_eq!(
            result.to_string(),
            "MEMCOMP: memory comparison unavailable (baseline 1000, current none)"
        );
    }

    #[test]
    fn test_result_serializes_to_json() {
        let result = ComparisonResult::unavailable(MetricKind::Memory, 0.1, Some(0.0), None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "memory");
        assert!(json["diff"].is_null());
        assert_eq!(json["baseline"], 0.0);
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(-4.0 / 500.0), -0.008);
        assert_eq!(round3(3.0 / 1000.0), 0.003);
        assert_eq!(round3(0.12345), 0.123);
    }
}

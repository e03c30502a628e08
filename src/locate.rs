/// Coupler log discovery in a case's run directory.
///
/// The newest coupler log is returned first, followed by every other log
/// that shares its suffix (the other instances of the same run).
use crate::config::Case;
use crate::fs::FileSystem;
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Coupler log name prefix for a component interface.
pub fn log_prefix(comp_interface: &str) -> &'static str {
    if comp_interface == "nuopc" {
        "drv"
    } else {
        "cpl"
    }
}

/// File name after its first `.`, e.g. `log.230504-231800.gz`.
fn name_suffix(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.split_once('.').map(|(_, suffix)| suffix.to_string())
}

/// Find the coupler logs written by the most recent run.
///
/// Returns an empty vector when the run directory is missing or holds no
/// coupler log.
pub fn get_latest_cpl_logs(fs: &dyn FileSystem, case: &dyn Case) -> Vec<PathBuf> {
    let run_dir = case.run_dir();
    let prefix = log_prefix(&case.comp_interface());

    if !fs.is_dir(&run_dir) {
        tracing::debug!(run_dir = %run_dir.display(), "run directory does not exist");
        return Vec::new();
    }

    let pattern = match Pattern::new(&format!("{prefix}*.log*")) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "invalid coupler log pattern");
            return Vec::new();
        }
    };

    let entries = match fs.read_dir(&run_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, run_dir = %run_dir.display(), "failed to read run directory");
            return Vec::new();
        }
    };

    let mut candidates: Vec<(PathBuf, SystemTime)> = entries
        .into_iter()
        .filter(|p| fs.is_file(p))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.matches(n))
        })
        .map(|p| {
            let mtime = fs.modified(&p).unwrap_or(SystemTime::UNIX_EPOCH);
            (p, mtime)
        })
        .collect();

    // Newest first; ties broken by name so the result is deterministic.
    candidates.sort_by(|(pa, ta), (pb, tb)| tb.cmp(ta).then_with(|| pa.cmp(pb)));

    let Some((newest, _)) = candidates.first() else {
        tracing::debug!(run_dir = %run_dir.display(), prefix, "no coupler logs found");
        return Vec::new();
    };
    let suffix = name_suffix(newest);

    let mut logs = vec![newest.clone()];
    for (path, _) in candidates.iter().skip(1) {
        if suffix.is_some() && name_suffix(path) == suffix {
            logs.push(path.clone());
        }
    }

    tracing::debug!(
        run_dir = %run_dir.display(),
        count = logs.len(),
        newest = %logs[0].display(),
        "located coupler logs"
    );
    logs
}

//! Coupler log metric extraction.
//!
//! Pulls the throughput figure and the memory-usage series out of a coupler
//! log. Logs may be plain text, gzip (`.gz`) or zstd (`.zst`) compressed; the
//! decoder is picked from the file name. Logs are append-only, so for
//! throughput the last matching line wins.

use crate::fs::FileSystem;
use flate2::read::MultiGzDecoder;
use regex::Regex;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

/// One memory diagnostic: (model date, memory in MB).
pub type MemorySample = (f64, f64);

const FLOAT: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

fn tput_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?:tput:|simulated years / cmp-day =)\s*({FLOAT})"
        ))
        .expect("throughput pattern is valid")
    })
}

fn mem_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"model date =\s*({FLOAT}).*?memory =\s*({FLOAT})"
        ))
        .expect("memory pattern is valid")
    })
}

/// Open a log for line-by-line reading, decompressing by suffix.
pub fn open_log<'a>(fs: &'a dyn FileSystem, path: &Path) -> io::Result<Box<dyn BufRead + 'a>> {
    let raw = fs.open(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reader: Box<dyn BufRead + 'a> = if name.ends_with(".gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(raw)))
    } else if name.ends_with(".zst") {
        Box::new(BufReader::new(zstd::stream::read::Decoder::new(raw)?))
    } else {
        Box::new(BufReader::new(raw))
    };
    Ok(reader)
}

/// Feed every line of the log to `visit`. A missing or unreadable log feeds
/// nothing; read errors part-way through keep what was seen.
fn scan_lines(fs: &dyn FileSystem, path: &Path, mut visit: impl FnMut(&str)) {
    if !fs.is_file(path) {
        tracing::debug!(path = %path.display(), "coupler log not found");
        return;
    }

    let reader = match open_log(fs, path) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to open coupler log");
            return;
        }
    };

    // Lossy decoding: coupler logs occasionally carry stray non-UTF-8 bytes.
    for line in reader.split(b'\n') {
        match line {
            Ok(bytes) => visit(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "error reading coupler log");
                break;
            }
        }
    }
}

/// Throughput reported by the last throughput line of the log.
///
/// Returns `None` if the log does not exist or has no throughput line.
pub fn get_throughput(fs: &dyn FileSystem, path: &Path) -> Option<f64> {
    let mut tput = None;
    scan_lines(fs, path, |line| {
        if let Some(caps) = tput_regex().captures(line) {
            if let Ok(v) = caps[1].parse::<f64>() {
                tput = Some(v);
            }
        }
    });
    tracing::debug!(path = %path.display(), ?tput, "extracted throughput");
    tput
}

/// Every memory diagnostic in the log, in file order.
pub fn get_mem_usage(fs: &dyn FileSystem, path: &Path) -> Vec<MemorySample> {
    let mut samples = Vec::new();
    scan_lines(fs, path, |line| {
        if let Some(caps) = mem_regex().captures(line) {
            if let (Ok(date), Ok(mem)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) {
                samples.push((date, mem));
            }
        }
    });
    tracing::debug!(path = %path.display(), samples = samples.len(), "extracted memory usage");
    samples
}

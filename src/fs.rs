//! File access abstraction.
//!
//! Every component reads and writes through [`FileSystem`] so that tests can
//! substitute [`MemFs`] for the real filesystem ([`OsFs`]).

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// The filesystem operations needed to locate logs and manage baselines.
pub trait FileSystem {
    /// Open a file for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;

    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// List the entries directly inside `dir`.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Last modification time of a file.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Create or truncate `path` and write `contents` to it.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let file = std::fs::File::open(path)?;
        Ok(Box::new(file))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)
    }
}

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    modified: SystemTime,
}

/// In-memory filesystem.
///
/// Directories are implied by the files stored beneath them, plus any
/// created explicitly with `create_dir_all`.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<PathBuf, MemFile>>,
    dirs: Mutex<Vec<PathBuf>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file with the given raw bytes, stamped with the current time.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.insert_with_mtime(path, data, SystemTime::now());
    }

    /// Insert a file with an explicit modification time.
    pub fn insert_with_mtime(
        &self,
        path: impl Into<PathBuf>,
        data: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(
            path.into(),
            MemFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Contents of a stored file as UTF-8, if present.
    pub fn contents(&self, path: &Path) -> Option<String> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(path)
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file", path.display()),
        )
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let file = files.get(path).ok_or_else(|| Self::not_found(path))?;
        Ok(Box::new(io::Cursor::new(file.data.clone())))
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        if dirs.iter().any(|d| d.starts_with(path)) {
            return true;
        }
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.keys().any(|f| f != path && f.starts_with(path))
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.is_dir(dir) {
            return Err(Self::not_found(dir));
        }
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files
            .keys()
            .filter(|f| f.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path, contents.as_bytes().to_vec());
        Ok(())
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        if !dirs.iter().any(|d| d == dir) {
            dirs.push(dir.to_path_buf());
        }
        Ok(())
    }
}

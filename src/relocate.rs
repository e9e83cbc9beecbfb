//! Draining finished segment files off the fast capture volume.
//!
//! Source and destination are usually different filesystems (a RAM disk and
//! bulk storage), so files are copied and then removed rather than renamed.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// What happened to one file
#[derive(Debug)]
pub struct FileMoveOutcome {
    pub file: PathBuf,
    pub error: Option<io::Error>,
}

impl FileMoveOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct RelocationReport {
    pub outcomes: Vec<FileMoveOutcome>,
}

impl RelocationReport {
    pub fn moved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileMoveOutcome> {
        self.outcomes.iter().filter(|o| !o.success())
    }
}

/// Regular files directly inside `dir`
fn regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::fs("listing directory", dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs("listing directory", dir, e))?;
        // file_type does not follow symlinks, so a link to a file is skipped like a directory
        match entry.file_type() {
            Ok(ft) if ft.is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {e}", entry.path().display()),
        }
    }
    files.sort();
    Ok(files)
}

/// Copy `src` to `dst` and only remove `src` once the whole file arrived
fn safe_move(src: &Path, dst: &Path) -> io::Result<u64> {
    let expected = fs::metadata(src)?.len();
    let copied = fs::copy(src, dst)?;
    if copied != expected {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("short copy: {copied} of {expected} bytes"),
        ));
    }
    fs::remove_file(src)?;
    Ok(copied)
}

pub struct FileRelocator;

impl FileRelocator {
    /// Move every regular file in `source` into `dest`.
    ///
    /// Per-file failures are logged and left in place; only failing to list
    /// `source` or create `dest` is an error.
    pub fn relocate(source: &Path, dest: &Path) -> Result<RelocationReport> {
        info!(
            "Moving files from {} to {}...",
            source.display(),
            dest.display()
        );
        let files = regular_files(source)?;
        let mut report = RelocationReport::default();
        if files.is_empty() {
            info!("Nothing to move");
            return Ok(report);
        }
        fs::create_dir_all(dest).map_err(|e| Error::fs("creating destination", dest, e))?;
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let error = match safe_move(&file, &dest.join(name)) {
                Ok(bytes) => {
                    info!(bytes, "Moved: {}", name.to_string_lossy());
                    None
                }
                Err(e) => {
                    warn!("Error moving file {}: {e}", file.display());
                    Some(e)
                }
            };
            report.outcomes.push(FileMoveOutcome { file, error });
        }
        info!("Moved {} files successfully", report.moved());
        Ok(report)
    }

    /// Remove stale regular files from `dir`, creating it if needed
    pub fn purge(dir: &Path) -> Result<usize> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| Error::fs("creating directory", dir, e))?;
            return Ok(0);
        }
        let files = regular_files(dir)?;
        for file in &files {
            fs::remove_file(file).map_err(|e| Error::fs("removing stale file", file, e))?;
        }
        Ok(files.len())
    }
}

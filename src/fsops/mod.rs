//! Tree Operations
//!
//! Crash-tolerant recursive copy, merge, and clear over directory trees.
//! Files held open by another process (the game, Steam) are skipped and
//! reported rather than failing the whole operation; every other I/O error
//! aborts and propagates. All operations are no-ops when the source does
//! not exist and are idempotent with respect to final state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Outcome of a tree operation: how many entries were processed and which
/// paths were skipped due to lock contention.
#[derive(Debug, Default)]
pub struct TreeReport {
    /// Files copied or removed.
    pub processed: usize,
    /// Paths left untouched because another process held them.
    pub skipped: Vec<PathBuf>,
}

impl TreeReport {
    /// True when nothing had to be skipped.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn absorb(&mut self, other: TreeReport) {
        self.processed += other.processed;
        self.skipped.extend(other.skipped);
    }
}

/// Whether an I/O error means "another process holds this file" rather
/// than a real failure. Sharing violations on Windows surface as raw OS
/// errors, not as a distinct `ErrorKind`.
fn is_lock_contention(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    match err.raw_os_error() {
        // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
        Some(32) | Some(33) if cfg!(windows) => true,
        // EBUSY
        Some(16) if cfg!(unix) => true,
        _ => false,
    }
}

/// Recursively copy `src` into `dst`, creating `dst` if absent.
/// Existing destination files are overwritten.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<TreeReport> {
    copy_tree_except(src, dst, &[])
}

/// Like [`copy_tree`], but skips top-level entries of `src` whose file
/// name matches one of `exceptions` (exact name match).
pub fn copy_tree_except(src: &Path, dst: &Path, exceptions: &[&str]) -> io::Result<TreeReport> {
    let mut report = TreeReport::default();
    if !src.exists() {
        return Ok(report);
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exceptions.iter().any(|e| name == *e) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let result = if entry.file_type()?.is_dir() {
            match copy_tree_except(&src_path, &dst_path, &[]) {
                Ok(sub) => {
                    report.absorb(sub);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            fs::copy(&src_path, &dst_path).map(|_| report.processed += 1)
        };
        if let Err(e) = result {
            if is_lock_contention(&e) {
                warn!("skipping locked file during copy: {}", src_path.display());
                report.skipped.push(src_path);
            } else {
                return Err(e);
            }
        }
    }
    Ok(report)
}

/// Recursively copy `src` into `dst`, but never overwrite: a destination
/// file that already exists keeps its content. Directories are always
/// descended so the result is the union of both subtrees.
pub fn merge_tree(src: &Path, dst: &Path) -> io::Result<TreeReport> {
    let mut report = TreeReport::default();
    if !src.exists() {
        return Ok(report);
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let result = if entry.file_type()?.is_dir() {
            match merge_tree(&src_path, &dst_path) {
                Ok(sub) => {
                    report.absorb(sub);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else if dst_path.exists() {
            Ok(())
        } else {
            fs::copy(&src_path, &dst_path).map(|_| report.processed += 1)
        };
        if let Err(e) = result {
            if is_lock_contention(&e) {
                warn!("skipping locked file during merge: {}", src_path.display());
                report.skipped.push(src_path);
            } else {
                return Err(e);
            }
        }
    }
    Ok(report)
}

/// Delete every immediate child of `dir` except names listed in
/// `exceptions` (exact name match, not path match). Children that cannot
/// be removed because another process holds them are skipped.
pub fn clear_tree(dir: &Path, exceptions: &[&str]) -> io::Result<TreeReport> {
    let mut report = TreeReport::default();
    if !dir.exists() {
        return Ok(report);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if exceptions.iter().any(|e| name == *e) {
            continue;
        }
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => report.processed += 1,
            Err(e) if is_lock_contention(&e) => {
                warn!("skipping locked entry during clear: {}", path.display());
                report.skipped.push(path);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

//! Per-session workspace file operations.
//!
//! Every function takes the workspace root handed to it by the session
//! manager and resolves caller paths strictly inside it; the store keeps no
//! session state of its own.

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory inside a workspace reserved for engine bookkeeping (server
/// logs); hidden from listings and excluded from the user file count.
pub const INTERNAL_DIR: &str = ".enclave";

/// Resolve a caller-supplied relative path against the workspace root.
/// Absolute paths and any traversal outside the root (`..`) are rejected.
pub fn resolve(root: &Path, rel: &str) -> Result<PathBuf> {
    let rel_path = Path::new(rel);
    let mut resolved = root.to_path_buf();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathEscapesWorkspace(rel.to_string()));
            }
        }
    }
    if resolved == root {
        return Err(Error::PathEscapesWorkspace(rel.to_string()));
    }
    Ok(resolved)
}

/// Write a file into the workspace, creating intermediate directories as
/// needed. `disk_limit_bytes` is the session's quota; a write that would push
/// usage past it fails with `CapacityExceeded`.
pub fn write_file(root: &Path, rel: &str, content: &[u8], disk_limit_bytes: u64) -> Result<()> {
    let path = resolve(root, rel)?;

    let used = disk_usage(root);
    if used + content.len() as u64 > disk_limit_bytes {
        return Err(Error::CapacityExceeded(format!(
            "disk quota exceeded: {} + {} bytes over the {} byte limit",
            used,
            content.len(),
            disk_limit_bytes
        )));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
    }
    fs::write(&path, content).map_err(|e| Error::filesystem(&path, e))?;
    Ok(())
}

pub fn read_file(root: &Path, rel: &str) -> Result<Vec<u8>> {
    let path = resolve(root, rel)?;
    fs::read(&path).map_err(|e| Error::filesystem(&path, e))
}

/// Lazy depth-first enumeration of the workspace's files as relative paths.
/// Engine bookkeeping under [`INTERNAL_DIR`] is skipped.
pub fn list_files(root: &Path) -> impl Iterator<Item = String> + '_ {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == INTERNAL_DIR))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
}

/// Total bytes on disk under the workspace root, bookkeeping included.
pub fn disk_usage(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Number of user-visible files in the workspace.
pub fn file_count(root: &Path) -> u64 {
    list_files(root).count() as u64
}

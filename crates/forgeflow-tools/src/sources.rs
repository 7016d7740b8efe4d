//! Layered source file discovery
//!
//! Generator configurations are assembled from source files found in, in
//! order: the tool's default asset directory, the user configuration
//! directory, the current working directory, and an extra directory given
//! per host. When several directories provide the same file name, the last
//! one wins, so users override defaults by dropping a file with the same
//! name in a later directory.

use forgeflow_config::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source directories for a tool, later entries override earlier ones
pub fn source_dirs(ctx: &Context, tool: &str, user_config: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = vec![ctx.assets_dir(tool), ctx.config_dir().to_path_buf()];
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(extra) = user_config {
        dirs.push(extra.to_path_buf());
    }
    dirs.retain(|dir| dir.is_dir());
    dirs
}

/// Name tags used to filter source files for the current configuration
///
/// A file participates when the part of its name before the first dot is
/// one of `common`, the provider (first comma-separated segment), or the
/// application type.
pub fn source_filters(provider: Option<&str>, application_type: Option<&str>) -> Vec<String> {
    let mut names = vec!["common".to_string()];
    if let Some(provider) = provider {
        let first = provider.split(',').next().unwrap_or_default();
        if !first.is_empty() {
            names.push(first.to_string());
        }
    }
    if let Some(kind) = application_type
        && !kind.is_empty()
    {
        names.push(kind.to_string());
    }
    names
}

/// List source files matching the filters and extension rules
///
/// Returns file name (lowercased) to path, with later directories
/// overriding earlier ones.
pub fn list_sources(
    dirs: &[PathBuf],
    names: &[String],
    include_exts: &[&str],
    exclude_exts: &[&str],
) -> BTreeMap<String, PathBuf> {
    let mut sources = BTreeMap::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            let tag = name.split('.').next().unwrap_or_default();
            if !names.iter().any(|filter| filter == tag) {
                continue;
            }
            if !include_exts.iter().any(|ext| name.ends_with(ext)) {
                continue;
            }
            if exclude_exts.iter().any(|ext| name.ends_with(ext)) {
                continue;
            }
            sources.insert(name, entry.path());
        }
    }
    sources
}

/// Symlink a source into the configuration directory, replacing any
/// previous link; falls back to a copy for regular files when the link
/// cannot be created.
pub fn link_source(src: &Path, dst: &Path) -> std::io::Result<()> {
    let src = src.canonicalize()?;
    if dst.symlink_metadata().is_ok() {
        std::fs::remove_file(dst)?;
    }
    #[cfg(unix)]
    {
        match std::os::unix::fs::symlink(&src, dst) {
            Ok(()) => Ok(()),
            Err(_) if src.is_file() => std::fs::copy(&src, dst).map(|_| ()),
            Err(error) => Err(error),
        }
    }
    #[cfg(not(unix))]
    {
        std::fs::copy(&src, dst).map(|_| ())
    }
}

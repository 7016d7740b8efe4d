//! Short-lived disk cache
//!
//! Used in CLI mode to keep auth tokens (and other small responses)
//! across process invocations. Entries are files named
//! `<sha256(name)>_<expiry-epoch>.json`; readers prune expired entries
//! opportunistically on every read.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Process-wide disk cache rooted in the context cache directory
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn hashed(name: &str) -> String {
        hex::encode(Sha256::digest(name.as_bytes()))
    }

    /// Read a cached value, pruning expired entries on the way
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        let prefix = format!("{}_", Self::hashed(name));
        let now = Utc::now().timestamp();
        let entries = std::fs::read_dir(&self.dir).ok()?;

        let mut found = None;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(expiry) = parse_expiry(&file_name) else {
                continue;
            };
            if expiry <= now {
                // 期限切れエントリはここで掃除する
                let _ = std::fs::remove_file(entry.path());
                continue;
            }
            if file_name.starts_with(&prefix) {
                found = Some(entry.path());
            }
        }

        let content = std::fs::read_to_string(found?).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Store a value until `expires_at` (epoch seconds), replacing any
    /// previous entry for the same name
    pub fn set(&self, name: &str, value: &serde_json::Value, expires_at: i64) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.remove(name);
        let path = self
            .dir
            .join(format!("{}_{}.json", Self::hashed(name), expires_at));
        std::fs::write(path, serde_json::to_string(value)?)?;
        Ok(())
    }

    /// Drop all entries for a name
    pub fn remove(&self, name: &str) {
        let prefix = format!("{}_", Self::hashed(name));
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(&prefix)
            {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Extract the numeric expiry suffix from `<hash>_<expiry>.json`
fn parse_expiry(file_name: &str) -> Option<i64> {
    file_name
        .strip_suffix(".json")?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

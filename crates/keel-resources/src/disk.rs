//! Best-effort disk persistence for fetched framework metadata.
//!
//! Reads treat every failure (missing file, non-file path, parse error) as a
//! cache miss; writes are atomic tempfile-renames whose failures are logged
//! and otherwise ignored. Nothing in this module returns an error to its
//! caller.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use keel_core::FrameworkKind;
use serde_json::Value;

pub const CACHE_DIR_NAME: &str = "ui5-resources-cache";

/// Library manifest file, one per cached release.
pub const VERSION_INFO_FILE: &str = "sap-ui-version.json";

/// `<cacheRoot>/ui5-resources-cache/<framework>/<version>/`
pub fn cache_dir(cache_root: &Path, framework: FrameworkKind, version: &str) -> PathBuf {
    cache_root
        .join(CACHE_DIR_NAME)
        .join(framework.as_str())
        .join(version)
}

/// Read a cached JSON document, treating any failure as a miss.
pub(crate) fn read_json(path: &Path) -> Option<Value> {
    // Avoid following symlinks out of the cache directory.
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "keel.resources",
                    path = %path.display(),
                    error = %err,
                    "failed to stat cache file"
                );
            }
            return None;
        }
    };
    if meta.file_type().is_symlink() || !meta.is_file() {
        return None;
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(
                target = "keel.resources",
                path = %path.display(),
                error = %err,
                "failed to read cache file"
            );
            return None;
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(
                target = "keel.resources",
                path = %path.display(),
                error = %err,
                "cache file is not valid JSON; treating as a miss"
            );
            None
        }
    }
}

/// Write a JSON document to the cache, logging failures instead of raising.
///
/// Content is immutable per (framework, version, library) key, so concurrent
/// writers racing on the rename are tolerated: last write wins.
pub(crate) fn write_json(path: &Path, value: &Value) {
    if let Err(err) = try_write_json(path, value) {
        tracing::debug!(
            target = "keel.resources",
            path = %path.display(),
            error = %err,
            "failed to write cache file (best effort)"
        );
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn try_write_json(path: &Path, value: &Value) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("cache path has no parent"))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("cache path has no file name"))?;
    let pid = std::process::id();

    let (tmp_path, mut file) = loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => break (tmp_path, file),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    };

    let bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    let write_result = file.write_all(&bytes).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

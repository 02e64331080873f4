use std::path::{Path, PathBuf};

/// Canonicalize a project/application root for use as a cache key.
///
/// Cache maps are keyed by absolute canonical paths so that `foo/../foo` and
/// `foo` share one entry. If canonicalization fails (root vanished between
/// the notification and the lookup), fall back to the path as given rather
/// than failing the lookup.
pub fn canonical_root(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match std::fs::canonicalize(path) {
        Ok(canonical) => canonical,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "keel.core",
                    path = %path.display(),
                    error = %err,
                    "failed to canonicalize root; using path as given"
                );
            }
            path.to_path_buf()
        }
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_core::{Fetcher, FrameworkKind};
use serde::Deserialize;
use serde_json::Value;

use crate::disk::{self, VERSION_INFO_FILE};
use crate::flight::SingleFlight;
use crate::urls;

/// The assembled semantic-model input: one JSON document per library.
pub type LibrarySet = HashMap<String, Value>;

/// The `sap-ui-version.json` document enumerating a release's libraries.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct VersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub libraries: Vec<LibraryRef>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryRef {
    pub name: String,
}

/// Cache of per-release library metadata sets.
///
/// Disk-cache-first with a network fallback, and a single-flight memo per
/// `framework:version` so concurrent identical builds share one workload.
/// No method here ever fails: unreachable resources shrink the result set.
pub struct ResourceStore {
    fetcher: Arc<dyn Fetcher>,
    flight: SingleFlight<Arc<LibrarySet>>,
}

impl ResourceStore {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            flight: SingleFlight::new(),
        }
    }

    /// Drop all memoized assemblies. Intended for tests and full teardown.
    pub fn reset(&self) {
        self.flight.clear();
    }

    /// Assemble (or return the memoized) library set for a release.
    pub async fn library_set(
        &self,
        framework: FrameworkKind,
        version: &str,
        cache_root: Option<&Path>,
    ) -> Arc<LibrarySet> {
        let key = flight_key(framework, version);
        let fetcher = Arc::clone(&self.fetcher);
        let version = version.to_string();
        let cache_root = cache_root.map(Path::to_path_buf);
        // The placeholder future is inserted before the first await, so a
        // second caller arriving mid-assembly attaches to the same handle.
        let handle = self.flight.get_or_spawn(&key, move || {
            assemble(fetcher, framework, version, cache_root)
        });
        handle.await
    }

    /// Bypass the single-flight memo and rebuild. Used by invalidation and
    /// tests; concurrent callers arriving after the refresh share the new
    /// assembly.
    pub async fn refresh_library_set(
        &self,
        framework: FrameworkKind,
        version: &str,
        cache_root: Option<&Path>,
    ) -> Arc<LibrarySet> {
        self.flight.remove(&flight_key(framework, version));
        self.library_set(framework, version, cache_root).await
    }

    /// The release's library manifest, disk-first. `None` means the release
    /// has no obtainable metadata (which callers treat as "empty", never as
    /// an error).
    pub async fn version_info(
        &self,
        framework: FrameworkKind,
        version: &str,
        cache_root: Option<&Path>,
    ) -> Option<VersionInfo> {
        load_version_info(self.fetcher.as_ref(), framework, version, cache_root).await
    }

    /// Probe whether version-specific metadata exists (cache or remote).
    pub async fn version_exists(
        &self,
        framework: FrameworkKind,
        version: &str,
        cache_root: Option<&Path>,
    ) -> bool {
        self.version_info(framework, version, cache_root)
            .await
            .is_some()
    }
}

fn flight_key(framework: FrameworkKind, version: &str) -> String {
    format!("{framework}:{version}")
}

async fn assemble(
    fetcher: Arc<dyn Fetcher>,
    framework: FrameworkKind,
    version: String,
    cache_root: Option<PathBuf>,
) -> Arc<LibrarySet> {
    let info =
        load_version_info(fetcher.as_ref(), framework, &version, cache_root.as_deref()).await;
    let Some(info) = info else {
        // No library manifest means an empty semantic model, not a failure.
        return Arc::new(LibrarySet::new());
    };

    let dir = cache_root
        .as_deref()
        .map(|root| disk::cache_dir(root, framework, &version));

    let lookups = info.libraries.iter().map(|library| {
        resolve_library(
            fetcher.as_ref(),
            framework,
            &version,
            &library.name,
            dir.as_deref(),
        )
    });

    let mut set = LibrarySet::new();
    for (name, document) in futures::future::join_all(lookups).await.into_iter().flatten() {
        set.insert(name, document);
    }
    Arc::new(set)
}

/// Resolve one library to "included" (`Some`) or "omitted" (`None`).
async fn resolve_library(
    fetcher: &dyn Fetcher,
    framework: FrameworkKind,
    version: &str,
    name: &str,
    dir: Option<&Path>,
) -> Option<(String, Value)> {
    let path = dir.map(|dir| dir.join(format!("{name}.json")));

    if let Some(path) = &path {
        if let Some(document) = disk::read_json(path) {
            if is_absent_placeholder(&document) {
                // A previous fetch confirmed this library absent from the
                // release; don't ask the network again.
                return None;
            }
            return Some((name.to_string(), document));
        }
    }

    let url = urls::library(framework, version, name);
    match fetcher.fetch(&url).await {
        Ok(response) if response.ok() => match response.json(&url) {
            Ok(document) => {
                if let Some(path) = &path {
                    disk::write_json(path, &document);
                }
                Some((name.to_string(), document))
            }
            Err(err) => {
                tracing::error!(
                    target = "keel.resources",
                    library = name,
                    error = %err,
                    "library document is not JSON; omitting"
                );
                None
            }
        },
        Ok(response) if response.status() == 404 => {
            if let Some(path) = &path {
                disk::write_json(path, &Value::Object(Default::default()));
            }
            tracing::debug!(
                target = "keel.resources",
                library = name,
                version,
                "library absent from this release"
            );
            None
        }
        Ok(response) => {
            tracing::error!(
                target = "keel.resources",
                library = name,
                status = response.status(),
                "unexpected status fetching library; omitting"
            );
            None
        }
        Err(err) => {
            tracing::error!(
                target = "keel.resources",
                library = name,
                error = %err,
                "failed to fetch library; omitting"
            );
            None
        }
    }
}

fn is_absent_placeholder(document: &Value) -> bool {
    matches!(document, Value::Object(map) if map.is_empty())
}

async fn load_version_info(
    fetcher: &dyn Fetcher,
    framework: FrameworkKind,
    version: &str,
    cache_root: Option<&Path>,
) -> Option<VersionInfo> {
    let path =
        cache_root.map(|root| disk::cache_dir(root, framework, version).join(VERSION_INFO_FILE));

    if let Some(path) = &path {
        if let Some(document) = disk::read_json(path) {
            match serde_json::from_value::<VersionInfo>(document) {
                Ok(info) => return Some(info),
                Err(err) => {
                    tracing::debug!(
                        target = "keel.resources",
                        path = %path.display(),
                        error = %err,
                        "cached version info is malformed; refetching"
                    );
                }
            }
        }
    }

    let url = urls::version_info(framework, version);
    match fetcher.fetch(&url).await {
        Ok(response) if response.ok() => {
            let document = match response.json(&url) {
                Ok(document) => document,
                Err(err) => {
                    tracing::error!(
                        target = "keel.resources",
                        version,
                        error = %err,
                        "version info is not JSON"
                    );
                    return None;
                }
            };
            let info = match serde_json::from_value::<VersionInfo>(document.clone()) {
                Ok(info) => info,
                Err(err) => {
                    tracing::error!(
                        target = "keel.resources",
                        version,
                        error = %err,
                        "version info has unexpected shape"
                    );
                    return None;
                }
            };
            if let Some(path) = &path {
                disk::write_json(path, &document);
            }
            Some(info)
        }
        Ok(response) => {
            tracing::debug!(
                target = "keel.resources",
                version,
                status = response.status(),
                "no version info for this release"
            );
            None
        }
        Err(err) => {
            tracing::error!(
                target = "keel.resources",
                version,
                error = %err,
                "failed to fetch version info"
            );
            None
        }
    }
}

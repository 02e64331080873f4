use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use keel_core::{Fetcher, FrameworkKind, DEFAULT_UI5_VERSION};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::store::ResourceStore;
use crate::urls;

/// One entry of the published version map.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VersionMapEntry {
    pub version: String,
    #[serde(default)]
    pub support: String,
    #[serde(default)]
    pub lts: bool,
}

/// The remotely published `version.json`: `"major.minor"` keys plus the
/// distinguished `"latest"` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMap {
    entries: HashMap<String, VersionMapEntry>,
}

impl VersionMap {
    /// Tolerant decode: entries that don't look like version records are
    /// skipped rather than failing the whole map.
    pub fn from_value(value: Value) -> Self {
        let mut entries = HashMap::new();
        if let Value::Object(object) = value {
            for (key, entry) in object {
                match serde_json::from_value::<VersionMapEntry>(entry) {
                    Ok(entry) => {
                        entries.insert(key, entry);
                    }
                    Err(err) => {
                        tracing::debug!(
                            target = "keel.resources",
                            key = %key,
                            error = %err,
                            "skipping malformed version map entry"
                        );
                    }
                }
            }
        }
        Self { entries }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, VersionMapEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Terminal fallback for total network unavailability: a single
    /// `"latest"` entry pointing at the hardcoded default.
    pub fn fallback() -> Self {
        Self::from_entries([(
            "latest".to_string(),
            VersionMapEntry {
                version: DEFAULT_UI5_VERSION.to_string(),
                support: String::new(),
                lts: false,
            },
        )])
    }

    pub fn get(&self, key: &str) -> Option<&VersionMapEntry> {
        self.entries.get(key)
    }

    pub fn latest(&self) -> Option<&VersionMapEntry> {
        self.entries.get("latest")
    }

    fn semver_versions(&self) -> impl Iterator<Item = semver::Version> + '_ {
        self.entries
            .values()
            .filter_map(|entry| semver::Version::parse(&entry.version).ok())
    }
}

/// Maps a loosely-specified version string (or its absence) onto a concrete
/// release version.
///
/// Resolutions are memoized per requested string for the lifetime of the
/// negotiator; the version map is fetched at most once per framework unless
/// explicitly refreshed. `resolve` never fails: the worst case is the
/// hardcoded default version.
pub struct VersionNegotiator {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<ResourceStore>,
    memo: Mutex<HashMap<(FrameworkKind, String), String>>,
    maps: Mutex<HashMap<FrameworkKind, Arc<VersionMap>>>,
}

impl VersionNegotiator {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<ResourceStore>) -> Self {
        Self {
            fetcher,
            store,
            memo: Mutex::new(HashMap::new()),
            maps: Mutex::new(HashMap::new()),
        }
    }

    /// Drop the memo table and any fetched version maps.
    pub fn reset(&self) {
        self.memo.lock().clear();
        self.maps.lock().clear();
    }

    pub async fn resolve(
        &self,
        framework: FrameworkKind,
        requested: Option<&str>,
        cache_root: Option<&Path>,
    ) -> String {
        let Some(requested) = requested.map(str::trim).filter(|text| !text.is_empty()) else {
            // Missing project configuration; always re-evaluated, never memoized.
            tracing::warn!(
                target = "keel.resources",
                framework = %framework,
                default = DEFAULT_UI5_VERSION,
                "no framework version declared; using default"
            );
            return DEFAULT_UI5_VERSION.to_string();
        };

        if let Some(resolved) = self
            .memo
            .lock()
            .get(&(framework, requested.to_string()))
            .cloned()
        {
            return resolved;
        }

        // The literal requested string may itself be a published release.
        if self
            .store
            .version_exists(framework, requested, cache_root)
            .await
        {
            self.memoize(framework, requested, requested);
            return requested.to_string();
        }

        let map = self.version_map(framework, false).await;
        let resolved = match coerce(requested) {
            None => {
                // Placeholder tokens and invalid strings resolve to "latest".
                latest_or_default(&map)
            }
            Some(coerced) => {
                let mut adopted = None;
                let major_minor = format!("{}.{}", coerced.major, coerced.minor);
                if let Some(entry) = map.get(&major_minor) {
                    if self
                        .store
                        .version_exists(framework, &entry.version, cache_root)
                        .await
                    {
                        adopted = Some(entry.version.clone());
                    }
                }
                match adopted {
                    Some(version) => version,
                    None => closest_caret_match(&map, &coerced)
                        .unwrap_or_else(|| latest_or_default(&map)),
                }
            }
        };

        self.memoize(framework, requested, &resolved);
        resolved
    }

    /// The cached version map, fetching on first use. Only successful
    /// fetches are cached; an unreachable map synthesizes the fallback each
    /// time so a later call can retry the network.
    pub async fn version_map(
        &self,
        framework: FrameworkKind,
        force_refresh: bool,
    ) -> Arc<VersionMap> {
        if !force_refresh {
            if let Some(map) = self.maps.lock().get(&framework).cloned() {
                return map;
            }
        }

        let url = urls::version_map(framework);
        let fetched = match self.fetcher.fetch(&url).await {
            Ok(response) if response.ok() => response.json(&url).ok(),
            Ok(response) => {
                tracing::error!(
                    target = "keel.resources",
                    framework = %framework,
                    status = response.status(),
                    "unexpected status fetching version map"
                );
                None
            }
            Err(err) => {
                tracing::error!(
                    target = "keel.resources",
                    framework = %framework,
                    error = %err,
                    "failed to fetch version map; falling back to default"
                );
                None
            }
        };

        match fetched {
            Some(document) => {
                let map = Arc::new(VersionMap::from_value(document));
                self.maps.lock().insert(framework, Arc::clone(&map));
                map
            }
            None => Arc::new(VersionMap::fallback()),
        }
    }

    fn memoize(&self, framework: FrameworkKind, requested: &str, resolved: &str) {
        self.memo
            .lock()
            .insert((framework, requested.to_string()), resolved.to_string());
    }
}

fn latest_or_default(map: &VersionMap) -> String {
    map.latest()
        .map(|entry| entry.version.clone())
        .unwrap_or_else(|| DEFAULT_UI5_VERSION.to_string())
}

/// Coerce a requested string into `major.minor.patch` shape.
fn coerce(text: &str) -> Option<semver::Version> {
    let text = text.trim();
    if let Ok(version) = semver::Version::parse(text) {
        return Some(version);
    }
    // "1.96" is a valid request meaning "some 1.96 patch release".
    let numeric_segments = text.split('.').count();
    if numeric_segments == 2 {
        if let Ok(version) = semver::Version::parse(&format!("{text}.0")) {
            return Some(version);
        }
    }
    None
}

/// The numerically closest version in the map satisfying `^requested`.
fn closest_caret_match(map: &VersionMap, requested: &semver::Version) -> Option<String> {
    let requirement = semver::VersionReq::parse(&format!("^{requested}")).ok()?;
    map.semver_versions()
        .filter(|candidate| requirement.matches(candidate))
        .min()
        .map(|version| version.to_string())
}

//! File-change-driven cache invalidation.
//!
//! A handful of file kinds affect cached state; each handler is best-effort: a
//! failure refreshing one entry never blocks its siblings and, except for
//! manifests, never replaces previously good state with bad.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_core::canonical_root;

use crate::app::{load_app, AppLoadInputs};
use crate::cds::compile_cap_services;
use crate::classify::{
    parse_framework_config, FRAMEWORK_CONFIG_FILE, MANIFEST_FILE, PACKAGE_JSON_FILE,
};
use crate::model::Project;
use crate::resolve::ContextCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Created,
    Changed,
    Deleted,
}

/// The file kinds the caches care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedFileKind {
    Manifest,
    FrameworkConfig,
    XmlView,
    Cds,
    PackageJson,
}

impl WatchedFileKind {
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        match name {
            MANIFEST_FILE => Some(WatchedFileKind::Manifest),
            FRAMEWORK_CONFIG_FILE => Some(WatchedFileKind::FrameworkConfig),
            PACKAGE_JSON_FILE => Some(WatchedFileKind::PackageJson),
            _ => match Path::new(name).extension()?.to_str()? {
                "xml" => Some(WatchedFileKind::XmlView),
                "cds" => Some(WatchedFileKind::Cds),
                _ => None,
            },
        }
    }
}

/// Whether a failed app reload keeps or drops the previous cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadPolicy {
    /// Manifest changes: an invalid manifest must surface as "no app",
    /// never as stale data.
    ReplaceOnFailure,
    /// Everything else: keep the old value rather than corrupting good
    /// state with an empty or partial reload.
    KeepOnFailure,
}

impl ContextCache {
    /// React to a single file-change notification.
    pub async fn notify_file_change(&self, path: &Path, change: ChangeType) {
        let Some(kind) = WatchedFileKind::classify(path) else {
            return;
        };
        match kind {
            WatchedFileKind::Manifest => self.on_manifest_change(path, change).await,
            WatchedFileKind::FrameworkConfig => self.on_framework_config_change(path, change),
            WatchedFileKind::XmlView => {
                // No cache entry is keyed by view content; downstream
                // re-validation reacts to this event, not the caches.
            }
            WatchedFileKind::Cds => {
                self.notify_cds_batch(std::slice::from_ref(&path.to_path_buf()))
                    .await;
            }
            WatchedFileKind::PackageJson => self.on_package_json_change(path),
        }
    }

    /// React to a burst of `.cds` changes: recompile services for every
    /// affected cached project, then reload that project's cached apps so
    /// their local services reflect the new compiled metadata.
    pub async fn notify_cds_batch(&self, changed: &[PathBuf]) {
        let mut roots: Vec<PathBuf> = {
            let projects = self.projects.lock();
            changed
                .iter()
                .filter_map(|path| owning_cached_root(&projects, path))
                .filter(|root| matches!(projects.get(root), Some(Project::Cap(_))))
                .collect()
        };
        roots.sort();
        roots.dedup();

        for root in roots {
            self.recompile_cap_project(&root).await;
        }
    }

    async fn recompile_cap_project(&self, root: &Path) {
        let Some(services) = compile_cap_services(self.cds().as_ref(), root).await else {
            // Compilation failed; the previous services map stays in place.
            return;
        };

        let app_roots: Vec<PathBuf> = {
            let mut projects = self.projects.lock();
            match projects.get_mut(root) {
                Some(Project::Cap(cap)) => {
                    // Wholesale replacement, no partial merge.
                    cap.services = services;
                    cap.apps.keys().cloned().collect()
                }
                // Evicted or reclassified while compiling; nothing to update.
                Some(Project::Ui5(_)) | None => return,
            }
        };

        for app_root in app_roots {
            self.reload_app(root, &app_root, ReloadPolicy::KeepOnFailure)
                .await;
        }
    }

    async fn on_manifest_change(&self, path: &Path, change: ChangeType) {
        let Some(app_root) = path.parent().map(canonical_root) else {
            return;
        };
        let project_root = {
            let projects = self.projects.lock();
            owning_cached_root(&projects, &app_root)
        };
        let Some(project_root) = project_root else {
            return;
        };

        match change {
            ChangeType::Deleted => {
                let mut projects = self.projects.lock();
                if let Some(project) = projects.get_mut(&project_root) {
                    remove_app(project, &app_root);
                }
            }
            ChangeType::Created | ChangeType::Changed => {
                let cached = {
                    let projects = self.projects.lock();
                    projects
                        .get(&project_root)
                        .is_some_and(|project| project.app(&app_root).is_some())
                };
                if cached {
                    self.reload_app(&project_root, &app_root, ReloadPolicy::ReplaceOnFailure)
                        .await;
                }
            }
        }
    }

    fn on_framework_config_change(&self, path: &Path, change: ChangeType) {
        let Some(root) = path.parent().map(canonical_root) else {
            return;
        };
        let mut projects = self.projects.lock();
        let Some(project) = projects.get_mut(&root) else {
            return;
        };
        match project {
            Project::Ui5(ui5) => match change {
                ChangeType::Deleted => ui5.framework_config = None,
                ChangeType::Created | ChangeType::Changed => {
                    match parse_framework_config(&root) {
                        Ok(config) => ui5.framework_config = config,
                        Err(err) => {
                            // Invalid config: keep the previous good value.
                            tracing::warn!(
                                target = "keel.context",
                                root = %root.display(),
                                error = %err,
                                "framework config update is unparsable; keeping previous"
                            );
                        }
                    }
                }
            },
            // Framework config is only cached on plain UI5 projects.
            Project::Cap(_) => {}
        }
    }

    /// A package.json change can alter which project-type markers apply, so
    /// the whole entry is evicted: the next access re-classifies from
    /// scratch.
    fn on_package_json_change(&self, path: &Path) {
        let Some(dir) = path.parent().map(canonical_root) else {
            return;
        };
        // A classification for this root may be mid-flight with nothing in
        // the map yet; invalidate unconditionally so its result is not
        // written back after the change.
        self.bump_eviction_epoch();
        self.remove_project_flight(&dir);

        let root = {
            let mut projects = self.projects.lock();
            let root = owning_cached_root(&projects, &dir);
            if let Some(root) = &root {
                projects.remove(root);
            }
            root
        };
        if let Some(root) = root {
            // Also drop an in-flight classification so the next access
            // probes the filesystem again.
            self.remove_project_flight(&root);
            tracing::debug!(
                target = "keel.context",
                root = %root.display(),
                "evicted project after package.json change"
            );
        }
    }

    async fn reload_app(&self, project_root: &Path, app_root: &Path, policy: ReloadPolicy) {
        let cap_services = {
            let projects = self.projects.lock();
            match projects.get(project_root) {
                Some(Project::Cap(cap)) => cap.services.clone(),
                Some(Project::Ui5(_)) => HashMap::new(),
                None => return,
            }
        };

        let loaded = load_app(AppLoadInputs {
            app_root: app_root.to_path_buf(),
            project_root: project_root.to_path_buf(),
            cap_services,
            converter: Arc::clone(self.converter()),
        })
        .await;

        // Re-fetch the map: the project may have been evicted mid-load.
        let mut projects = self.projects.lock();
        let Some(project) = projects.get_mut(project_root) else {
            return;
        };
        match (loaded, policy) {
            (Some(app), _) => match project {
                Project::Ui5(ui5) => ui5.app = Some(app),
                Project::Cap(cap) => {
                    cap.apps.insert(app_root.to_path_buf(), app);
                }
            },
            (None, ReloadPolicy::ReplaceOnFailure) => remove_app(project, app_root),
            (None, ReloadPolicy::KeepOnFailure) => {}
        }
    }
}

fn remove_app(project: &mut Project, app_root: &Path) {
    match project {
        Project::Ui5(ui5) => {
            if ui5
                .app
                .as_ref()
                .is_some_and(|app| app.app_root.as_path() == app_root)
            {
                ui5.app = None;
            }
        }
        Project::Cap(cap) => {
            cap.apps.remove(app_root);
        }
    }
}

/// Longest cached project root that is a prefix of `path`.
fn owning_cached_root(
    projects: &HashMap<PathBuf, Project>,
    path: &Path,
) -> Option<PathBuf> {
    projects
        .keys()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
        .cloned()
}

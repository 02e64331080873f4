use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keel_core::{canonical_root, Fetcher, FrameworkKind};
use keel_metadata::EdmxConverter;
use keel_resources::{LibrarySet, ResourceStore, SingleFlight, VersionNegotiator};
use parking_lot::Mutex;

use crate::app::{load_app, AppLoadInputs};
use crate::cds::CdsCompiler;
use crate::classify::{classify_project, MANIFEST_FILE, PACKAGE_JSON_FILE};
use crate::model::{CachedApp, ManifestDetails, Project, ServiceDetails};

/// The aggregate read result handed to completion/hover/diagnostics.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub services: HashMap<String, ServiceDetails>,
    pub manifest_details: Option<ManifestDetails>,
    pub semantic_model: Arc<LibrarySet>,
}

/// The resolution core: project map, app cache, version negotiation, and
/// the framework resource store, behind one entry point.
///
/// All state is owned here (nothing module-global); `reset` restores the
/// just-constructed state for tests and teardown.
pub struct ContextCache {
    store: Arc<ResourceStore>,
    negotiator: Arc<VersionNegotiator>,
    converter: Arc<dyn EdmxConverter>,
    cds: Arc<dyn CdsCompiler>,
    cache_root: Option<PathBuf>,
    pub(crate) projects: Mutex<HashMap<PathBuf, Project>>,
    project_flight: SingleFlight<Project>,
    app_flight: SingleFlight<Option<Arc<CachedApp>>>,
    /// Bumped by evictions; a classification that was in flight across a
    /// bump must not write its result back (see [`Self::project_for`]).
    eviction_epoch: AtomicU64,
}

impl ContextCache {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        converter: Arc<dyn EdmxConverter>,
        cds: Arc<dyn CdsCompiler>,
        cache_root: Option<PathBuf>,
    ) -> Self {
        let store = Arc::new(ResourceStore::new(Arc::clone(&fetcher)));
        let negotiator = Arc::new(VersionNegotiator::new(fetcher, Arc::clone(&store)));
        Self {
            store,
            negotiator,
            converter,
            cds,
            cache_root,
            projects: Mutex::new(HashMap::new()),
            project_flight: SingleFlight::new(),
            app_flight: SingleFlight::new(),
            eviction_epoch: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn negotiator(&self) -> &Arc<VersionNegotiator> {
        &self.negotiator
    }

    pub(crate) fn cds(&self) -> &Arc<dyn CdsCompiler> {
        &self.cds
    }

    pub(crate) fn converter(&self) -> &Arc<dyn EdmxConverter> {
        &self.converter
    }

    /// Drop every cached project, app, resolution, and assembly.
    pub fn reset(&self) {
        self.bump_eviction_epoch();
        self.projects.lock().clear();
        self.project_flight.clear();
        self.app_flight.clear();
        self.store.reset();
        self.negotiator.reset();
    }

    /// Snapshot of a cached project, if the root has been classified.
    pub fn project(&self, root: &Path) -> Option<Project> {
        self.projects.lock().get(&canonical_root(root)).cloned()
    }

    /// Resolve everything a semantic query about `document_path` needs.
    ///
    /// Never fails: an unresolvable project or app yields a context with
    /// empty services and no manifest details, and the semantic model falls
    /// back to the default framework release.
    pub async fn resolve_context(&self, document_path: &Path) -> ResolvedContext {
        let app_root = find_app_root(document_path);
        let project_root = find_project_root(document_path, app_root.as_deref());

        let mut project = None;
        if let Some(root) = &project_root {
            project = Some(self.project_for(root).await);
        }

        let mut app = None;
        if let (Some(project_root), Some(app_root)) = (&project_root, &app_root) {
            app = self.app_for(project_root, app_root).await;
        }

        let (framework, requested) = negotiation_inputs(project.as_ref(), app.as_deref());
        let version = self
            .negotiator
            .resolve(framework, requested.as_deref(), self.cache_root.as_deref())
            .await;
        let semantic_model = self
            .store
            .library_set(framework, &version, self.cache_root.as_deref())
            .await;

        ResolvedContext {
            services: app
                .as_deref()
                .map(|app| app.local_services.clone())
                .unwrap_or_default(),
            manifest_details: app.as_deref().map(|app| app.manifest_details.clone()),
            semantic_model,
        }
    }

    /// Return the cached project for `root`, classifying it on first use.
    /// Concurrent classifications of the same root share one probe.
    pub(crate) async fn project_for(&self, root: &Path) -> Project {
        let epoch = self.eviction_epoch.load(Ordering::Acquire);
        if let Some(project) = self.projects.lock().get(root) {
            return project.clone();
        }

        let key = project_flight_key(root);
        let cds = Arc::clone(&self.cds);
        let owned_root = root.to_path_buf();
        let handle = self
            .project_flight
            .get_or_spawn(&key, move || classify_project(owned_root, cds));
        let classified = handle.await;
        self.project_flight.remove(&key);

        // Re-lock at write time: if an invalidation (or a sibling caller)
        // already produced an entry, that entry wins.
        let mut projects = self.projects.lock();
        if self.eviction_epoch.load(Ordering::Acquire) != epoch {
            // An eviction landed while this classification was in flight;
            // writing the result back would silently undo it. Serve the
            // value to this caller only and let the next access
            // re-classify from scratch.
            return projects.get(root).cloned().unwrap_or(classified);
        }
        projects
            .entry(root.to_path_buf())
            .or_insert(classified)
            .clone()
    }

    /// Return the cached app under `project_root`, loading it on first use.
    /// Negative results (no manifest) are never cached.
    pub(crate) async fn app_for(
        &self,
        project_root: &Path,
        app_root: &Path,
    ) -> Option<Arc<CachedApp>> {
        let cap_services = {
            let projects = self.projects.lock();
            let project = projects.get(project_root)?;
            if let Some(app) = project.app(app_root) {
                return Some(Arc::clone(app));
            }
            match project {
                Project::Ui5(_) => HashMap::new(),
                Project::Cap(cap) => cap.services.clone(),
            }
        };

        let key = app_flight_key(app_root);
        let inputs = AppLoadInputs {
            app_root: app_root.to_path_buf(),
            project_root: project_root.to_path_buf(),
            cap_services,
            converter: Arc::clone(&self.converter),
        };
        let handle = self.app_flight.get_or_spawn(&key, move || load_app(inputs));
        let app = handle.await;
        // The flight entry only dedups concurrent loads; the project map is
        // the durable cache, and "absent" must stay uncached.
        self.app_flight.remove(&key);

        if let Some(app) = &app {
            // Re-fetch the map at write time so an eviction that happened
            // during the load is not silently undone for other entries.
            let mut projects = self.projects.lock();
            if let Some(project) = projects.get_mut(project_root) {
                match project {
                    Project::Ui5(ui5) => ui5.app = Some(Arc::clone(app)),
                    Project::Cap(cap) => {
                        cap.apps.insert(app_root.to_path_buf(), Arc::clone(app));
                    }
                }
            }
        }
        app
    }

    pub(crate) fn remove_project_flight(&self, root: &Path) {
        self.project_flight.remove(&project_flight_key(root));
    }

    /// Invalidate every classification currently in flight: each will still
    /// answer its awaiting callers, but none will be written back.
    pub(crate) fn bump_eviction_epoch(&self) {
        self.eviction_epoch.fetch_add(1, Ordering::AcqRel);
    }
}

pub(crate) fn project_flight_key(root: &Path) -> String {
    format!("project:{}", root.display())
}

fn app_flight_key(app_root: &Path) -> String {
    format!("app:{}", app_root.display())
}

fn negotiation_inputs(
    project: Option<&Project>,
    app: Option<&CachedApp>,
) -> (FrameworkKind, Option<String>) {
    let mut framework = FrameworkKind::SapUi5;
    let mut requested = None;

    if let Some(Project::Ui5(ui5)) = project {
        if let Some(config) = &ui5.framework_config {
            if let Some(kind) = config.framework {
                framework = kind;
            }
            requested = config.version.clone();
        }
    }
    if requested.is_none() {
        requested = app.and_then(|app| app.manifest_details.min_ui5_version.clone());
    }

    (framework, requested)
}

/// Nearest ancestor directory holding a manifest, canonicalized.
fn find_app_root(document_path: &Path) -> Option<PathBuf> {
    document_path
        .ancestors()
        .find(|dir| dir.join(MANIFEST_FILE).is_file())
        .map(canonical_root)
}

/// Outermost ancestor carrying a project marker; the app root (or the
/// document's directory) when no marker exists.
fn find_project_root(document_path: &Path, app_root: Option<&Path>) -> Option<PathBuf> {
    let marked = document_path
        .ancestors()
        .filter(|dir| {
            dir.join(PACKAGE_JSON_FILE).is_file()
                || dir.join("pom.xml").is_file()
                || dir.join(".cdsrc.json").is_file()
        })
        .last();

    match marked {
        Some(root) => Some(canonical_root(root)),
        None => app_root
            .map(Path::to_path_buf)
            .or_else(|| document_path.parent().map(canonical_root)),
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_metadata::{EdmxConverter, EdmxDocument};
use serde_json::Value;

use crate::classify::MANIFEST_FILE;
use crate::model::{service_paths_match, CachedApp, ManifestDetails, ServiceDetails};

/// Everything an app load needs, owned, so the load can run as a shared
/// future independent of the cache's lifetime.
pub(crate) struct AppLoadInputs {
    pub app_root: PathBuf,
    pub project_root: PathBuf,
    /// Snapshot of the enclosing CAP project's compiled services
    /// (`servicePath -> metadataText`); empty for plain UI5 projects.
    pub cap_services: HashMap<String, String>,
    pub converter: Arc<dyn EdmxConverter>,
}

/// Load an application from disk.
///
/// `None` means "no app here right now" (missing or unparsable manifest) and
/// must never be cached: a retry after the user saves a valid manifest has
/// to succeed. Per-service failures degrade to a partial `local_services`
/// map; they never fail the app load itself.
pub(crate) async fn load_app(inputs: AppLoadInputs) -> Option<Arc<CachedApp>> {
    let manifest_path = inputs.app_root.join(MANIFEST_FILE);
    let text = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(
                target = "keel.context",
                path = %manifest_path.display(),
                error = %err,
                "no readable manifest; app is absent"
            );
            return None;
        }
    };
    let manifest: Value = match serde_json::from_str(&text) {
        Ok(manifest) => manifest,
        Err(err) => {
            tracing::warn!(
                target = "keel.context",
                path = %manifest_path.display(),
                error = %err,
                "manifest is not valid JSON; app is absent"
            );
            return None;
        }
    };

    let manifest_details = ManifestDetails::from_manifest(&manifest);

    let mut local_services = HashMap::new();
    if let Some(service_path) = manifest_details.main_service_path.clone() {
        if let Some(details) = load_main_service(&inputs, &manifest, &service_path).await {
            local_services.insert(service_path, details);
        }
    }

    Some(Arc::new(CachedApp {
        app_root: inputs.app_root,
        project_root: inputs.project_root,
        manifest,
        manifest_details,
        local_services,
    }))
}

async fn load_main_service(
    inputs: &AppLoadInputs,
    manifest: &Value,
    service_path: &str,
) -> Option<ServiceDetails> {
    let data_sources = &manifest["sap.app"]["dataSources"];
    let source_name = manifest["sap.ui5"]["models"][""]["dataSource"].as_str()?;
    let source = &data_sources[source_name];

    let metadata_file = source["settings"]["localUri"]
        .as_str()
        .map(|uri| inputs.app_root.join(uri));

    // Annotation data sources referenced by name from the main source.
    let mut annotation_files = Vec::new();
    if let Value::Array(names) = &source["settings"]["annotations"] {
        for name in names.iter().filter_map(Value::as_str) {
            let annotation_source = &data_sources[name];
            if annotation_source["type"].as_str() != Some("ODataAnnotation") {
                continue;
            }
            if let Some(uri) = annotation_source["settings"]["localUri"].as_str() {
                annotation_files.push((name.to_string(), inputs.app_root.join(uri)));
            }
        }
    }

    let metadata_read = async {
        match &metadata_file {
            Some(path) => read_text(path).await,
            None => None,
        }
    };
    let annotation_reads = futures::future::join_all(
        annotation_files
            .iter()
            .map(|(name, path)| async move { (name.clone(), read_text(path).await) }),
    );
    let (local_metadata, annotation_texts) = tokio::join!(metadata_read, annotation_reads);

    // When the enclosing CAP project compiled a service at this path, that
    // compiled document is the source of truth for the metadata; the local
    // metadata file's content is ignored even when present. Local files
    // still contribute the annotation overlays. Asymmetric, but downstream
    // consumers rely on exactly this precedence.
    let compiled = inputs
        .cap_services
        .iter()
        .find(|(path, _)| service_paths_match(path, service_path))
        .map(|(_, metadata)| metadata.clone());

    let metadata_text = match compiled.or(local_metadata) {
        Some(text) => text,
        None => {
            tracing::debug!(
                target = "keel.context",
                app = %inputs.app_root.display(),
                service = service_path,
                "no metadata source for service"
            );
            return None;
        }
    };

    let base = match inputs.converter.parse(&metadata_text, "$metadata") {
        Ok(document) => document,
        Err(err) => {
            tracing::error!(
                target = "keel.context",
                app = %inputs.app_root.display(),
                service = service_path,
                error = %err,
                "service metadata failed to parse; skipping service"
            );
            return None;
        }
    };

    let mut overlays: Vec<EdmxDocument> = Vec::new();
    for (name, text) in annotation_texts {
        let Some(text) = text else { continue };
        match inputs.converter.parse(&text, &name) {
            Ok(document) => overlays.push(document),
            Err(err) => {
                // One bad annotation file must not take the service down.
                tracing::warn!(
                    target = "keel.context",
                    app = %inputs.app_root.display(),
                    annotation = %name,
                    error = %err,
                    "annotation file failed to parse; skipping it"
                );
            }
        }
    }

    let merged = inputs.converter.merge(base, overlays);
    match inputs.converter.convert(&merged) {
        Ok(converted_metadata) => Some(ServiceDetails {
            path: service_path.to_string(),
            converted_metadata,
        }),
        Err(err) => {
            tracing::error!(
                target = "keel.context",
                app = %inputs.app_root.display(),
                service = service_path,
                error = %err,
                "service metadata conversion failed; skipping service"
            );
            None
        }
    }
}

async fn read_text(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::debug!(
                target = "keel.context",
                path = %path.display(),
                error = %err,
                "failed to read local service file"
            );
            None
        }
    }
}

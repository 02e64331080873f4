use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use keel_core::FrameworkKind;
use keel_metadata::ConvertedMetadata;
use serde_json::Value;

/// A classified filesystem root. Exactly one `Project` exists per
/// canonicalized root; consumers match exhaustively so a third project kind
/// is a compile-time-checked addition.
#[derive(Debug, Clone)]
pub enum Project {
    Ui5(Ui5Project),
    Cap(CapProject),
}

impl Project {
    pub fn root(&self) -> &PathBuf {
        match self {
            Project::Ui5(project) => &project.root,
            Project::Cap(project) => &project.root,
        }
    }

    /// The cached app for `app_root`, if one is loaded.
    pub fn app(&self, app_root: &std::path::Path) -> Option<&Arc<CachedApp>> {
        match self {
            Project::Ui5(project) => project
                .app
                .as_ref()
                .filter(|app| app.app_root.as_path() == app_root),
            Project::Cap(project) => project.apps.get(app_root),
        }
    }
}

/// A plain single-app project.
#[derive(Debug, Clone)]
pub struct Ui5Project {
    pub root: PathBuf,
    pub framework_config: Option<FrameworkConfig>,
    pub app: Option<Arc<CachedApp>>,
}

/// A multi-service CAP project.
#[derive(Debug, Clone)]
pub struct CapProject {
    pub root: PathBuf,
    pub runtime: CapRuntime,
    /// Compiled OData metadata per service path. Replaced wholesale on each
    /// successful recompilation.
    pub services: HashMap<String, String>,
    pub apps: HashMap<PathBuf, Arc<CachedApp>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapRuntime {
    Java,
    NodeJs,
}

/// The project-local framework descriptor (`ui5.yaml`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkConfig {
    pub framework: Option<FrameworkKind>,
    pub version: Option<String>,
}

/// A resolved application: raw manifest, its derived details, and the local
/// data services. Immutable until explicitly reloaded.
#[derive(Debug, Clone)]
pub struct CachedApp {
    pub app_root: PathBuf,
    pub project_root: PathBuf,
    pub manifest: Value,
    pub manifest_details: ManifestDetails,
    pub local_services: HashMap<String, ServiceDetails>,
}

/// Pure projection of the raw manifest; recomputed on every (re)load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDetails {
    pub flex_enabled: bool,
    pub min_ui5_version: Option<String>,
    pub main_service_path: Option<String>,
    pub custom_views: HashMap<String, CustomView>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomView {
    pub entity_set: Option<String>,
}

/// One local data service, ready for downstream consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetails {
    pub path: String,
    pub converted_metadata: ConvertedMetadata,
}

impl ManifestDetails {
    /// Derive the details downstream tooling needs from a raw manifest.
    /// Absent or oddly-typed fields degrade to their defaults.
    pub fn from_manifest(manifest: &Value) -> Self {
        let ui5 = &manifest["sap.ui5"];
        let app = &manifest["sap.app"];

        let flex_enabled = ui5["flexEnabled"].as_bool().unwrap_or(false);

        // `minUI5Version` may be a plain string or (since manifest 1.13) an
        // array of alternatives; take the first.
        let min_ui5_version = match &ui5["dependencies"]["minUI5Version"] {
            Value::String(version) => Some(version.clone()),
            Value::Array(versions) => versions
                .iter()
                .find_map(|version| version.as_str())
                .map(str::to_string),
            _ => None,
        };

        let main_service_path = ui5["models"][""]["dataSource"]
            .as_str()
            .and_then(|name| app["dataSources"][name]["uri"].as_str())
            .map(str::to_string);

        let app_id = app["id"].as_str().unwrap_or_default();
        let mut custom_views = HashMap::new();
        if let Value::Object(targets) = &ui5["routing"]["targets"] {
            for target in targets.values() {
                let settings = &target["options"]["settings"];
                let Some(view_name) = settings["viewName"].as_str() else {
                    continue;
                };
                let qualified = if app_id.is_empty() {
                    view_name.to_string()
                } else {
                    format!("{app_id}.{view_name}")
                };
                custom_views.insert(
                    qualified,
                    CustomView {
                        entity_set: settings["entitySet"].as_str().map(str::to_string),
                    },
                );
            }
        }

        Self {
            flex_enabled,
            min_ui5_version,
            main_service_path,
            custom_views,
        }
    }
}

/// Service paths are compared both with and without a leading slash.
pub(crate) fn service_paths_match(left: &str, right: &str) -> bool {
    left.trim_start_matches('/') == right.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_details_projects_the_interesting_fields() {
        let manifest = json!({
            "sap.app": {
                "id": "my.shop",
                "dataSources": {
                    "mainService": {
                        "uri": "/odata/v4/catalog/",
                        "type": "OData",
                    },
                },
            },
            "sap.ui5": {
                "flexEnabled": true,
                "dependencies": {"minUI5Version": "1.96.0"},
                "models": {"": {"dataSource": "mainService"}},
                "routing": {
                    "targets": {
                        "books": {
                            "options": {
                                "settings": {
                                    "viewName": "BooksView",
                                    "entitySet": "Books",
                                },
                            },
                        },
                    },
                },
            },
        });

        let details = ManifestDetails::from_manifest(&manifest);
        assert!(details.flex_enabled);
        assert_eq!(details.min_ui5_version.as_deref(), Some("1.96.0"));
        assert_eq!(details.main_service_path.as_deref(), Some("/odata/v4/catalog/"));
        assert_eq!(
            details.custom_views["my.shop.BooksView"],
            CustomView {
                entity_set: Some("Books".to_string())
            }
        );
    }

    #[test]
    fn min_version_array_takes_the_first_entry() {
        let manifest = json!({
            "sap.ui5": {"dependencies": {"minUI5Version": ["1.120.0", "2.0.0"]}},
        });
        let details = ManifestDetails::from_manifest(&manifest);
        assert_eq!(details.min_ui5_version.as_deref(), Some("1.120.0"));
    }

    #[test]
    fn empty_manifest_degrades_to_defaults() {
        let details = ManifestDetails::from_manifest(&json!({}));
        assert_eq!(details, ManifestDetails::default());
    }

    #[test]
    fn service_path_comparison_ignores_a_leading_slash() {
        assert!(service_paths_match("/odata/v4/catalog/", "odata/v4/catalog/"));
        assert!(service_paths_match("odata", "odata"));
        assert!(!service_paths_match("/a", "/b"));
    }
}

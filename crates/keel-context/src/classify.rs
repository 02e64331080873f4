use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_core::FrameworkKind;
use serde::Deserialize;

use crate::cds::{compile_cap_services, CdsCompiler};
use crate::model::{CapProject, CapRuntime, FrameworkConfig, Project, Ui5Project};

pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const FRAMEWORK_CONFIG_FILE: &str = "ui5.yaml";
pub(crate) const PACKAGE_JSON_FILE: &str = "package.json";
const POM_FILE: &str = "pom.xml";

/// Classify a root into a [`Project`]: CAP-Java, then CAP-NodeJS, then plain
/// UI5. CAP classification also runs the initial service compilation.
pub(crate) async fn classify_project(root: PathBuf, compiler: Arc<dyn CdsCompiler>) -> Project {
    match detect_cap_runtime(&root) {
        Some(runtime) => {
            let services = compile_cap_services(compiler.as_ref(), &root)
                .await
                .unwrap_or_default();
            tracing::debug!(
                target = "keel.context",
                root = %root.display(),
                runtime = ?runtime,
                services = services.len(),
                "classified CAP project"
            );
            Project::Cap(CapProject {
                root,
                runtime,
                services,
                apps: HashMap::new(),
            })
        }
        None => {
            let framework_config = load_framework_config(&root);
            tracing::debug!(
                target = "keel.context",
                root = %root.display(),
                has_framework_config = framework_config.is_some(),
                "classified plain UI5 project"
            );
            Project::Ui5(Ui5Project {
                root,
                framework_config,
                app: None,
            })
        }
    }
}

fn detect_cap_runtime(root: &Path) -> Option<CapRuntime> {
    // Java first: a CAP Java project also carries a package.json for its
    // UI content, so the order matters.
    if let Ok(pom) = std::fs::read_to_string(root.join(POM_FILE)) {
        if pom.contains("com.sap.cds") {
            return Some(CapRuntime::Java);
        }
    }

    let package_json = match std::fs::read_to_string(root.join(PACKAGE_JSON_FILE)) {
        Ok(text) => text,
        Err(_) => return None,
    };
    let package: serde_json::Value = match serde_json::from_str(&package_json) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(
                target = "keel.context",
                root = %root.display(),
                error = %err,
                "package.json is not valid JSON; treating as plain project"
            );
            return None;
        }
    };

    let declares_cds = package["dependencies"]["@sap/cds"].is_string()
        || package["devDependencies"]["@sap/cds"].is_string()
        || package["cds"].is_object();
    declares_cds.then_some(CapRuntime::NodeJs)
}

#[derive(Debug, Deserialize)]
struct Ui5YamlDocument {
    framework: Option<Ui5YamlFramework>,
}

#[derive(Debug, Deserialize)]
struct Ui5YamlFramework {
    name: Option<String>,
    version: Option<String>,
}

/// Read and parse `<root>/ui5.yaml`. `None` means the file is absent.
/// A present-but-unparsable file is reported as an error so invalidation can
/// keep the previous good value.
pub(crate) fn parse_framework_config(
    root: &Path,
) -> Result<Option<FrameworkConfig>, serde_yaml::Error> {
    let text = match std::fs::read_to_string(root.join(FRAMEWORK_CONFIG_FILE)) {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };

    let document: Ui5YamlDocument = serde_yaml::from_str(&text)?;
    Ok(document.framework.map(|framework| FrameworkConfig {
        framework: framework.name.as_deref().and_then(FrameworkKind::parse),
        version: framework.version,
    }))
}

pub(crate) fn load_framework_config(root: &Path) -> Option<FrameworkConfig> {
    match parse_framework_config(root) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                target = "keel.context",
                root = %root.display(),
                error = %err,
                "failed to parse framework config"
            );
            None
        }
    }
}

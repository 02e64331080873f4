//! URL layout of the framework CDN.

use keel_core::FrameworkKind;

/// The published version map, e.g. `https://ui5.sap.com/version.json`.
pub fn version_map(framework: FrameworkKind) -> String {
    format!("{}/version.json", framework.cdn_base())
}

/// The per-release library manifest.
pub fn version_info(framework: FrameworkKind, version: &str) -> String {
    format!(
        "{}/{}/resources/sap-ui-version.json",
        framework.cdn_base(),
        version
    )
}

/// The design-time metadata document for one library.
pub fn library(framework: FrameworkKind, version: &str, library: &str) -> String {
    format!(
        "{}/{}/test-resources/{}/designtime/api.json",
        framework.cdn_base(),
        version,
        library.replace('.', "/")
    )
}

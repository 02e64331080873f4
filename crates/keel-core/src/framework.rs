use std::fmt;

/// Fallback release used when a project declares no usable version at all.
///
/// This is the oldest release line the tooling still ships metadata for; the
/// negotiator only reaches for it when both the project configuration and the
/// remote version map are unavailable.
pub const DEFAULT_UI5_VERSION: &str = "1.71.67";

/// The UI framework distribution a view document targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameworkKind {
    SapUi5,
    OpenUi5,
}

impl FrameworkKind {
    /// Canonical spelling used in `ui5.yaml` and in cache directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkKind::SapUi5 => "SAPUI5",
            FrameworkKind::OpenUi5 => "OpenUI5",
        }
    }

    /// Lenient parse of the spelling found in framework-config files.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "sapui5" => Some(FrameworkKind::SapUi5),
            "openui5" => Some(FrameworkKind::OpenUi5),
            _ => None,
        }
    }

    /// CDN root serving both the version map and per-release metadata.
    pub fn cdn_base(&self) -> &'static str {
        match self {
            FrameworkKind::SapUi5 => "https://ui5.sap.com",
            FrameworkKind::OpenUi5 => "https://sdk.openui5.org",
        }
    }
}

impl fmt::Display for FrameworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

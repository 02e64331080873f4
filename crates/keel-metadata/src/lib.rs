//! The OData EDMX boundary: parse a service metadata document, merge in
//! annotation overlay documents, and convert the result into the in-memory
//! shape downstream tooling consumes.
//!
//! This is a pure function boundary for the caches: no I/O, no shared state.
//! Callers treat any error here as "this service has no usable metadata".

mod convert;

pub use convert::XmlEdmxConverter;

/// A syntactically valid EDMX document, held as text.
///
/// `roxmltree` documents borrow their input, so the parsed tree is not kept
/// around; [`EdmxConverter::parse`] validates the text and conversion
/// re-parses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdmxDocument {
    pub label: String,
    pub text: String,
}

/// A base metadata document plus its annotation overlays, ready to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEdmx {
    pub base: EdmxDocument,
    pub overlays: Vec<EdmxDocument>,
}

/// The in-memory service metadata shape consumed by completion/validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvertedMetadata {
    /// Namespace of the service schema.
    pub namespace: String,
    /// OData protocol version declared by the document.
    pub odata_version: String,
    pub entity_sets: Vec<EntitySet>,
    /// Annotation targets contributed by the base document and overlays.
    pub annotation_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EdmxError {
    #[error("failed to parse XML in {label}: {source}")]
    Xml {
        label: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("{label} is not an EDMX document (root element is <{root}>)")]
    NotEdmx { label: String, root: String },

    #[error("{label} has no schema element")]
    MissingSchema { label: String },
}

/// OData EDMX pipeline: `parse`, `merge`, `convert`.
///
/// Implemented by [`XmlEdmxConverter`] in production; tests substitute
/// converters that fail on demand to exercise partial-failure isolation.
pub trait EdmxConverter: Send + Sync {
    fn parse(&self, text: &str, label: &str) -> Result<EdmxDocument, EdmxError>;

    fn merge(&self, base: EdmxDocument, overlays: Vec<EdmxDocument>) -> MergedEdmx {
        MergedEdmx { base, overlays }
    }

    fn convert(&self, merged: &MergedEdmx) -> Result<ConvertedMetadata, EdmxError>;
}

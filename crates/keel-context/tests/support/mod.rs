//! Shared fixtures for the context integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel_context::{CdsCompiler, CdsError, CdsServiceRef, ContextCache};
use keel_core::test_support::StaticFetcher;
use keel_core::Fetcher;
use keel_metadata::{
    ConvertedMetadata, EdmxConverter, EdmxDocument, EdmxError, MergedEdmx, XmlEdmxConverter,
};
use tokio::sync::watch;

/// A CDS compiler whose service list is controlled by the test, with a call
/// counter to observe (re-)classification and recompilation.
#[derive(Default)]
pub struct StubCdsCompiler {
    services: Mutex<Vec<(CdsServiceRef, String)>>,
    fail: AtomicBool,
    compile_calls: AtomicUsize,
}

impl StubCdsCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, url_path, metadata)` triples served by the next compilation.
    pub fn set_services(&self, services: Vec<(&str, &str, String)>) {
        *self.services.lock().unwrap() = services
            .into_iter()
            .map(|(name, url_path, metadata)| {
                (
                    CdsServiceRef {
                        name: name.to_string(),
                        url_path: url_path.to_string(),
                    },
                    metadata,
                )
            })
            .collect();
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CdsCompiler for StubCdsCompiler {
    async fn compile_services(&self, project_root: &Path) -> Result<Vec<CdsServiceRef>, CdsError> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CdsError::Compilation {
                root: project_root.display().to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .map(|(service, _)| service.clone())
            .collect())
    }

    async fn compile_to_metadata(
        &self,
        project_root: &Path,
        service_name: &str,
    ) -> Result<String, CdsError> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|(service, _)| service.name == service_name)
            .map(|(_, metadata)| metadata.clone())
            .ok_or_else(|| CdsError::Compilation {
                root: project_root.display().to_string(),
                message: format!("unknown service {service_name}"),
            })
    }
}

/// Holds every service enumeration until the gate opens, so tests can pile
/// up concurrent classifications before the first one completes.
pub struct GatedCdsCompiler {
    inner: Arc<StubCdsCompiler>,
    gate: watch::Receiver<bool>,
}

/// Opens the gate of a [`GatedCdsCompiler`]. Dropping the gate also opens
/// it so a panicking test cannot deadlock its sibling tasks.
pub struct CdsGate {
    tx: watch::Sender<bool>,
}

impl CdsGate {
    pub fn open(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for CdsGate {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

impl GatedCdsCompiler {
    pub fn new(inner: Arc<StubCdsCompiler>) -> (Self, CdsGate) {
        let (tx, rx) = watch::channel(false);
        (Self { inner, gate: rx }, CdsGate { tx })
    }
}

#[async_trait]
impl CdsCompiler for GatedCdsCompiler {
    async fn compile_services(&self, project_root: &Path) -> Result<Vec<CdsServiceRef>, CdsError> {
        let mut gate = self.gate.clone();
        while !*gate.borrow() {
            if gate.changed().await.is_err() {
                break;
            }
        }
        self.inner.compile_services(project_root).await
    }

    async fn compile_to_metadata(
        &self,
        project_root: &Path,
        service_name: &str,
    ) -> Result<String, CdsError> {
        self.inner.compile_to_metadata(project_root, service_name).await
    }
}

/// Counts conversions so tests can observe how many app loads actually ran.
pub struct CountingConverter {
    inner: XmlEdmxConverter,
    converts: AtomicUsize,
}

impl CountingConverter {
    pub fn new() -> Self {
        Self {
            inner: XmlEdmxConverter::new(),
            converts: AtomicUsize::new(0),
        }
    }

    pub fn convert_calls(&self) -> usize {
        self.converts.load(Ordering::SeqCst)
    }
}

impl EdmxConverter for CountingConverter {
    fn parse(&self, text: &str, label: &str) -> Result<EdmxDocument, EdmxError> {
        self.inner.parse(text, label)
    }

    fn convert(&self, merged: &MergedEdmx) -> Result<ConvertedMetadata, EdmxError> {
        self.converts.fetch_add(1, Ordering::SeqCst);
        self.inner.convert(merged)
    }
}

pub fn new_cache<C>(fetcher: Arc<StaticFetcher>, cds: Arc<C>) -> ContextCache
where
    C: CdsCompiler + 'static,
{
    new_cache_with(fetcher, cds, Arc::new(XmlEdmxConverter::new()))
}

pub fn new_cache_with<C, V>(
    fetcher: Arc<StaticFetcher>,
    cds: Arc<C>,
    converter: Arc<V>,
) -> ContextCache
where
    C: CdsCompiler + 'static,
    V: EdmxConverter + 'static,
{
    let fetcher: Arc<dyn Fetcher> = fetcher;
    let converter: Arc<dyn EdmxConverter> = converter;
    let cds: Arc<dyn CdsCompiler> = cds;
    ContextCache::new(fetcher, converter, cds, None)
}

pub fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

/// Minimal EDMX service metadata with one entity set, distinguishable by
/// schema namespace.
pub fn edmx(namespace: &str) -> String {
    format!(
        r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="{namespace}">
      <EntityContainer Name="EntityContainer">
        <EntitySet Name="Books" EntityType="{namespace}.Books"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#
    )
}

/// Annotation overlay targeting `target`.
pub fn edmx_annotations(target: &str) -> String {
    format!(
        r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="local.annotations">
      <Annotations Target="{target}"/>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#
    )
}

/// A manifest whose default model points at `service_uri`, with a local
/// metadata file and one local annotation file.
pub fn manifest(app_id: &str, service_uri: &str) -> String {
    serde_json::json!({
        "sap.app": {
            "id": app_id,
            "dataSources": {
                "mainService": {
                    "uri": service_uri,
                    "type": "OData",
                    "settings": {
                        "localUri": "localService/metadata.xml",
                        "annotations": ["localAnnotations"],
                    },
                },
                "localAnnotations": {
                    "uri": "annotations.xml",
                    "type": "ODataAnnotation",
                    "settings": {"localUri": "localService/annotations.xml"},
                },
            },
        },
        "sap.ui5": {
            "flexEnabled": true,
            "dependencies": {"minUI5Version": "1.96.0"},
            "models": {"": {"dataSource": "mainService"}},
        },
    })
    .to_string()
}

/// Lay down a complete app below `app_root`: manifest, local metadata with
/// `namespace`, and one annotation file targeting `{namespace}.Books`.
pub fn write_app(app_root: &Path, app_id: &str, service_uri: &str, namespace: &str) {
    write(&app_root.join("manifest.json"), &manifest(app_id, service_uri));
    write(
        &app_root.join("localService/metadata.xml"),
        &edmx(namespace),
    );
    write(
        &app_root.join("localService/annotations.xml"),
        &edmx_annotations(&format!("{namespace}.Books")),
    );
}

pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum CdsError {
    #[error("cds compilation failed for {root}: {message}")]
    Compilation { root: String, message: String },
}

/// One service declared by a CAP data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsServiceRef {
    pub name: String,
    pub url_path: String,
}

/// Boundary to the CAP data-model compiler.
///
/// Failures from implementations are caught and logged by this crate; they
/// never propagate past [`compile_cap_services`].
#[async_trait]
pub trait CdsCompiler: Send + Sync {
    /// Enumerate the services the project's data model declares.
    async fn compile_services(&self, project_root: &Path) -> Result<Vec<CdsServiceRef>, CdsError>;

    /// Compile the project's data model to OData metadata for one service.
    async fn compile_to_metadata(
        &self,
        project_root: &Path,
        service_name: &str,
    ) -> Result<String, CdsError>;
}

/// Compiler for environments without a CDS toolchain: no services, ever.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCdsCompiler;

#[async_trait]
impl CdsCompiler for NoopCdsCompiler {
    async fn compile_services(&self, _project_root: &Path) -> Result<Vec<CdsServiceRef>, CdsError> {
        Ok(Vec::new())
    }

    async fn compile_to_metadata(
        &self,
        _project_root: &Path,
        service_name: &str,
    ) -> Result<String, CdsError> {
        Err(CdsError::Compilation {
            root: String::new(),
            message: format!("no cds toolchain available for service {service_name}"),
        })
    }
}

/// Compile every declared service to `servicePath -> metadataText`.
///
/// `None` means the compilation run itself failed and the caller must keep
/// its previous map; `Some` replaces the prior map wholesale. A failure for
/// one service only omits that service.
pub(crate) async fn compile_cap_services(
    compiler: &dyn CdsCompiler,
    project_root: &Path,
) -> Option<HashMap<String, String>> {
    let services = match compiler.compile_services(project_root).await {
        Ok(services) => services,
        Err(err) => {
            tracing::error!(
                target = "keel.context",
                root = %project_root.display(),
                error = %err,
                "cds service enumeration failed; keeping previous services"
            );
            return None;
        }
    };

    let mut compiled = HashMap::new();
    for service in services {
        match compiler
            .compile_to_metadata(project_root, &service.name)
            .await
        {
            Ok(metadata) => {
                compiled.insert(service.url_path, metadata);
            }
            Err(err) => {
                tracing::error!(
                    target = "keel.context",
                    root = %project_root.display(),
                    service = %service.name,
                    error = %err,
                    "cds metadata compilation failed; omitting service"
                );
            }
        }
    }
    Some(compiled)
}

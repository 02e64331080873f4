//! Project classification and the application context cache.
//!
//! [`ContextCache`] is the aggregate entry point of the resolution core: it
//! classifies filesystem roots into [`Project`]s, caches resolved
//! applications (manifest details plus local data-service metadata), and
//! reacts to file-change notifications by refreshing or evicting exactly the
//! entries each file kind affects.
//!
//! Everything here is infallible at the boundary: failures degrade to
//! smaller or staler-but-valid results and show up only in the logs.

mod app;
mod cds;
mod classify;
mod invalidate;
mod model;
mod resolve;

pub use cds::{CdsCompiler, CdsError, CdsServiceRef, NoopCdsCompiler};
pub use invalidate::{ChangeType, WatchedFileKind};
pub use model::{
    CachedApp, CapProject, CapRuntime, CustomView, FrameworkConfig, ManifestDetails, Project,
    ServiceDetails, Ui5Project,
};
pub use resolve::{ContextCache, ResolvedContext};

//! The seam between this stage and the external style compiler.
//!
//! The backend is an opaque collaborator: it receives one fully merged
//! request per compile call and returns compiled CSS, an optional raw JSON
//! source map, and the list of URLs it loaded. It is invoked exactly once
//! per call; retries, timeouts, and cancellation belong to the host
//! pipeline's orchestration layer, not here. A realistic backend may proxy
//! the request to a persistent sidecar process; that transport is the
//! implementation's own business.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use url::Url;

use crate::error::BackendError;
use crate::functions::FunctionBridge;
use crate::options::{OutputStyle, Syntax};

/// One compile request, fully merged and immutable for the duration of the
/// call.
#[derive(Debug)]
pub struct BackendRequest<'a> {
    /// The stylesheet source text.
    pub source: &'a str,
    /// Input syntax, fixed by the invoking processor variant.
    pub syntax: Syntax,
    /// Logical URL identifying the source, used for error reporting and as
    /// the source map's root identity.
    pub url: &'a Url,
    /// Directories to search for loaded stylesheets, in priority order.
    pub load_paths: &'a [Utf8PathBuf],
    pub style: OutputStyle,
    /// Whether the backend should produce a source map.
    pub source_map: bool,
    /// Opaque key-value overrides passed through from the configuration.
    pub custom: &'a BTreeMap<String, String>,
    /// Host-side callables the backend may invoke mid-compilation. `None`
    /// for the CSS minification variant.
    pub functions: Option<&'a FunctionBridge<'a>>,
}

/// What the backend hands back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub css: String,
    /// Raw source-map v3 JSON, if the request asked for one and the backend
    /// can produce one.
    pub source_map: Option<String>,
    /// Every URL the backend loaded while compiling, including the entry
    /// point if it was read from disk.
    pub loaded_urls: Vec<Url>,
}

/// An external style compiler.
///
/// Implementations must be safe to invoke concurrently from multiple
/// threads; each call owns its request and bridge.
pub trait CompilerBackend: Send + Sync {
    /// The backend's own version string. Participates in cache keys so a
    /// compiler upgrade invalidates all previously cached output.
    fn version(&self) -> &str;

    /// Compile one request. Blocking; called exactly once per stage call.
    fn compile(&self, request: BackendRequest<'_>) -> Result<BackendOutput, BackendError>;
}

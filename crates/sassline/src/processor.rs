//! The pipeline-facing processors: compile-and-integrate for the two style
//! syntaxes, and the reduced CSS minification variant.
//!
//! A processor is constructed once per configuration by the caller (no
//! process-wide singleton), is immutable afterwards, and lives as long as
//! the host pipeline. Each `call` builds a fresh request and function
//! bridge, so concurrent compilations share nothing mutable.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use crate::backend::{BackendRequest, CompilerBackend};
use crate::cache_key::{PROTOCOL_VERSION, cache_key};
use crate::dependencies;
use crate::error::{ConfigurationError, Result};
use crate::functions::{Environment, ExtraFunctions, FunctionBridge};
use crate::options::{OutputStyle, ResolvedOptions, StageConfig, Syntax};
use crate::source_map::{self, SourceMap};

/// Content types the stage is registered against.
pub mod content_type {
    pub const SASS: &str = "text/sass";
    pub const SCSS: &str = "text/scss";
    pub const CSS: &str = "text/css";
}

/// Which stage a [`Registration`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    SassTransformer,
    ScssTransformer,
    CssCompressor,
}

/// One entry the host pipeline registers: input content type, output
/// content type, and which processor handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub from: &'static str,
    pub to: &'static str,
    pub kind: StageKind,
}

/// The three stages this crate contributes to a pipeline.
pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        from: content_type::SASS,
        to: content_type::CSS,
        kind: StageKind::SassTransformer,
    },
    Registration {
        from: content_type::SCSS,
        to: content_type::CSS,
        kind: StageKind::ScssTransformer,
    },
    Registration {
        from: content_type::CSS,
        to: content_type::CSS,
        kind: StageKind::CssCompressor,
    },
];

/// Per-call input from the host pipeline.
pub struct StageInput<'a> {
    /// The source text to compile.
    pub data: &'a str,
    /// Logical filename of the asset being processed.
    pub filename: &'a Utf8Path,
    /// Source map accumulated by earlier transform stages, if any.
    pub prior_map: Option<SourceMap>,
    /// The host environment: asset resolution and search paths.
    pub environment: &'a dyn Environment,
}

/// The full result triple handed back to the host pipeline. Either all of
/// it is produced or the call fails; there are no partial results.
#[derive(Debug)]
pub struct StageOutput {
    /// Compiled (or minified) CSS.
    pub data: String,
    /// Combined source map tracing back through every prior stage, when one
    /// could be produced.
    pub map: Option<SourceMap>,
    /// Content-addressed dependency URIs to merge into the asset's record.
    pub dependencies: BTreeSet<Url>,
    /// Local filesystem paths the backend loaded, for diagnostics.
    pub loaded_paths: BTreeSet<Utf8PathBuf>,
}

/// The host pipeline contract: a cache-key accessor plus a call entry point.
pub trait Transform: Send + Sync {
    fn cache_key(&self) -> &str;
    fn call(&self, input: StageInput<'_>) -> Result<StageOutput>;
}

/// Build the logical `file://` URL identifying a source file.
fn source_url(filename: &Utf8Path) -> Result<Url, ConfigurationError> {
    let candidate = if filename.is_absolute() {
        Url::from_file_path(filename.as_std_path()).ok()
    } else {
        Url::parse(&format!("file:///{}", filename.as_str())).ok()
    };
    candidate.ok_or_else(|| {
        ConfigurationError::new(format!("cannot build a source URL for `{filename}`"))
    })
}

/// Compile-and-integrate processor for one of the two style syntaxes.
///
/// Construct with [`StyleProcessor::sass`] for the indented syntax or
/// [`StyleProcessor::scss`] for the braced syntax; the syntax is part of the
/// processor's identity, never chosen per call.
pub struct StyleProcessor {
    identity: &'static str,
    syntax: Syntax,
    backend: Arc<dyn CompilerBackend>,
    config: StageConfig,
    functions: ExtraFunctions,
    cache_key: OnceLock<String>,
}

impl std::fmt::Debug for StyleProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleProcessor")
            .field("identity", &self.identity)
            .field("syntax", &self.syntax)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StyleProcessor {
    /// A processor for the indentation-based syntax.
    pub fn sass(backend: Arc<dyn CompilerBackend>, config: StageConfig) -> Self {
        Self::with_identity("sassline.SassProcessor", Syntax::Indented, backend, config)
    }

    /// A processor for the brace-based syntax.
    pub fn scss(backend: Arc<dyn CompilerBackend>, config: StageConfig) -> Self {
        Self::with_identity("sassline.ScssProcessor", Syntax::Scss, backend, config)
    }

    fn with_identity(
        identity: &'static str,
        syntax: Syntax,
        backend: Arc<dyn CompilerBackend>,
        config: StageConfig,
    ) -> Self {
        Self {
            identity,
            syntax,
            backend,
            config,
            functions: ExtraFunctions::new(),
            cache_key: OnceLock::new(),
        }
    }

    /// Register host extension functions, mixed into every compile call's
    /// bridge. Bump `cache_version` in the config when their behavior
    /// changes: the cache key cannot see into closures.
    pub fn with_functions(mut self, functions: ExtraFunctions) -> Self {
        self.functions = functions;
        self
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// The options this processor would resolve absent any per-call load
    /// paths. Used for the cache key, which must not depend on per-call
    /// state.
    fn static_options(&self) -> Result<ResolvedOptions, ConfigurationError> {
        ResolvedOptions::merge(self.syntax, OutputStyle::Expanded, &[], &self.config)
    }
}

impl Transform for StyleProcessor {
    fn cache_key(&self) -> &str {
        self.cache_key.get_or_init(|| {
            // Merge validation happens again (and fails properly) inside
            // call(); for the key a rejected config hashes as empty options.
            let options = self.static_options().unwrap_or(ResolvedOptions {
                syntax: self.syntax,
                style: OutputStyle::Expanded,
                source_map: true,
                load_paths: Vec::new(),
                custom: Default::default(),
            });
            cache_key(
                self.identity,
                PROTOCOL_VERSION,
                self.backend.version(),
                &options,
                self.config.cache_version.as_deref(),
            )
        })
    }

    fn call(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let options = ResolvedOptions::merge(
            self.syntax,
            OutputStyle::Expanded,
            input.environment.load_paths(),
            &self.config,
        )?;
        let url = source_url(input.filename)?;
        let bridge = FunctionBridge::new(input.environment, &self.functions);

        tracing::debug!(
            filename = %input.filename,
            syntax = %options.syntax,
            style = %options.style,
            load_paths = options.load_paths.len(),
            "compiling stylesheet"
        );

        let output = self.backend.compile(BackendRequest {
            source: input.data,
            syntax: options.syntax,
            url: &url,
            load_paths: &options.load_paths,
            style: options.style,
            source_map: options.source_map,
            custom: &options.custom,
            functions: Some(&bridge),
        })?;

        let map = match output.source_map {
            Some(json) => {
                let fresh = SourceMap::from_json(&json)?;
                let normalized = source_map::normalize(fresh, input.filename);
                Some(source_map::combine(input.prior_map.as_ref(), normalized)?)
            }
            // Backend produced no map (disabled or unsupported): prior
            // stage metadata passes through untouched.
            None => input.prior_map,
        };

        let mut deps = BTreeSet::new();
        let loaded_paths = dependencies::collect(&output.loaded_urls, &mut deps);
        deps.extend(bridge.take_recorded());

        Ok(StageOutput {
            data: output.css,
            map,
            dependencies: deps,
            loaded_paths,
        })
    }
}

/// The reduced invocation path: parses already-compiled CSS and re-emits it
/// minified. No function bridge and no dependency collection, just
/// option pass-through minification with its own cache key.
pub struct SassCompressor {
    backend: Arc<dyn CompilerBackend>,
    config: StageConfig,
    cache_key: OnceLock<String>,
}

impl std::fmt::Debug for SassCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SassCompressor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SassCompressor {
    const IDENTITY: &'static str = "sassline.SassCompressor";

    pub fn new(backend: Arc<dyn CompilerBackend>) -> Self {
        Self::with_config(backend, StageConfig::default())
    }

    /// Compressor with overridden defaults, e.g. `style: expanded` to turn
    /// the stage into a formatting pass.
    pub fn with_config(backend: Arc<dyn CompilerBackend>, config: StageConfig) -> Self {
        Self {
            backend,
            config,
            cache_key: OnceLock::new(),
        }
    }

    fn static_options(&self) -> Result<ResolvedOptions, ConfigurationError> {
        ResolvedOptions::merge(Syntax::Css, OutputStyle::Compressed, &[], &self.config)
    }
}

impl Transform for SassCompressor {
    fn cache_key(&self) -> &str {
        self.cache_key.get_or_init(|| {
            let options = self.static_options().unwrap_or(ResolvedOptions {
                syntax: Syntax::Css,
                style: OutputStyle::Compressed,
                source_map: true,
                load_paths: Vec::new(),
                custom: Default::default(),
            });
            cache_key(
                Self::IDENTITY,
                PROTOCOL_VERSION,
                self.backend.version(),
                &options,
                self.config.cache_version.as_deref(),
            )
        })
    }

    fn call(&self, input: StageInput<'_>) -> Result<StageOutput> {
        let options = self.static_options()?;
        let url = source_url(input.filename)?;

        tracing::debug!(filename = %input.filename, style = %options.style, "minifying css");

        let output = self.backend.compile(BackendRequest {
            source: input.data,
            syntax: options.syntax,
            url: &url,
            load_paths: &options.load_paths,
            style: options.style,
            source_map: options.source_map,
            custom: &options.custom,
            functions: None,
        })?;

        let map = match output.source_map {
            Some(json) => {
                let fresh = SourceMap::from_json(&json)?;
                let normalized = source_map::normalize(fresh, input.filename);
                Some(source_map::combine(input.prior_map.as_ref(), normalized)?)
            }
            None => input.prior_map,
        };

        Ok(StageOutput {
            data: output.css,
            map,
            dependencies: BTreeSet::new(),
            loaded_paths: BTreeSet::new(),
        })
    }
}

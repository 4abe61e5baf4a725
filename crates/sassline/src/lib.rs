//! # sassline
//!
//! A Sass/SCSS compile-and-integrate stage for asset pipelines.
//!
//! sassline sits between a host asset pipeline and an external style
//! compiler. Per compile call it:
//! - merges typed options (fixed defaults ← per-call ← static config, with
//!   load paths concatenated, caller paths first),
//! - invokes the compiler backend exactly once through the
//!   [`CompilerBackend`] seam, wiring in a [`FunctionBridge`] of host
//!   callables (`asset_path`, `image_url`, `asset_data_uri`, ...),
//! - combines the freshly produced source map with any map from earlier
//!   transform stages so traces resolve to the originally authored source,
//! - converts the backend's file-load reports into content-addressed
//!   dependency URIs for incremental invalidation,
//! - and exposes a memoized cache key derived from processor identity,
//!   backend version, and the full option set.
//!
//! The style language itself lives behind the backend seam; see the
//! `sassline-grass` crate for a concrete backend.
//!
//! ## Example
//!
//! ```text
//! use sassline::{StageConfig, StageInput, StyleProcessor, Transform};
//!
//! let processor = StyleProcessor::scss(backend, StageConfig::default());
//! let output = processor.call(StageInput {
//!     data: ".a { color: red; }",
//!     filename: "styles/app.scss".into(),
//!     prior_map: None,
//!     environment: &env,
//! })?;
//!
//! println!("css: {}", output.data);
//! println!("cache key: {}", processor.cache_key());
//! ```

pub mod backend;
pub mod cache_key;
pub mod dependencies;
pub mod error;
pub mod functions;
pub mod options;
pub mod processor;
pub mod source_map;

pub use backend::{BackendOutput, BackendRequest, CompilerBackend};
pub use cache_key::PROTOCOL_VERSION;
pub use error::{BackendError, ConfigurationError, ResolutionError, Result, StageError};
pub use functions::{
    AssetKind, Environment, ExtraFunction, ExtraFunctions, FunctionBridge, FunctionSpec,
    SassString, FUNCTION_TABLE,
};
pub use options::{OutputStyle, ResolvedOptions, StageConfig, Syntax};
pub use processor::{
    content_type, Registration, SassCompressor, StageInput, StageKind, StageOutput,
    StyleProcessor, Transform, REGISTRATIONS,
};
pub use source_map::{SourceMap, SourceMapError};

//! Typed compile options and the merge policy.
//!
//! Options are merged from three layers: fixed defaults (source-map on,
//! style per use-case, syntax fixed by the processor variant), overridden by
//! caller-supplied per-call options, overridden by processor-wide static
//! configuration. The exception is list-valued load paths, which are
//! concatenated rather than replaced: per-call paths are searched before
//! statically configured ones, so callers can add search paths without
//! losing environment-wide defaults.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;

use crate::error::ConfigurationError;

/// Input syntax of a compile call. Fixed by the processor variant, never
/// chosen dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    /// Whitespace-significant (`.sass`) syntax.
    Indented,
    /// Brace/semicolon-significant (`.scss`) syntax.
    Scss,
    /// Already-compiled CSS; parse and re-emit only.
    Css,
}

impl Syntax {
    pub fn as_str(self) -> &'static str {
        match self {
            Syntax::Indented => "indented",
            Syntax::Scss => "scss",
            Syntax::Css => "css",
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output style requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStyle {
    Expanded,
    Compressed,
}

impl OutputStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputStyle::Expanded => "expanded",
            OutputStyle::Compressed => "compressed",
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor-wide static configuration, frozen at processor construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageConfig {
    /// Override the variant's default output style.
    pub style: Option<OutputStyle>,
    /// Override source-map emission (on by default).
    pub source_map: Option<bool>,
    /// Search paths appended after caller/environment paths.
    pub load_paths: Vec<Utf8PathBuf>,
    /// Escape hatch: opaque key-value overrides passed through to the
    /// backend. Keys that shadow a typed field are rejected at merge time.
    pub custom: BTreeMap<String, String>,
    /// Caller-supplied cache version token, used to force a cache change
    /// after host-side function implementations change.
    pub cache_version: Option<String>,
}

/// Keys the typed fields already cover. A custom override re-binding one of
/// these would silently contradict the typed configuration, so it is an
/// error instead.
const RESERVED_KEYS: &[&str] = &[
    "syntax",
    "style",
    "source-map",
    "load-path",
    "load-paths",
    "url",
    "functions",
];

/// The per-call merge result handed to the backend.
///
/// Field order is part of the cache-key contract: the option digest hashes
/// fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedOptions {
    pub syntax: Syntax,
    pub style: OutputStyle,
    pub source_map: bool,
    pub load_paths: Vec<Utf8PathBuf>,
    pub custom: BTreeMap<String, String>,
}

impl ResolvedOptions {
    /// Merge the three option layers for one compile call.
    ///
    /// `syntax` and `default_style` come from the processor variant,
    /// `call_load_paths` from the caller/environment, and `config` is the
    /// processor-wide static configuration.
    pub fn merge(
        syntax: Syntax,
        default_style: OutputStyle,
        call_load_paths: &[Utf8PathBuf],
        config: &StageConfig,
    ) -> Result<Self, ConfigurationError> {
        for key in config.custom.keys() {
            let normalized = key.replace('_', "-");
            if RESERVED_KEYS.contains(&normalized.as_str()) {
                return Err(ConfigurationError::new(format!(
                    "custom override `{key}` shadows a typed option; set the typed field instead"
                )));
            }
        }

        let mut load_paths = Vec::with_capacity(call_load_paths.len() + config.load_paths.len());
        load_paths.extend(call_load_paths.iter().cloned());
        load_paths.extend(config.load_paths.iter().cloned());

        Ok(Self {
            syntax,
            style: config.style.unwrap_or(default_style),
            source_map: config.source_map.unwrap_or(true),
            load_paths,
            custom: config.custom.clone(),
        })
    }
}

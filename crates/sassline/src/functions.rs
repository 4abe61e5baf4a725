//! The function bridge: host-side callables the backend can invoke
//! mid-compilation.
//!
//! The callable surface is a statically declared table with one `*_path` /
//! `*_url` pair per asset category plus the `data:` URI variants, so the
//! contract is checked at compile time instead of discovered by runtime
//! reflection. The bridge itself is rebuilt per compile call, capturing the
//! host environment and a private dependency sink; the table's shape is
//! fixed for the process lifetime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use url::Url;

use crate::error::{ConfigurationError, ResolutionError, StageError};

/// Asset categories the per-category resolvers pass as type hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// No type hint; the host resolves by extension or convention.
    Generic,
    Image,
    Video,
    Audio,
    Font,
    Javascript,
    Stylesheet,
}

impl AssetKind {
    /// The hint string handed to the host's resolution service, if any.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            AssetKind::Generic => None,
            AssetKind::Image => Some("image"),
            AssetKind::Video => Some("video"),
            AssetKind::Audio => Some("audio"),
            AssetKind::Font => Some("font"),
            AssetKind::Javascript => Some("javascript"),
            AssetKind::Stylesheet => Some("stylesheet"),
        }
    }
}

/// The host environment's asset-resolution service.
///
/// Errors from these methods propagate unmodified through the compile call,
/// aborting that compilation.
pub trait Environment: Send + Sync {
    /// Resolve a logical asset path (query/fragment already stripped) to its
    /// final public path.
    fn asset_path(&self, logical_path: &str, kind: AssetKind) -> Result<String, ResolutionError>;

    /// Resolve a logical asset path to a `data:` URI embedding its content.
    fn asset_data_uri(&self, logical_path: &str) -> Result<String, ResolutionError>;

    /// Environment-wide stylesheet search paths, searched before any
    /// statically configured ones.
    fn load_paths(&self) -> &[Utf8PathBuf];
}

/// A string value crossing the bridge.
///
/// The style language distinguishes bare strings from `url(...)` literals at
/// the call site, so quoted and unquoted forms are deliberately distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SassString {
    pub text: String,
    pub quoted: bool,
}

impl SassString {
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }
}

/// What a built-in bridge function does with its resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    /// Return the resolved public path as a quoted string.
    Path(AssetKind),
    /// Return an unquoted `url(...)` literal around the resolved path.
    WrappedUrl(AssetKind),
    /// Return a `data:` URI as a quoted string.
    DataUri,
    /// Return an unquoted `url(...)` literal around a `data:` URI.
    DataUrl,
}

/// One entry of the static callable table.
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub parameters: &'static [&'static str],
    operation: Operation,
}

impl FunctionSpec {
    /// The signature string advertised to the backend, e.g.
    /// `asset_path($path)`.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.parameters.join(", "))
    }
}

impl fmt::Display for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// The declared callable surface: a path/url pair per asset category plus
/// the data-URI variants.
pub static FUNCTION_TABLE: &[FunctionSpec] = &[
    FunctionSpec { name: "asset_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Generic) },
    FunctionSpec { name: "asset_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Generic) },
    FunctionSpec { name: "image_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Image) },
    FunctionSpec { name: "image_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Image) },
    FunctionSpec { name: "video_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Video) },
    FunctionSpec { name: "video_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Video) },
    FunctionSpec { name: "audio_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Audio) },
    FunctionSpec { name: "audio_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Audio) },
    FunctionSpec { name: "font_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Font) },
    FunctionSpec { name: "font_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Font) },
    FunctionSpec { name: "javascript_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Javascript) },
    FunctionSpec { name: "javascript_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Javascript) },
    FunctionSpec { name: "stylesheet_path", parameters: &["$path"], operation: Operation::Path(AssetKind::Stylesheet) },
    FunctionSpec { name: "stylesheet_url", parameters: &["$path"], operation: Operation::WrappedUrl(AssetKind::Stylesheet) },
    FunctionSpec { name: "asset_data_uri", parameters: &["$path"], operation: Operation::DataUri },
    FunctionSpec { name: "asset_data_url", parameters: &["$path"], operation: Operation::DataUrl },
];

/// A host-registered extension function, mixed into the bridge alongside the
/// built-in table. Extensions shadow built-ins of the same name.
pub struct ExtraFunction {
    pub parameters: Vec<String>,
    #[allow(clippy::type_complexity)]
    pub callable: Box<
        dyn Fn(&FunctionBridge<'_>, &[SassString]) -> Result<SassString, StageError> + Send + Sync,
    >,
}

impl fmt::Debug for ExtraFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraFunction")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Host-registered extension functions keyed by name.
pub type ExtraFunctions = BTreeMap<String, ExtraFunction>;

/// One compile call's binding of the callable table to the host environment.
///
/// Path resolution itself records nothing in the dependency sink; the sink
/// exists so extension functions that do touch files can report them.
pub struct FunctionBridge<'a> {
    environment: &'a dyn Environment,
    extra: &'a ExtraFunctions,
    recorded: Mutex<BTreeSet<Url>>,
}

impl fmt::Debug for FunctionBridge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBridge")
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<'a> FunctionBridge<'a> {
    pub fn new(environment: &'a dyn Environment, extra: &'a ExtraFunctions) -> Self {
        Self {
            environment,
            extra,
            recorded: Mutex::new(BTreeSet::new()),
        }
    }

    /// The signatures advertised to the backend, built-ins first.
    pub fn signatures(&self) -> Vec<String> {
        FUNCTION_TABLE
            .iter()
            .filter(|spec| !self.extra.contains_key(spec.name))
            .map(FunctionSpec::signature)
            .chain(self.extra.iter().map(|(name, function)| {
                format!("{name}({})", function.parameters.join(", "))
            }))
            .collect()
    }

    /// Invoke a callable by name. Unknown names and arity mismatches are
    /// configuration errors: they indicate a backend advertising a table
    /// this bridge never declared.
    pub fn invoke(&self, name: &str, args: &[SassString]) -> Result<SassString, StageError> {
        if let Some(function) = self.extra.get(name) {
            if args.len() != function.parameters.len() {
                return Err(arity_error(name, function.parameters.len(), args.len()));
            }
            return (function.callable)(self, args);
        }

        let spec = FUNCTION_TABLE
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ConfigurationError::new(format!("unknown bridge function `{name}`")))?;
        if args.len() != spec.parameters.len() {
            return Err(arity_error(name, spec.parameters.len(), args.len()));
        }

        let path = &args[0].text;
        match spec.operation {
            Operation::Path(kind) => self.resolve_path(path, kind),
            Operation::WrappedUrl(kind) => {
                let resolved = self.resolve_path(path, kind)?;
                Ok(SassString::unquoted(format!("url({})", resolved.text)))
            }
            Operation::DataUri => {
                let uri = self.environment.asset_data_uri(path)?;
                Ok(SassString::quoted(uri))
            }
            Operation::DataUrl => {
                let uri = self.environment.asset_data_uri(path)?;
                Ok(SassString::unquoted(format!("url({uri})")))
            }
        }
    }

    /// The host environment this bridge is bound to, for extension
    /// functions.
    pub fn environment(&self) -> &dyn Environment {
        self.environment
    }

    /// Record an additional build dependency discovered while a callable
    /// executed. Set semantics; recording twice has no further effect.
    pub fn record_dependency(&self, url: Url) {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(url);
    }

    /// Drain the dependencies recorded during this call.
    pub fn take_recorded(&self) -> BTreeSet<Url> {
        std::mem::take(
            &mut *self
                .recorded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Resolve a logical path, preserving any query string and fragment
    /// unchanged across the resolution. This applies uniformly to every
    /// category resolver.
    fn resolve_path(&self, logical: &str, kind: AssetKind) -> Result<SassString, StageError> {
        let (bare, query, fragment) = split_query_fragment(logical);
        let resolved = self.environment.asset_path(bare, kind)?;
        Ok(SassString::quoted(format!("{resolved}{query}{fragment}")))
    }
}

fn arity_error(name: &str, expected: usize, got: usize) -> StageError {
    ConfigurationError::new(format!(
        "bridge function `{name}` takes {expected} argument(s), got {got}"
    ))
    .into()
}

/// Split `path?query#fragment` into its parts, keeping the `?` and `#`
/// delimiters attached so reassembly is plain concatenation.
fn split_query_fragment(path: &str) -> (&str, &str, &str) {
    let (rest, fragment) = match path.find('#') {
        Some(i) => path.split_at(i),
        None => (path, ""),
    };
    let (bare, query) = match rest.find('?') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    (bare, query, fragment)
}

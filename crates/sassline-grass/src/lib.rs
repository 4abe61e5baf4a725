//! grass-backed [`CompilerBackend`] for sassline.
//!
//! grass compiles Sass/SCSS in-process, so there is no sidecar transport
//! here: the request maps straight onto `grass::Options` and the compiler
//! runs on the calling thread. File loads are observed through a
//! [`grass::Fs`] wrapper so the stage's dependency collector sees every
//! stylesheet the compiler actually read.
//!
//! Two limitations of grass surface here, both reported rather than hidden:
//! it emits no source map (`BackendOutput::source_map` is always `None`, so
//! the stage passes any prior map through untouched), and it has no stable
//! public API for injected functions, so a non-empty function table is
//! logged as a warning and the asset helpers are unavailable in
//! stylesheets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sassline::{BackendError, BackendOutput, BackendRequest, CompilerBackend, OutputStyle, Syntax};
use url::Url;

/// The grass release this backend is built against. Participates in cache
/// keys, so the workspace pins the dependency to exactly this version; a
/// test asserts the two stay in lockstep.
const GRASS_VERSION: &str = "grass/0.13.4";

/// A [`CompilerBackend`] running the grass compiler in-process.
#[derive(Debug, Default)]
pub struct GrassBackend {}

impl GrassBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompilerBackend for GrassBackend {
    fn version(&self) -> &str {
        GRASS_VERSION
    }

    fn compile(&self, request: BackendRequest<'_>) -> Result<BackendOutput, BackendError> {
        if let Some(bridge) = request.functions {
            let signatures = bridge.signatures();
            if !signatures.is_empty() {
                tracing::warn!(
                    functions = signatures.len(),
                    "grass does not support injected functions; asset helpers are unavailable"
                );
            }
        }

        let fs = LoadTrackingFs::new();
        let mut options = grass::Options::default()
            .fs(&fs)
            .input_syntax(match request.syntax {
                Syntax::Indented => grass::InputSyntax::Sass,
                Syntax::Scss => grass::InputSyntax::Scss,
                Syntax::Css => grass::InputSyntax::Css,
            })
            .style(match request.style {
                OutputStyle::Expanded => grass::OutputStyle::Expanded,
                OutputStyle::Compressed => grass::OutputStyle::Compressed,
            });
        for path in request.load_paths {
            options = options.load_path(path.as_std_path().to_path_buf());
        }

        let result = grass::from_string(request.source.to_string(), &options);
        drop(options);
        let css = result.map_err(|e| BackendError::message(e.to_string()))?;

        let loaded_urls = fs
            .into_loaded()
            .into_iter()
            .filter_map(|path| file_url(&path))
            .collect();

        Ok(BackendOutput {
            css,
            source_map: None,
            loaded_urls,
        })
    }
}

fn file_url(path: &Path) -> Option<Url> {
    let absolute = std::path::absolute(path).ok()?;
    Url::from_file_path(absolute).ok()
}

/// Delegates to the real filesystem while recording every file read, so the
/// compiler's own load behavior drives dependency tracking.
#[derive(Debug)]
struct LoadTrackingFs {
    loaded: Mutex<BTreeSet<PathBuf>>,
}

impl LoadTrackingFs {
    fn new() -> Self {
        Self {
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    fn into_loaded(self) -> BTreeSet<PathBuf> {
        self.loaded.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

impl grass::Fs for LoadTrackingFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let contents = std::fs::read(path)?;
        self.loaded
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_path_buf());
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_the_exact_dependency_pin() {
        let manifest = include_str!("../../../Cargo.toml");
        let pin = manifest
            .lines()
            .find(|line| line.trim_start().starts_with("grass"))
            .expect("workspace manifest must declare the grass dependency");
        let pinned = pin
            .split('"')
            .nth(1)
            .expect("grass dependency must carry a version string");
        assert!(
            pinned.starts_with('='),
            "grass must be pinned exactly, found `{pinned}`: the version feeds cache keys"
        );
        assert_eq!(
            GrassBackend::new().version(),
            format!("grass/{}", pinned.trim_start_matches('=')),
            "GRASS_VERSION must match the pinned dependency version"
        );
    }

    #[test]
    fn file_url_requires_a_representable_path() {
        let url = file_url(Path::new("/srv/styles/_mixins.scss")).unwrap();
        assert_eq!(url.as_str(), "file:///srv/styles/_mixins.scss");
    }

    #[test]
    fn tracking_fs_records_reads_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.scss");
        std::fs::write(&file, "a { color: red; }").unwrap();

        let fs = LoadTrackingFs::new();
        assert!(grass::Fs::is_file(&fs, &file));
        assert!(grass::Fs::is_dir(&fs, dir.path()));
        assert!(fs.loaded.lock().unwrap().is_empty());

        grass::Fs::read(&fs, &file).unwrap();
        grass::Fs::read(&fs, &file).unwrap();
        assert_eq!(fs.into_loaded().len(), 1);
    }
}

//! End-to-end compilation through the stage with the real grass compiler.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use url::Url;

use sassline::{
    AssetKind, Environment, OutputStyle, ResolutionError, SassCompressor, StageConfig, StageError,
    StageInput, StyleProcessor, Transform,
};
use sassline_grass::GrassBackend;

struct FixtureEnv {
    roots: Vec<Utf8PathBuf>,
}

impl FixtureEnv {
    fn new() -> Self {
        Self { roots: Vec::new() }
    }

    fn with_root(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }
}

impl Environment for FixtureEnv {
    fn asset_path(&self, logical_path: &str, _kind: AssetKind) -> Result<String, ResolutionError> {
        Ok(format!("/assets/{logical_path}"))
    }

    fn asset_data_uri(&self, logical_path: &str) -> Result<String, ResolutionError> {
        Ok(format!("data:;base64,{logical_path}"))
    }

    fn load_paths(&self) -> &[Utf8PathBuf] {
        &self.roots
    }
}

fn backend() -> Arc<GrassBackend> {
    Arc::new(GrassBackend::new())
}

#[test]
fn compiles_indented_syntax() {
    let processor = StyleProcessor::sass(backend(), StageConfig::default());
    let env = FixtureEnv::new();

    let output = processor
        .call(StageInput {
            data: "html\n  font-size: 1rem",
            filename: "styles.sass".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert_eq!(output.data.trim_end(), "html {\n  font-size: 1rem;\n}");
}

#[test]
fn compiles_braced_syntax() {
    let processor = StyleProcessor::scss(backend(), StageConfig::default());
    let env = FixtureEnv::new();

    let output = processor
        .call(StageInput {
            data: ".a { .b { color: red; } }",
            filename: "styles.scss".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert!(output.data.contains(".a .b"));
}

#[test]
fn compressor_minifies_plain_css() {
    let compressor = SassCompressor::new(backend());
    let env = FixtureEnv::new();

    let output = compressor
        .call(StageInput {
            data: ".a {\n  color: red;\n}\n",
            filename: "bundle.css".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert_eq!(output.data.trim_end(), ".a{color:red}");
}

#[test]
fn style_override_changes_output_and_cache_key() {
    let compressed = SassCompressor::new(backend());
    let expanded = SassCompressor::with_config(
        backend(),
        StageConfig {
            style: Some(OutputStyle::Expanded),
            ..Default::default()
        },
    );
    assert_ne!(compressed.cache_key(), expanded.cache_key());

    let env = FixtureEnv::new();
    let output = expanded
        .call(StageInput {
            data: ".a{color:red}",
            filename: "bundle.css".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert_eq!(output.data.trim_end(), ".a {\n  color: red;\n}");
}

#[test]
fn imported_files_become_content_addressed_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    std::fs::write(root.join("_palette.scss"), "$accent: #cc0000;\n").unwrap();

    let processor = StyleProcessor::scss(backend(), StageConfig::default());
    let env = FixtureEnv::with_root(root.clone());

    let output = processor
        .call(StageInput {
            data: "@import \"palette\";\na { color: $accent; }",
            filename: "main.scss".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert!(output.data.contains("#cc0000"));

    let expected_path = root.join("_palette.scss");
    assert!(
        output
            .loaded_paths
            .iter()
            .any(|p| p.as_str().ends_with("_palette.scss")),
        "loaded paths should include the import, got {:?}",
        output.loaded_paths
    );
    let digest_urls: Vec<&Url> = output.dependencies.iter().collect();
    assert!(
        digest_urls
            .iter()
            .any(|u| u.scheme() == "file-digest" && u.path().ends_with("_palette.scss")),
        "dependencies should reference {expected_path} as file-digest, got {digest_urls:?}"
    );
}

#[test]
fn static_load_paths_resolve_imports_too() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    std::fs::write(root.join("_shared.scss"), ".shared { margin: 0; }\n").unwrap();

    let processor = StyleProcessor::scss(
        backend(),
        StageConfig {
            load_paths: vec![root],
            ..Default::default()
        },
    );
    let env = FixtureEnv::new();

    let output = processor
        .call(StageInput {
            data: "@import \"shared\";",
            filename: "main.scss".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert!(output.data.contains(".shared"));
}

#[test]
fn syntax_errors_surface_as_backend_errors() {
    let processor = StyleProcessor::scss(backend(), StageConfig::default());
    let env = FixtureEnv::new();

    let err = processor
        .call(StageInput {
            data: ".a { color: ",
            filename: "broken.scss".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap_err();
    assert!(matches!(err, StageError::Backend(_)));
}

#[test]
fn custom_overrides_do_not_disturb_compilation() {
    let processor = StyleProcessor::scss(
        backend(),
        StageConfig {
            custom: BTreeMap::from([("charset".to_string(), "false".to_string())]),
            ..Default::default()
        },
    );
    let env = FixtureEnv::new();

    let output = processor
        .call(StageInput {
            data: "a { color: red; }",
            filename: "main.scss".into(),
            prior_map: None,
            environment: &env,
        })
        .unwrap();
    assert!(output.data.contains("color: red"));
}

#[test]
fn cache_key_is_stable_across_instances_with_identical_config() {
    let a = StyleProcessor::scss(backend(), StageConfig::default());
    let b = StyleProcessor::scss(backend(), StageConfig::default());
    assert_eq!(a.cache_key(), b.cache_key());
}

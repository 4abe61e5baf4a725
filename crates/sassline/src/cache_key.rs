//! Cache-key derivation.
//!
//! The host pipeline caches compiled output under a compound key: a digest of
//! the input content (owned by the host) alongside the identity string built
//! here. The identity must change whenever anything that could change the
//! output changes (processor, protocol, backend version, or any recognized
//! option), and is computed without ever reading the input. False cache
//! misses are acceptable; false hits are not.

use std::hash::{Hash, Hasher};

use rapidhash::fast::RapidHasher;

use crate::options::ResolvedOptions;

/// Version of the stage's own output contract. Bumped when the shape of the
/// stage's output changes in a way that invalidates cached results.
pub const PROTOCOL_VERSION: &str = "1";

/// Derive the cache key for one processor configuration.
///
/// Pure and deterministic: identical inputs always produce the identical
/// key, and upgrading the backend invalidates all previously cached output
/// without content rehashing. Never fails: options are fully typed, so
/// every value is representable in the digest.
pub fn cache_key(
    processor_identity: &str,
    protocol_version: &str,
    backend_version: &str,
    options: &ResolvedOptions,
    cache_version: Option<&str>,
) -> String {
    let mut key = format!(
        "{processor_identity}:{protocol_version}:{backend_version}:{}",
        options_digest(options)
    );
    if let Some(version) = cache_version {
        key.push(':');
        key.push_str(version);
    }
    key
}

/// Digest of a resolved option set, hashed in declaration order.
pub fn options_digest(options: &ResolvedOptions) -> String {
    let mut hasher = RapidHasher::default();
    options.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OutputStyle, StageConfig, Syntax};

    fn options(style: OutputStyle) -> ResolvedOptions {
        ResolvedOptions::merge(
            Syntax::Scss,
            style,
            &["app/styles".into()],
            &StageConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn identical_configuration_yields_identical_key() {
        let a = cache_key("scss", PROTOCOL_VERSION, "1.0.0", &options(OutputStyle::Expanded), None);
        let b = cache_key("scss", PROTOCOL_VERSION, "1.0.0", &options(OutputStyle::Expanded), None);
        assert_eq!(a, b);
    }

    #[test]
    fn any_option_change_changes_the_key() {
        let expanded = options(OutputStyle::Expanded);
        let compressed = options(OutputStyle::Compressed);
        assert_ne!(
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &expanded, None),
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &compressed, None),
        );

        let mut reordered = expanded.clone();
        reordered.load_paths.push("vendor/styles".into());
        assert_ne!(
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &expanded, None),
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &reordered, None),
        );

        let mut custom = expanded.clone();
        custom.custom.insert("charset".into(), "false".into());
        assert_ne!(
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &expanded, None),
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &custom, None),
        );
    }

    #[test]
    fn backend_version_and_cache_version_participate() {
        let opts = options(OutputStyle::Expanded);
        assert_ne!(
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &opts, None),
            cache_key("scss", PROTOCOL_VERSION, "1.1.0", &opts, None),
        );
        assert_ne!(
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &opts, None),
            cache_key("scss", PROTOCOL_VERSION, "1.0.0", &opts, Some("v2")),
        );
    }

    #[test]
    fn key_shape_is_colon_joined() {
        let opts = options(OutputStyle::Expanded);
        let key = cache_key("sass", "1", "1.0.0", &opts, Some("custom"));
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "sass");
        assert_eq!(parts[1], "1");
        assert_eq!(parts[2], "1.0.0");
        assert_eq!(parts[3], options_digest(&opts));
        assert_eq!(parts[4], "custom");
    }
}

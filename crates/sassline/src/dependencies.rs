//! Build-dependency collection from the backend's file-load reports.
//!
//! The backend reports every URL it loaded while compiling. Only local
//! `file://` URIs become build dependencies; other schemes (package URIs,
//! data URIs) are not independently watchable files. Surviving URIs are
//! converted to the host's content-addressed `file-digest://` form so the
//! host invalidates on content change, not timestamp change.

use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use url::Url;

/// Scheme of the host's canonical, content-addressed dependency URIs.
pub const FILE_DIGEST_SCHEME: &str = "file-digest";

/// Convert a `file://` URL to its `file-digest://` dependency form.
/// Any query or fragment is dropped; only the path identifies the file.
pub fn file_digest_url(file_url: &Url) -> Option<Url> {
    if file_url.scheme() != "file" {
        return None;
    }
    Url::parse(&format!("{FILE_DIGEST_SCHEME}://{}", file_url.path())).ok()
}

/// Merge the backend's loaded URLs into `dependencies` (set semantics, so
/// repeated reports are no-ops) and return the set of local filesystem paths
/// that were loaded.
pub fn collect(loaded_urls: &[Url], dependencies: &mut BTreeSet<Url>) -> BTreeSet<Utf8PathBuf> {
    let mut loaded_paths = BTreeSet::new();
    for url in loaded_urls {
        let Some(digest_url) = file_digest_url(url) else {
            tracing::debug!(%url, "skipping non-file load report");
            continue;
        };
        loaded_paths.insert(Utf8PathBuf::from(url.path()));
        dependencies.insert(digest_url);
    }
    loaded_paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn keeps_file_uris_only() {
        let loaded = vec![
            url("file:///a.scss"),
            url("file:///b.scss"),
            url("pkg://something"),
            url("data:text/css,a{}"),
        ];
        let mut deps = BTreeSet::new();
        let paths = collect(&loaded, &mut deps);

        assert_eq!(
            deps,
            BTreeSet::from([
                url("file-digest:///a.scss"),
                url("file-digest:///b.scss"),
            ])
        );
        assert_eq!(
            paths,
            BTreeSet::from([Utf8PathBuf::from("/a.scss"), Utf8PathBuf::from("/b.scss")])
        );
    }

    #[test]
    fn duplicate_reports_are_idempotent() {
        let loaded = vec![url("file:///a.scss"), url("file:///a.scss")];
        let mut deps = BTreeSet::new();
        collect(&loaded, &mut deps);
        assert_eq!(deps.len(), 1);

        // A second collection pass adds nothing either.
        collect(&loaded, &mut deps);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn merges_into_existing_set() {
        let mut deps = BTreeSet::from([url("file-digest:///earlier-stage.scss")]);
        collect(&[url("file:///a.scss")], &mut deps);
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn digest_form_drops_query_and_fragment() {
        let converted = file_digest_url(&url("file:///a.scss?type=text/css#frag")).unwrap();
        assert_eq!(converted.as_str(), "file-digest:///a.scss");
        assert!(file_digest_url(&url("pkg://x/y")).is_none());
    }
}

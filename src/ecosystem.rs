//! Per-ecosystem proxy policy.
//!
//! Each frontend (NPM, RubyGems, PyPI) is the same caching engine
//! parameterized by the rules collected here: which requests are artifact
//! downloads, how an upstream path maps to a cache key, where the artifact
//! is actually fetched from, and how metadata responses are rewritten so
//! clients come back to the proxy for their downloads.

/// PyPI package files are hosted on a separate CDN origin.
pub const PYPI_FILES_HOST: &str = "https://files.pythonhosted.org";

/// Artifact extensions served by PyPI, matched case-insensitively.
const PYPI_ARTIFACT_SUFFIXES: &[&str] = &[".whl", ".tar.gz", ".zip", ".egg", ".tar.bz2"];

/// How metadata responses are rewritten on the proxy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewritePolicy {
    /// Pass responses through untouched.
    None,
    /// Non-tarball JSON responses: substitute the upstream origin with the
    /// proxy's listen address.
    NpmJson,
    /// `/simple/` HTML/JSON responses: substitute the files CDN origin with
    /// the requesting client's host, decoding gzip transparently.
    PypiSimple,
}

/// A supported package ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Npm,
    RubyGems,
    PyPi,
}

impl Ecosystem {
    /// Short lowercase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::RubyGems => "rubygems",
            Self::PyPi => "pypi",
        }
    }

    /// Title shown on the operator dashboard.
    pub fn dashboard_title(&self) -> &'static str {
        match self {
            Self::Npm => "Registry Cache for NPM",
            Self::RubyGems => "Registry Cache for RubyGems",
            Self::PyPi => "Registry Cache for PyPI",
        }
    }

    /// Canonical public registry origin.
    pub fn default_upstream(&self) -> &'static str {
        match self {
            Self::Npm => "https://registry.npmjs.org",
            Self::RubyGems => "https://rubygems.org",
            Self::PyPi => "https://pypi.org",
        }
    }

    /// Default on-disk cache directory.
    pub fn default_cache_dir(&self) -> &'static str {
        match self {
            Self::Npm => "./npm_cache_data",
            Self::RubyGems => "./gem_cache_data",
            Self::PyPi => "./pypi_cache_data",
        }
    }

    /// Whether a GET for `path` is an artifact download. Decided purely on
    /// the path; the cache is never consulted.
    pub fn is_artifact(&self, path: &str) -> bool {
        match self {
            Self::Npm => path.ends_with(".tgz"),
            Self::RubyGems => path.starts_with("/gems/") && path.ends_with(".gem"),
            Self::PyPi => {
                let lower = path.to_ascii_lowercase();
                PYPI_ARTIFACT_SUFFIXES
                    .iter()
                    .any(|suffix| lower.ends_with(suffix))
            }
        }
    }

    /// Derive the filename-safe cache key for an artifact path.
    ///
    /// The key is a pure function of the path, contains no `/`, and is
    /// unique per upstream artifact URL.
    pub fn cache_key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match self {
            // Scoped tarball paths look like `@scope/name/-/name-ver.tgz`;
            // the scope prefix keeps the key unique across scopes. Anything
            // else collapses to the tarball basename.
            Self::Npm => {
                if path.starts_with('@') {
                    if let Some((prefix, tail)) = path.split_once("/-/") {
                        let scope = prefix.rsplit_once('/').map_or(prefix, |(scope, _name)| scope);
                        return format!("{}__{}", scope.replace('/', "__"), basename(tail));
                    }
                }
                basename(path).to_string()
            }
            Self::RubyGems => basename(path).to_string(),
            // PyPI paths carry index structure (`packages/py3/f/foo/…`);
            // keep all of it so distinct hosting paths cannot collide.
            Self::PyPi => path.replace('/', "__"),
        }
    }

    /// Build the upstream URL an artifact is fetched from.
    pub fn upstream_url(&self, upstream: &str, path: &str) -> String {
        match self {
            Self::Npm | Self::RubyGems => format!("{}{}", upstream.trim_end_matches('/'), path),
            Self::PyPi => {
                // Package files live on the CDN; everything else falls back
                // to the registry origin.
                if path.starts_with("/packages/") {
                    format!("{PYPI_FILES_HOST}{path}")
                } else {
                    format!("{}{}", upstream.trim_end_matches('/'), path)
                }
            }
        }
    }

    /// Metadata rewrite policy for the transparent proxy path.
    pub fn rewrite_policy(&self) -> RewritePolicy {
        match self {
            Self::Npm => RewritePolicy::NpmJson,
            Self::RubyGems => RewritePolicy::None,
            Self::PyPi => RewritePolicy::PypiSimple,
        }
    }
}

/// Final path segment.
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── classification ───────────────────────────────────────────────

    #[test]
    fn test_npm_classifies_tarballs_only() {
        let eco = Ecosystem::Npm;
        assert!(eco.is_artifact("/lodash/-/lodash-4.17.21.tgz"));
        assert!(eco.is_artifact("/@types/node/-/node-20.10.0.tgz"));
        assert!(!eco.is_artifact("/lodash"));
        assert!(!eco.is_artifact("/-/npm/v1/security/audits"));
    }

    #[test]
    fn test_rubygems_requires_prefix_and_suffix() {
        let eco = Ecosystem::RubyGems;
        assert!(eco.is_artifact("/gems/rails-7.1.0.gem"));
        assert!(!eco.is_artifact("/rails-7.1.0.gem"));
        assert!(!eco.is_artifact("/gems/rails"));
        assert!(!eco.is_artifact("/api/v1/dependencies"));
    }

    #[test]
    fn test_pypi_extensions_case_insensitive() {
        let eco = Ecosystem::PyPi;
        assert!(eco.is_artifact("/packages/py3/f/foo/foo-1.2-py3-none-any.whl"));
        assert!(eco.is_artifact("/packages/py3/f/foo/FOO-1.2.WHL"));
        assert!(eco.is_artifact("/packages/source/f/foo/foo-1.0.Tar.Gz"));
        assert!(eco.is_artifact("/packages/source/f/foo/foo-1.0.zip"));
        assert!(eco.is_artifact("/packages/source/f/foo/foo-1.0.egg"));
        assert!(eco.is_artifact("/packages/source/f/foo/foo-1.0.tar.bz2"));
        assert!(!eco.is_artifact("/simple/requests/"));
    }

    // ── cache keys ───────────────────────────────────────────────────

    #[test]
    fn test_npm_plain_key_is_basename() {
        assert_eq!(
            Ecosystem::Npm.cache_key("/lodash/-/lodash-4.17.21.tgz"),
            "lodash-4.17.21.tgz"
        );
    }

    #[test]
    fn test_npm_scoped_key() {
        assert_eq!(
            Ecosystem::Npm.cache_key("/@types/node/-/node-20.10.0.tgz"),
            "@types__node-20.10.0.tgz"
        );
    }

    #[test]
    fn test_npm_scoped_key_with_nested_scope() {
        // Slashes remaining in the scope prefix become double underscores
        assert_eq!(
            Ecosystem::Npm.cache_key("/@corp/team/pkg/-/pkg-1.0.0.tgz"),
            "@corp__team__pkg-1.0.0.tgz"
        );
    }

    #[test]
    fn test_gem_key_is_basename() {
        assert_eq!(
            Ecosystem::RubyGems.cache_key("/gems/rails-7.1.0.gem"),
            "rails-7.1.0.gem"
        );
    }

    #[test]
    fn test_pypi_key_preserves_index_structure() {
        assert_eq!(
            Ecosystem::PyPi.cache_key("/packages/source/p/pkg/pkg-1.0.tar.gz"),
            "packages__source__p__pkg__pkg-1.0.tar.gz"
        );
    }

    #[test]
    fn test_pypi_wheel_key() {
        assert_eq!(
            Ecosystem::PyPi.cache_key("/packages/py3/f/foo/foo-1.2-py3-none-any.whl"),
            "packages__py3__f__foo__foo-1.2-py3-none-any.whl"
        );
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        for eco in [Ecosystem::Npm, Ecosystem::RubyGems, Ecosystem::PyPi] {
            let path = "/packages/py3/f/foo/foo-1.2-py3-none-any.whl";
            assert_eq!(eco.cache_key(path), eco.cache_key(path));
        }
    }

    #[test]
    fn test_cache_key_has_no_separators() {
        let keys = [
            Ecosystem::Npm.cache_key("/@types/node/-/node-20.10.0.tgz"),
            Ecosystem::RubyGems.cache_key("/gems/rails-7.1.0.gem"),
            Ecosystem::PyPi.cache_key("/packages/source/p/pkg/pkg-1.0.tar.gz"),
        ];
        for key in keys {
            assert!(!key.contains('/'), "key {key} contains a path separator");
        }
    }

    // ── upstream URL construction ────────────────────────────────────

    #[test]
    fn test_npm_upstream_url_appends_path() {
        assert_eq!(
            Ecosystem::Npm.upstream_url(
                "https://registry.npmjs.org",
                "/@types/node/-/node-20.10.0.tgz"
            ),
            "https://registry.npmjs.org/@types/node/-/node-20.10.0.tgz"
        );
    }

    #[test]
    fn test_upstream_url_trims_trailing_slash() {
        assert_eq!(
            Ecosystem::RubyGems.upstream_url("https://rubygems.org/", "/gems/rails-7.1.0.gem"),
            "https://rubygems.org/gems/rails-7.1.0.gem"
        );
    }

    #[test]
    fn test_pypi_packages_go_to_files_host() {
        assert_eq!(
            Ecosystem::PyPi.upstream_url(
                "https://pypi.org",
                "/packages/py3/f/foo/foo-1.2-py3-none-any.whl"
            ),
            "https://files.pythonhosted.org/packages/py3/f/foo/foo-1.2-py3-none-any.whl"
        );
    }

    #[test]
    fn test_pypi_other_paths_use_registry_origin() {
        assert_eq!(
            Ecosystem::PyPi.upstream_url("https://pypi.org", "/simple/requests/"),
            "https://pypi.org/simple/requests/"
        );
    }

    // ── rewrite policy ───────────────────────────────────────────────

    #[test]
    fn test_rewrite_policies() {
        assert_eq!(Ecosystem::Npm.rewrite_policy(), RewritePolicy::NpmJson);
        assert_eq!(Ecosystem::RubyGems.rewrite_policy(), RewritePolicy::None);
        assert_eq!(Ecosystem::PyPi.rewrite_policy(), RewritePolicy::PypiSimple);
    }
}

//! URL scheme of the proxy's tarball endpoint.
//!
//! Tarball URLs handed to npm point back at the proxy and say where the
//! bytes really come from:
//!
//! - local module: `{proxy}/tarballs/{name}?source=local&name={name}`
//! - upstream package: `{proxy}/tarballs/{name}?source=upstream&url={url}`
//!
//! npm records these URLs in lockfiles, so after npm runs they are mapped
//! back to real registry URLs with [`resolve_registry_url`].

use tandem_core::{ModuleName, NpmConfig};
use url::Url;

/// Where a proxied tarball comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TarballSource {
    /// Packed on demand from a local module.
    Local { name: String },
    /// Fetched from (or cached from) an upstream URL.
    Upstream { url: String },
}

fn base(proxy: &str) -> &str {
    proxy.trim_end_matches('/')
}

/// Proxy tarball URL for a local module.
pub fn local_tarball_url(proxy: &str, name: &ModuleName) -> String {
    format!(
        "{}/tarballs/{name}?source=local&name={}",
        base(proxy),
        urlencoding::encode(&name.full())
    )
}

/// Proxy tarball URL standing in for an upstream tarball.
pub fn upstream_tarball_url(proxy: &str, name: &str, upstream: &str) -> String {
    format!(
        "{}/tarballs/{name}?source=upstream&url={}",
        base(proxy),
        urlencoding::encode(upstream)
    )
}

/// Identify the source encoded in a tarball URL's query.
pub fn tarball_source(url: &str) -> Option<TarballSource> {
    let parsed = Url::parse(url).ok()?;
    let mut source = None;
    let mut name = None;
    let mut upstream = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "source" => source = Some(value.into_owned()),
            "name" => name = Some(value.into_owned()),
            "url" => upstream = Some(value.into_owned()),
            _ => {}
        }
    }
    match source.as_deref() {
        Some("local") => name.map(|name| TarballSource::Local { name }),
        Some("upstream") => upstream.map(|url| TarballSource::Upstream { url }),
        _ => None,
    }
}

/// Tarball URL of a package version on a real registry.
pub fn registry_tarball_url(registry: &str, name: &ModuleName, version: &str) -> String {
    format!(
        "{}/{name}/-/{}-{version}.tgz",
        base(registry),
        name.pkg()
    )
}

/// Metadata (packument) URL of a package on a registry.
///
/// Scoped names keep their `@` but have the slash escaped, the way npm
/// requests them.
pub fn registry_metadata_url(registry: &str, name: &str) -> String {
    format!("{}/{}", base(registry), name.replace('/', "%2f"))
}

/// Map a proxy tarball URL back to the URL the package has on its real
/// registry. Other URLs are returned unchanged.
pub fn resolve_registry_url(url: &str, version: &str, npm: &NpmConfig) -> String {
    match tarball_source(url) {
        Some(TarballSource::Local { name }) => match ModuleName::parse(&name) {
            Ok(name) => registry_tarball_url(npm.registry_for(&name), &name, version),
            Err(_) => url.to_string(),
        },
        Some(TarballSource::Upstream { url }) => url,
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXY: &str = "http://127.0.0.1:4873";

    #[test]
    fn local_url_roundtrip() {
        let name = ModuleName::parse("@acme/core").unwrap();
        let url = local_tarball_url(&format!("{PROXY}/"), &name);
        assert_eq!(
            url,
            "http://127.0.0.1:4873/tarballs/@acme/core?source=local&name=%40acme%2Fcore"
        );
        assert_eq!(
            tarball_source(&url),
            Some(TarballSource::Local {
                name: "@acme/core".to_string()
            })
        );
    }

    #[test]
    fn upstream_url_roundtrip() {
        let upstream = "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz?x=1&y=2";
        let url = upstream_tarball_url(PROXY, "left-pad", upstream);
        assert_eq!(
            tarball_source(&url),
            Some(TarballSource::Upstream {
                url: upstream.to_string()
            })
        );
    }

    #[test]
    fn resolve_back_to_registry() {
        let npm = NpmConfig::parse_with(
            "registry=https://registry.npmjs.org/\n@acme:registry=https://npm.acme.io/\n",
            |_| None,
        );
        let local = local_tarball_url(PROXY, &ModuleName::parse("@acme/core").unwrap());
        assert_eq!(
            resolve_registry_url(&local, "2.1.0", &npm),
            "https://npm.acme.io/@acme/core/-/core-2.1.0.tgz"
        );

        let local = local_tarball_url(PROXY, &ModuleName::parse("util").unwrap());
        assert_eq!(
            resolve_registry_url(&local, "1.0.0", &npm),
            "https://registry.npmjs.org/util/-/util-1.0.0.tgz"
        );

        let real = "https://registry.npmjs.org/a/-/a-1.0.0.tgz";
        let proxied = upstream_tarball_url(PROXY, "a", real);
        assert_eq!(resolve_registry_url(&proxied, "1.0.0", &npm), real);
        assert_eq!(resolve_registry_url(real, "1.0.0", &npm), real);
    }

    #[test]
    fn metadata_urls() {
        assert_eq!(
            registry_metadata_url("https://registry.npmjs.org/", "@types/node"),
            "https://registry.npmjs.org/@types%2fnode"
        );
        assert_eq!(
            registry_metadata_url("https://r.io/npm", "left-pad"),
            "https://r.io/npm/left-pad"
        );
    }

    #[test]
    fn unrelated_query_is_not_a_source() {
        assert_eq!(tarball_source("http://x/tarballs/a?source=other"), None);
        assert_eq!(tarball_source("http://x/tarballs/a?source=local"), None);
        assert_eq!(tarball_source("not a url"), None);
    }
}

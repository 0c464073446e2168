//! Packument synthesis and rewriting.

use serde_json::{json, Map, Value};
use tandem_core::{ModuleName, PackageManifest};

use crate::client::INSTALL_V1;
use crate::paths::upstream_tarball_url;

/// Manifest fields copied into each synthesized version object.
const VERSION_FIELDS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "bundleDependencies",
    "bundledDependencies",
    "peerDependencies",
    "bin",
    "engines",
];

/// Response headers that no longer describe a rewritten body.
const HOP_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
];

/// Pick the media type to answer with for an `Accept` header.
pub fn negotiate(accept: Option<&str>) -> &'static str {
    match accept {
        Some(accept) if accept.contains(INSTALL_V1) => INSTALL_V1,
        _ => "application/json",
    }
}

/// Whether a `Content-Type` value names a JSON packument.
pub fn is_packument_type(content_type: Option<&str>) -> bool {
    let Some(value) = content_type else {
        return false;
    };
    let media_type = value.split(';').next().unwrap_or("").trim();
    media_type.eq_ignore_ascii_case("application/json") || media_type.eq_ignore_ascii_case(INSTALL_V1)
}

/// Whether an upstream response header may be forwarded unchanged.
pub fn is_forwardable_header(name: &str) -> bool {
    !HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// A single-version packument for a local module.
pub fn local_packument(
    name: &ModuleName,
    version: &str,
    manifest: &PackageManifest,
    tarball_url: &str,
) -> Value {
    let manifest_json = serde_json::to_value(manifest).unwrap_or(Value::Null);

    let mut version_object = Map::new();
    version_object.insert("name".into(), json!(name.full()));
    version_object.insert("version".into(), json!(version));
    for field in VERSION_FIELDS {
        if let Some(value) = manifest_json.get(*field) {
            version_object.insert((*field).to_string(), value.clone());
        }
    }
    version_object.insert("directories".into(), json!({}));
    version_object.insert("_hasShrinkwrap".into(), json!(false));
    version_object.insert("dist".into(), json!({ "tarball": tarball_url }));

    let mut versions = Map::new();
    versions.insert(version.to_string(), Value::Object(version_object));
    json!({
        "name": name.full(),
        "dist-tags": { "latest": version },
        "versions": versions,
    })
}

/// Point every `versions.*.dist.tarball` of an upstream packument back at
/// the proxy. Returns how many URLs were rewritten.
pub fn rewrite_tarball_urls(packument: &mut Value, proxy: &str, name: &str) -> usize {
    let Some(versions) = packument.get_mut("versions").and_then(Value::as_object_mut) else {
        return 0;
    };
    let mut rewritten = 0;
    for version in versions.values_mut() {
        let Some(tarball) = version.pointer_mut("/dist/tarball") else {
            continue;
        };
        if let Some(url) = tarball.as_str() {
            *tarball = Value::String(upstream_tarball_url(proxy, name, url));
            rewritten += 1;
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packument_types() {
        assert!(is_packument_type(Some("application/json")));
        assert!(is_packument_type(Some("application/json; charset=utf-8")));
        assert!(is_packument_type(Some(INSTALL_V1)));
        assert!(!is_packument_type(Some("text/html")));
        assert!(!is_packument_type(None));
    }
    use crate::paths::{tarball_source, TarballSource};
    use std::path::Path;

    #[test]
    fn negotiation() {
        assert_eq!(negotiate(None), "application/json");
        assert_eq!(negotiate(Some("application/json")), "application/json");
        assert_eq!(
            negotiate(Some(
                "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*"
            )),
            INSTALL_V1
        );
    }

    #[test]
    fn local_packument_has_single_version() {
        let manifest = PackageManifest::parse(
            r#"{
                "name": "my-lib",
                "version": "1.2.0",
                "dependencies": {"left-pad": "^1.0.0"},
                "bin": {"my-lib": "cli.js"},
                "scripts": {"build": "tsc"}
            }"#,
            Path::new("package.json"),
        )
        .unwrap();
        let name = ModuleName::parse("my-lib").unwrap();
        let doc = local_packument(&name, "1.2.0", &manifest, "http://proxy/tarballs/my-lib");

        assert_eq!(doc["name"], "my-lib");
        assert_eq!(doc["dist-tags"]["latest"], "1.2.0");
        let versions = doc["versions"].as_object().unwrap();
        assert_eq!(versions.len(), 1);
        let v = &versions["1.2.0"];
        assert_eq!(v["dist"]["tarball"], "http://proxy/tarballs/my-lib");
        assert_eq!(v["dependencies"]["left-pad"], "^1.0.0");
        assert_eq!(v["bin"]["my-lib"], "cli.js");
        assert_eq!(v["_hasShrinkwrap"], false);
        assert!(v.get("scripts").is_none());
        assert!(v.get("devDependencies").is_none());
    }

    #[test]
    fn upstream_tarballs_are_rewritten() {
        let mut doc = json!({
            "name": "left-pad",
            "versions": {
                "1.0.0": {"dist": {"tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz"}},
                "1.1.0": {"dist": {"tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.1.0.tgz"}},
                "broken": {}
            }
        });
        let count = rewrite_tarball_urls(&mut doc, "http://127.0.0.1:9", "left-pad");
        assert_eq!(count, 2);

        let url = doc["versions"]["1.0.0"]["dist"]["tarball"].as_str().unwrap();
        assert!(url.starts_with("http://127.0.0.1:9/tarballs/left-pad?"));
        assert_eq!(
            tarball_source(url),
            Some(TarballSource::Upstream {
                url: "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz".to_string()
            })
        );
    }

    #[test]
    fn header_filter() {
        assert!(!is_forwardable_header("Content-Encoding"));
        assert!(!is_forwardable_header("transfer-encoding"));
        assert!(is_forwardable_header("etag"));
    }
}

//! Distribution links found on a project page

use std::cmp::Ordering;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::hashes::{extract_link_hash, LinkHash};
use crate::html::Anchor;
use crate::pep440::{Version, VersionSpecifiers};
use crate::quoting::{ensure_quoted_url, join_url, UrlParts};
use crate::simple::canonicalize_name;

/// Wheel file name without the `.whl` suffix
/// (`name-version(-build)?-python-abi-platform`)
static WHEEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<name>[^\s-]+?)-(?P<ver>[^\s-]*?)
        (?:-(?P<build>\d[^-]*?))?
        -(?P<pyver>[^\s-]+?)
        -(?P<abi>[^\s-]+?)
        -(?P<plat>[^\s-]+?)$",
    )
    .expect("wheel regex is valid")
});

const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.gz",
    ".tgz",
    ".tar",
    ".zip",
    ".tar.bz2",
    ".tbz",
    ".tar.xz",
    ".txz",
    ".tlz",
    ".tar.lz",
    ".tar.lzma",
];

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot resolve '{href}' against '{base}': {source}")]
    Join {
        base: String,
        href: String,
        #[source]
        source: url::ParseError,
    },
    #[error("link has no file name: '{0}'")]
    MissingFilename(String),
}

/// Compatibility tags of a wheel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WheelInfo {
    pub build: Option<String>,
    pub python_tags: Vec<String>,
    pub abi_tags: Vec<String>,
    pub platform_tags: Vec<String>,
}

impl WheelInfo {
    /// Every `python-abi-platform` combination the wheel declares
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for python in &self.python_tags {
            for abi in &self.abi_tags {
                for platform in &self.platform_tags {
                    tags.push(format!("{}-{}-{}", python, abi, platform));
                }
            }
        }
        tags
    }
}

/// One downloadable file of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageLink {
    /// Absolute, fully quoted, without the fragment
    pub url: String,
    pub filename: String,
    pub extension: String,
    /// `None` when the file name cannot be split for this project
    pub version: Option<String>,
    pub requires_python: Option<String>,
    /// Present when yanked; the reason may be empty
    pub yanked: Option<String>,
    pub hash: Option<LinkHash>,
    pub wheel: Option<WheelInfo>,
}

impl PackageLink {
    /// Build a link from an absolute URL
    pub fn new(
        url: &str,
        project: &str,
        requires_python: Option<&str>,
        yanked: Option<&str>,
    ) -> Result<Self, LinkError> {
        let quoted = ensure_quoted_url(url);
        let hash = extract_link_hash(&quoted);

        let mut parts = UrlParts::parse(&quoted);
        parts.fragment.clear();

        let filename = filename_from_path(&parts.path)
            .ok_or_else(|| LinkError::MissingFilename(quoted.clone()))?;
        let (base, extension) = split_extension(&filename);

        let canonical_name = canonicalize_name(project);
        let (version, wheel) = if extension == ".whl" {
            match parse_wheel_filename(base) {
                Some((name, version, wheel)) if canonicalize_name(&name) == canonical_name => {
                    (Some(version), Some(wheel))
                },
                Some((name, _, wheel)) => {
                    debug!("Wheel {} belongs to {}, not {}", filename, name, project);
                    (None, Some(wheel))
                },
                None => {
                    debug!("Not a valid wheel file name: {}", filename);
                    (None, None)
                },
            }
        } else if is_archive_extension(extension) {
            (split_sdist_version(base, &canonical_name), None)
        } else {
            debug!("Not a source archive: {}", filename);
            (None, None)
        };

        Ok(PackageLink {
            url: parts.to_string(),
            extension: extension.to_string(),
            filename,
            version,
            requires_python: requires_python.map(str::to_string),
            yanked: yanked.map(str::to_string),
            hash,
            wheel,
        })
    }

    /// Build a link from an index page anchor
    ///
    /// Returns `Ok(None)` for anchors without an `href`.
    pub fn from_anchor(
        anchor: &Anchor,
        base_url: &str,
        project: &str,
    ) -> Result<Option<Self>, LinkError> {
        let Some(href) = anchor.get("href") else {
            return Ok(None);
        };

        let url = join_url(base_url, href).map_err(|source| LinkError::Join {
            base: base_url.to_string(),
            href: href.to_string(),
            source,
        })?;

        let yanked = anchor
            .has("data-yanked")
            .then(|| anchor.get("data-yanked").unwrap_or(""));

        PackageLink::new(
            &url,
            project,
            anchor.get("data-requires-python"),
            yanked,
        )
        .map(Some)
    }

    pub fn is_wheel(&self) -> bool {
        self.wheel.is_some()
    }

    pub fn is_yanked(&self) -> bool {
        self.yanked.is_some()
    }

    /// Parsed version, when the file name carries a valid one
    pub fn parsed_version(&self) -> Option<Version> {
        self.version.as_deref().and_then(|v| v.parse().ok())
    }
}

fn filename_from_path(path: &str) -> Option<String> {
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    if last.is_empty() {
        return None;
    }
    Some(percent_decode_str(last).decode_utf8_lossy().into_owned())
}

/// `.tar.gz` and friends count as one extension
fn split_extension(filename: &str) -> (&str, &str) {
    let Some(mut dot) = filename.rfind('.') else {
        return (filename, "");
    };
    if filename[..dot].to_ascii_lowercase().ends_with(".tar") {
        dot -= 4;
    }
    (&filename[..dot], &filename[dot..])
}

/// Source archive formats that can be built
fn is_archive_extension(extension: &str) -> bool {
    ARCHIVE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

/// Returns the distribution name, the version and the tags
fn parse_wheel_filename(base: &str) -> Option<(String, String, WheelInfo)> {
    let caps = WHEEL_REGEX.captures(base)?;
    let split = |name: &str| -> Vec<String> { caps[name].split('.').map(str::to_string).collect() };

    let wheel = WheelInfo {
        build: caps.name("build").map(|m| m.as_str().to_string()),
        python_tags: split("pyver"),
        abi_tags: split("abi"),
        platform_tags: split("plat"),
    };

    Some((
        caps["name"].to_string(),
        caps["ver"].replace('_', "-"),
        wheel,
    ))
}

/// Version of an sdist: everything after the first `-` whose prefix
/// canonicalizes to the project name.
fn split_sdist_version(base: &str, canonical_name: &str) -> Option<String> {
    base.match_indices('-')
        .find(|(idx, _)| canonicalize_name(&base[..*idx]) == canonical_name)
        .map(|(idx, _)| base[idx + 1..].to_string())
        .filter(|version| !version.is_empty())
}

/// Links usable for `specifiers` on `python`, best first
///
/// Yanked links and links whose version does not parse are dropped. A
/// `requires-python` that does not parse is ignored. Newer versions come
/// first; for the same version, wheels come before source archives.
pub fn select_candidates<'a>(
    links: &'a [PackageLink],
    specifiers: &VersionSpecifiers,
    python: Option<&Version>,
) -> Vec<&'a PackageLink> {
    let mut candidates: Vec<(Version, &PackageLink)> = links
        .iter()
        .filter(|link| !link.is_yanked())
        .filter(|link| match (python, link.requires_python.as_deref()) {
            (Some(python), Some(requires)) => match requires.parse::<VersionSpecifiers>() {
                Ok(requires) => requires.with_prereleases(true).contains(python),
                Err(err) => {
                    debug!("Ignoring requires-python of {}: {}", link.filename, err);
                    true
                },
            },
            _ => true,
        })
        .filter_map(|link| link.parsed_version().map(|version| (version, link)))
        .filter(|(version, _)| specifiers.contains(version))
        .collect();

    candidates.sort_by(|(va, a), (vb, b)| match vb.cmp(va) {
        Ordering::Equal => b.is_wheel().cmp(&a.is_wheel()),
        ordering => ordering,
    });

    candidates.into_iter().map(|(_, link)| link).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str) -> PackageLink {
        PackageLink::new(url, "demo-pkg", None, None).unwrap()
    }

    #[test]
    fn test_sdist_link() {
        let link = link("https://files.example.com/p/demo_pkg-1.2.3.tar.gz#sha256=abcd");
        assert_eq!(link.url, "https://files.example.com/p/demo_pkg-1.2.3.tar.gz");
        assert_eq!(link.filename, "demo_pkg-1.2.3.tar.gz");
        assert_eq!(link.extension, ".tar.gz");
        assert_eq!(link.version.as_deref(), Some("1.2.3"));
        assert_eq!(link.hash.as_ref().map(|h| h.digest.as_str()), Some("abcd"));
        assert!(!link.is_wheel());
    }

    #[test]
    fn test_wheel_link() {
        let link = link(
            "https://files.example.com/p/demo_pkg-2.0-1-cp311.cp312-abi3-manylinux_2_17_x86_64.whl",
        );
        assert_eq!(link.extension, ".whl");
        assert_eq!(link.version.as_deref(), Some("2.0"));
        let wheel = link.wheel.unwrap();
        assert_eq!(wheel.build.as_deref(), Some("1"));
        assert_eq!(
            wheel.tags(),
            vec![
                "cp311-abi3-manylinux_2_17_x86_64",
                "cp312-abi3-manylinux_2_17_x86_64"
            ]
        );
    }

    #[test]
    fn test_unsplittable_sdist_keeps_link() {
        let link = link("https://files.example.com/p/other-1.0.zip");
        assert_eq!(link.extension, ".zip");
        assert_eq!(link.version, None);
    }

    #[test]
    fn test_filename_is_unquoted() {
        let link = link("https://files.example.com/some dir/demo_pkg-1.0%2blocal.tar.gz");
        assert_eq!(
            link.url,
            "https://files.example.com/some%20dir/demo_pkg-1.0%2Blocal.tar.gz"
        );
        assert_eq!(link.filename, "demo_pkg-1.0+local.tar.gz");
        assert_eq!(link.version.as_deref(), Some("1.0+local"));
    }

    #[test]
    fn test_non_archive_not_candidate() {
        let links = vec![
            link("https://x.org/demo_pkg-1.0.exe"),
            link("https://x.org/demo_pkg-1.0.msi"),
            link("https://x.org/demo_pkg-1.0.tar.gz"),
        ];
        assert_eq!(links[0].version, None);
        assert_eq!(links[1].extension, ".msi");

        let specifiers: VersionSpecifiers = ">=1.0".parse().unwrap();
        let picked: Vec<&str> = select_candidates(&links, &specifiers, None)
            .iter()
            .map(|link| link.filename.as_str())
            .collect();
        assert_eq!(picked, vec!["demo_pkg-1.0.tar.gz"]);
    }

    #[test]
    fn test_archive_extensions() {
        for name in [
            "demo_pkg-1.0.tgz",
            "demo_pkg-1.0.tar",
            "demo_pkg-1.0.tar.bz2",
            "demo_pkg-1.0.tar.xz",
            "demo_pkg-1.0.tar.lzma",
            "demo_pkg-1.0.ZIP",
        ] {
            let link = link(&format!("https://x.org/{}", name));
            assert_eq!(link.version.as_deref(), Some("1.0"), "no version for {}", name);
        }
    }

    #[test]
    fn test_wheel_for_other_project_not_candidate() {
        let links = vec![
            link("https://x.org/other-9.0-py3-none-any.whl"),
            link("https://x.org/Demo.Pkg-1.0-py3-none-any.whl"),
        ];
        assert_eq!(links[0].version, None);
        assert!(links[0].is_wheel());

        let picked: Vec<&str> = select_candidates(&links, &VersionSpecifiers::empty(), None)
            .iter()
            .map(|link| link.filename.as_str())
            .collect();
        assert_eq!(picked, vec!["Demo.Pkg-1.0-py3-none-any.whl"]);
    }

    #[test]
    fn test_missing_filename() {
        assert!(matches!(
            PackageLink::new("https://files.example.com/", "demo", None, None),
            Err(LinkError::MissingFilename(_))
        ));
    }

    #[test]
    fn test_from_anchor() {
        let anchor = Anchor::new(vec![
            (
                "href".to_string(),
                Some("../../packages/demo_pkg-1.0.tar.gz#md5=ff".to_string()),
            ),
            ("data-requires-python".to_string(), Some(">=3.8".to_string())),
            ("data-yanked".to_string(), None),
        ]);
        let link = PackageLink::from_anchor(&anchor, "https://pypi.org/simple/demo-pkg/", "demo-pkg")
            .unwrap()
            .unwrap();
        assert_eq!(link.url, "https://pypi.org/packages/demo_pkg-1.0.tar.gz");
        assert_eq!(link.requires_python.as_deref(), Some(">=3.8"));
        assert_eq!(link.yanked.as_deref(), Some(""));
        assert_eq!(link.hash.unwrap().to_string(), "md5=ff");
    }

    #[test]
    fn test_from_anchor_without_href() {
        let anchor = Anchor::new(vec![("name".to_string(), Some("top".to_string()))]);
        assert!(PackageLink::from_anchor(&anchor, "https://x.org/", "demo")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_select_candidates() {
        let mut yanked = link("https://x.org/demo_pkg-1.1.9.tar.gz");
        yanked.yanked = Some("broken".to_string());
        let mut needs_new_python = link("https://x.org/demo_pkg-1.1.8-py3-none-any.whl");
        needs_new_python.requires_python = Some(">=3.12".to_string());

        let links = vec![
            link("https://x.org/demo_pkg-1.1.0.tar.gz"),
            link("https://x.org/demo_pkg-1.1.2.tar.gz"),
            link("https://x.org/demo_pkg-1.1.2-py3-none-any.whl"),
            link("https://x.org/demo_pkg-1.1.3rc1.tar.gz"),
            link("https://x.org/demo_pkg-1.2.0.tar.gz"),
            yanked,
            needs_new_python,
        ];

        let specifiers: VersionSpecifiers = "~=1.1.0".parse().unwrap();
        let python: Version = "3.11.4".parse().unwrap();
        let picked: Vec<&str> = select_candidates(&links, &specifiers, Some(&python))
            .iter()
            .map(|link| link.filename.as_str())
            .collect();

        assert_eq!(
            picked,
            vec![
                "demo_pkg-1.1.2-py3-none-any.whl",
                "demo_pkg-1.1.2.tar.gz",
                "demo_pkg-1.1.0.tar.gz",
            ]
        );
    }
}

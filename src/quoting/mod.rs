//! URL decomposition, path cleaning and percent-quoting for index links
//!
//! Links scraped from index pages are not always properly quoted: some carry
//! raw spaces, some are already escaped, and VCS-style URLs put revisions
//! after `@`. Cleaning unquotes and requotes each path segment so nothing is
//! double quoted, while `@` and `%2F` are kept exactly where they were.

use std::fmt;
use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use url::Url;

/// Everything except the unreserved characters and `/`
const PATH_QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Schemes whose path may carry `;params`
const USES_PARAMS: &[&str] = &[
    "", "ftp", "hdl", "prospero", "http", "imap", "https", "shttp", "rtsp", "rtspu", "sip",
    "sips", "mms", "sftp", "tel",
];

/// Schemes that are written with `//` even when the netloc is empty
const USES_NETLOC: &[&str] = &[
    "", "ftp", "http", "gopher", "nntp", "telnet", "imap", "wais", "file", "mms", "https",
    "shttp", "snews", "prospero", "rtsp", "rtspu", "rsync", "svn", "svn+ssh", "sftp", "nfs",
    "git", "git+ssh", "ws", "wss",
];

static RESERVED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@|%2F").expect("reserved regex is valid"));

static DRIVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/?[A-Za-z]:").expect("drive regex is valid"));

/// `scheme://netloc/path;params?query#fragment`
///
/// Parsing never fails: anything that is not recognized as a scheme or a
/// netloc ends up in the path. Reassembling with `Display` gives back an
/// equivalent URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub netloc: String,
    pub path: String,
    pub params: String,
    pub query: String,
    pub fragment: String,
}

impl UrlParts {
    pub fn parse(url: &str) -> Self {
        let mut parts = UrlParts::default();
        let mut rest = url.trim_start();

        if let Some(colon) = rest.find(':') {
            let candidate = &rest[..colon];
            if is_scheme(candidate) {
                parts.scheme = candidate.to_ascii_lowercase();
                rest = &rest[colon + 1..];
            }
        }

        if let Some(after) = rest.strip_prefix("//") {
            let end = after.find(['/', '?', '#']).unwrap_or(after.len());
            parts.netloc = after[..end].to_string();
            rest = &after[end..];
        }

        if let Some((before, fragment)) = rest.split_once('#') {
            parts.fragment = fragment.to_string();
            rest = before;
        }

        if let Some((before, query)) = rest.split_once('?') {
            parts.query = query.to_string();
            rest = before;
        }

        if USES_PARAMS.contains(&parts.scheme.as_str()) {
            let (path, params) = split_params(rest);
            parts.path = path.to_string();
            parts.params = params.to_string();
        } else {
            parts.path = rest.to_string();
        }

        parts
    }

    /// No netloc means the path names a local file
    pub fn is_local_path(&self) -> bool {
        self.netloc.is_empty()
    }
}

impl fmt::Display for UrlParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = self.path.clone();
        if !self.params.is_empty() {
            path = format!("{};{}", path, self.params);
        }

        let wants_netloc = !self.scheme.is_empty()
            && USES_NETLOC.contains(&self.scheme.as_str())
            && !path.starts_with("//");
        if !self.netloc.is_empty() || wants_netloc {
            if !path.is_empty() && !path.starts_with('/') {
                path.insert(0, '/');
            }
            path = format!("//{}{}", self.netloc, path);
        }

        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        write!(f, "{}", path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Params belong to the last path segment only.
fn split_params(path: &str) -> (&str, &str) {
    let last_segment = path.rfind('/').unwrap_or(0);
    match path[last_segment..].find(';') {
        Some(idx) => {
            let idx = last_segment + idx;
            (&path[..idx], &path[idx + 1..])
        },
        None => (path, ""),
    }
}

/// Unquote then quote, so escapes already present are not quoted again.
pub fn clean_url_path_part(part: &str) -> String {
    let unquoted = percent_decode_str(part).decode_utf8_lossy();
    utf8_percent_encode(&unquoted, PATH_QUOTE_SET).to_string()
}

/// Like [`clean_url_path_part`], but a leading drive letter keeps its colon.
pub fn clean_file_url_path(part: &str) -> String {
    match DRIVE_REGEX.find(part) {
        Some(drive) => format!(
            "{}{}",
            drive.as_str(),
            clean_url_path_part(&part[drive.end()..])
        ),
        None => clean_url_path_part(part),
    }
}

/// Clean the path portion of a URL
///
/// The path is split on `@` and `%2F` first so that revision strings in VCS
/// URLs survive; each reserved token is kept with its escape uppercased.
pub fn clean_url_path(path: &str, is_local_path: bool) -> String {
    let mut cleaned = String::with_capacity(path.len());
    let mut last = 0;

    for (idx, reserved) in RESERVED_REGEX.find_iter(path).enumerate() {
        let to_clean = &path[last..reserved.start()];
        cleaned.push_str(&clean_segment(to_clean, is_local_path && idx == 0));
        cleaned.push_str(&reserved.as_str().to_ascii_uppercase());
        last = reserved.end();
    }
    cleaned.push_str(&clean_segment(&path[last..], is_local_path && last == 0));

    cleaned
}

fn clean_segment(segment: &str, leading_local: bool) -> String {
    if leading_local {
        clean_file_url_path(segment)
    } else {
        clean_url_path_part(segment)
    }
}

/// Make sure a link is fully quoted
///
/// A raw space becomes `%20`, but `%20` stays `%20`.
///
/// ```
/// use pyindex::quoting::ensure_quoted_url;
///
/// assert_eq!(
///     ensure_quoted_url("https://example.com/a b/c%20d.tar.gz#sha256=ab"),
///     "https://example.com/a%20b/c%20d.tar.gz#sha256=ab"
/// );
/// ```
pub fn ensure_quoted_url(url: &str) -> String {
    let mut parts = UrlParts::parse(url);
    parts.path = clean_url_path(&parts.path, parts.is_local_path());
    parts.to_string()
}

/// Resolve `href` against `base`
pub fn join_url(base: &str, href: &str) -> Result<String, url::ParseError> {
    let base = Url::parse(base)?;
    Ok(base.join(href)?.to_string())
}

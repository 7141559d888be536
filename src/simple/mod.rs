//! Simple repository API (PEP 503 HTML / PEP 691 JSON) client

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::hashes::{HashAlgorithm, LinkHash};
use crate::html::parse_links;
use crate::link::PackageLink;
use crate::quoting::join_url;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

const SIMPLE_JSON: &str = "application/vnd.pypi.simple.v1+json";
const SIMPLE_LATEST_JSON: &str = "application/vnd.pypi.simple.latest+json";
const SIMPLE_HTML: &str = "application/vnd.pypi.simple.v1+html";
const SIMPLE_LATEST_HTML: &str = "application/vnd.pypi.simple.latest+html";
const TEXT_HTML: &str = "text/html";

static CANONICALIZE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("canonicalize regex is valid"));

/// Normalize a project name: lowercase, runs of `-`, `_`, `.` become `-`.
///
/// ```
/// use pyindex::simple::canonicalize_name;
///
/// assert_eq!(canonicalize_name("JupyterLab"), "jupyterlab");
/// assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
/// assert_eq!(canonicalize_name("Foo__Bar-.baz"), "foo-bar-baz");
/// ```
pub fn canonicalize_name(name: &str) -> String {
    CANONICALIZE_REGEX.replace_all(name, "-").to_lowercase()
}

/// Where and how to query the index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub index_url: String,
    /// Ask for the JSON form first
    pub prefer_json: bool,
    pub user_agent: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            prefer_json: false,
            user_agent: concat!("pyindex/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl IndexConfig {
    /// `Accept` header value, most preferred first
    pub fn accept_header(&self) -> String {
        let mut accepted = Vec::new();
        if self.prefer_json {
            accepted.push(SIMPLE_JSON.to_string());
        }
        accepted.push(format!("{}; q=0.1", SIMPLE_HTML));
        accepted.push(format!("{}; q=0.01", TEXT_HTML));
        accepted.join(", ")
    }

    /// `<index>/<canonical-name>/`
    pub fn project_url(&self, project: &str) -> String {
        let index = self.index_url.trim_end_matches('/');
        format!("{}/{}/", index, canonicalize_name(project))
    }
}

/// A fetched project page
#[derive(Debug, Clone)]
pub struct ProjectPage {
    /// Final URL after redirects, used to resolve relative links
    pub url: String,
    pub content_type: String,
    pub body: String,
}

/// Body of a PEP 691 JSON project page
#[derive(Debug, Deserialize)]
pub struct SimpleJsonPage {
    pub name: String,
    pub files: Vec<SimpleJsonFile>,
}

/// One entry of `files` in a PEP 691 JSON project page
#[derive(Debug, Deserialize)]
pub struct SimpleJsonFile {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(rename = "requires-python", default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub yanked: Yanked,
}

/// `yanked` is either a flag or a reason string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Yanked {
    Flag(bool),
    Reason(String),
}

impl Default for Yanked {
    fn default() -> Self {
        Yanked::Flag(false)
    }
}

impl Yanked {
    fn reason(&self) -> Option<&str> {
        match self {
            Yanked::Flag(false) => None,
            Yanked::Flag(true) => Some(""),
            Yanked::Reason(reason) => Some(reason.as_str()),
        }
    }
}

impl SimpleJsonFile {
    /// Strongest advertised digest we know how to check
    fn best_hash(&self) -> Option<LinkHash> {
        HashAlgorithm::ALL.into_iter().find_map(|algorithm| {
            self.hashes.get(algorithm.name()).map(|digest| LinkHash {
                algorithm,
                digest: digest.clone(),
            })
        })
    }
}

impl ProjectPage {
    pub fn is_json(&self) -> bool {
        let mime = self.mime_type();
        mime == SIMPLE_JSON || mime == SIMPLE_LATEST_JSON
    }

    pub fn is_html(&self) -> bool {
        let mime = self.mime_type();
        mime == SIMPLE_HTML || mime == SIMPLE_LATEST_HTML || mime == TEXT_HTML
    }

    fn mime_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Every usable link on the page, in page order
    ///
    /// Entries that cannot be turned into a link are logged and skipped.
    pub fn links(&self, project: &str) -> anyhow::Result<Vec<PackageLink>> {
        if self.is_json() {
            self.json_links(project)
        } else if self.is_html() {
            self.html_links(project)
        } else {
            anyhow::bail!(
                "Unsupported content type from {}: {}",
                self.url,
                self.content_type
            )
        }
    }

    fn html_links(&self, project: &str) -> anyhow::Result<Vec<PackageLink>> {
        let page = parse_links(&self.body);

        let base_url = match &page.base_url {
            Some(base) => join_url(&self.url, base)?,
            None => self.url.clone(),
        };
        debug!("Resolving {} anchors against {}", page.anchors.len(), base_url);

        let mut links = Vec::new();
        for anchor in &page.anchors {
            match PackageLink::from_anchor(anchor, &base_url, project) {
                Ok(Some(link)) => links.push(link),
                Ok(None) => debug!("Skipping anchor without href: {:?}", anchor.attrs()),
                Err(e) => warn!("Skipping anchor: {}", e),
            }
        }

        Ok(links)
    }

    fn json_links(&self, project: &str) -> anyhow::Result<Vec<PackageLink>> {
        let page: SimpleJsonPage = serde_json::from_str(&self.body)?;
        debug!("Project page for {} lists {} files", page.name, page.files.len());
        if canonicalize_name(&page.name) != canonicalize_name(project) {
            warn!("Requested {} but the index returned {}", project, page.name);
        }

        let mut links = Vec::new();
        for file in &page.files {
            let url = match join_url(&self.url, &file.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping {}: {}", file.filename, e);
                    continue;
                },
            };

            match PackageLink::new(
                &url,
                project,
                file.requires_python.as_deref(),
                file.yanked.reason(),
            ) {
                Ok(mut link) => {
                    if link.hash.is_none() {
                        link.hash = file.best_hash();
                    }
                    links.push(link);
                },
                Err(e) => warn!("Skipping {}: {}", file.filename, e),
            }
        }

        Ok(links)
    }
}

/// HTTP client for one index
pub struct IndexClient {
    config: IndexConfig,
    client: reqwest::Client,
}

impl IndexClient {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Fetch the project page of `project`
    ///
    /// Sends the simple-API `Accept` preference list and asks caches not to
    /// serve a stale page.
    ///
    /// # Example
    /// ```no_run
    /// use pyindex::simple::{IndexClient, IndexConfig};
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = IndexClient::new(IndexConfig::default());
    /// let page = client.fetch_project_page("jupyterlab").await?;
    /// println!("{} links", page.links("jupyterlab")?.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_project_page(&self, project: &str) -> anyhow::Result<ProjectPage> {
        let url = self.config.project_url(project);

        debug!("Fetching project page from {}", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, self.config.accept_header())
            .header(CACHE_CONTROL, "max-age=0")
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Index request for {} failed with status: {}",
                url,
                response.status()
            );
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(TEXT_HTML)
            .to_string();
        let body = response.text().await?;

        debug!(
            "Received {} bytes of {} from {}",
            body.len(),
            content_type,
            final_url
        );

        Ok(ProjectPage {
            url: final_url,
            content_type,
            body,
        })
    }
}

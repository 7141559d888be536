//! Anchor extraction from simple-index HTML pages

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

static BASE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("base").expect("base selector is valid"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("anchor selector is valid"));

/// Attributes of one `<a>` element
///
/// A valueless attribute (`<a data-yanked>`) and an empty one
/// (`data-yanked=""`) are both stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    attrs: Vec<(String, Option<String>)>,
}

impl Anchor {
    pub fn new(attrs: Vec<(String, Option<String>)>) -> Self {
        Self { attrs }
    }

    /// Value of `name`, `None` when absent or empty
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Whether the attribute is present at all, with or without a value
    pub fn has(&self, name: &str) -> bool {
        self.attrs.iter().any(|(attr, _)| attr == name)
    }

    pub fn attrs(&self) -> &[(String, Option<String>)] {
        &self.attrs
    }
}

/// Result of one parse pass over an index page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPage {
    /// `href` of the first `<base>` that has one
    pub base_url: Option<String>,
    /// Every `<a>` in document order
    pub anchors: Vec<Anchor>,
}

/// Parse `html` and collect its base URL override and anchors
///
/// ```
/// use pyindex::html::parse_links;
///
/// let page = parse_links(r#"<a href="pkg-1.0.tar.gz" data-requires-python="&gt;=3.8">pkg</a>"#);
/// assert_eq!(page.base_url, None);
/// assert_eq!(page.anchors[0].get("href"), Some("pkg-1.0.tar.gz"));
/// assert_eq!(page.anchors[0].get("data-requires-python"), Some(">=3.8"));
/// ```
pub fn parse_links(html: &str) -> LinkPage {
    let document = Html::parse_document(html);

    if !document.errors.is_empty() {
        debug!("HTML parser recovered from {} errors", document.errors.len());
    }

    let base_url = document
        .select(&BASE_SELECTOR)
        .find_map(|element| element.value().attr("href"))
        .map(str::to_string);

    let anchors = document
        .select(&ANCHOR_SELECTOR)
        .map(|element| {
            let attrs = element
                .value()
                .attrs()
                .map(|(name, value)| {
                    let value = (!value.is_empty()).then(|| value.to_string());
                    (name.to_string(), value)
                })
                .collect();
            Anchor::new(attrs)
        })
        .collect();

    LinkPage { base_url, anchors }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta name="pypi:repository-version" content="1.1">
    <title>Links for demo</title>
  </head>
  <body>
    <h1>Links for demo</h1>
    <a href="../../packages/aa/demo-1.0.tar.gz#sha256=0011">demo-1.0.tar.gz</a><br />
    <a href="../../packages/bb/demo-1.1-py3-none-any.whl#sha256=2233" data-requires-python="&gt;=3.8">demo-1.1-py3-none-any.whl</a><br />
    <a href="../../packages/cc/demo-1.2.tar.gz" data-yanked>demo-1.2.tar.gz</a><br />
    <a name="no-href">anchor without href</a>
  </body>
</html>"#;

    #[test]
    fn test_anchors_in_document_order() {
        let page = parse_links(PAGE);
        assert_eq!(page.anchors.len(), 4);
        assert_eq!(
            page.anchors[0].get("href"),
            Some("../../packages/aa/demo-1.0.tar.gz#sha256=0011")
        );
        assert_eq!(
            page.anchors[1].get("href"),
            Some("../../packages/bb/demo-1.1-py3-none-any.whl#sha256=2233")
        );
        assert_eq!(page.anchors[2].get("href"), Some("../../packages/cc/demo-1.2.tar.gz"));
        assert_eq!(page.anchors[3].get("href"), None);
    }

    #[test]
    fn test_entities_are_decoded() {
        let page = parse_links(PAGE);
        assert_eq!(page.anchors[1].get("data-requires-python"), Some(">=3.8"));
    }

    #[test]
    fn test_valueless_attribute() {
        let page = parse_links(PAGE);
        assert!(page.anchors[2].has("data-yanked"));
        assert_eq!(page.anchors[2].get("data-yanked"), None);
        assert!(!page.anchors[0].has("data-yanked"));
    }

    #[test]
    fn test_no_base_tag() {
        assert_eq!(parse_links(PAGE).base_url, None);
    }

    #[test]
    fn test_first_base_with_href_wins() {
        let html = r#"<html><head>
            <base target="_blank">
            <base href="https://mirror.example.com/simple/demo/">
            <base href="https://other.example.com/">
            </head><body><a href="x.whl">x</a></body></html>"#;
        let page = parse_links(html);
        assert_eq!(
            page.base_url.as_deref(),
            Some("https://mirror.example.com/simple/demo/")
        );
        assert_eq!(page.anchors.len(), 1);
    }

    #[test]
    fn test_malformed_html_is_tolerated() {
        let page = parse_links("<a href='a.whl'>a<a href=b.whl>b</p><a href=\"c.whl\"");
        let hrefs: Vec<_> = page.anchors.iter().filter_map(|a| a.get("href")).collect();
        assert_eq!(hrefs, vec!["a.whl", "b.whl"]);
    }

    #[test]
    fn test_empty_document() {
        let page = parse_links("");
        assert!(page.anchors.is_empty());
        assert!(page.base_url.is_none());
    }
}

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ConfigError;

/// Placeholder for anchors without an `href`.
pub const FALLBACK_URL: &str = "https://www.naver.com/";
/// Placeholder for anchors without an `aria-label`.
pub const FALLBACK_LABEL: &str = "네이버(기본값)";

/// An anchor as found on the page. Either attribute may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub href: Option<String>,
    pub aria_label: Option<String>,
}

impl RawLink {
    pub fn is_anomalous(&self) -> bool {
        self.href.is_none() || self.aria_label.is_none()
    }

    pub fn url_or_fallback(&self) -> String {
        self.href.clone().unwrap_or_else(|| FALLBACK_URL.to_string())
    }

    pub fn label_or_fallback(&self) -> String {
        self.aria_label
            .clone()
            .unwrap_or_else(|| FALLBACK_LABEL.to_string())
    }
}

/// Parsed pair of selectors: the listing container and the anchors inside it.
#[derive(Debug)]
pub struct LinkSelectors {
    scope: Selector,
    anchor: Selector,
}

impl LinkSelectors {
    pub fn parse(scope: &str, anchor: &str) -> Result<Self, ConfigError> {
        Ok(LinkSelectors {
            scope: parse_selector(scope)?,
            anchor: parse_selector(anchor)?,
        })
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ConfigError> {
    Selector::parse(raw).map_err(|e| ConfigError::InvalidSelector {
        selector: raw.to_string(),
        reason: e.to_string(),
    })
}

/// All anchors inside a scope element, in document order, each at most once.
///
/// Runs to completion over the whole page before returning so callers only ever see a
/// finished list.
pub fn extract_links(html: &str, selectors: &LinkSelectors) -> Vec<RawLink> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.anchor)
        .filter(|anchor| in_scope(anchor, &selectors.scope))
        .map(|anchor| {
            let el = anchor.value();
            RawLink {
                href: el
                    .attr("href")
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(String::from),
                aria_label: el
                    .attr("aria-label")
                    .map(normalize_label)
                    .filter(|l| !l.is_empty()),
            }
        })
        .collect()
}

fn in_scope(anchor: &ElementRef, scope: &Selector) -> bool {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| scope.matches(&ancestor))
}

/// Trim and collapse internal whitespace runs.
pub fn normalize_label(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(raw.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_selectors() -> LinkSelectors {
        LinkSelectors::parse(".fusion-image-wrapper", "a").unwrap()
    }

    #[test]
    fn extracts_in_document_order() {
        let html = r#"
            <div class="fusion-image-wrapper"><a href="http://x/a/6" aria-label="ML Engineer"></a></div>
            <div class="fusion-image-wrapper"><a href="http://x/a/4" aria-label="Backend"></a></div>
        "#;
        let links = extract_links(html, &default_selectors());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href.as_deref(), Some("http://x/a/6"));
        assert_eq!(links[1].aria_label.as_deref(), Some("Backend"));
    }

    #[test]
    fn anchors_outside_scope_are_ignored() {
        let html = r#"
            <nav><a href="http://x/menu" aria-label="Menu"></a></nav>
            <div class="fusion-image-wrapper"><a href="http://x/a/6" aria-label="ML"></a></div>
        "#;
        let links = extract_links(html, &default_selectors());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href.as_deref(), Some("http://x/a/6"));
    }

    #[test]
    fn nested_scopes_do_not_duplicate() {
        let html = r#"
            <div class="fusion-image-wrapper"><div class="fusion-image-wrapper">
                <a href="http://x/a/6" aria-label="ML"></a>
            </div></div>
        "#;
        assert_eq!(extract_links(html, &default_selectors()).len(), 1);
    }

    #[test]
    fn missing_attributes_are_reported_not_dropped() {
        let html = r#"<div class="fusion-image-wrapper"><a aria-label="No link"></a><a href=" "></a></div>"#;
        let links = extract_links(html, &default_selectors());
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(RawLink::is_anomalous));
        assert_eq!(links[0].url_or_fallback(), FALLBACK_URL);
        assert_eq!(links[0].label_or_fallback(), "No link");
        assert_eq!(links[1].label_or_fallback(), FALLBACK_LABEL);
    }

    #[test]
    fn labels_are_whitespace_normalized() {
        let html = "<div class=\"fusion-image-wrapper\"><a href=\"http://x/1\" aria-label=\"  Data\n   Scientist \"></a></div>";
        let links = extract_links(html, &default_selectors());
        assert_eq!(links[0].aria_label.as_deref(), Some("Data Scientist"));
    }

    #[test]
    fn invalid_selector_is_config_error() {
        assert!(matches!(
            LinkSelectors::parse("div[", "a"),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn listing_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/listing.html").unwrap();
        let links = extract_links(&html, &default_selectors());
        assert_eq!(links.len(), 12, "got: {:?}", links);
        assert_eq!(links[0].href.as_deref(), Some("https://inthiswork.com/archives/41240"));
        assert!(links.iter().any(|l| l.href.is_none()));
    }
}

pub mod links;
pub mod post_id;

use links::{extract_links, LinkSelectors};
use post_id::resolve_post_id;

/// A posting link pending dedup and relevance checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub content_url: String,
    pub content_label: String,
    pub post_id: i64,
}

pub struct PageCandidates {
    pub candidates: Vec<Candidate>,
    /// Anchors that needed a fallback href or label.
    pub anomalies: usize,
    /// Anchors found before the per-site cap was applied.
    pub found: usize,
}

/// Two passes over a fetched page: anchors → candidates with resolved ids.
/// The cap is applied to the finished list, never while extracting.
pub fn process_page(html: &str, selectors: &LinkSelectors, max_links: usize) -> PageCandidates {
    let raw = extract_links(html, selectors);
    let found = raw.len();
    let kept = &raw[..found.min(max_links)];

    let anomalies = kept.iter().filter(|l| l.is_anomalous()).count();
    let candidates = kept
        .iter()
        .map(|link| {
            let content_url = link.url_or_fallback();
            Candidate {
                post_id: resolve_post_id(&content_url),
                content_label: link.label_or_fallback(),
                content_url,
            }
        })
        .collect();

    PageCandidates {
        candidates,
        anomalies,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::links::{FALLBACK_LABEL, FALLBACK_URL};
    use crate::parser::post_id::UNRESOLVED_ID;

    fn selectors() -> LinkSelectors {
        LinkSelectors::parse(".fusion-image-wrapper", "a").unwrap()
    }

    #[test]
    fn cap_is_a_slice_of_the_full_list() {
        let html = std::fs::read_to_string("tests/fixtures/listing.html").unwrap();
        let page = process_page(&html, &selectors(), 10);
        assert_eq!(page.found, 12);
        assert_eq!(page.candidates.len(), 10);
        assert_eq!(page.candidates[0].post_id, 41240);
        assert_eq!(page.candidates[3].post_id, 41236);
        assert_eq!(page.candidates[9].post_id, 41227);
    }

    #[test]
    fn missing_href_falls_back_and_is_kept() {
        let html = r#"<div class="fusion-image-wrapper"><a aria-label="Recommender Engineer"></a></div>"#;
        let page = process_page(html, &selectors(), 10);
        assert_eq!(page.anomalies, 1);
        assert_eq!(
            page.candidates,
            vec![Candidate {
                content_url: FALLBACK_URL.into(),
                content_label: "Recommender Engineer".into(),
                post_id: UNRESOLVED_ID,
            }]
        );
    }

    #[test]
    fn missing_label_falls_back() {
        let html = r#"<div class="fusion-image-wrapper"><a href="http://x/a/9"></a></div>"#;
        let page = process_page(html, &selectors(), 10);
        assert_eq!(page.candidates[0].content_label, FALLBACK_LABEL);
        assert_eq!(page.candidates[0].post_id, 9);
    }

    #[test]
    fn empty_page() {
        let page = process_page("<html></html>", &selectors(), 10);
        assert!(page.candidates.is_empty());
        assert_eq!(page.found, 0);
    }
}

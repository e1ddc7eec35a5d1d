use tracing::warn;

/// Id given to links whose trailing segment is not an integer.
pub const UNRESOLVED_ID: i64 = -1;

/// How candidates with an unparsable post id are treated.
///
/// Either way they go through the watermark filter like any other candidate, so with a
/// watermark of `-1` or more they count as already seen and never reach the webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedIdPolicy {
    #[default]
    DropSilently,
    /// Same outcome, plus a warning per unresolved link.
    Report,
}

impl UnresolvedIdPolicy {
    pub fn observe(self, site: &str, url: &str, post_id: i64) {
        if post_id == UNRESOLVED_ID && self == UnresolvedIdPolicy::Report {
            warn!(site, url, "post id could not be derived from link");
        }
    }
}

/// Post id embedded as the last path segment, e.g. `https://host/jobs/41235/` -> 41235.
pub fn resolve_post_id(url: &str) -> i64 {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .and_then(|segment| segment.parse::<i64>().ok())
        .unwrap_or(UNRESOLVED_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_number() {
        assert_eq!(resolve_post_id("https://inthiswork.com/archives/41235"), 41235);
    }

    #[test]
    fn trailing_slash_is_skipped() {
        assert_eq!(resolve_post_id("http://x/a/6/"), 6);
    }

    #[test]
    fn query_and_fragment_ignored() {
        assert_eq!(resolve_post_id("http://x/a/77?utm_source=feed#top"), 77);
    }

    #[test]
    fn slug_is_unresolved() {
        assert_eq!(resolve_post_id("https://inthiswork.com/archives/ml-engineer"), UNRESOLVED_ID);
        assert_eq!(resolve_post_id("https://www.naver.com/"), UNRESOLVED_ID);
    }

    #[test]
    fn empty_input() {
        assert_eq!(resolve_post_id(""), UNRESOLVED_ID);
        assert_eq!(resolve_post_id("///"), UNRESOLVED_ID);
    }

    #[test]
    fn bare_number() {
        assert_eq!(resolve_post_id("12"), 12);
    }
}

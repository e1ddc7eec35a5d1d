use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::classifier::{Category, RelevanceOracle};
use crate::error::ClassificationError;
use crate::notify::{self, Notifier, Posting};
use crate::parser::links::LinkSelectors;
use crate::parser::post_id::UnresolvedIdPolicy;
use crate::parser::{self, Candidate};
use crate::registry::{Registry, SiteDescriptor};
use crate::fetcher::PageFetcher;
use crate::watermark::filter_new;

/// Steps of one site-iteration, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetching,
    Extracting,
    Resolving,
    Filtering,
    Classifying,
    Formatting,
    Notifying,
    Committing,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Fetching => "fetching",
            Step::Extracting => "extracting",
            Step::Resolving => "resolving",
            Step::Filtering => "filtering",
            Step::Classifying => "classifying",
            Step::Formatting => "formatting",
            Step::Notifying => "notifying",
            Step::Committing => "committing",
        };
        f.write_str(s)
    }
}

/// Where accepted postings go.
pub enum Delivery<'a> {
    Webhook(&'a dyn Notifier),
    /// Print instead of sending; never commit.
    DryRun { limit: usize },
}

pub struct PipelineOptions {
    pub selectors: LinkSelectors,
    pub max_links: usize,
    pub classify_timeout: Duration,
    pub unresolved_ids: UnresolvedIdPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    Done {
        found: usize,
        accepted: usize,
        relevant: usize,
        /// Watermark written to the registry, if this site committed one.
        committed: Option<i64>,
    },
    Failed {
        step: Step,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteReport {
    pub url: String,
    pub outcome: SiteOutcome,
}

/// Per-run counters, printed at the end of `jobwatch run`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sites: Vec<SiteReport>,
    pub anomalies: usize,
    pub classification_failures: usize,
    pub notifications: usize,
    pub watermark_before: i64,
    pub watermark_after: i64,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.sites
            .iter()
            .filter(|s| matches!(s.outcome, SiteOutcome::Failed { .. }))
            .count()
    }

    pub fn print(&self) {
        println!(
            "Processed {} sites ({} failed), {} notifications sent.",
            self.sites.len(),
            self.failed(),
            self.notifications
        );
        println!(
            "Watermark {} -> {} | {} link anomalies, {} classification failures.",
            self.watermark_before,
            self.watermark_after,
            self.anomalies,
            self.classification_failures
        );
        for site in &self.sites {
            match &site.outcome {
                SiteOutcome::Done {
                    found,
                    accepted,
                    relevant,
                    committed,
                } => println!(
                    "  {}: {} links, {} new, {} relevant{}",
                    site.url,
                    found,
                    accepted,
                    relevant,
                    committed.map(|w| format!(", committed {}", w)).unwrap_or_default()
                ),
                SiteOutcome::Failed { step, reason } => {
                    println!("  {}: failed while {}: {}", site.url, step, reason)
                }
            }
        }
    }
}

struct SiteFailure {
    step: Step,
    reason: String,
}

impl SiteFailure {
    fn at(step: Step, err: impl fmt::Display) -> Self {
        SiteFailure {
            step,
            reason: err.to_string(),
        }
    }
}

#[derive(Default)]
struct Counters {
    anomalies: usize,
    classification_failures: usize,
    notifications: usize,
}

pub struct Pipeline<'a> {
    fetcher: &'a dyn PageFetcher,
    oracle: &'a dyn RelevanceOracle,
    delivery: Delivery<'a>,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        oracle: &'a dyn RelevanceOracle,
        delivery: Delivery<'a>,
        options: PipelineOptions,
    ) -> Self {
        Pipeline {
            fetcher,
            oracle,
            delivery,
            options,
        }
    }

    /// One full pass over every site, strictly in order.
    ///
    /// Every site is compared against the watermark as it was loaded at run start. The
    /// registry is rewritten after each successful delivery and only ever moves up.
    pub async fn run(&self, registry: &mut Registry, registry_path: &Path) -> RunSummary {
        let start_watermark = registry.watermark;
        let mut summary = RunSummary {
            watermark_before: start_watermark,
            ..RunSummary::default()
        };
        let mut counters = Counters::default();

        let sites = registry.sites.clone();
        for (i, site) in sites.iter().enumerate() {
            info!(
                site = %site.url,
                name = %site.name,
                watermark = start_watermark,
                "processing site {}/{}",
                i + 1,
                sites.len()
            );
            let outcome = match self
                .run_site(site, start_watermark, registry, registry_path, &mut counters)
                .await
            {
                Ok(outcome) => outcome,
                Err(failure) => {
                    error!(site = %site.url, step = %failure.step, "site failed: {}", failure.reason);
                    SiteOutcome::Failed {
                        step: failure.step,
                        reason: failure.reason,
                    }
                }
            };
            summary.sites.push(SiteReport {
                url: site.url.clone(),
                outcome,
            });
        }

        summary.anomalies = counters.anomalies;
        summary.classification_failures = counters.classification_failures;
        summary.notifications = counters.notifications;
        summary.watermark_after = registry.watermark;
        summary
    }

    async fn run_site(
        &self,
        site: &SiteDescriptor,
        watermark: i64,
        registry: &mut Registry,
        registry_path: &Path,
        counters: &mut Counters,
    ) -> Result<SiteOutcome, SiteFailure> {
        let html = self
            .fetcher
            .fetch(&site.url)
            .await
            .map_err(|e| SiteFailure::at(Step::Fetching, e))?;

        // The whole page is parsed before anything is filtered.
        debug!(site = %site.url, step = %Step::Extracting, bytes = html.len());
        let page = parser::process_page(&html, &self.options.selectors, self.options.max_links);
        if page.anomalies > 0 {
            debug!(site = %site.url, count = page.anomalies, "anchors needed fallback values");
        }
        counters.anomalies += page.anomalies;
        debug!(site = %site.url, step = %Step::Resolving, candidates = page.candidates.len());
        for c in &page.candidates {
            self.options
                .unresolved_ids
                .observe(&site.url, &c.content_url, c.post_id);
        }

        debug!(site = %site.url, step = %Step::Filtering, watermark);
        let filtered = filter_new(&page.candidates, watermark);
        info!(
            site = %site.url,
            found = page.found,
            candidates = page.candidates.len(),
            accepted = filtered.accepted.len(),
            new_watermark = filtered.new_watermark,
            "filtered against watermark"
        );

        debug!(site = %site.url, step = %Step::Classifying, accepted = filtered.accepted.len());
        let relevant = self.classify_all(&site.url, &filtered.accepted, counters).await;
        let done = |committed| SiteOutcome::Done {
            found: page.found,
            accepted: filtered.accepted.len(),
            relevant: relevant.len(),
            committed,
        };

        if relevant.is_empty() {
            info!(site = %site.url, "no new relevant postings");
            return Ok(done(None));
        }

        debug!(site = %site.url, step = %Step::Formatting, relevant = relevant.len());
        let message = notify::format(&relevant);

        let notifier = match &self.delivery {
            Delivery::Webhook(notifier) => *notifier,
            Delivery::DryRun { .. } => {
                info!(site = %site.url, postings = relevant.len(), "[dry run] delivery and commit skipped");
                println!("{}", message);
                return Ok(done(None));
            }
        };

        if !notifier.notify(&message).await {
            return Err(SiteFailure::at(
                Step::Notifying,
                "webhook delivery failed; watermark left unchanged",
            ));
        }
        counters.notifications += 1;

        let previous = registry.watermark;
        if !registry.advance(filtered.new_watermark) {
            info!(
                site = %site.url,
                watermark = previous,
                "registry watermark already at or above this batch"
            );
            return Ok(done(None));
        }
        if let Err(e) = registry.save(registry_path) {
            registry.watermark = previous;
            return Err(SiteFailure::at(Step::Committing, e));
        }
        info!(site = %site.url, from = previous, to = registry.watermark, "watermark committed");
        Ok(done(Some(registry.watermark)))
    }

    /// Candidates whose top category is not the catch-all, tagged with that category. A
    /// failing or slow oracle call only drops that candidate.
    async fn classify_all(
        &self,
        site: &str,
        accepted: &[Candidate],
        counters: &mut Counters,
    ) -> Vec<Posting> {
        let categories = Category::labels();
        let limit = match self.delivery {
            Delivery::DryRun { limit } => Some(limit),
            Delivery::Webhook(_) => None,
        };

        let mut relevant: Vec<Posting> = Vec::new();
        for candidate in accepted {
            if limit.is_some_and(|l| relevant.len() >= l) {
                info!(site, "[dry run] posting limit reached, skipping the rest");
                break;
            }

            let label = candidate.content_label.as_str();
            let timeout = self.options.classify_timeout;
            let call = self.oracle.classify(label, &categories);
            let result = match tokio::time::timeout(timeout, call)
                .await
                .unwrap_or_else(|_| Err(ClassificationError::Timeout(timeout)))
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(site, post_id = candidate.post_id, label, "classification failed: {}", e);
                    counters.classification_failures += 1;
                    continue;
                }
            };

            match result.top() {
                Some((top, score)) if result.is_relevant() => {
                    info!(site, post_id = candidate.post_id, label, category = top, score, "relevant posting");
                    relevant.push(Posting {
                        candidate: candidate.clone(),
                        category: top.to_string(),
                    });
                }
                _ => info!(site, post_id = candidate.post_id, label, "PASS (not relevant)"),
            }
        }
        relevant
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::ClassificationError;

/// Fixed category vocabulary handed to the zero-shot model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    ArtificialIntelligence,
    Data,
    Research,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ArtificialIntelligence,
        Category::Data,
        Category::Research,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::ArtificialIntelligence => "AI/Machine Learning",
            Category::Data => "Data/Analytics",
            Category::Research => "Research",
            Category::Other => "Other",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.label()).collect()
    }
}

/// Ranked categories, best first. `labels` and `scores` are parallel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassificationResult {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl ClassificationResult {
    pub fn validate(self) -> Result<Self, ClassificationError> {
        if self.labels.is_empty() {
            return Err(ClassificationError::Malformed("no labels".into()));
        }
        if self.labels.len() != self.scores.len() {
            return Err(ClassificationError::Malformed(format!(
                "{} labels but {} scores",
                self.labels.len(),
                self.scores.len()
            )));
        }
        Ok(self)
    }

    pub fn top(&self) -> Option<(&str, f64)> {
        Some((self.labels.first()?.as_str(), *self.scores.first()?))
    }

    /// Relevant unless the best match is the catch-all.
    pub fn is_relevant(&self) -> bool {
        self.labels
            .first()
            .is_some_and(|top| top != Category::Other.label())
    }
}

#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        categories: &[&str],
    ) -> Result<ClassificationResult, ClassificationError>;
}

/// Zero-shot classification over a hosted NLI model (Hugging Face inference API shape).
pub struct ZeroShotClassifier {
    endpoint: String,
    token: Option<String>,
    hypothesis_template: String,
    model: OnceCell<ModelHandle>,
    initializations: AtomicUsize,
}

struct ModelHandle {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

/// The endpoint answers with a single object, or a one-element batch.
#[derive(Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    Single(ClassificationResult),
    Batch(Vec<ClassificationResult>),
}

impl ZeroShotClassifier {
    pub fn new(endpoint: String, token: Option<String>, hypothesis_template: String) -> Self {
        ZeroShotClassifier {
            endpoint,
            token,
            hypothesis_template,
            model: OnceCell::new(),
            initializations: AtomicUsize::new(0),
        }
    }

    /// First caller builds the handle; concurrent callers wait on the same init.
    async fn model(&self) -> Result<&ModelHandle, ClassificationError> {
        self.model
            .get_or_try_init(|| async {
                self.initializations.fetch_add(1, Ordering::SeqCst);
                info!(endpoint = %self.endpoint, "initializing classification model");
                self.build_handle()
            })
            .await
    }

    fn build_handle(&self) -> Result<ModelHandle, ClassificationError> {
        let endpoint = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ClassificationError::Init(format!("bad endpoint {}: {}", self.endpoint, e)))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClassificationError::Init(format!("bad token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClassificationError::Init(e.to_string()))?;

        Ok(ModelHandle { http, endpoint })
    }

    #[cfg(test)]
    fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceOracle for ZeroShotClassifier {
    async fn classify(
        &self,
        text: &str,
        categories: &[&str],
    ) -> Result<ClassificationResult, ClassificationError> {
        let model = self.model().await?;
        let payload = json!({
            "inputs": text,
            "parameters": {
                "candidate_labels": categories,
                "hypothesis_template": self.hypothesis_template,
                "multi_label": false,
            },
        });

        let resp = model
            .http
            .post(model.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassificationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ZeroShotResponse = resp
            .json()
            .await
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;
        let result = match parsed {
            ZeroShotResponse::Single(r) => r,
            ZeroShotResponse::Batch(batch) => batch
                .into_iter()
                .next()
                .ok_or_else(|| ClassificationError::Malformed("empty batch".into()))?,
        };
        result.validate()
    }
}

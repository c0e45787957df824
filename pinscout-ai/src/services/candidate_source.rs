//! Candidate acquisition
//!
//! The [`CandidateSource`] seam warms up the content-source account and
//! scrapes candidate records. [`HttpCandidateSource`] delegates both to an
//! external scraper service and copies its log lines into the stage log.

use async_trait::async_trait;
use chrono::Utc;
use pinscout_common::config::AcquisitionConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::progress_log::StageLog;
use crate::models::CandidateRecord;

const USER_AGENT: &str = concat!("PinScout/", env!("CARGO_PKG_VERSION"));

/// Produces candidate records for a prompt
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Prepare the account for scraping; `Ok(false)` when warm-up did not succeed
    async fn warm_up(&self, prompt_text: &str, log: &StageLog) -> anyhow::Result<bool>;

    /// Up to `max_items` candidates; failures yield an empty vec and a logged reason
    async fn acquire(&self, prompt_text: &str, max_items: usize, log: &StageLog)
        -> Vec<CandidateRecord>;
}

#[derive(Debug, Serialize)]
struct WarmupRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct WarmupResponse {
    ok: bool,
    #[serde(default)]
    log: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AcquireRequest<'a> {
    prompt: &'a str,
    max_items: usize,
}

#[derive(Debug, Deserialize)]
struct AcquireResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
    #[serde(default)]
    log: Vec<String>,
}

/// Candidate as the scraper reports it
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCandidate {
    #[serde(alias = "image_url")]
    image_ref: Option<String>,
    #[serde(alias = "pin_url")]
    source_ref: Option<String>,
    title: Option<String>,
    description: Option<String>,
    metadata: Option<Value>,
}

/// Scraper-service backed candidate source
pub struct HttpCandidateSource {
    http_client: reqwest::Client,
    base_url: String,
    link_base: String,
}

impl HttpCandidateSource {
    pub fn new(config: &AcquisitionConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            link_base: config.link_base.trim_end_matches('/').to_string(),
        })
    }

    async fn request_acquire(
        &self,
        prompt_text: &str,
        max_items: usize,
    ) -> anyhow::Result<AcquireResponse> {
        let response = self
            .http_client
            .post(format!("{}/acquire", self.base_url))
            .json(&AcquireRequest {
                prompt: prompt_text,
                max_items,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn warm_up(&self, prompt_text: &str, log: &StageLog) -> anyhow::Result<bool> {
        log.append("Starting warm-up phase...").await;

        let response: WarmupResponse = self
            .http_client
            .post(format!("{}/warmup", self.base_url))
            .json(&WarmupRequest {
                prompt: prompt_text,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        for line in response.log {
            log.append(line).await;
        }
        Ok(response.ok)
    }

    async fn acquire(
        &self,
        prompt_text: &str,
        max_items: usize,
        log: &StageLog,
    ) -> Vec<CandidateRecord> {
        log.append(format!("Starting to scrape pins for: {}", prompt_text))
            .await;

        let response = match self.request_acquire(prompt_text, max_items).await {
            Ok(response) => response,
            Err(e) => {
                log.append(format!("Scraping error: {:#}", e)).await;
                return Vec::new();
            }
        };

        for line in response.log {
            log.append(line).await;
        }

        let candidates: Vec<CandidateRecord> = response
            .candidates
            .into_iter()
            .filter_map(|raw| normalize_candidate(raw, &self.link_base))
            .take(max_items)
            .collect();

        log.append(format!(
            "Scraping completed. Found {} pins",
            candidates.len()
        ))
        .await;
        candidates
    }
}

/// Absolute link for a scraped reference; scheme-less paths join `link_base`
pub fn absolutize_link(link: &str, link_base: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else if link.starts_with('/') {
        format!("{}{}", link_base, link)
    } else {
        format!("{}/{}", link_base, link)
    }
}

/// Keep only candidates with both references; stamp `collected_at`
fn normalize_candidate(raw: RawCandidate, link_base: &str) -> Option<CandidateRecord> {
    let image_ref = raw.image_ref.filter(|s| !s.trim().is_empty())?;
    let source_ref = raw.source_ref.filter(|s| !s.trim().is_empty())?;

    let mut metadata = match raw.metadata {
        Some(Value::Object(map)) => Value::Object(map),
        _ => json!({}),
    };
    if metadata.get("collected_at").is_none() {
        metadata["collected_at"] = json!(Utc::now().to_rfc3339());
    }

    Some(CandidateRecord {
        image_ref,
        source_ref: absolutize_link(source_ref.trim(), link_base),
        title: raw.title.unwrap_or_default().trim().to_string(),
        description: raw.description.unwrap_or_default().trim().to_string(),
        metadata,
    })
}

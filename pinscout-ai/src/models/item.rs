//! Item ("pin") model and classification verdicts

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ItemStatus;

/// A scraped candidate persisted for one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub prompt_id: Uuid,
    /// Link to the page the image came from
    pub source_ref: String,
    /// Image URL; empty when the scraper found none
    pub image_ref: String,
    pub title: String,
    pub description: String,
    pub score: f64,
    pub status: ItemStatus,
    pub explanation: String,
    pub metadata: serde_json::Value,
}

impl Item {
    /// Pending item built from an acquired candidate
    pub fn from_candidate(prompt_id: Uuid, candidate: CandidateRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt_id,
            source_ref: candidate.source_ref,
            image_ref: candidate.image_ref,
            title: candidate.title,
            description: candidate.description,
            score: 0.0,
            status: ItemStatus::Pending,
            explanation: String::new(),
            metadata: candidate.metadata,
        }
    }
}

/// Raw record returned by the candidate source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    pub image_ref: String,
    pub source_ref: String,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Outcome of classifying one item
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Normalized score in [0.0, 1.0]
    pub score: f64,
    pub status: ItemStatus,
    pub explanation: String,
}

/// Per-status item totals for one prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub pending: usize,
    pub approved: usize,
    pub disqualified: usize,
}

impl ItemCounts {
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.disqualified
    }
}

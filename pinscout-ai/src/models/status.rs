//! Status model
//!
//! Closed sets for prompt, stage, stage-status and item status. Values are
//! stored as their lower-case names; parsing an unknown name is an error so
//! a corrupt row can never be loaded as a valid status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Score at or above which an item is approved
pub const APPROVAL_THRESHOLD: f64 = 0.5;

/// Prompt lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    /// Submitted, no run started
    Pending,
    /// A run is in progress (or stopped at a failed stage)
    Processing,
    /// Validation finished
    Completed,
    /// The run hit an unexpected error
    Error,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl FromStr for PromptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid prompt status: {}", s)),
        }
    }
}

/// Workflow stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Account warm-up on the content source
    Warmup,
    /// Candidate scraping and persistence
    Acquisition,
    /// Classification of every pending item
    Validation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Acquisition => "acquisition",
            Self::Validation => "validation",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warmup" => Ok(Self::Warmup),
            "acquisition" => Ok(Self::Acquisition),
            "validation" => Ok(Self::Validation),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

/// Status of one stage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Terminal status for a finished work unit
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Completed
        } else {
            Self::Failed
        }
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid stage status: {}", s)),
        }
    }
}

/// Classification state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Acquired, not yet classified
    Pending,
    Approved,
    Disqualified,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Disqualified => "disqualified",
        }
    }

    /// Label for a normalized score; the 0.5 boundary is inclusive
    pub fn from_score(score: f64) -> Self {
        if score >= APPROVAL_THRESHOLD {
            Self::Approved
        } else {
            Self::Disqualified
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "disqualified" => Ok(Self::Disqualified),
            _ => Err(format!("Invalid item status: {}", s)),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(PromptStatus, Stage, StageStatus, ItemStatus);

//! Data models for pinscout-ai

pub mod item;
pub mod prompt;
pub mod stage_record;
pub mod status;

pub use item::{CandidateRecord, Item, ItemCounts, Verdict};
pub use prompt::{Prompt, MAX_PROMPT_CHARS};
pub use stage_record::{LogEntry, StageRecord};
pub use status::{ItemStatus, PromptStatus, Stage, StageStatus, APPROVAL_THRESHOLD};

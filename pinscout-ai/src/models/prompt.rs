//! Prompt model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PromptStatus;

/// Longest accepted prompt text, in characters
pub const MAX_PROMPT_CHARS: usize = 500;

/// A user-submitted search prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub text: String,
    pub status: PromptStatus,
    pub created_at: DateTime<Utc>,
}

impl Prompt {
    /// New prompt in Pending state
    ///
    /// Text is trimmed; empty or overlong text is rejected with a message
    /// suitable for a 400 response.
    pub fn new(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("Prompt text must not be empty".to_string());
        }
        let chars = text.chars().count();
        if chars > MAX_PROMPT_CHARS {
            return Err(format!(
                "Prompt text is {} characters, maximum is {}",
                chars, MAX_PROMPT_CHARS
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            status: PromptStatus::Pending,
            created_at: Utc::now(),
        })
    }
}

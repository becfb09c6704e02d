use serde_json::Value;

use crate::core::state::{ErrorRecord, ProfileOutcome};
use crate::services::llm::LlmClient;

pub const SKIP_MARKER: &str = "skip";

const PROFILE_SCHEMA: &str = r#"{
"character_id": "...",
"name": "...",
"dialogue_samples": [{"quote": "...", "context": "...", "book": "...", "emotional_state": "...", "topic": "..."}],
"personality_traits": {"trait": 0.0},
"speaking_patterns": {"formality": "...", "vocabulary_complexity": "...", "sentence_length": "..."},
"knowledge_domains": ["..."]
}"#;

pub fn build_prompt(paragraph: &str) -> String {
    format!(
        "You are an expert in fictional character profiling.\n\
        \n\
        From the following paragraph, extract a structured character description in this JSON format:\n\
        \n\
        {}\n\
        \n\
        If the paragraph contains no character activity or dialogue, respond with just the single word:\n\
        **{}**\n\
        \n\
        Paragraph:\n\
        \"\"\"\n\
        {}\n\
        \"\"\"\n\
        \n\
        Output:\n",
        PROFILE_SCHEMA, SKIP_MARKER, paragraph
    )
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

/// Classifies a model response: the skip marker, a JSON value, or a parse failure
/// carrying the response untouched.
pub fn interpret_response(raw: &str) -> ProfileOutcome {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(SKIP_MARKER) {
        return ProfileOutcome::Skip;
    }

    match serde_json::from_str::<Value>(&strip_code_blocks(trimmed)) {
        Ok(value) => ProfileOutcome::Profile(value),
        Err(e) => {
            log::warn!("JSON parse error: {}", e);
            ProfileOutcome::Failed(ErrorRecord::parse(raw))
        }
    }
}

/// Turns paragraphs into profile outcomes, one model call each.
pub struct ProfileExtractor<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> ProfileExtractor<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    /// Never fails: transport errors become a `RequestError` record.
    pub async fn extract(&self, paragraph: &str) -> ProfileOutcome {
        let prompt = build_prompt(paragraph);
        match self.llm.generate(&prompt).await {
            Ok(raw) => interpret_response(&raw),
            Err(e) => {
                log::warn!("Request error: {:#}", e);
                ProfileOutcome::Failed(ErrorRecord::request(format!("{:#}", e)))
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Typed view over a profile entry produced by the model.
///
/// The model is only asked to follow this shape, so every field is optional
/// and unknown keys are ignored. Persisted entries stay raw [`Value`]s; this
/// struct is only used for reporting.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct CharacterRecord {
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dialogue_samples: Vec<DialogueSample>,
    #[serde(default)]
    pub personality_traits: HashMap<String, f64>,
    #[serde(default)]
    pub speaking_patterns: Option<SpeakingPatterns>,
    #[serde(default)]
    pub knowledge_domains: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct DialogueSample {
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub book: Option<String>,
    #[serde(default)]
    pub emotional_state: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct SpeakingPatterns {
    #[serde(default)]
    pub formality: Option<String>,
    #[serde(default)]
    pub vocabulary_complexity: Option<String>,
    #[serde(default)]
    pub sentence_length: Option<String>,
}

impl CharacterRecord {
    /// Best-effort read of a stored entry. Returns `None` for error records and
    /// for values that are not objects or do not fit the advisory shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() || ErrorRecord::is_error_entry(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Name used when reporting: `name`, falling back to `character_id`.
    pub fn display_name(&self) -> Option<&str> {
        non_blank(&self.name).or_else(|| non_blank(&self.character_id))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    ParseError,
    RequestError,
}

/// Placeholder stored in place of a profile when generation or parsing failed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorRecord {
    pub fn parse(raw_response: &str) -> Self {
        Self {
            error: "Failed to parse JSON".to_string(),
            kind: ErrorKind::ParseError,
            raw_response: Some(raw_response.to_string()),
            details: None,
        }
    }

    pub fn request(details: impl Into<String>) -> Self {
        Self {
            error: "Request failed".to_string(),
            kind: ErrorKind::RequestError,
            raw_response: None,
            details: Some(details.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        // Plain struct of strings, serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_error_entry(value: &Value) -> bool {
        value.get("error").map_or(false, Value::is_string)
    }
}

/// Result of extracting one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileOutcome {
    Skip,
    Profile(Value),
    Failed(ErrorRecord),
}

impl ProfileOutcome {
    /// Entry to store in the output collection, `None` for skipped paragraphs.
    pub fn into_entry(self) -> Option<Value> {
        match self {
            ProfileOutcome::Skip => None,
            ProfileOutcome::Profile(value) => Some(value),
            ProfileOutcome::Failed(record) => Some(record.to_value()),
        }
    }
}

/// Counts over an output collection, as printed by `inspect`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutputSummary {
    pub total: usize,
    pub profiles: usize,
    pub errors: BTreeMap<String, usize>,
    pub other: usize,
    pub names: BTreeSet<String>,
}

impl OutputSummary {
    pub fn from_entries(entries: &[Value]) -> Self {
        let mut summary = Self {
            total: entries.len(),
            ..Self::default()
        };

        for entry in entries {
            if ErrorRecord::is_error_entry(entry) {
                let kind = entry
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string();
                *summary.errors.entry(kind).or_insert(0) += 1;
            } else if entry.is_object() {
                // Off-shape objects still count, they just may not yield a name.
                summary.profiles += 1;
                if let Some(record) = CharacterRecord::from_value(entry) {
                    if let Some(name) = record.display_name() {
                        summary.names.insert(name.to_string());
                    }
                }
            } else {
                summary.other += 1;
            }
        }

        summary
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().sum()
    }
}

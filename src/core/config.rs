use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::llm::LlmConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_pdf_file")]
    pub pdf_file: String,

    #[serde(default = "default_book_file")]
    pub book_file: String,

    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Number of non-skip results accumulated before a flush to `output_file`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_pdf_file() -> String {
    "book.pdf".to_string()
}
fn default_book_file() -> String {
    "book_text.txt".to_string()
}
fn default_output_file() -> String {
    "all_characters.json".to_string()
}
fn default_batch_size() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pdf_file: default_pdf_file(),
            book_file: default_book_file(),
            output_file: default_output_file(),
            batch_size: default_batch_size(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.llm.request_timeout_seconds == 0 {
            anyhow::bail!("llm.request_timeout_seconds must be at least 1");
        }
        Ok(())
    }
}

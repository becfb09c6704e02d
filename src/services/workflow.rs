use crate::core::config::Config;
use crate::core::io::{JsonArrayFile, RecordSink};
use crate::core::state::ProfileOutcome;
use crate::services::batch::Batcher;
use crate::services::llm::LlmClient;
use crate::services::paragraph::split_paragraphs;
use crate::services::profile::ProfileExtractor;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub paragraphs: usize,
    pub skipped: usize,
    pub profiles: usize,
    pub errors: usize,
    pub flushes: usize,
}

impl RunSummary {
    /// Paragraphs that produced an entry in the output collection.
    pub fn processed(&self) -> usize {
        self.profiles + self.errors
    }
}

pub struct ProfilePipeline {
    batch_size: usize,
    llm: Box<dyn LlmClient>,
    sink: Box<dyn RecordSink>,
}

impl ProfilePipeline {
    pub fn new(config: &Config, llm: Box<dyn LlmClient>) -> Result<Self> {
        config.validate()?;
        let sink = Box::new(JsonArrayFile::new(&config.output_file));
        Ok(Self::with_sink(config.batch_size, llm, sink))
    }

    pub fn with_sink(batch_size: usize, llm: Box<dyn LlmClient>, sink: Box<dyn RecordSink>) -> Self {
        Self { batch_size, llm, sink }
    }

    pub async fn run_file(&self, book_path: &Path) -> Result<RunSummary> {
        let text = fs::read_to_string(book_path)
            .with_context(|| format!("Failed to read book text {}", book_path.display()))?;
        self.run(&text).await
    }

    pub async fn run(&self, text: &str) -> Result<RunSummary> {
        let paragraphs = split_paragraphs(text);
        let total = paragraphs.len();
        println!("Total paragraphs: {}", total);
        if let Some(first) = paragraphs.first() {
            log::debug!("First paragraph: {}", first);
        }

        let extractor = ProfileExtractor::new(self.llm.as_ref());
        let mut batcher = Batcher::new(self.sink.as_ref(), self.batch_size);
        let mut summary = RunSummary {
            paragraphs: total,
            ..RunSummary::default()
        };

        for (idx, paragraph) in paragraphs.iter().enumerate() {
            let number = idx + 1;
            println!("Processing paragraph {}/{}", number, total);

            let outcome = extractor.extract(paragraph).await;
            match &outcome {
                ProfileOutcome::Skip => {
                    println!("Paragraph {} skipped", number);
                    summary.skipped += 1;
                    continue;
                }
                ProfileOutcome::Profile(_) => summary.profiles += 1,
                ProfileOutcome::Failed(record) => {
                    log::warn!("Paragraph {} recorded as {:?}", number, record.kind);
                    summary.errors += 1;
                }
            }

            if let Some(entry) = outcome.into_entry() {
                batcher.push(entry).await?;
            }
        }

        batcher.finish().await?;
        summary.flushes = batcher.flushes();

        println!(
            "Processing complete. Total processed paragraphs: {} ({} profiles, {} errors, {} skipped)",
            summary.processed(),
            summary.profiles,
            summary.errors,
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    // Mock LLM Client
    #[derive(Debug)]
    struct MockLlmClient {
        call_count: Arc<Mutex<usize>>,
    }

    impl MockLlmClient {
        fn new() -> Self {
            Self {
                call_count: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn generate(&self, prompt: &str) -> Result<String> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;

            if prompt.contains("NARRATION") {
                return Ok("Skip".to_string());
            } else if prompt.contains("GARBLED") {
                return Ok("I think this is Harry, but I'm not sure.".to_string());
            } else if prompt.contains("OFFLINE") {
                return Err(anyhow!("error sending request: connection refused"));
            }

            let id = prompt
                .split("CHAR-")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .unwrap_or("unknown");
            Ok(format!(r#"{{"character_id": "{}", "name": "Character {}"}}"#, id, id))
        }
    }

    fn book(paragraphs: &[&str]) -> String {
        paragraphs.join("\n\n")
    }

    fn read_entries(path: &Path) -> Result<Vec<Value>> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    fn pipeline_for(path: &Path, batch_size: usize) -> (ProfilePipeline, Arc<Mutex<usize>>) {
        let llm = MockLlmClient::new();
        let call_count = llm.call_count.clone();
        let sink = Box::new(JsonArrayFile::new(path));
        (ProfilePipeline::with_sink(batch_size, Box::new(llm), sink), call_count)
    }

    #[tokio::test]
    async fn test_every_non_skipped_paragraph_yields_one_entry_in_order() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let output = temp_dir.path().join("all_characters.json");
        let (pipeline, call_count) = pipeline_for(&output, 2);

        let text = book(&[
            "CHAR-a speaks.",
            "NARRATION about the weather.",
            "CHAR-b replies.",
            "GARBLED output follows.",
            "OFFLINE endpoint.",
            "CHAR-c leaves.",
        ]);

        let summary = pipeline.run(&text).await?;

        assert_eq!(*call_count.lock().unwrap(), 6, "one call per paragraph, no retries");
        assert_eq!(
            summary,
            RunSummary { paragraphs: 6, skipped: 1, profiles: 3, errors: 2, flushes: 3 }
        );

        let entries = read_entries(&output)?;
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0]["character_id"], "a");
        assert_eq!(entries[1]["character_id"], "b");
        assert_eq!(entries[2]["kind"], "ParseError");
        assert_eq!(entries[2]["raw_response"], "I think this is Harry, but I'm not sure.");
        assert_eq!(entries[3]["kind"], "RequestError");
        assert_eq!(entries[4]["character_id"], "c");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_appends_to_previous_output() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let output = temp_dir.path().join("all_characters.json");
        fs::write(&output, serde_json::to_string(&vec![json!({"character_id": "old"})])?)?;

        let (pipeline, _) = pipeline_for(&output, 10);
        pipeline.run(&book(&["CHAR-new arrives."])).await?;

        let entries = read_entries(&output)?;
        assert_eq!(entries, vec![
            json!({"character_id": "old"}),
            json!({"character_id": "new", "name": "Character new"}),
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_skipped_writes_nothing() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let output = temp_dir.path().join("all_characters.json");
        let (pipeline, _) = pipeline_for(&output, 10);

        let summary = pipeline.run(&book(&["NARRATION one.", "NARRATION two."])).await?;

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.flushes, 0);
        assert!(!output.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_twenty_three_profiles_flush_three_times() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let output = temp_dir.path().join("all_characters.json");
        let (pipeline, _) = pipeline_for(&output, 10);

        let paragraphs: Vec<String> = (0..23).map(|i| format!("CHAR-{} waves.", i)).collect();
        let refs: Vec<&str> = paragraphs.iter().map(String::as_str).collect();
        let summary = pipeline.run(&book(&refs)).await?;

        assert_eq!(summary.flushes, 3);
        assert_eq!(read_entries(&output)?.len(), 23);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_file_reads_book_text() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let book_path = temp_dir.path().join("book_text.txt");
        let output = temp_dir.path().join("all_characters.json");
        fs::write(&book_path, "CHAR-x enters.\n\n\n\nNARRATION.\n")?;

        let (pipeline, _) = pipeline_for(&output, 10);
        let summary = pipeline.run_file(&book_path).await?;

        assert_eq!(summary.paragraphs, 2);
        assert_eq!(summary.processed(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_book_text_is_an_error() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (pipeline, call_count) = pipeline_for(&temp_dir.path().join("out.json"), 10);

        let result = pipeline.run_file(&temp_dir.path().join("missing.txt")).await;

        assert!(result.is_err());
        assert_eq!(*call_count.lock().unwrap(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unwritable_output_aborts_run() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "not a directory")?;
        let (pipeline, call_count) = pipeline_for(&blocker.join("out.json"), 1);

        let result = pipeline.run(&book(&["CHAR-a", "CHAR-b", "CHAR-c"])).await;

        assert!(result.is_err());
        assert_eq!(*call_count.lock().unwrap(), 1, "run stops at the first failed flush");
        Ok(())
    }

    #[test]
    fn test_new_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.batch_size = 0;
        assert!(ProfilePipeline::new(&config, Box::new(MockLlmClient::new())).is_err());
    }
}

use anyhow::Result;
use serde_json::Value;

use crate::core::io::RecordSink;

/// Buffers output entries and hands them to a [`RecordSink`] every
/// `threshold` entries.
pub struct Batcher<'a> {
    sink: &'a dyn RecordSink,
    threshold: usize,
    pending: Vec<Value>,
    flushes: usize,
}

impl<'a> Batcher<'a> {
    pub fn new(sink: &'a dyn RecordSink, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            sink,
            threshold,
            pending: Vec::new(),
            flushes: 0,
        }
    }

    /// Adds one entry. Returns the number of entries written if this push
    /// reached the threshold.
    pub async fn push(&mut self, entry: Value) -> Result<Option<usize>> {
        self.pending.push(entry);
        if self.pending.len() >= self.threshold {
            return self.flush().await;
        }
        Ok(None)
    }

    /// Writes whatever is still pending, regardless of size.
    pub async fn finish(&mut self) -> Result<Option<usize>> {
        self.flush().await
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    async fn flush(&mut self) -> Result<Option<usize>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.sink.append(batch).await?;
        self.flushes += 1;
        println!("Saved {} items to {}", count, self.sink.describe());
        Ok(Some(count))
    }
}

mod ollama;
mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::models::Task;

pub use ollama::OllamaInsight;
pub use prompt::{build_prompt, clean_response, HistorySummary};

pub const STUB_INSIGHT: &str = "AI Insight: Your task completion rate in the last 72 hours is 85%. \
You tend to schedule high-priority tasks in the late evening, suggesting effective focus during \
non-standard working hours. Consider front-loading medium tasks to clear your mornings.";

/// Source of the behavioural summary shown in the insight panel.
#[async_trait]
pub trait InsightRequester: Send + Sync {
    async fn request_insight(&self, history: &[Task]) -> Result<String>;

    /// Message posted once an insight has been produced.
    fn success_message(&self) -> &str {
        "AI analysis completed."
    }
}

/// Offline stand-in: waits a moment and returns a canned summary.
pub struct StubInsight {
    delay: Duration,
}

impl StubInsight {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for StubInsight {
    fn default() -> Self {
        Self::new(Duration::from_millis(800))
    }
}

#[async_trait]
impl InsightRequester for StubInsight {
    async fn request_insight(&self, history: &[Task]) -> Result<String> {
        log::debug!("Simulating insight over {} task(s)", history.len());
        tokio::time::sleep(self.delay).await;
        Ok(STUB_INSIGHT.to_string())
    }

    fn success_message(&self) -> &str {
        "AI analysis simulated successfully."
    }
}

#[async_trait]
impl<R: InsightRequester + ?Sized> InsightRequester for Box<R> {
    async fn request_insight(&self, history: &[Task]) -> Result<String> {
        (**self).request_insight(history).await
    }

    fn success_message(&self) -> &str {
        (**self).success_message()
    }
}

use parking_lot::Mutex;
use std::sync::Arc;

use crate::llm::InsightRequester;
use crate::models::Task;
use crate::notify::NotificationQueue;

pub const MSG_INSIGHT_FAILED: &str = "Failed to get AI insight.";
pub const IDLE_PLACEHOLDER: &str =
    "Press 'i' to analyze your habits (completion rates, scheduling, priority trends).";
pub const LOADING_TEXT: &str = "Analyzing past task data...";
pub const FAILED_TEXT: &str = "Error fetching AI insight.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InsightState {
    #[default]
    Idle,
    Loading,
    Ready(String),
    Failed,
}

impl InsightState {
    /// Text for the insight panel.
    pub fn text(&self) -> &str {
        match self {
            InsightState::Idle => IDLE_PLACEHOLDER,
            InsightState::Loading => LOADING_TEXT,
            InsightState::Ready(text) => text,
            InsightState::Failed => FAILED_TEXT,
        }
    }
}

// Puts a still-loading panel back to idle if `generate` is dropped before
// the requester answers.
struct LoadingGuard<'a>(&'a Mutex<InsightState>);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if *state == InsightState::Loading {
            *state = InsightState::Idle;
        }
    }
}

/// Loading/result bookkeeping around an [`InsightRequester`].
pub struct InsightPanel<R> {
    requester: R,
    state: Mutex<InsightState>,
    notifications: Arc<NotificationQueue>,
}

impl<R: InsightRequester> InsightPanel<R> {
    pub fn new(requester: R, notifications: Arc<NotificationQueue>) -> Self {
        Self {
            requester,
            state: Mutex::new(InsightState::Idle),
            notifications,
        }
    }

    pub fn state(&self) -> InsightState {
        self.state.lock().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.state.lock() == InsightState::Loading
    }

    /// Requests a fresh insight. Ignored while one is already loading.
    pub async fn generate(&self, history: &[Task]) -> InsightState {
        {
            let mut state = self.state.lock();
            if *state == InsightState::Loading {
                log::debug!("Insight already loading, ignoring request");
                return InsightState::Loading;
            }
            *state = InsightState::Loading;
        }
        let _guard = LoadingGuard(&self.state);

        let next = match self.requester.request_insight(history).await {
            Ok(text) => {
                self.notifications.info(self.requester.success_message());
                InsightState::Ready(text)
            }
            Err(err) => {
                log::error!("Error generating AI insight: {:#}", err);
                self.notifications.error(MSG_INSIGHT_FAILED);
                InsightState::Failed
            }
        };
        *self.state.lock() = next.clone();
        next
    }
}

use chrono::{DateTime, FixedOffset, Timelike};

use crate::models::{Priority, Task};

const SYSTEM_PROMPT: &str = "You are a productivity coach. Given statistics about a person's task list, \
write a short behavioural insight (three sentences at most) about their completion habits, \
scheduling and priority trends. Return only the insight, no preamble.";

/// Aggregate numbers about a task history, fed to the model instead of raw
/// task titles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub total: usize,
    pub completed: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub with_due_date: usize,
    pub due_in_evening: usize,
    pub recurring: usize,
}

impl HistorySummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = HistorySummary {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            if task.completed {
                summary.completed += 1;
            }
            if task.is_recurring {
                summary.recurring += 1;
            }
            match task.priority {
                Priority::High => summary.high += 1,
                Priority::Medium => summary.medium += 1,
                Priority::Low => summary.low += 1,
                Priority::Unrecognized(_) => {}
            }
            if let Some(due) = &task.due_date {
                summary.with_due_date += 1;
                if is_evening(due) {
                    summary.due_in_evening += 1;
                }
            }
        }
        summary
    }

    /// Completion rate in whole percent; zero for an empty history.
    pub fn completion_rate(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.completed * 100 / self.total
        }
    }
}

fn is_evening(due: &DateTime<FixedOffset>) -> bool {
    due.hour() >= 18
}

pub fn build_prompt(tasks: &[Task]) -> String {
    let s = HistorySummary::from_tasks(tasks);
    format!(
        "{}\n\nTask statistics:\n\
         - total tasks: {}\n\
         - completed: {} ({}%)\n\
         - priorities: {} high, {} medium, {} low\n\
         - with a due date: {} ({} due after 18:00)\n\
         - recurring: {}\n\nInsight:",
        SYSTEM_PROMPT,
        s.total,
        s.completed,
        s.completion_rate(),
        s.high,
        s.medium,
        s.low,
        s.with_due_date,
        s.due_in_evening,
        s.recurring
    )
}

/// Strips labels and wrapping quotes small models like to add.
pub fn clean_response(response: &str) -> String {
    let mut cleaned = response.trim();

    for prefix in ["Insight:", "AI Insight:", "Answer:"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim_start();
        }
    }

    if cleaned.len() > 2 && cleaned.starts_with('"') && cleaned.ends_with('"') {
        cleaned = &cleaned[1..cleaned.len() - 1];
    }

    cleaned.to_string()
}

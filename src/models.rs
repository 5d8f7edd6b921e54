use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const NO_DUE_DATE: &str = "No Due Date";

// Month/day/year + hour:minute, rendered in local time
const DUE_DATE_FORMAT: &str = "%b %-d, %Y, %I:%M %p";

/// Identifier assigned by the remote store. Never constructed client-side
/// except when the user names an existing task on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic colour class attached to a priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Error,
    Warning,
    Primary,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    /// A code this client does not know. Kept verbatim so it round-trips.
    Unrecognized(String),
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn code(&self) -> &str {
        match self {
            Priority::High => "H",
            Priority::Medium => "M",
            Priority::Low => "L",
            Priority::Unrecognized(code) => code,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Unrecognized(code) => code,
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Priority::High => Tone::Error,
            Priority::Medium => Tone::Warning,
            Priority::Low => Tone::Primary,
            Priority::Unrecognized(_) => Tone::Neutral,
        }
    }
}

impl From<String> for Priority {
    fn from(code: String) -> Self {
        match code.as_str() {
            "H" => Priority::High,
            "M" => Priority::Medium,
            "L" => Priority::Low,
            _ => Priority::Unrecognized(code),
        }
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        priority.code().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub due_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub priority_display: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub ai_insight: Option<String>,
}

impl Task {
    /// Label for the priority column. Prefers the server-provided label for
    /// codes this client does not recognise.
    pub fn priority_label(&self) -> &str {
        match (&self.priority, &self.priority_display) {
            (Priority::Unrecognized(_), Some(display)) => display,
            (priority, _) => priority.label(),
        }
    }

    pub fn due_label(&self) -> String {
        match &self.due_date {
            Some(due) => due.with_timezone(&Local).format(DUE_DATE_FORMAT).to_string(),
            None => NO_DUE_DATE.to_string(),
        }
    }
}

/// Body of a creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDateTime>,
    pub description: String,
}

impl NewTask {
    pub fn new(title: impl Into<String>, priority: Priority, due_date: Option<NaiveDateTime>) -> Self {
        NewTask {
            title: title.into(),
            priority,
            due_date,
            description: String::new(),
        }
    }
}

/// Partial update. Only the fields that are set go on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        TaskPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        TaskPatch {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Info => "info",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub visible: bool,
}

/// Which prompt the terminal UI is currently collecting input for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupMode {
    None,
    NewTaskTitle,
    NewTaskPriority,
    NewTaskDueDate,
    EditTitle,
}

/// Parses a user-entered due date such as `2026-10-18T15:30` or
/// `2026-10-18 15:30`.
pub fn parse_due_input(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
}

fn parse_remote_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    // Backends running without time zone support send naive timestamps
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.fixed_offset())
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| {
        let parsed = parse_remote_datetime(&raw);
        if parsed.is_none() {
            log::warn!("Ignoring unparseable timestamp '{}'", raw);
        }
        parsed
    }))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

use crate::models::{Task, TaskId};

/// Inline title editing. At most one task is being edited at a time, and the
/// working title only exists while editing, so a half-set session cannot be
/// represented.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditSession {
    #[default]
    Idle,
    Editing { id: TaskId, title: String },
}

impl EditSession {
    /// Starts editing `task`, discarding any other unsaved session.
    pub fn begin(&mut self, task: &Task) {
        if let EditSession::Editing { id, .. } = self {
            if *id != task.id {
                log::debug!("Discarding unsaved edit of task {}", id);
            }
        }
        *self = EditSession::Editing {
            id: task.id,
            title: task.title.clone(),
        };
    }

    /// Replaces the working title. Ignored when idle.
    pub fn set_title(&mut self, text: impl Into<String>) {
        if let EditSession::Editing { title, .. } = self {
            *title = text.into();
        }
    }

    pub fn cancel(&mut self) {
        *self = EditSession::Idle;
    }

    /// Closes the session if it belongs to `id`. Returns whether it did.
    pub fn finish(&mut self, id: TaskId) -> bool {
        if self.editing_id() == Some(id) {
            *self = EditSession::Idle;
            true
        } else {
            false
        }
    }

    pub fn editing_id(&self) -> Option<TaskId> {
        match self {
            EditSession::Editing { id, .. } => Some(*id),
            EditSession::Idle => None,
        }
    }

    pub fn working_title(&self) -> Option<&str> {
        match self {
            EditSession::Editing { title, .. } => Some(title),
            EditSession::Idle => None,
        }
    }

    pub fn is_editing(&self, id: TaskId) -> bool {
        self.editing_id() == Some(id)
    }
}

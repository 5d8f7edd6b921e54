//! Terminal client for a remote task store.
//!
//! The library holds the synchronisation core: a local mirror of the remote
//! task list ([`store::TaskStore`]) that re-fetches after every confirmed
//! mutation, a retry combinator with exponential backoff, the inline edit
//! state machine, the single-slot notification channel and the insight
//! panel. The binary adds a CLI and a ratatui front end on top.

pub mod api;
pub mod config;
pub mod editor;
pub mod error;
pub mod insight;
pub mod llm;
pub mod models;
pub mod notify;
pub mod retry;
pub mod session;
pub mod store;
pub mod ui;

pub use api::{HttpTaskApi, TaskApi};
pub use error::{ApiError, TaskError};
pub use models::{Priority, Severity, Task, TaskId};
pub use store::TaskStore;

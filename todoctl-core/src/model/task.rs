//! Task entity, title/note validation and change sets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{required, ValidationError};

/// Maximum length for task titles
const MAX_TITLE_LEN: usize = 256;

/// Maximum length for task notes
const MAX_NOTE_LEN: usize = 4096;

/// Task record as stored in `tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub note: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated task title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTitle(String);

impl TaskTitle {
    /// Create a new task title.
    ///
    /// # Rules
    /// - Non-empty (after trimming whitespace)
    /// - Max 256 characters
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        required("title", s, MAX_TITLE_LEN).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Validated free-text note. Empty notes are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskNote(String);

impl TaskNote {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.chars().count() > MAX_NOTE_LEN {
            return Err(ValidationError::TooLong {
                field: "note",
                max: MAX_NOTE_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Insert payload for `tasks`
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: i64,
    pub title: TaskTitle,
    pub note: TaskNote,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewTask {
    /// A not-yet-done task stamped with the current time.
    pub fn new(user_id: i64, title: TaskTitle, note: TaskNote) -> Self {
        let now = super::now();
        Self {
            user_id,
            title,
            note,
            done: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field changes for a task update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<TaskTitle>,
    pub note: Option<TaskNote>,
    pub done: Option<bool>,
}

impl TaskPatch {
    /// Apply the changes and bump `updated_at`.
    ///
    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            task.title = title.into_string();
        }
        if let Some(note) = self.note {
            task.note = note.into_string();
        }
        if let Some(done) = self.done {
            task.done = done;
        }
        task.updated_at = now.max(task.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Task {
        let at = Utc::now();
        Task {
            id: 3,
            user_id: 1,
            title: "write report".into(),
            note: String::new(),
            done: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn rejects_whitespace_title() {
        assert!(matches!(
            TaskTitle::new("   ").unwrap_err(),
            ValidationError::Empty { field: "title" }
        ));
    }

    #[test]
    fn note_may_be_empty_but_bounded() {
        assert!(TaskNote::new("").is_ok());
        assert!(TaskNote::new(&"n".repeat(4096)).is_ok());
        assert!(matches!(
            TaskNote::new(&"n".repeat(4097)).unwrap_err(),
            ValidationError::TooLong { field: "note", .. }
        ));
    }

    #[test]
    fn patch_updates_fields_and_timestamp() {
        let mut task = sample();
        let created = task.created_at;
        let later = created + Duration::seconds(5);

        TaskPatch {
            done: Some(true),
            ..Default::default()
        }
        .apply(&mut task, later);

        assert!(task.done);
        assert_eq!(task.title, "write report");
        assert_eq!(task.created_at, created);
        assert_eq!(task.updated_at, later);
    }

    #[test]
    fn patch_never_moves_updated_at_backwards() {
        let mut task = sample();
        let before = task.updated_at;
        TaskPatch::default().apply(&mut task, before - Duration::seconds(30));
        assert_eq!(task.updated_at, before);
    }
}

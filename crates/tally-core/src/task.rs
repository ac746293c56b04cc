use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default lead time for reminders: 15 minutes before the due date.
pub const DEFAULT_NOTIFY_BEFORE_MS: i64 = 15 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Browser,
    Toast,
    Both,
}

impl NotificationType {
    pub fn wants_toast(self) -> bool {
        matches!(self, Self::Toast | Self::Both)
    }

    pub fn wants_desktop(self) -> bool {
        matches!(self, Self::Browser | Self::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub enabled: bool,

    /// Lead time before the due date, in milliseconds.
    pub notify_before: i64,

    pub notification_type: NotificationType,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Default for Reminder {
    fn default() -> Self {
        Self {
            enabled: false,
            notify_before: DEFAULT_NOTIFY_BEFORE_MS,
            notification_type: NotificationType::Both,
            sent_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub text: String,

    #[serde(default)]
    pub description: String,

    pub completed: bool,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Soft references; a deleted category leaves its id in place.
    #[serde(default)]
    pub categories: Vec<Uuid>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub reminder: Reminder,
}

impl Task {
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: draft.text,
            description: draft.description,
            completed: draft.completed,
            completed_at: draft.completed.then_some(now),
            categories: draft.categories,
            tags: vec![],
            created_at: now,
            updated_at: now,
            due_date: draft.due_date,
            reminder: Reminder::default(),
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Start of the window in which a "due soon" notification may fire.
    pub fn reminder_time(&self) -> Option<DateTime<Utc>> {
        let due = self.due_date?;
        Some(due - chrono::Duration::milliseconds(self.reminder.notify_before))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub text: String,
    pub description: String,
    pub categories: Vec<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Partial update; `None` leaves the field untouched. `due_date` is doubly
/// optional so a patch can clear it.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub categories: Option<Vec<Uuid>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderPatch {
    pub enabled: Option<bool>,
    pub notify_before: Option<i64>,
    pub notification_type: Option<NotificationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,

    pub name: String,

    /// Display token, e.g. a hex color or a palette name.
    pub color: String,

    #[serde(default)]
    pub icon: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn from_draft(draft: CategoryDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: draft.name,
            color: draft.color,
            icon: draft.icon,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

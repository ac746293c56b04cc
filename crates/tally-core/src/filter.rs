use std::str::FromStr;

use anyhow::anyhow;
use uuid::Uuid;

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" | "done" => Ok(Self::Completed),
            "pending" | "open" => Ok(Self::Pending),
            other => Err(anyhow!("unknown status filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    DueDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Transient view state. Never persisted; reset restores every default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterState {
    pub status: StatusFilter,
    pub search: String,
    pub categories: Vec<Uuid>,
    pub tags: Vec<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl FilterState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn status_matches(&self, task: &Task) -> bool {
        match self.status {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Pending => !task.completed,
        }
    }

    /// Empty selection passes everything; otherwise the task must reference
    /// at least one selected category. Stale selections simply match nothing.
    pub fn categories_match(&self, task: &Task) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        task.categories
            .iter()
            .any(|id| self.categories.contains(id))
    }
}

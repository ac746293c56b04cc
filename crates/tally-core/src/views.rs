use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::search;
use crate::store::Store;
use crate::task::Task;

/// Memoized projection of the visible task list.
///
/// The pipeline runs in fixed order: flatten in display order, partition by
/// status, rank by fuzzy relevance when a query is set, then intersect with
/// the selected categories. The result is cached against the revisions of
/// the two inputs that can change it, so unrelated store traffic (category
/// edits, repeated reads) never forces a recompute.
#[derive(Debug, Default)]
pub struct ViewCache {
    key: Option<(u64, u64)>,
    order: Vec<Uuid>,
    recomputes: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_ids(&mut self, store: &Store) -> &[Uuid] {
        let key = (store.tasks_rev(), store.filters_rev());
        if self.key != Some(key) {
            self.order = compute_pipeline(store);
            self.key = Some(key);
            self.recomputes += 1;
            debug!(
                visible = self.order.len(),
                recomputes = self.recomputes,
                "recomputed visible task list"
            );
        } else {
            trace!("visible task list served from cache");
        }
        &self.order
    }

    pub fn visible_tasks<'a>(&mut self, store: &'a Store) -> Vec<&'a Task> {
        self.visible_ids(store)
            .iter()
            .filter_map(|id| store.task(*id))
            .collect()
    }

    /// How many times the pipeline actually ran; the memoization contract is
    /// asserted on this.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }
}

fn compute_pipeline(store: &Store) -> Vec<Uuid> {
    let state = store.state();
    let filters = &state.filters;

    let by_status: Vec<&Task> = state
        .tasks
        .iter_ordered()
        .filter(|task| filters.status_matches(task))
        .collect();

    let query = filters.search.trim();
    let searched: Vec<&Task> = if query.is_empty() {
        by_status
    } else {
        let mut scored: Vec<(f64, &Task)> = by_status
            .into_iter()
            .filter_map(|task| search::score_task(query, task).map(|score| (score, task)))
            .collect();
        // Stable sort keeps display order among equally relevant tasks.
        scored.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, task)| task).collect()
    };

    searched
        .into_iter()
        .filter(|task| filters.categories_match(task))
        .map(|task| task.id)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
}

pub fn stats(store: &Store, now: DateTime<Utc>) -> TaskStats {
    let tasks: Vec<&Task> = store.state().tasks.iter_ordered().collect();
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let overdue = tasks.iter().filter(|task| task.is_overdue(now)).count();

    TaskStats {
        total,
        completed,
        pending: total - completed,
        overdue,
    }
}

pub fn overdue_tasks(store: &Store, now: DateTime<Utc>) -> Vec<&Task> {
    store
        .state()
        .tasks
        .iter_ordered()
        .filter(|task| task.is_overdue(now))
        .collect()
}

/// Tasks whose reminder window opens within the next 24 hours.
pub fn upcoming_reminders(store: &Store, now: DateTime<Utc>) -> Vec<&Task> {
    let horizon = now + Duration::hours(24);
    store
        .state()
        .tasks
        .iter_ordered()
        .filter(|task| {
            if task.completed || task.due_date.is_none() || !task.reminder.enabled {
                return false;
            }
            task.reminder_time()
                .map(|at| at >= now && at <= horizon)
                .unwrap_or(false)
        })
        .collect()
}

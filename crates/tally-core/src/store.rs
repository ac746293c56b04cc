use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Error;
use crate::filter::{FilterState, SortField, SortOrder, StatusFilter};
use crate::task::{
    Category, CategoryDraft, CategoryPatch, ReminderPatch, Task, TaskDraft, TaskPatch,
};

/// Normalized table: keyed lookup plus a separately owned display order.
/// The order survives reorders independently of insertion order, and pruning
/// an entity always prunes its id from the sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table<T> {
    pub by_id: HashMap<Uuid, T>,
    pub all_ids: Vec<Uuid>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            all_ids: Vec::new(),
        }
    }
}

impl<T> Table<T> {
    pub fn len(&self) -> usize {
        self.all_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_ids.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut T> {
        self.by_id.get_mut(&id)
    }

    pub fn insert(&mut self, id: Uuid, value: T) {
        self.by_id.insert(id, value);
        self.all_ids.push(id);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<T> {
        let removed = self.by_id.remove(&id);
        if removed.is_some() {
            self.all_ids.retain(|existing| *existing != id);
        }
        removed
    }

    /// Entities in display order; dangling ids are skipped rather than
    /// surfaced.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &T> {
        self.all_ids.iter().filter_map(|id| self.by_id.get(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub tasks: Table<Task>,
    pub categories: Table<Category>,
    pub filters: FilterState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    TaskAdded(Uuid),
    TaskUpdated(Uuid),
    TaskToggled(Uuid),
    TaskDeleted(Uuid),
    TasksReordered,
    ReminderConfigured(Uuid),
    ReminderSent(Uuid),
    CategoryAdded(Uuid),
    CategoryUpdated(Uuid),
    CategoryDeleted(Uuid),
    CategoriesReordered,
    FiltersChanged,
    Hydrated,
}

pub type Subscriber = Box<dyn FnMut(&StoreEvent)>;

/// The single mutation authority. Every command runs to completion, bumps
/// the revision of the slice it touched, and notifies subscribers
/// synchronously before returning.
#[derive(Default)]
pub struct Store {
    state: State,
    tasks_rev: u64,
    categories_rev: u64,
    filters_rev: u64,
    subscribers: Vec<Subscriber>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("tasks", &self.state.tasks.len())
            .field("categories", &self.state.categories.len())
            .field("tasks_rev", &self.tasks_rev)
            .field("categories_rev", &self.categories_rev)
            .field("filters_rev", &self.filters_rev)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.state.tasks.get(id)
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.state.categories.get(id)
    }

    pub fn tasks_rev(&self) -> u64 {
        self.tasks_rev
    }

    pub fn categories_rev(&self) -> u64 {
        self.categories_rev
    }

    pub fn filters_rev(&self) -> u64 {
        self.filters_rev
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    fn notify(&mut self, event: StoreEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    // ---- task commands ----

    #[instrument(skip(self, draft, now))]
    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Uuid, Error> {
        if draft.text.trim().is_empty() {
            return Err(Error::EmptyTitle);
        }

        let task = Task::from_draft(draft, now);
        let id = task.id;
        self.state.tasks.insert(id, task);
        self.tasks_rev += 1;
        debug!(%id, count = self.state.tasks.len(), "task added");
        self.notify(StoreEvent::TaskAdded(id));
        Ok(id)
    }

    #[instrument(skip(self, patch, now))]
    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch, now: DateTime<Utc>) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            debug!(%id, "update on unknown task ignored");
            return false;
        };

        if let Some(text) = patch.text {
            task.text = text;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(categories) = patch.categories {
            task.categories = categories;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        task.updated_at = now;

        self.tasks_rev += 1;
        self.notify(StoreEvent::TaskUpdated(id));
        true
    }

    #[instrument(skip(self, now))]
    pub fn toggle_task(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            debug!(%id, "toggle on unknown task ignored");
            return false;
        };

        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        task.updated_at = now;
        let completed = task.completed;

        self.tasks_rev += 1;
        debug!(%id, completed, "task toggled");
        self.notify(StoreEvent::TaskToggled(id));
        true
    }

    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: Uuid) -> bool {
        if self.state.tasks.remove(id).is_none() {
            debug!(%id, "delete on unknown task ignored");
            return false;
        }

        self.tasks_rev += 1;
        debug!(%id, remaining = self.state.tasks.len(), "task deleted");
        self.notify(StoreEvent::TaskDeleted(id));
        true
    }

    /// Replaces the display order verbatim. The caller guarantees the new
    /// sequence is a permutation of the current ids; mismatches are not
    /// checked here, matching the source contract.
    #[instrument(skip(self, new_order))]
    pub fn reorder_tasks(&mut self, new_order: Vec<Uuid>) {
        debug!(
            before = self.state.tasks.all_ids.len(),
            after = new_order.len(),
            "reordering tasks"
        );
        self.state.tasks.all_ids = new_order;
        self.tasks_rev += 1;
        self.notify(StoreEvent::TasksReordered);
    }

    #[instrument(skip(self, due_date, now))]
    pub fn set_task_due_date(
        &mut self,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return false;
        };
        task.due_date = due_date;
        task.updated_at = now;

        self.tasks_rev += 1;
        self.notify(StoreEvent::TaskUpdated(id));
        true
    }

    #[instrument(skip(self, categories, now))]
    pub fn set_task_categories(
        &mut self,
        id: Uuid,
        categories: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return false;
        };
        task.categories = categories;
        task.updated_at = now;

        self.tasks_rev += 1;
        self.notify(StoreEvent::TaskUpdated(id));
        true
    }

    #[instrument(skip(self, tags, now))]
    pub fn set_task_tags(&mut self, id: Uuid, tags: Vec<String>, now: DateTime<Utc>) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return false;
        };
        task.tags = tags;
        task.updated_at = now;

        self.tasks_rev += 1;
        self.notify(StoreEvent::TaskUpdated(id));
        true
    }

    /// Merges reminder configuration and clears `sent_at`, re-arming
    /// notification eligibility even for a task already reported overdue.
    #[instrument(skip(self, patch, now))]
    pub fn set_task_reminder(&mut self, id: Uuid, patch: ReminderPatch, now: DateTime<Utc>) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            debug!(%id, "reminder config on unknown task ignored");
            return false;
        };

        let reminder = &mut task.reminder;
        if let Some(enabled) = patch.enabled {
            reminder.enabled = enabled;
        }
        if let Some(notify_before) = patch.notify_before {
            reminder.notify_before = notify_before;
        }
        if let Some(notification_type) = patch.notification_type {
            reminder.notification_type = notification_type;
        }
        reminder.sent_at = None;
        task.updated_at = now;

        self.tasks_rev += 1;
        self.notify(StoreEvent::ReminderConfigured(id));
        true
    }

    /// The only write the reminder scheduler performs. Idempotent.
    #[instrument(skip(self, now))]
    pub fn mark_reminder_sent(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return false;
        };
        task.reminder.sent_at = Some(now);

        self.tasks_rev += 1;
        self.notify(StoreEvent::ReminderSent(id));
        true
    }

    // ---- category commands ----

    #[instrument(skip(self, draft, now))]
    pub fn add_category(
        &mut self,
        draft: CategoryDraft,
        now: DateTime<Utc>,
    ) -> Result<Uuid, Error> {
        if draft.name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        let category = Category::from_draft(draft, now);
        let id = category.id;
        self.state.categories.insert(id, category);
        self.categories_rev += 1;
        debug!(%id, count = self.state.categories.len(), "category added");
        self.notify(StoreEvent::CategoryAdded(id));
        Ok(id)
    }

    #[instrument(skip(self, patch))]
    pub fn update_category(&mut self, id: Uuid, patch: CategoryPatch) -> bool {
        let Some(category) = self.state.categories.get_mut(id) else {
            debug!(%id, "update on unknown category ignored");
            return false;
        };

        if let Some(name) = patch.name {
            category.name = name;
        }
        if let Some(color) = patch.color {
            category.color = color;
        }
        if let Some(icon) = patch.icon {
            category.icon = icon;
        }

        self.categories_rev += 1;
        self.notify(StoreEvent::CategoryUpdated(id));
        true
    }

    /// Tasks keep their references to a deleted category; stale ids are
    /// inert everywhere they are read.
    #[instrument(skip(self))]
    pub fn delete_category(&mut self, id: Uuid) -> bool {
        if self.state.categories.remove(id).is_none() {
            debug!(%id, "delete on unknown category ignored");
            return false;
        }

        self.categories_rev += 1;
        self.notify(StoreEvent::CategoryDeleted(id));
        true
    }

    #[instrument(skip(self, new_order))]
    pub fn reorder_categories(&mut self, new_order: Vec<Uuid>) {
        debug!(
            before = self.state.categories.all_ids.len(),
            after = new_order.len(),
            "reordering categories"
        );
        self.state.categories.all_ids = new_order;
        self.categories_rev += 1;
        self.notify(StoreEvent::CategoriesReordered);
    }

    // ---- filter commands ----

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.state.filters.status = status;
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.state.filters.search = query.into();
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    pub fn set_category_filter(&mut self, categories: Vec<Uuid>) {
        self.state.filters.categories = categories;
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    pub fn set_tag_filter(&mut self, tags: Vec<String>) {
        self.state.filters.tags = tags;
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    pub fn set_sort(&mut self, sort_by: SortField, sort_order: SortOrder) {
        self.state.filters.sort_by = sort_by;
        self.state.filters.sort_order = sort_order;
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    pub fn reset_filters(&mut self) {
        self.state.filters.reset();
        self.filters_rev += 1;
        self.notify(StoreEvent::FiltersChanged);
    }

    // ---- hydration ----

    /// Wholesale table replacement from the persisted snapshot. Trusted
    /// input: per-field validation is bypassed, and filter state is left at
    /// its defaults.
    #[instrument(skip(self, tasks, categories))]
    pub fn hydrate(&mut self, tasks: Table<Task>, categories: Table<Category>) {
        debug!(
            tasks = tasks.len(),
            categories = categories.len(),
            "hydrating store"
        );
        self.state.tasks = tasks;
        self.state.categories = categories;
        self.tasks_rev += 1;
        self.categories_rev += 1;
        self.notify(StoreEvent::Hydrated);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Store, StoreEvent};
    use crate::error::Error;
    use crate::task::{CategoryDraft, ReminderPatch, TaskDraft, TaskPatch};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn add_task_fixes_creation_defaults() {
        let mut store = Store::new();
        let id = store
            .add_task(TaskDraft::new("water the plants"), now())
            .expect("add task");

        let task = store.task(id).expect("task present");
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.due_date, None);
        assert!(!task.reminder.enabled);
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(store.state().tasks.all_ids, vec![id]);
    }

    #[test]
    fn add_task_rejects_blank_title() {
        let mut store = Store::new();
        let err = store
            .add_task(TaskDraft::new("   "), now())
            .expect_err("blank title");
        assert_eq!(err, Error::EmptyTitle);
        assert!(store.state().tasks.is_empty());
    }

    #[test]
    fn toggle_twice_restores_original_state() {
        let mut store = Store::new();
        let id = store
            .add_task(TaskDraft::new("call the bank"), now())
            .expect("add task");

        assert!(store.toggle_task(id, now() + Duration::minutes(1)));
        let task = store.task(id).expect("task");
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now() + Duration::minutes(1)));

        assert!(store.toggle_task(id, now() + Duration::minutes(2)));
        let task = store.task(id).expect("task");
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn unknown_ids_are_silent_noops() {
        let mut store = Store::new();
        let ghost = Uuid::new_v4();

        assert!(!store.update_task(ghost, TaskPatch::default(), now()));
        assert!(!store.toggle_task(ghost, now()));
        assert!(!store.delete_task(ghost));
        assert!(!store.set_task_reminder(ghost, ReminderPatch::default(), now()));
        assert!(!store.mark_reminder_sent(ghost, now()));
        assert!(!store.update_category(ghost, Default::default()));
        assert!(!store.delete_category(ghost));
    }

    #[test]
    fn delete_prunes_table_and_order() {
        let mut store = Store::new();
        let first = store
            .add_task(TaskDraft::new("one"), now())
            .expect("add one");
        let second = store
            .add_task(TaskDraft::new("two"), now())
            .expect("add two");

        assert!(store.delete_task(first));
        assert!(store.task(first).is_none());
        assert_eq!(store.state().tasks.all_ids, vec![second]);
        for id in &store.state().tasks.all_ids {
            assert!(store.state().tasks.by_id.contains_key(id));
        }
    }

    #[test]
    fn reorder_replaces_sequence_verbatim() {
        let mut store = Store::new();
        let a = store.add_task(TaskDraft::new("a"), now()).expect("a");
        let b = store.add_task(TaskDraft::new("b"), now()).expect("b");
        let c = store.add_task(TaskDraft::new("c"), now()).expect("c");

        store.reorder_tasks(vec![c, a, b]);
        assert_eq!(store.state().tasks.all_ids, vec![c, a, b]);
    }

    #[test]
    fn reminder_config_change_clears_sent_marker() {
        let mut store = Store::new();
        let id = store
            .add_task(TaskDraft::new("submit report"), now())
            .expect("add task");

        store.mark_reminder_sent(id, now());
        assert!(store.task(id).expect("task").reminder.sent_at.is_some());

        store.set_task_reminder(
            id,
            ReminderPatch {
                enabled: Some(true),
                ..Default::default()
            },
            now(),
        );
        let reminder = &store.task(id).expect("task").reminder;
        assert!(reminder.enabled);
        assert_eq!(reminder.sent_at, None);
    }

    #[test]
    fn update_merges_fields_and_refreshes_updated_at() {
        let mut store = Store::new();
        let id = store
            .add_task(TaskDraft::new("draft email"), now())
            .expect("add task");

        let later = now() + Duration::hours(1);
        store.update_task(
            id,
            TaskPatch {
                description: Some("to the landlord".to_string()),
                due_date: Some(Some(later + Duration::days(1))),
                ..Default::default()
            },
            later,
        );

        let task = store.task(id).expect("task");
        assert_eq!(task.text, "draft email");
        assert_eq!(task.description, "to the landlord");
        assert_eq!(task.due_date, Some(later + Duration::days(1)));
        assert_eq!(task.updated_at, later);
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn deleting_category_leaves_task_references() {
        let mut store = Store::new();
        let cat = store
            .add_category(
                CategoryDraft {
                    name: "errands".to_string(),
                    color: "#ff8800".to_string(),
                    icon: String::new(),
                },
                now(),
            )
            .expect("add category");

        let mut draft = TaskDraft::new("post office");
        draft.categories = vec![cat];
        let task_id = store.add_task(draft, now()).expect("add task");

        assert!(store.delete_category(cat));
        assert!(store.category(cat).is_none());
        assert_eq!(store.task(task_id).expect("task").categories, vec![cat]);
    }

    #[test]
    fn subscribers_see_every_command_synchronously() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let events: Rc<RefCell<Vec<StoreEvent>>> = Rc::default();
        let sink = Rc::clone(&events);

        let mut store = Store::new();
        store.subscribe(Box::new(move |event| sink.borrow_mut().push(*event)));

        let id = store
            .add_task(TaskDraft::new("observe me"), now())
            .expect("add task");
        store.toggle_task(id, now());
        store.set_search_query("obs");

        assert_eq!(
            events.borrow().as_slice(),
            &[
                StoreEvent::TaskAdded(id),
                StoreEvent::TaskToggled(id),
                StoreEvent::FiltersChanged,
            ]
        );
    }
}

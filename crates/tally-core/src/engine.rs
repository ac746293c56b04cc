use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::Error;
use crate::filter::{SortField, SortOrder, StatusFilter};
use crate::notify::{DesktopNotifier, ToastSink};
use crate::persist::Gateway;
use crate::remind::Scheduler;
use crate::store::{Store, Table};
use crate::task::{
    Category, CategoryDraft, CategoryPatch, ReminderPatch, Task, TaskDraft, TaskPatch,
};
use crate::timer::TimerQueue;
use crate::views::{self, TaskStats, ViewCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    PersistFlush,
    ReminderTick,
}

/// Composition root. Owns the store, the derived-view cache, the
/// persistence gateway, the reminder scheduler and the one timer queue
/// they cooperate on.
///
/// Every command wrapper notifies the two background observers
/// synchronously before returning: the scheduler lazily starts on the
/// first observed command, and the gateway re-arms its debounce. Nothing
/// fires until the owner pumps.
pub struct Engine {
    store: Store,
    views: ViewCache,
    gateway: Gateway,
    scheduler: Scheduler,
    timers: TimerQueue<TimerKey>,
    toasts: Box<dyn ToastSink>,
    desktop: Box<dyn DesktopNotifier>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("scheduler_started", &self.scheduler.is_started())
            .field("next_deadline", &self.timers.next_deadline())
            .finish()
    }
}

impl Engine {
    /// Builds the engine and hydrates the store from the persisted
    /// snapshot. Hydration is trusted bulk input, not an observed command:
    /// it neither starts the scheduler nor schedules a save.
    #[instrument(skip_all)]
    pub fn start(
        gateway: Gateway,
        poll_interval_ms: i64,
        toasts: Box<dyn ToastSink>,
        desktop: Box<dyn DesktopNotifier>,
    ) -> Self {
        let mut store = Store::new();
        if let Some(snapshot) = gateway.load() {
            info!(
                tasks = snapshot.tasks.len(),
                categories = snapshot.categories.len(),
                "hydrating from persisted state"
            );
            store.hydrate(snapshot.tasks, snapshot.categories);
        }

        Self {
            store,
            views: ViewCache::new(),
            gateway,
            scheduler: Scheduler::new(poll_interval_ms),
            timers: TimerQueue::new(),
            toasts,
            desktop,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn visible_tasks(&mut self) -> Vec<&Task> {
        self.views.visible_tasks(&self.store)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> TaskStats {
        views::stats(&self.store, now)
    }

    pub fn upcoming_reminders(&self, now: DateTime<Utc>) -> Vec<&Task> {
        views::upcoming_reminders(&self.store, now)
    }

    fn after_command(&mut self, now: DateTime<Utc>) {
        self.scheduler.ensure_started(
            &mut self.store,
            &mut *self.toasts,
            &mut *self.desktop,
            &mut self.timers,
            TimerKey::ReminderTick,
            now,
        );
        self.gateway
            .note_change(&mut self.timers, TimerKey::PersistFlush, now);
    }

    // ---- task commands ----

    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Uuid, Error> {
        let id = self.store.add_task(draft, now)?;
        self.after_command(now);
        Ok(id)
    }

    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch, now: DateTime<Utc>) -> bool {
        let changed = self.store.update_task(id, patch, now);
        self.after_command(now);
        changed
    }

    pub fn toggle_task(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let changed = self.store.toggle_task(id, now);
        self.after_command(now);
        changed
    }

    pub fn delete_task(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let changed = self.store.delete_task(id);
        self.after_command(now);
        changed
    }

    pub fn reorder_tasks(&mut self, new_order: Vec<Uuid>, now: DateTime<Utc>) {
        self.store.reorder_tasks(new_order);
        self.after_command(now);
    }

    pub fn set_task_due_date(
        &mut self,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let changed = self.store.set_task_due_date(id, due_date, now);
        self.after_command(now);
        changed
    }

    pub fn set_task_categories(
        &mut self,
        id: Uuid,
        categories: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> bool {
        let changed = self.store.set_task_categories(id, categories, now);
        self.after_command(now);
        changed
    }

    pub fn set_task_tags(&mut self, id: Uuid, tags: Vec<String>, now: DateTime<Utc>) -> bool {
        let changed = self.store.set_task_tags(id, tags, now);
        self.after_command(now);
        changed
    }

    pub fn set_task_reminder(
        &mut self,
        id: Uuid,
        patch: ReminderPatch,
        now: DateTime<Utc>,
    ) -> bool {
        let changed = self.store.set_task_reminder(id, patch, now);
        self.after_command(now);
        changed
    }

    // ---- category commands ----

    pub fn add_category(
        &mut self,
        draft: CategoryDraft,
        now: DateTime<Utc>,
    ) -> Result<Uuid, Error> {
        let id = self.store.add_category(draft, now)?;
        self.after_command(now);
        Ok(id)
    }

    pub fn update_category(&mut self, id: Uuid, patch: CategoryPatch, now: DateTime<Utc>) -> bool {
        let changed = self.store.update_category(id, patch);
        self.after_command(now);
        changed
    }

    pub fn delete_category(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let changed = self.store.delete_category(id);
        self.after_command(now);
        changed
    }

    pub fn reorder_categories(&mut self, new_order: Vec<Uuid>, now: DateTime<Utc>) {
        self.store.reorder_categories(new_order);
        self.after_command(now);
    }

    // ---- filter commands ----

    pub fn set_status_filter(&mut self, status: StatusFilter, now: DateTime<Utc>) {
        self.store.set_status_filter(status);
        self.after_command(now);
    }

    pub fn set_search_query(&mut self, query: impl Into<String>, now: DateTime<Utc>) {
        self.store.set_search_query(query);
        self.after_command(now);
    }

    pub fn set_category_filter(&mut self, categories: Vec<Uuid>, now: DateTime<Utc>) {
        self.store.set_category_filter(categories);
        self.after_command(now);
    }

    pub fn set_tag_filter(&mut self, tags: Vec<String>, now: DateTime<Utc>) {
        self.store.set_tag_filter(tags);
        self.after_command(now);
    }

    pub fn set_sort(&mut self, sort_by: SortField, sort_order: SortOrder, now: DateTime<Utc>) {
        self.store.set_sort(sort_by, sort_order);
        self.after_command(now);
    }

    pub fn reset_filters(&mut self, now: DateTime<Utc>) {
        self.store.reset_filters();
        self.after_command(now);
    }

    // ---- background work ----

    /// Starts the scheduler without waiting for a mutating command; the
    /// watch loop opts in with this so a read-only session still scans.
    pub fn ensure_scheduler(&mut self, now: DateTime<Utc>) {
        self.scheduler.ensure_started(
            &mut self.store,
            &mut *self.toasts,
            &mut *self.desktop,
            &mut self.timers,
            TimerKey::ReminderTick,
            now,
        );
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Fires every due timer. A reminder tick that marked anything sent
    /// schedules a persistence pass of its own, so sent markers survive a
    /// restart.
    #[instrument(skip(self, now))]
    pub fn pump(&mut self, now: DateTime<Utc>) {
        for key in self.timers.due(now) {
            match key {
                TimerKey::PersistFlush => {
                    self.gateway.flush(self.store.state(), now);
                }
                TimerKey::ReminderTick => {
                    let rev_before = self.store.tasks_rev();
                    self.scheduler.tick(
                        &mut self.store,
                        &mut *self.toasts,
                        &mut *self.desktop,
                        &mut self.timers,
                        TimerKey::ReminderTick,
                        now,
                    );
                    if self.store.tasks_rev() != rev_before {
                        self.gateway
                            .note_change(&mut self.timers, TimerKey::PersistFlush, now);
                    }
                }
            }
        }
    }

    /// Flushes an armed save, then cancels both timers so no background
    /// work outlives the engine.
    #[instrument(skip(self, now))]
    pub fn shutdown(&mut self, now: DateTime<Utc>) {
        if self.timers.disarm(TimerKey::PersistFlush) {
            debug!("flushing pending save on teardown");
            self.gateway.flush(self.store.state(), now);
        }
        self.timers.clear();
        info!("engine shut down");
    }

    /// Snapshot accessors for callers that render both tables.
    pub fn tasks(&self) -> &Table<Task> {
        &self.store.state().tasks
    }

    pub fn categories(&self) -> &Table<Category> {
        &self.store.state().categories
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{Engine, TimerKey};
    use crate::notify::test_support::{RecordingDesktop, RecordingToasts};
    use crate::persist::{Gateway, Storage};
    use crate::remind::DEFAULT_POLL_INTERVAL_MS;
    use crate::task::{ReminderPatch, TaskDraft};

    #[derive(Debug, Default, Clone)]
    struct MemStorage {
        record: Rc<RefCell<Option<String>>>,
        writes: Rc<RefCell<usize>>,
    }

    impl Storage for MemStorage {
        fn read(&self) -> anyhow::Result<Option<String>> {
            Ok(self.record.borrow().clone())
        }

        fn write(&self, record: &str) -> anyhow::Result<()> {
            *self.record.borrow_mut() = Some(record.to_string());
            *self.writes.borrow_mut() += 1;
            Ok(())
        }

        fn remove(&self) -> anyhow::Result<()> {
            *self.record.borrow_mut() = None;
            Ok(())
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn engine_over(storage: MemStorage) -> Engine {
        Engine::start(
            Gateway::new(Box::new(storage), 1000),
            DEFAULT_POLL_INTERVAL_MS,
            Box::new(RecordingToasts::default()),
            Box::new(RecordingDesktop::granting()),
        )
    }

    #[test]
    fn commands_arm_the_debounce_and_pump_flushes_once() {
        let storage = MemStorage::default();
        let mut engine = engine_over(storage.clone());

        engine
            .add_task(TaskDraft::new("one"), now())
            .expect("add one");
        engine
            .add_task(TaskDraft::new("two"), now() + Duration::milliseconds(200))
            .expect("add two");

        engine.pump(now() + Duration::milliseconds(900));
        assert_eq!(*storage.writes.borrow(), 0);

        engine.pump(now() + Duration::milliseconds(1300));
        assert_eq!(*storage.writes.borrow(), 1);
        let record = storage.record.borrow().clone().expect("record");
        assert!(record.contains("two"));
    }

    #[test]
    fn scheduler_starts_on_first_command_not_at_start() {
        let mut engine = engine_over(MemStorage::default());
        assert!(engine.next_deadline().is_none());

        engine
            .add_task(TaskDraft::new("wake up the scheduler"), now())
            .expect("add");
        assert!(engine.timers.is_armed(TimerKey::ReminderTick));
    }

    #[test]
    fn reminder_tick_schedules_its_own_persistence() {
        let storage = MemStorage::default();
        let mut engine = engine_over(storage.clone());

        let mut draft = TaskDraft::new("send invoices");
        draft.due_date = Some(now() + Duration::minutes(40));
        let id = engine.add_task(draft, now()).expect("add");
        engine.set_task_reminder(
            id,
            ReminderPatch {
                enabled: Some(true),
                ..Default::default()
            },
            now(),
        );

        // Drain the command debounce first.
        engine.pump(now() + Duration::seconds(2));
        let writes_after_commands = *storage.writes.borrow();

        // The tick at +30s finds nothing; the window opens at due-15min.
        engine.pump(now() + Duration::seconds(30));
        engine.pump(now() + Duration::minutes(26));
        engine.pump(now() + Duration::minutes(27));

        assert!(engine.store().task(id).expect("task").reminder.sent_at.is_some());
        assert_eq!(*storage.writes.borrow(), writes_after_commands + 1);
        let record = storage.record.borrow().clone().expect("record");
        assert!(record.contains("sentAt"));
    }

    #[test]
    fn shutdown_flushes_pending_save_and_cancels_timers() {
        let storage = MemStorage::default();
        let mut engine = engine_over(storage.clone());

        engine
            .add_task(TaskDraft::new("persist me"), now())
            .expect("add");
        assert_eq!(*storage.writes.borrow(), 0);

        engine.shutdown(now() + Duration::milliseconds(10));
        assert_eq!(*storage.writes.borrow(), 1);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn restart_hydrates_persisted_state() {
        let storage = MemStorage::default();
        let mut engine = engine_over(storage.clone());
        engine
            .add_task(TaskDraft::new("survives restart"), now())
            .expect("add");
        engine.shutdown(now());

        let mut reopened = engine_over(storage);
        assert_eq!(reopened.store().state().tasks.len(), 1);
        let visible = reopened.visible_tasks();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].text, "survives restart");
    }
}

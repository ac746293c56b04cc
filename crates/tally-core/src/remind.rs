use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::notify::{
    DesktopNotification, DesktopNotifier, Permission, Toast, ToastSeverity, ToastSink,
};
use crate::store::Store;
use crate::timer::TimerQueue;

pub const DEFAULT_POLL_INTERVAL_MS: i64 = 30_000;

const DUE_SOON_TOAST_MS: u32 = 8_000;
const OVERDUE_TOAST_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    Soon,
    Overdue,
}

/// Polling reminder scanner.
///
/// Started lazily on the first observed store command, never at plain
/// process start. Each tick reads the whole task table and emits at most
/// one notification per task per reminder configuration; marking the
/// reminder sent is the only store write it performs.
#[derive(Debug)]
pub struct Scheduler {
    started: bool,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(poll_interval_ms: i64) -> Self {
        Self {
            started: false,
            poll_interval: Duration::milliseconds(poll_interval_ms),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// First-command start: request desktop permission once, scan
    /// immediately, then arm the recurring tick.
    #[instrument(skip_all)]
    pub fn ensure_started<K>(
        &mut self,
        store: &mut Store,
        toasts: &mut dyn ToastSink,
        desktop: &mut dyn DesktopNotifier,
        timers: &mut TimerQueue<K>,
        tick_key: K,
        now: DateTime<Utc>,
    ) where
        K: Copy + Eq + Hash + Debug,
    {
        if self.started {
            return;
        }
        self.started = true;
        info!(interval_ms = self.poll_interval.num_milliseconds(), "starting reminder scheduler");

        if desktop.permission() == Permission::Default {
            desktop.request_permission();
        }

        self.scan(store, toasts, desktop, now);
        timers.arm(tick_key, now + self.poll_interval);
    }

    /// One polling tick; re-arms the timer for the next interval.
    #[instrument(skip_all)]
    pub fn tick<K>(
        &mut self,
        store: &mut Store,
        toasts: &mut dyn ToastSink,
        desktop: &mut dyn DesktopNotifier,
        timers: &mut TimerQueue<K>,
        tick_key: K,
        now: DateTime<Utc>,
    ) where
        K: Copy + Eq + Hash + Debug,
    {
        self.scan(store, toasts, desktop, now);
        timers.arm(tick_key, now + self.poll_interval);
    }

    fn scan(
        &mut self,
        store: &mut Store,
        toasts: &mut dyn ToastSink,
        desktop: &mut dyn DesktopNotifier,
        now: DateTime<Utc>,
    ) {
        let mut due: Vec<(Uuid, Due)> = Vec::new();

        for task in store.state().tasks.iter_ordered() {
            if task.completed || !task.reminder.enabled {
                continue;
            }
            let Some(due_date) = task.due_date else {
                continue;
            };
            if task.reminder.sent_at.is_some() {
                continue;
            }

            let Some(reminder_time) = task.reminder_time() else {
                continue;
            };

            if now >= reminder_time && now < due_date {
                due.push((task.id, Due::Soon));
            } else if now >= due_date {
                due.push((task.id, Due::Overdue));
            }
        }

        if !due.is_empty() {
            debug!(count = due.len(), "reminders due");
        }

        for (id, kind) in due {
            let Some(task) = store.task(id) else {
                continue;
            };
            let text = task.text.clone();
            let wants_toast = task.reminder.notification_type.wants_toast();
            let wants_desktop = task.reminder.notification_type.wants_desktop();

            match kind {
                Due::Soon => {
                    if wants_toast {
                        toasts.toast(Toast {
                            message: format!("Reminder: \"{text}\" is due soon!"),
                            severity: ToastSeverity::Warning,
                            duration_ms: DUE_SOON_TOAST_MS,
                        });
                    }
                    if wants_desktop && desktop.permission() == Permission::Granted {
                        desktop.notify(DesktopNotification {
                            title: "Task Reminder".to_string(),
                            body: format!("\"{text}\" is due soon!"),
                            icon: None,
                            tag: format!("reminder-{id}"),
                            require_interaction: false,
                        });
                    }
                }
                Due::Overdue => {
                    if wants_toast {
                        toasts.toast(Toast {
                            message: format!("\"{text}\" is overdue!"),
                            severity: ToastSeverity::Error,
                            duration_ms: OVERDUE_TOAST_MS,
                        });
                    }
                    if wants_desktop && desktop.permission() == Permission::Granted {
                        desktop.notify(DesktopNotification {
                            title: "Task Overdue".to_string(),
                            body: format!("\"{text}\" is overdue!"),
                            icon: None,
                            tag: format!("overdue-{id}"),
                            require_interaction: true,
                        });
                    }
                }
            }

            store.mark_reminder_sent(id, now);
        }
    }
}

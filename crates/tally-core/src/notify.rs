use tracing::{debug, info};

/// Toast severity; determines styling and how long the toast lingers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastSeverity {
    Info,
    Warning,
    Error,
}

impl ToastSeverity {
    fn prefix(self) -> &'static str {
        match self {
            Self::Info => "i",
            Self::Warning => "!",
            Self::Error => "!!",
        }
    }
}

/// Transient in-UI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub severity: ToastSeverity,
    pub duration_ms: u32,
}

/// Native notification payload. The `tag` deduplicates repeat deliveries at
/// the OS surface (`reminder-<taskId>` / `overdue-<taskId>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub tag: String,
    pub require_interaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Never asked.
    Default,
    Granted,
    Denied,
}

/// Sink for the transient toast channel.
pub trait ToastSink {
    fn toast(&mut self, toast: Toast);
}

/// The native notification channel. Delivery is gated on `Granted`; a
/// denied permission is final and is never re-requested.
pub trait DesktopNotifier {
    fn permission(&self) -> Permission;
    fn request_permission(&mut self) -> Permission;
    fn notify(&mut self, notification: DesktopNotification);
}

/// Default toast sink for the CLI: one styled line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleToasts;

impl ToastSink for ConsoleToasts {
    fn toast(&mut self, toast: Toast) {
        debug!(severity = ?toast.severity, "delivering toast");
        println!("{} {}", toast.severity.prefix(), toast.message);
    }
}

/// Desktop channel for the CLI. A terminal session has no permission
/// broker, so the first request is granted; delivery is a distinct console
/// line plus a terminal bell.
#[derive(Debug)]
pub struct ConsoleDesktop {
    permission: Permission,
}

impl ConsoleDesktop {
    pub fn new() -> Self {
        Self {
            permission: Permission::Default,
        }
    }
}

impl Default for ConsoleDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopNotifier for ConsoleDesktop {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        if self.permission == Permission::Default {
            info!("granting desktop notification permission");
            self.permission = Permission::Granted;
        }
        self.permission
    }

    fn notify(&mut self, notification: DesktopNotification) {
        debug!(tag = %notification.tag, "delivering desktop notification");
        println!("\x07[{}] {}: {}", notification.tag, notification.title, notification.body);
    }
}

use std::fmt::Debug;
use std::fs;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::store::{State, Table};
use crate::task::{Category, Task};
use crate::timer::TimerQueue;

/// Bumped on any incompatible change to the persisted record. A mismatched
/// record is discarded wholesale; migrations are the future version's
/// problem.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_DEBOUNCE_MS: i64 = 1000;

const RECORD_FILE: &str = "tally.json";

/// The durable medium behind the gateway, reduced to one opaque record.
pub trait Storage {
    fn read(&self) -> anyhow::Result<Option<String>>;
    fn write(&self, record: &str) -> anyhow::Result<()>;
    fn remove(&self) -> anyhow::Result<()>;
}

/// Single JSON document in the data directory, replaced atomically via a
/// tempfile rename so a crash mid-write cannot truncate the record.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(RECORD_FILE);
        info!(path = %path.display(), "opened file storage");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read(&self) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(Some(raw))
    }

    fn write(&self, record: &str) -> anyhow::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(record.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }

    fn remove(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tasks: Table<Task>,
    pub categories: Table<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    data: Snapshot,
}

/// Debounced, versioned persistence over a [`Storage`] medium.
///
/// The gateway never returns an error: write failures are logged and
/// swallowed, and every load failure degrades to "no persisted state".
pub struct Gateway {
    storage: Box<dyn Storage>,
    debounce: Duration,
}

impl Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("debounce_ms", &self.debounce.num_milliseconds())
            .finish()
    }
}

impl Gateway {
    pub fn new(storage: Box<dyn Storage>, debounce_ms: i64) -> Self {
        Self {
            storage,
            debounce: Duration::milliseconds(debounce_ms),
        }
    }

    /// Arms (or re-arms) the trailing debounce. Repeated store traffic
    /// inside the window collapses into the single flush that fires once
    /// the store goes quiet.
    pub fn note_change<K>(&self, timers: &mut TimerQueue<K>, key: K, now: DateTime<Utc>)
    where
        K: Copy + Eq + Hash + Debug,
    {
        timers.arm(key, now + self.debounce);
    }

    /// Serializes tasks and categories (never filter state) and writes the
    /// envelope. Failures are logged; in-memory state is untouched either
    /// way.
    #[instrument(skip(self, state, now))]
    pub fn flush(&self, state: &State, now: DateTime<Utc>) {
        match self.try_flush(state, now) {
            Ok(()) => debug!(
                tasks = state.tasks.len(),
                categories = state.categories.len(),
                "flushed state"
            ),
            Err(err) => warn!(error = %err, "failed to persist state; keeping in-memory copy"),
        }
    }

    fn try_flush(&self, state: &State, now: DateTime<Utc>) -> anyhow::Result<()> {
        let envelope = Envelope {
            version: SCHEMA_VERSION,
            timestamp: now,
            data: Snapshot {
                tasks: state.tasks.clone(),
                categories: state.categories.clone(),
            },
        };
        let record = serde_json::to_string(&envelope)?;
        self.storage.write(&record)
    }

    /// Reads the persisted snapshot, if any. A missing record, an
    /// unreadable record, a parse failure, or a version mismatch all come
    /// back as `None`; the mismatched record is deleted on the spot.
    #[instrument(skip(self))]
    pub fn load(&self) -> Option<Snapshot> {
        let raw = match self.storage.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted record");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "failed to read persisted record; starting empty");
                return None;
            }
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "persisted record is unreadable; starting empty");
                return None;
            }
        };

        if envelope.version != SCHEMA_VERSION {
            warn!(
                stored = envelope.version,
                expected = SCHEMA_VERSION,
                "persisted record version mismatch; discarding"
            );
            if let Err(err) = self.storage.remove() {
                warn!(error = %err, "failed to remove stale record");
            }
            return None;
        }

        debug!(
            tasks = envelope.data.tasks.len(),
            categories = envelope.data.categories.len(),
            "loaded persisted state"
        );
        Some(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{FileStorage, Gateway, SCHEMA_VERSION, Storage};
    use crate::store::Store;
    use crate::task::{CategoryDraft, TaskDraft};
    use crate::timer::TimerQueue;

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

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn read(&self) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("medium offline"))
        }

        fn write(&self, _record: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("quota exceeded"))
        }

        fn remove(&self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("medium offline"))
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0)
            .single()
            .expect("valid now")
    }

    fn populated_store() -> Store {
        let mut store = Store::new();
        let cat = store
            .add_category(
                CategoryDraft {
                    name: "chores".to_string(),
                    color: "#884400".to_string(),
                    icon: String::new(),
                },
                now(),
            )
            .expect("category");
        let mut draft = TaskDraft::new("take out the trash");
        draft.categories = vec![cat];
        draft.due_date = Some(now() + Duration::hours(6));
        store.add_task(draft, now()).expect("task");
        store
    }

    #[test]
    fn roundtrip_reproduces_tables_exactly() {
        let storage = MemStorage::default();
        let gateway = Gateway::new(Box::new(storage.clone()), 1000);
        let store = populated_store();

        gateway.flush(store.state(), now());
        let snapshot = gateway.load().expect("snapshot");

        assert_eq!(snapshot.tasks, store.state().tasks);
        assert_eq!(snapshot.categories, store.state().categories);

        // Transient filter state never reaches the record.
        let raw = storage.record.borrow().clone().expect("record");
        assert!(!raw.contains("filters"));
        assert!(!raw.contains("sortBy"));
    }

    #[test]
    fn file_storage_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let storage = FileStorage::open(dir.path()).expect("open storage");
        let gateway = Gateway::new(Box::new(storage), 1000);
        let store = populated_store();

        gateway.flush(store.state(), now());
        let snapshot = gateway.load().expect("snapshot");
        assert_eq!(snapshot.tasks, store.state().tasks);
    }

    #[test]
    fn version_mismatch_discards_and_removes() {
        let storage = MemStorage::default();
        let stale = format!(
            r#"{{"version":{},"timestamp":0,"data":{{"tasks":{{"byId":{{}},"allIds":[]}},"categories":{{"byId":{{}},"allIds":[]}}}}}}"#,
            SCHEMA_VERSION - 1
        );
        storage.write(&stale).expect("seed record");

        let gateway = Gateway::new(Box::new(storage.clone()), 1000);
        assert!(gateway.load().is_none());
        assert!(storage.record.borrow().is_none());
    }

    #[test]
    fn parse_failure_degrades_to_absent() {
        let storage = MemStorage::default();
        storage.write("not json at all {").expect("seed record");

        let gateway = Gateway::new(Box::new(storage), 1000);
        assert!(gateway.load().is_none());
    }

    #[test]
    fn load_from_empty_medium_is_none() {
        let gateway = Gateway::new(Box::new(MemStorage::default()), 1000);
        assert!(gateway.load().is_none());
    }

    #[test]
    fn failures_never_propagate() {
        let gateway = Gateway::new(Box::new(FailingStorage), 1000);
        let store = populated_store();

        gateway.flush(store.state(), now());
        assert!(gateway.load().is_none());
    }

    #[test]
    fn debounce_collapses_to_one_trailing_write() {
        let storage = MemStorage::default();
        let gateway = Gateway::new(Box::new(storage.clone()), 1000);
        let mut timers: TimerQueue<u8> = TimerQueue::new();
        let mut store = populated_store();

        const FLUSH: u8 = 0;
        gateway.note_change(&mut timers, FLUSH, now());
        store.add_task(TaskDraft::new("second"), now()).expect("add");
        gateway.note_change(&mut timers, FLUSH, now() + Duration::milliseconds(200));
        store.add_task(TaskDraft::new("third"), now()).expect("add");
        gateway.note_change(&mut timers, FLUSH, now() + Duration::milliseconds(400));

        // The first two deadlines were superseded before they came due.
        assert!(timers.due(now() + Duration::milliseconds(1200)).is_empty());

        let fired = timers.due(now() + Duration::milliseconds(1400));
        assert_eq!(fired, vec![FLUSH]);
        gateway.flush(store.state(), now() + Duration::milliseconds(1400));

        assert_eq!(*storage.writes.borrow(), 1);
        let snapshot = gateway.load().expect("snapshot");
        assert_eq!(snapshot.tasks.len(), 3);
    }
}

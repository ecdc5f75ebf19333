use crate::db;
use crate::error::{RecordError, RecordResult};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Teachers,
    Exams,
    Results,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Exams => "exams",
            Collection::Results => "results",
        }
    }
}

/// Whole-collection persistence.
///
/// Writers replace a collection wholesale. Any read-modify-write must run
/// inside [`RecordStore::exclusive`], otherwise two writers can interleave
/// and the later snapshot silently drops the earlier change.
pub trait RecordStore {
    /// Records in stored order; empty if the collection was never written.
    fn load(&self, collection: Collection) -> anyhow::Result<Vec<serde_json::Value>>;

    /// Atomically replaces the whole collection.
    fn save(&self, collection: Collection, records: &[serde_json::Value]) -> anyhow::Result<()>;

    /// Next value of a per-collection counter that never goes backwards,
    /// even after deletions.
    fn next_id(&self, collection: Collection) -> anyhow::Result<u64>;

    /// Runs `f` while holding the store's write lock. Nothing `f` wrote is
    /// kept if it returns an error.
    fn exclusive<T, F>(&self, f: F) -> RecordResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RecordResult<T>;
}

pub fn load_records<T, S>(store: &S, collection: Collection) -> RecordResult<Vec<T>>
where
    T: DeserializeOwned,
    S: RecordStore,
{
    store
        .load(collection)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value(v).map_err(|e| {
                RecordError::malformed(format!(
                    "malformed {} record at position {}: {}",
                    collection.as_str(),
                    i,
                    e
                ))
            })
        })
        .collect()
}

pub fn save_records<T, S>(store: &S, collection: Collection, records: &[T]) -> RecordResult<()>
where
    T: Serialize,
    S: RecordStore,
{
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to serialize {}", collection.as_str()))?;
    store.save(collection, &values)?;
    Ok(())
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    // Savepoints nest inside an open `exclusive` transaction and behave as a
    // plain transaction otherwise.
    fn with_savepoint<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        match f(&self.conn) {
            Ok(v) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(v)
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"));
                Err(e)
            }
        }
    }
}

impl RecordStore for SqliteStore {
    fn load(&self, collection: Collection) -> anyhow::Result<Vec<serde_json::Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE collection = ? ORDER BY position")?;
        let bodies = stmt
            .query_map([collection.as_str()], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|b| {
                serde_json::from_str(b)
                    .with_context(|| format!("stored {} record is not JSON", collection.as_str()))
            })
            .collect()
    }

    fn save(&self, collection: Collection, records: &[serde_json::Value]) -> anyhow::Result<()> {
        self.with_savepoint("save_records", |conn| {
            conn.execute(
                "DELETE FROM records WHERE collection = ?",
                [collection.as_str()],
            )?;
            let mut stmt =
                conn.prepare("INSERT INTO records(collection, position, body) VALUES(?, ?, ?)")?;
            for (i, r) in records.iter().enumerate() {
                stmt.execute((collection.as_str(), i as i64, serde_json::to_string(r)?))?;
            }
            Ok(())
        })
        .with_context(|| format!("failed to save {}", collection.as_str()))
    }

    fn next_id(&self, collection: Collection) -> anyhow::Result<u64> {
        self.with_savepoint("next_id", |conn| {
            // First use seeds the counter past any records already stored.
            conn.execute(
                "INSERT OR IGNORE INTO id_counters(collection, next_value)
                 VALUES(?1, (SELECT COUNT(*) FROM records WHERE collection = ?1) + 1)",
                [collection.as_str()],
            )?;
            let value: Option<i64> = conn
                .query_row(
                    "SELECT next_value FROM id_counters WHERE collection = ?",
                    [collection.as_str()],
                    |r| r.get(0),
                )
                .optional()?;
            let value = value.context("id counter row missing")?;
            conn.execute(
                "UPDATE id_counters SET next_value = next_value + 1 WHERE collection = ?",
                [collection.as_str()],
            )?;
            Ok(u64::try_from(value)?)
        })
    }

    fn exclusive<T, F>(&self, f: F) -> RecordResult<T>
    where
        F: FnOnce(&Self) -> RecordResult<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let out = f(self);
        match out {
            Ok(v) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(v),
                Err(e) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub use memory::MemoryStore;


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn exercise_store<S: RecordStore>(store: &S) {
        assert!(store.load(Collection::Exams).expect("load").is_empty());

        let records = vec![json!({ "id": "b" }), json!({ "id": "a" })];
        store.save(Collection::Exams, &records).expect("save");
        assert_eq!(store.load(Collection::Exams).expect("load"), records);
        assert!(store.load(Collection::Results).expect("load").is_empty());

        // Counter seeds from the existing record count, then only grows.
        assert_eq!(store.next_id(Collection::Exams).expect("id"), 3);
        store.save(Collection::Exams, &[]).expect("save");
        assert_eq!(store.next_id(Collection::Exams).expect("id"), 4);
        assert_eq!(store.next_id(Collection::Results).expect("id"), 1);

        let failed: RecordResult<()> = store.exclusive(|s| {
            s.save(Collection::Teachers, &[json!({ "username": "t" })])?;
            s.next_id(Collection::Teachers)?;
            Err(RecordError::malformed("abort"))
        });
        assert!(failed.is_err());
        assert!(store.load(Collection::Teachers).expect("load").is_empty());
        assert_eq!(store.next_id(Collection::Teachers).expect("id"), 1);

        store
            .exclusive(|s| {
                s.save(Collection::Teachers, &[json!({ "username": "t" })])?;
                Ok(())
            })
            .expect("commit");
        assert_eq!(store.load(Collection::Teachers).expect("load").len(), 1);
    }

    #[test]
    fn memory_store_contract() {
        exercise_store(&MemoryStore::default());
    }

    #[test]
    fn sqlite_store_contract() {
        let workspace = temp_dir("gradebook-store-contract");
        {
            let store = SqliteStore::open(&workspace).expect("open store");
            exercise_store(&store);
        }
        // Reopening sees the committed state and keeps counting.
        let store = SqliteStore::open(&workspace).expect("reopen store");
        assert_eq!(store.load(Collection::Teachers).expect("load").len(), 1);
        assert_eq!(store.next_id(Collection::Exams).expect("id"), 5);
        drop(store);
        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn concurrent_writers_on_one_workspace_keep_both_records() {
        let workspace = temp_dir("gradebook-store-writers");
        let slow = SqliteStore::open(&workspace).expect("open first store");
        let fast = SqliteStore::open(&workspace).expect("open second store");
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let slow_writer = std::thread::spawn(move || {
            slow.exclusive(|s| {
                let mut teachers = s.load(Collection::Teachers)?;
                locked_tx.send(()).expect("signal lock held");
                std::thread::sleep(std::time::Duration::from_millis(300));
                teachers.push(json!({ "username": "slow" }));
                s.save(Collection::Teachers, &teachers)?;
                Ok(())
            })
        });

        locked_rx.recv().expect("first writer holds the lock");
        let fast_writer = std::thread::spawn(move || {
            fast.exclusive(|s| {
                let mut teachers = s.load(Collection::Teachers)?;
                teachers.push(json!({ "username": "fast" }));
                s.save(Collection::Teachers, &teachers)?;
                Ok(())
            })
        });

        slow_writer.join().expect("join").expect("slow write");
        fast_writer.join().expect("join").expect("fast write");

        let store = SqliteStore::open(&workspace).expect("reopen store");
        let usernames: Vec<String> = store
            .load(Collection::Teachers)
            .expect("load")
            .iter()
            .filter_map(|t| t.get("username").and_then(|v| v.as_str()).map(String::from))
            .collect();
        assert_eq!(usernames, vec!["slow".to_string(), "fast".to_string()]);
        drop(store);
        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn typed_load_reports_malformed_marks() {
        let store = MemoryStore::default();
        store
            .save(
                Collection::Students,
                &[json!({
                    "admissionNo": "A1",
                    "name": "Amina",
                    "form": "2",
                    "stream": "A",
                    "subjects": { "compulsory": { "Math": { "comment": "no score" } } }
                })],
            )
            .expect("save");
        let err = load_records::<crate::model::Student, _>(&store, Collection::Students)
            .expect_err("missing score must fail");
        assert_eq!(err.code(), "bad_params");
        assert!(err.to_string().contains("students record at position 0"));
    }
}

//! The database driver: a dedicated thread owning the sole
//! [`rusqlite::Connection`], reached only through [`DbHandle`] (spec.md §5 —
//! "the database driver is its own process"; here realized as an in-process
//! actor thread, see DESIGN.md for why).
//!
//! Callers submit a boxed closure over `&mut Connection` and await the
//! result via a oneshot channel. This gives single-writer serialization
//! without requiring every caller to hold a lock, matching the teacher's
//! `Arc<Mutex<SymbolDatabase>>` usage in spirit while modeling the explicit
//! request/response queue the spec calls for.

pub mod chunks;
pub mod entities;
pub mod files;
pub mod schema;
pub mod types;

use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use tokio::sync::oneshot;
use tracing::{debug, error};

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// A handle to the running database driver thread. Cheap to clone; every
/// clone shares the same underlying channel and therefore the same
/// single-writer connection.
#[derive(Clone)]
pub struct DbHandle {
    tx: std_mpsc::Sender<Job>,
}

struct Driver {
    conn: Connection,
    rx: std_mpsc::Receiver<Job>,
}

impl Driver {
    fn run(mut self) {
        debug!("database driver thread started");
        while let Ok(job) = self.rx.recv() {
            job(&mut self.conn);
        }
        debug!("database driver thread exiting (all handles dropped)");
    }
}

impl DbHandle {
    /// Open (or create) the database at `path`, initialize the schema, and
    /// spawn the driver thread. Returns the handle and a join handle the
    /// caller may use to wait for clean shutdown in tests.
    pub fn open(path: &Path) -> Result<(Self, JoinHandle<()>)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize_schema(&conn)?;

        let (tx, rx) = std_mpsc::channel::<Job>();
        let driver = Driver { conn, rx };
        let join = std::thread::Builder::new()
            .name("codesync-db-driver".into())
            .spawn(move || driver.run())
            .map_err(|e| anyhow!("failed to spawn database driver thread: {e}"))?;

        Ok((DbHandle { tx }, join))
    }

    /// In-memory database, used by tests that need a real driver thread
    /// without touching the filesystem.
    pub fn open_in_memory() -> Result<(Self, JoinHandle<()>)> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        let (tx, rx) = std_mpsc::channel::<Job>();
        let driver = Driver { conn, rx };
        let join = std::thread::Builder::new()
            .name("codesync-db-driver".into())
            .spawn(move || driver.run())
            .map_err(|e| anyhow!("failed to spawn database driver thread: {e}"))?;
        Ok((DbHandle { tx }, join))
    }

    /// Submit a closure to run against the connection on the driver thread
    /// and await its result. This is the sole primitive every higher-level
    /// `db::*` function is built on.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<T>>();
        let job: Job = Box::new(move |conn| {
            let result = f(conn);
            if resp_tx.send(result).is_err() {
                error!("database driver: requester dropped before response sent");
            }
        });

        self.tx
            .send(job)
            .map_err(|_| anyhow!("database driver thread is gone"))?;

        resp_rx
            .await
            .map_err(|_| anyhow!("database driver dropped the response channel"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_round_trips_a_value() {
        let (db, _join) = DbHandle::open_in_memory().unwrap();
        let count: i64 = db
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized_not_lost() {
        let (db, _join) = DbHandle::open_in_memory().unwrap();
        db.call(|conn| {
            conn.execute(
                "INSERT INTO projects (id, root_path, name, description, created_at, updated_at)
                 VALUES ('p1', '/p', 'p', NULL, 0, 0)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.call(move |conn| {
                    conn.execute(
                        "INSERT INTO files (project_id, path, lines, last_modified, deleted)
                         VALUES ('p1', ?1, 0, 0, 0)",
                        [format!("f{i}.py")],
                    )?;
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let count: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 8);
    }
}

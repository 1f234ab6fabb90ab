use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    /// Close the connection, acknowledge, then exit the thread.
    Close(oneshot::Sender<()>),
}

struct DbThread {
    requests: mpsc::Sender<Request>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DbThread {
    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DbThread {
    fn drop(&mut self) {
        // Dropping the sender ends the request loop once queued jobs ran.
        // No join: this can run on a runtime thread.
        if self.handle().take().is_some() {
            debug!("Database dropped without close; worker finishes on its own");
        }
    }
}

/// Cheap to clone; every clone talks to the same connection thread.
#[derive(Clone)]
pub struct Database {
    thread: Arc<DbThread>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Opens (or creates) the database file and brings its schema up to
    /// date before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (requests, inbox) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name("bolita-db".into())
            .spawn(move || match open_connection(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn database thread")?;

        ready_rx
            .recv()
            .context("database thread exited before it was ready")??;

        info!("Database ready at {}", path.display());

        Ok(Self {
            thread: Arc::new(DbThread {
                requests,
                handle: Mutex::new(Some(handle)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` against the connection and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });

        self.thread
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("database at {} is closed", self.path().display()))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread stopped before answering"))?
    }

    /// Finishes queued jobs, closes the connection and joins the thread.
    /// Later calls on any clone fail; closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(handle) = self.thread.handle().take() else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if self.thread.requests.send(Request::Close(done_tx)).is_ok() {
            let _ = done_rx.await;
        }

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .context("failed to wait for database thread")?
            .map_err(|_| anyhow!("database thread panicked"))?;

        info!("Database at {} closed", self.path().display());
        Ok(())
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable, keeping the default: {err}");
    }
    // Records cascade with their session.
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<Request>) {
    while let Ok(request) = inbox.recv() {
        match request {
            Request::Run(job) => job(&mut conn),
            Request::Close(done) => {
                if let Err((_, err)) = conn.close() {
                    error!("Failed to close database cleanly: {err}");
                }
                let _ = done.send(());
                return;
            }
        }
    }
    debug!("Database thread exiting after its last handle was dropped");
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::db::migrations::CURRENT_SCHEMA_VERSION;

    async fn pragma(db: &Database, name: &'static str) -> Result<i64> {
        db.execute(move |conn| Ok(conn.pragma_query_value(None, name, |row| row.get(0))?))
            .await
    }

    #[tokio::test]
    async fn opens_with_foreign_keys_and_current_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("data").join("bolita.sqlite3")).unwrap();

        assert_eq!(pragma(&db, "foreign_keys").await.unwrap(), 1);
        assert_eq!(
            pragma(&db, "user_version").await.unwrap(),
            i64::from(CURRENT_SCHEMA_VERSION)
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_rejects_later_work_and_releases_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bolita.sqlite3");
        let db = Database::new(path.clone()).unwrap();
        let other = db.clone();

        db.close().await.unwrap();
        assert!(other.execute(|_| Ok(())).await.is_err());
        other.close().await.unwrap();

        let reopened = Database::new(path).unwrap();
        assert_eq!(
            pragma(&reopened, "user_version").await.unwrap(),
            i64::from(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn dropping_the_last_handle_does_not_wait_for_queued_work() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("bolita.sqlite3")).unwrap();

        let (ran_tx, ran_rx) = mpsc::channel();
        let queued = db.thread.requests.send(Request::Run(Box::new(move |_| {
            thread::sleep(Duration::from_millis(400));
            let _ = ran_tx.send(());
        })));
        assert!(queued.is_ok());

        let started = Instant::now();
        drop(db);
        assert!(started.elapsed() < Duration::from_millis(300));
        ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}

//! SQL execution backends.
//!
//! Both backends take the same shape of work: a closure that receives a
//! mutable connection and returns a rusqlite result. `Embedded` ships the
//! closure to a dedicated worker thread that owns the one and only
//! connection, serialized over an mpsc channel with a oneshot reply per
//! request. `Pooled` keeps a bounded set of connections in WAL mode and
//! runs each closure on the blocking thread pool.

use log::{debug, info, warn};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};

use super::schema::SCHEMA;
use super::StorageError;

/// How long a connection waits on a locked database file before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a runner could not produce a result.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("backend is shut down")]
    Closed,

    #[error("no connection available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Dispatches SQL work to whichever backend the gateway was configured
/// with.
pub enum SqlRunner {
    Embedded(EmbeddedWorker),
    Pooled(Pool),
}

impl SqlRunner {
    pub async fn run<T, F>(&self, f: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        match self {
            SqlRunner::Embedded(worker) => worker.run(f).await,
            SqlRunner::Pooled(pool) => pool.run(f).await,
        }
    }

    /// Stop accepting work and release connections. Safe to call twice.
    pub fn shutdown(&self) {
        match self {
            SqlRunner::Embedded(worker) => worker.shutdown(),
            SqlRunner::Pooled(pool) => pool.shutdown(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            SqlRunner::Embedded(_) => "embedded",
            SqlRunner::Pooled(_) => "pooled",
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::BackendUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

fn open_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

// ============================================================================
// Embedded: one connection, one worker thread
// ============================================================================

/// Single-connection backend. The worker thread owns the connection for its
/// whole life; every request is a closure it runs in arrival order, so
/// writes never contend. Dropping the sender drains the queue and stops the
/// thread.
pub struct EmbeddedWorker {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl EmbeddedWorker {
    /// Open the database, create the schema and hand the connection to a
    /// fresh worker thread.
    pub fn start(path: &Path) -> Result<Self, StorageError> {
        ensure_parent_dir(path)?;
        let conn = open_database(path).map_err(|e| {
            StorageError::BackendUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::BackendUnavailable(format!("schema setup: {}", e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("runeforge-sql".into())
            .spawn(move || {
                let mut conn = conn;
                while let Some(job) = rx.blocking_recv() {
                    job(&mut conn);
                }
                debug!("embedded sql worker stopped");
            })
            .map_err(|e| StorageError::BackendUnavailable(format!("worker spawn: {}", e)))?;

        info!("embedded database ready at {}", path.display());
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let tx = match self.tx.lock().unwrap().as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(RunnerError::Closed),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have gone away; a dead reply channel is fine.
            let _ = reply_tx.send(f(conn));
        });
        tx.send(job).map_err(|_| RunnerError::Closed)?;

        match reply_rx.await {
            Ok(result) => result.map_err(RunnerError::Sql),
            Err(_) => Err(RunnerError::Closed),
        }
    }

    /// Drop the sender so the worker drains its queue, then join it.
    pub fn shutdown(&self) {
        let taken = self.tx.lock().unwrap().take();
        if taken.is_none() {
            return;
        }
        drop(taken);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("embedded sql worker panicked during shutdown");
            }
        }
    }
}

// ============================================================================
// Pooled: bounded connection pool over WAL
// ============================================================================

/// Pool tuning knobs, filled from the `[database]` config section.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_size: usize,
    pub min_idle: usize,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 2,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

struct IdleConn {
    conn: Connection,
    created_at: Instant,
    idle_since: Instant,
}

/// Bounded pool of WAL-mode connections. A semaphore caps concurrent
/// checkouts at `max_size`; acquiring waits up to `connection_timeout`.
/// Connections past `max_lifetime` are retired at checkout, and connections
/// idle past `idle_timeout` are replaced with a fresh open, so a burst's
/// worth of connections does not linger forever.
pub struct Pool {
    path: PathBuf,
    options: PoolOptions,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConn>>,
    closed: AtomicBool,
}

impl Pool {
    /// Open the database in WAL mode, create the schema and pre-open
    /// `min_idle` connections.
    pub fn connect(path: &Path, options: PoolOptions) -> Result<Self, StorageError> {
        ensure_parent_dir(path)?;
        let mut options = options;
        options.max_size = options.max_size.max(1);
        options.min_idle = options.min_idle.min(options.max_size);

        let pool = Self {
            path: path.to_path_buf(),
            permits: Arc::new(Semaphore::new(options.max_size)),
            options,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };

        let first = pool
            .open_pool_conn()
            .map_err(|e| StorageError::BackendUnavailable(format!("cannot open pool: {}", e)))?;
        first
            .execute_batch(SCHEMA)
            .map_err(|e| StorageError::BackendUnavailable(format!("schema setup: {}", e)))?;
        let now = Instant::now();
        {
            let mut idle = pool.idle.lock().unwrap();
            idle.push(IdleConn {
                conn: first,
                created_at: now,
                idle_since: now,
            });
            while idle.len() < pool.options.min_idle {
                let conn = pool.open_pool_conn().map_err(|e| {
                    StorageError::BackendUnavailable(format!("cannot open pool: {}", e))
                })?;
                idle.push(IdleConn {
                    conn,
                    created_at: Instant::now(),
                    idle_since: Instant::now(),
                });
            }
        }

        info!(
            "connection pool ready at {} (max {}, min idle {})",
            path.display(),
            pool.options.max_size,
            pool.options.min_idle
        );
        Ok(pool)
    }

    fn open_pool_conn(&self) -> Result<Connection, rusqlite::Error> {
        let conn = open_database(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Pop a usable idle connection or open a fresh one. Retires entries
    /// past their lifetime or idle deadline on the way.
    fn checkout(&self) -> Result<IdleConn, rusqlite::Error> {
        let mut idle = self.idle.lock().unwrap();
        while let Some(entry) = idle.pop() {
            if entry.created_at.elapsed() >= self.options.max_lifetime {
                debug!("retiring pooled connection past max lifetime");
                continue;
            }
            if entry.idle_since.elapsed() >= self.options.idle_timeout {
                debug!("discarding pooled connection idle too long");
                continue;
            }
            return Ok(entry);
        }
        drop(idle);
        let conn = self.open_pool_conn()?;
        let now = Instant::now();
        Ok(IdleConn {
            conn,
            created_at: now,
            idle_since: now,
        })
    }

    fn release(&self, mut entry: IdleConn) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        entry.idle_since = Instant::now();
        self.idle.lock().unwrap().push(entry);
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RunnerError::Closed);
        }

        let acquire = self.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.options.connection_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RunnerError::Closed),
            Err(_) => return Err(RunnerError::AcquireTimeout(self.options.connection_timeout)),
        };

        let mut entry = self.checkout()?;
        let joined = tokio::task::spawn_blocking(move || {
            let result = f(&mut entry.conn);
            (entry, result)
        })
        .await;

        // The permit is held until the connection is back in the idle set,
        // so the pool never exceeds max_size connections.
        let out = match joined {
            Ok((entry, result)) => {
                self.release(entry);
                result.map_err(RunnerError::Sql)
            }
            Err(e) => Err(RunnerError::Task(e.to_string())),
        };
        drop(permit);
        out
    }

    /// Close the pool: reject new work, wake waiters, drop idle
    /// connections. Checked-out connections are dropped on release.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        self.idle.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options() -> PoolOptions {
        PoolOptions {
            max_size: 2,
            min_idle: 1,
            connection_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }

    #[tokio::test]
    async fn embedded_runs_jobs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let worker = EmbeddedWorker::start(&dir.path().join("test.db")).unwrap();

        worker
            .run(|conn| {
                conn.execute("CREATE TABLE t (n INTEGER)", [])?;
                conn.execute("INSERT INTO t (n) VALUES (1)", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let n: i64 = worker
            .run(|conn| conn.query_row("SELECT sum(n) FROM t", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(n, 1);
        worker.shutdown();
    }

    #[tokio::test]
    async fn embedded_rejects_work_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let worker = EmbeddedWorker::start(&dir.path().join("test.db")).unwrap();
        worker.shutdown();
        worker.shutdown(); // second call is a no-op

        let result = worker.run(|conn| conn.execute("SELECT 1", []).map(|_| ())).await;
        assert!(matches!(result, Err(RunnerError::Closed)));
    }

    #[tokio::test]
    async fn pool_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::connect(&dir.path().join("pool.db"), test_options()).unwrap();

        pool.run(|conn| {
            conn.execute(
                "INSERT INTO enchantment_statistics (enchantment_id, total_applications) VALUES ('X', 3)",
                [],
            )
            .map(|_| ())
        })
        .await
        .unwrap();

        let n: i64 = pool
            .run(|conn| {
                conn.query_row(
                    "SELECT total_applications FROM enchantment_statistics WHERE enchantment_id = 'X'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(n, 3);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_acquire_times_out_when_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = test_options();
        options.max_size = 1;
        options.connection_timeout = Duration::from_millis(50);
        let pool = Arc::new(Pool::connect(&dir.path().join("pool.db"), options).unwrap());

        let hog = pool.clone();
        let task = tokio::spawn(async move {
            hog.run(|_conn| {
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
            .await
        });
        // Give the hog time to take the only permit.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result = pool.run(|_conn| Ok(())).await;
        assert!(matches!(result, Err(RunnerError::AcquireTimeout(_))));
        task.await.unwrap().unwrap();
        pool.shutdown();
    }

    #[tokio::test]
    async fn pool_rejects_work_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::connect(&dir.path().join("pool.db"), test_options()).unwrap();
        pool.shutdown();
        pool.shutdown();

        let result = pool.run(|_conn| Ok(())).await;
        assert!(matches!(result, Err(RunnerError::Closed)));
    }
}

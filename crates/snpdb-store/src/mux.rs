//! Single-writer connection multiplexer.
//!
//! Every canonical database path gets at most one worker: a named thread
//! that exclusively owns the `rusqlite::Connection` and serves requests from
//! an unbounded queue in FIFO order. Callers hold [`MuxHandle`]s; each handle
//! id sits in the worker's reference set and the worker is shut down when the
//! last one is released.
//!
//! The worker polls its queue with a timeout so it notices shutdown. A panic
//! escaping statement execution stops it, and everything still queued fails
//! with [`StoreError::WorkerCrashed`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use snpdb_sql::{SqlValue, Statement};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// How a database file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Existing file, read-only connection.
    Read,
    /// Created if missing, read-write connection.
    Write,
}

impl OpenMode {
    /// `"r"` or `"w"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
        }
    }
}

impl FromStr for OpenMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            other => Err(StoreError::InvalidMode(other.to_owned())),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows produced by one statement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Decoded rows.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a mutating statement, 0 for queries.
    pub changes: usize,
}

impl ResultSet {
    /// Values of the first column of every row.
    pub fn first_column(&self) -> Vec<SqlValue> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect()
    }

    /// First value of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

type Reply<T> = Sender<Result<T>>;

enum Request {
    Execute(Statement, Reply<ResultSet>),
    Transaction(Vec<Statement>, Reply<Vec<ResultSet>>),
    #[cfg(test)]
    Panic(Reply<ResultSet>),
}

impl Request {
    /// Serve the request. Returns the panic message if execution panicked.
    fn serve(self, conn: &Connection, crash: &Crash<'_>) -> Option<String> {
        match self {
            Self::Execute(statement, reply) => {
                crash.respond(&reply, || run_statement(conn, &statement))
            }
            Self::Transaction(statements, reply) => {
                crash.respond(&reply, || run_transaction(conn, &statements))
            }
            #[cfg(test)]
            Self::Panic(reply) => crash.respond(&reply, || -> Result<ResultSet> {
                panic!("requested worker crash")
            }),
        }
    }

    fn fail(self, err: impl Fn() -> StoreError) {
        match self {
            Self::Execute(_, reply) => {
                let _ = reply.send(Err(err()));
            }
            Self::Transaction(_, reply) => {
                let _ = reply.send(Err(err()));
            }
            #[cfg(test)]
            Self::Panic(reply) => {
                let _ = reply.send(Err(err()));
            }
        }
    }
}

/// What a worker must update before a crash becomes visible to callers.
struct Crash<'a> {
    running: &'a AtomicBool,
    path: &'a Path,
}

impl Crash<'_> {
    /// Run `job` and send its result. A panic stops the worker first, so the
    /// caller holding the crash error already sees it as not running.
    fn respond<T>(&self, reply: &Reply<T>, job: impl FnOnce() -> Result<T>) -> Option<String> {
        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => {
                let _ = reply.send(result);
                None
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                self.running.store(false, Ordering::Release);
                error!(path = %self.path.display(), message = %message, "worker crashed");
                let _ = reply.send(Err(StoreError::WorkerCrashed(message.clone())));
                Some(message)
            }
        }
    }
}

fn run_statement(conn: &Connection, statement: &Statement) -> Result<ResultSet> {
    let mut prepared = conn.prepare_cached(&statement.sql)?;
    let params = params_from_iter(statement.params.iter());
    if prepared.column_count() == 0 {
        let changes = prepared.execute(params)?;
        debug!(sql = %statement.sql, changes, "statement executed");
        return Ok(ResultSet {
            changes,
            ..ResultSet::default()
        });
    }

    let columns: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = prepared.query(params)?;
    while let Some(row) = cursor.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, SqlValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.push(values);
    }
    debug!(sql = %statement.sql, rows = rows.len(), "query executed");
    Ok(ResultSet {
        columns,
        rows,
        changes: 0,
    })
}

fn run_transaction(conn: &Connection, statements: &[Statement]) -> Result<Vec<ResultSet>> {
    let tx = conn.unchecked_transaction()?;
    let results = statements
        .iter()
        .map(|statement| run_statement(&tx, statement))
        .collect::<Result<Vec<_>>>()?;
    tx.commit()?;
    debug!(statements = statements.len(), "transaction committed");
    Ok(results)
}

fn open_connection(path: &Path, mode: OpenMode, config: &StoreConfig) -> Result<Connection> {
    let flags = match mode {
        OpenMode::Read => {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI
        }
        OpenMode::Write => OpenFlags::default(),
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    // Renames must not rewrite references held by other tables.
    conn.pragma_update(None, "legacy_alter_table", true)?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
    if mode == OpenMode::Write {
        let journal: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            &config.journal_mode,
            |row| row.get(0),
        )?;
        debug!(path = %path.display(), journal, "journal mode set");
    }
    Ok(conn)
}

/// The thread serving one physical connection.
struct Worker {
    path: PathBuf,
    mode: OpenMode,
    running: Arc<AtomicBool>,
    sender: Mutex<Option<Sender<Request>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    handles: Mutex<HashSet<Uuid>>,
}

impl Worker {
    fn spawn(path: PathBuf, mode: OpenMode, config: &StoreConfig) -> Result<Self> {
        let conn = open_connection(&path, mode, config)?;
        let (sender, receiver) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let poll = config.poll_interval();
        let thread_path = path.clone();
        // Worker events report to whoever opened the connection.
        let dispatch = tracing::dispatcher::get_default(Clone::clone);
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    serve(conn, &receiver, &flag, poll, &thread_path);
                });
            })?;

        info!(path = %path.display(), mode = %mode, "worker started");
        Ok(Self {
            path,
            mode,
            running,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            handles: Mutex::new(HashSet::new()),
        })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn submit(&self, request: Request) -> Result<()> {
        let closed = || StoreError::ConnectionClosed(self.path.clone());
        if !self.is_running() {
            request.fail(&closed);
            return Err(closed());
        }
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(closed());
        };
        sender.send(request).map_err(|_| closed())
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        drop(self.sender.lock().take());
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!(path = %self.path.display(), "worker thread panicked during shutdown");
            }
        }
        info!(path = %self.path.display(), "worker stopped");
    }
}

fn serve(
    conn: Connection,
    receiver: &Receiver<Request>,
    running: &AtomicBool,
    poll: Duration,
    path: &Path,
) {
    let crash = Crash { running, path };
    while running.load(Ordering::Acquire) {
        let request = match receiver.recv_timeout(poll) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if let Some(message) = request.serve(&conn, &crash) {
            for queued in receiver.try_iter() {
                queued.fail(|| StoreError::WorkerCrashed(message.clone()));
            }
            break;
        }
    }

    for queued in receiver.try_iter() {
        queued.fail(|| StoreError::ConnectionClosed(path.to_path_buf()));
    }
    if let Err((_, err)) = conn.close() {
        warn!(path = %path.display(), error = %err, "failed to close connection");
    }
}

static GLOBAL: LazyLock<Arc<Multiplexer>> = LazyLock::new(|| Arc::new(Multiplexer::new()));

/// Registry of workers keyed by canonical path.
#[derive(Default)]
pub struct Multiplexer {
    workers: Mutex<HashMap<PathBuf, Arc<Worker>>>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

impl Multiplexer {
    /// An empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Attach a handle to the worker for `path`, spawning it if needed.
    ///
    /// Write mode creates the file; read mode requires it to exist.
    pub fn open(self: &Arc<Self>, path: &Path, mode: OpenMode, config: &StoreConfig) -> Result<MuxHandle> {
        if mode == OpenMode::Write && !path.exists() {
            drop(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            );
        }
        let canonical = std::fs::canonicalize(path)?;

        let mut workers = self.workers.lock();
        let (worker, stale) = match workers.get(&canonical).cloned() {
            Some(existing) if existing.is_running() => {
                if existing.mode == OpenMode::Read && mode == OpenMode::Write {
                    return Err(StoreError::ModeConflict(canonical));
                }
                (existing, None)
            }
            stale => {
                let worker = Arc::new(Worker::spawn(canonical.clone(), mode, config)?);
                let _ = workers.insert(canonical.clone(), Arc::clone(&worker));
                (worker, stale)
            }
        };
        let id = Uuid::now_v7();
        let _ = worker.handles.lock().insert(id);
        drop(workers);
        // Joined after the registry lock is released.
        if let Some(stale) = stale {
            stale.shutdown();
        }
        debug!(path = %canonical.display(), handle = %id, "handle attached");
        Ok(MuxHandle {
            id,
            mode,
            worker,
            mux: Arc::clone(self),
            released: false,
        })
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Handles attached to the worker for `path`, 0 when none is running.
    pub fn handle_count(&self, path: &Path) -> usize {
        let Ok(canonical) = std::fs::canonicalize(path) else {
            return 0;
        };
        self.workers
            .lock()
            .get(&canonical)
            .map_or(0, |w| w.handles.lock().len())
    }

    fn release(&self, worker: &Arc<Worker>, id: Uuid) {
        let mut workers = self.workers.lock();
        let remaining = {
            let mut handles = worker.handles.lock();
            let _ = handles.remove(&id);
            handles.len()
        };
        debug!(path = %worker.path.display(), handle = %id, remaining, "handle released");
        if remaining > 0 {
            return;
        }
        if workers
            .get(&worker.path)
            .is_some_and(|registered| Arc::ptr_eq(registered, worker))
        {
            let _ = workers.remove(&worker.path);
        }
        drop(workers);
        worker.shutdown();
    }
}

/// One caller's attachment to a worker. Releases itself on drop.
pub struct MuxHandle {
    id: Uuid,
    mode: OpenMode,
    worker: Arc<Worker>,
    mux: Arc<Multiplexer>,
    released: bool,
}

impl fmt::Debug for MuxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxHandle")
            .field("id", &self.id)
            .field("path", &self.worker.path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl MuxHandle {
    /// Handle id in the worker's reference set.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Canonical path of the database file.
    pub fn path(&self) -> &Path {
        &self.worker.path
    }

    /// Mode this handle was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the worker is still serving requests.
    pub fn is_running(&self) -> bool {
        !self.released && self.worker.is_running()
    }

    /// Run one statement and wait for its rows.
    pub fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        let (reply, response) = mpsc::channel();
        self.send(Request::Execute(statement.clone(), reply))?;
        await_reply(&response)
    }

    /// Run `statements` in one transaction; nothing else interleaves.
    pub fn transaction(&self, statements: Vec<Statement>) -> Result<Vec<ResultSet>> {
        let (reply, response) = mpsc::channel();
        self.send(Request::Transaction(statements, reply))?;
        await_reply(&response)
    }

    #[cfg(test)]
    fn crash(&self) -> Result<ResultSet> {
        let (reply, response) = mpsc::channel();
        self.send(Request::Panic(reply))?;
        await_reply(&response)
    }

    fn send(&self, request: Request) -> Result<()> {
        if self.released {
            return Err(StoreError::ConnectionClosed(self.worker.path.clone()));
        }
        self.worker.submit(request)
    }

    /// Detach from the worker; the last handle shuts it down.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.mux.release(&self.worker, self.id);
        }
    }
}

impl Drop for MuxHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn await_reply<T>(response: &Receiver<Result<T>>) -> Result<T> {
    response
        .recv()
        .map_err(|_| StoreError::WorkerCrashed("worker exited before replying".to_owned()))?
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

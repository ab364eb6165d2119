// crates/sticky-assign-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Assignment Store
// Description: Durable AssignmentStore backed by SQLite.
// Purpose: Persist sticky assignments with single-writer insert-or-fetch.
// Dependencies: sticky-assign-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements [`AssignmentStore`] on `SQLite`. Every write goes
//! through a dedicated writer thread that owns the only write connection and
//! drains a bounded queue one command at a time, each in its own immediate
//! transaction. Reads use a round-robin pool of separate connections.
//!
//! Persisting an assignment resolves the variant key, inserts with
//! `ON CONFLICT DO NOTHING` on `(experimentId, userId)`, and re-reads the
//! existing row when the insert was a no-op, so a losing writer always
//! returns the winner's variant.
//!
//! The `Variant` and `Assignment` tables follow the layout of the
//! administrative database that owns experiment and variant rows; this
//! store never creates or edits variants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::TryLockError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use sticky_assign_core::Assignment;
use sticky_assign_core::AssignmentStore;
use sticky_assign_core::ExperimentId;
use sticky_assign_core::RequestDeadline;
use sticky_assign_core::StoreError;
use sticky_assign_core::UserId;
use sticky_assign_core::Variant;
use sticky_assign_core::VariantKey;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Name of the writer thread.
const WRITER_THREAD_NAME: &str = "sticky-assign-sqlite-writer";
/// Pause between attempts to take a busy read connection.
const READ_LOCK_RETRY: Duration = Duration::from_millis(1);

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` assignment store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `writer_queue_capacity` and `read_pool_size` are greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Writer queue capacity.
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
    /// Number of read connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Returns a configuration for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            writer_queue_capacity: default_writer_queue_capacity(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
#[must_use]
pub const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default writer queue capacity.
#[must_use]
pub const fn default_writer_queue_capacity() -> usize {
    1_024
}

/// Returns the default read connection pool size.
#[must_use]
pub const fn default_read_pool_size() -> usize {
    4
}

/// Validates runtime limits in the store configuration.
fn validate_runtime_limits(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.writer_queue_capacity == 0 {
        return Err(SqliteStoreError::Invalid(
            "writer_queue_capacity must be greater than zero".to_string(),
        ));
    }
    if config.read_pool_size == 0 {
        return Err(SqliteStoreError::Invalid(
            "read_pool_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw row payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored rows failed integrity checks.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration or data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// The variant key does not exist for the experiment.
    #[error("variant {variant_key} not found for experiment {experiment_id}")]
    VariantNotFound {
        /// Experiment the key was resolved against.
        experiment_id: ExperimentId,
        /// Unresolved variant key.
        variant_key: VariantKey,
    },
    /// An insert conflicted but the existing row could not be read back.
    #[error("assignment exists for experiment {experiment_id} but could not be fetched")]
    AssignmentNotFound {
        /// Experiment identifier of the conflicting pair.
        experiment_id: ExperimentId,
        /// User identifier of the conflicting pair.
        user_id: UserId,
    },
    /// The request deadline passed before the operation completed.
    #[error("sqlite store operation cancelled: {0}")]
    Cancelled(String),
    /// The writer queue is full or the writer is gone.
    #[error("sqlite store overloaded: {0}")]
    Overloaded(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::VariantNotFound {
                experiment_id,
                variant_key,
            } => Self::VariantNotFound {
                experiment_id,
                variant_key,
            },
            SqliteStoreError::AssignmentNotFound {
                experiment_id,
                user_id,
            } => Self::AssignmentNotFound {
                experiment_id,
                user_id,
            },
            SqliteStoreError::Cancelled(message) => Self::Cancelled(message),
            SqliteStoreError::Overloaded(message) => Self::Overloaded(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed assignment store.
///
/// # Invariants
/// - Exactly one connection writes; it is owned by the writer thread.
/// - Read connections are used round-robin and serialized per connection.
#[derive(Clone)]
pub struct SqliteAssignmentStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Read connection pool.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Bounded queue into the writer thread.
    writer_gateway: Arc<SqliteWriteGateway>,
}

/// Gateway for bounded writer-queue submissions.
struct SqliteWriteGateway {
    /// Synchronous channel sender into the writer runtime.
    sender: SyncSender<SqliteWriterCommand>,
    /// Approximate number of commands currently pending.
    pending_depth: Arc<AtomicUsize>,
}

/// Command envelope queued to the writer runtime.
struct SqliteWriterCommand {
    /// Deadline of the submitting request.
    deadline: RequestDeadline,
    /// Command payload and response channel.
    payload: SqliteWriterPayload,
}

/// Queue payload variants handled by the writer runtime.
enum SqliteWriterPayload {
    /// Insert an assignment or fetch the existing one.
    Persist {
        /// Assignment to insert.
        request: PersistRequest,
        /// Result channel for the persisted assignment.
        response: mpsc::Sender<Result<Assignment, SqliteStoreError>>,
    },
    /// Execute lightweight readiness check on writer connection.
    Readiness {
        /// Result channel for readiness outcome.
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
}

/// Insert-or-fetch request for one (experiment, user) pair.
#[derive(Debug, Clone)]
struct PersistRequest {
    /// Experiment identifier.
    experiment_id: ExperimentId,
    /// User identifier.
    user_id: UserId,
    /// Proposed variant key.
    variant_key: VariantKey,
}

impl SqliteAssignmentStore {
    /// Opens an `SQLite`-backed assignment store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        validate_runtime_limits(&config)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        let pending_depth = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::sync_channel(config.writer_queue_capacity);
        spawn_sqlite_writer_runtime(write_connection, Arc::clone(&pending_depth), receiver)?;
        tracing::info!(
            path = %config.path.display(),
            journal_mode = config.journal_mode.pragma_value(),
            read_pool_size = config.read_pool_size,
            "sqlite assignment store opened"
        );
        Ok(Self {
            config,
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            writer_gateway: Arc::new(SqliteWriteGateway {
                sender,
                pending_depth,
            }),
        })
    }

    /// Returns the approximate number of queued writer commands.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writer_gateway.pending_depth.load(Ordering::Acquire)
    }

    /// Verifies both the read path and the writer path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if a mutex is poisoned, a query fails, or
    /// the writer does not answer within the busy timeout.
    fn check_connection(&self) -> Result<(), SqliteStoreError> {
        let deadline = RequestDeadline::after(Duration::from_millis(self.config.busy_timeout_ms));
        self.with_read_connection(&deadline, select_one)?;
        self.writer_gateway.submit_readiness(&deadline)
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Runs `op` on a pooled read connection unless the deadline passed.
    fn with_read_connection<T>(
        &self,
        deadline: &RequestDeadline,
        op: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        ensure_not_expired(deadline)?;
        let guard = lock_read_connection(self.read_connection(), deadline)?;
        op(&guard)
    }
}

/// Takes a read connection, waiting no longer than the deadline allows.
///
/// Once the connection is held, the query itself is bounded by `busy_timeout`.
fn lock_read_connection<'a>(
    slot: &'a Mutex<Connection>,
    deadline: &RequestDeadline,
) -> Result<MutexGuard<'a, Connection>, SqliteStoreError> {
    let poisoned = || SqliteStoreError::Io("sqlite read mutex poisoned".to_string());
    if deadline.remaining().is_none() {
        return slot.lock().map_err(|_| poisoned());
    }
    loop {
        match slot.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            Err(TryLockError::WouldBlock) => {
                if deadline.is_expired() {
                    return Err(SqliteStoreError::Cancelled(
                        "deadline exceeded waiting for sqlite read connection".to_string(),
                    ));
                }
                thread::sleep(READ_LOCK_RETRY);
            }
        }
    }
}

impl AssignmentStore for SqliteAssignmentStore {
    fn get_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
    ) -> Result<Option<Assignment>, StoreError> {
        self.with_read_connection(deadline, |connection| {
            query_assignment(connection, experiment_id, user_id)
        })
        .map_err(StoreError::from)
    }

    fn list_variants(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
    ) -> Result<Vec<Variant>, StoreError> {
        self.with_read_connection(deadline, |connection| query_variants(connection, experiment_id))
            .map_err(StoreError::from)
    }

    fn persist_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variant_key: &VariantKey,
    ) -> Result<Assignment, StoreError> {
        ensure_not_expired(deadline)?;
        let request = PersistRequest {
            experiment_id: experiment_id.clone(),
            user_id: user_id.clone(),
            variant_key: variant_key.clone(),
        };
        self.writer_gateway.submit_persist(deadline, request).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.check_connection().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Writer Runtime
// ============================================================================

impl SqliteWriteGateway {
    /// Submits an insert-or-fetch command and waits for its outcome.
    fn submit_persist(
        &self,
        deadline: &RequestDeadline,
        request: PersistRequest,
    ) -> Result<Assignment, SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        self.submit(SqliteWriterCommand {
            deadline: *deadline,
            payload: SqliteWriterPayload::Persist {
                request,
                response: response_tx,
            },
        })?;
        await_response(deadline, &response_rx)
    }

    /// Submits a writer readiness check and waits for completion.
    fn submit_readiness(&self, deadline: &RequestDeadline) -> Result<(), SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        self.submit(SqliteWriterCommand {
            deadline: *deadline,
            payload: SqliteWriterPayload::Readiness {
                response: response_tx,
            },
        })?;
        await_response(deadline, &response_rx)
    }

    /// Attempts enqueue into the bounded writer queue.
    fn submit(&self, command: SqliteWriterCommand) -> Result<(), SqliteStoreError> {
        let depth = self.pending_depth.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_command)) => {
                self.pending_depth.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(pending = depth, "sqlite writer queue full");
                Err(SqliteStoreError::Overloaded("sqlite writer queue full".to_string()))
            }
            Err(TrySendError::Disconnected(_command)) => {
                self.pending_depth.fetch_sub(1, Ordering::AcqRel);
                Err(SqliteStoreError::Overloaded("sqlite writer runtime unavailable".to_string()))
            }
        }
    }
}

/// Waits for a writer response, giving up once the deadline passes.
fn await_response<T>(
    deadline: &RequestDeadline,
    receiver: &mpsc::Receiver<Result<T, SqliteStoreError>>,
) -> Result<T, SqliteStoreError> {
    let closed = || SqliteStoreError::Io("sqlite writer response channel closed".to_string());
    match deadline.remaining() {
        None => receiver.recv().map_err(|_| closed())?,
        Some(remaining) => match receiver.recv_timeout(remaining) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(SqliteStoreError::Cancelled(
                "deadline exceeded waiting for sqlite writer".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(closed()),
        },
    }
}

/// Spawns the dedicated writer runtime thread.
fn spawn_sqlite_writer_runtime(
    mut write_connection: Connection,
    pending_depth: Arc<AtomicUsize>,
    receiver: mpsc::Receiver<SqliteWriterCommand>,
) -> Result<(), SqliteStoreError> {
    thread::Builder::new()
        .name(WRITER_THREAD_NAME.to_string())
        .spawn(move || {
            sqlite_writer_loop(&mut write_connection, &pending_depth, &receiver);
        })
        .map_err(|err| {
            SqliteStoreError::Io(format!("failed to spawn sqlite writer thread: {err}"))
        })?;
    Ok(())
}

/// Drains queued commands one transaction at a time until every sender is gone.
fn sqlite_writer_loop(
    write_connection: &mut Connection,
    pending_depth: &AtomicUsize,
    receiver: &mpsc::Receiver<SqliteWriterCommand>,
) {
    while let Ok(command) = receiver.recv() {
        execute_writer_command(write_connection, command);
        pending_depth.fetch_sub(1, Ordering::AcqRel);
    }
    tracing::debug!("sqlite writer runtime stopped");
}

/// Executes one writer command and delivers its outcome.
fn execute_writer_command(write_connection: &mut Connection, command: SqliteWriterCommand) {
    let expired = command.deadline.is_expired();
    match command.payload {
        SqliteWriterPayload::Persist {
            request,
            response,
        } => {
            let outcome = if expired {
                Err(SqliteStoreError::Cancelled(
                    "request deadline exceeded before write".to_string(),
                ))
            } else {
                apply_persist_in_tx(write_connection, &request)
            };
            if let Err(err) = &outcome
                && is_fatal_store_error(err)
            {
                tracing::error!(
                    experiment_id = %request.experiment_id,
                    user_id = %request.user_id,
                    error = %err,
                    "sqlite assignment write failed"
                );
            }
            let _ = response.send(outcome);
        }
        SqliteWriterPayload::Readiness {
            response,
        } => {
            let outcome = if expired {
                Err(SqliteStoreError::Cancelled("readiness check expired".to_string()))
            } else {
                select_one(write_connection)
            };
            let _ = response.send(outcome);
        }
    }
}

/// Returns true when the error points at the database rather than the request.
const fn is_fatal_store_error(error: &SqliteStoreError) -> bool {
    matches!(
        error,
        SqliteStoreError::Io(_)
            | SqliteStoreError::Db(_)
            | SqliteStoreError::Corrupt(_)
            | SqliteStoreError::VersionMismatch(_)
            | SqliteStoreError::AssignmentNotFound { .. }
    )
}

/// Resolves the variant, inserts if absent, and returns the persisted row.
fn apply_persist_in_tx(
    write_connection: &mut Connection,
    request: &PersistRequest,
) -> Result<Assignment, SqliteStoreError> {
    let tx = write_connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let variant_id: Option<String> = tx
        .query_row(
            r#"SELECT id FROM Variant WHERE experimentId = ?1 AND "key" = ?2
               ORDER BY createdAt ASC, rowid ASC LIMIT 1"#,
            params![request.experiment_id.as_str(), request.variant_key.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some(variant_id) = variant_id else {
        return Err(SqliteStoreError::VariantNotFound {
            experiment_id: request.experiment_id.clone(),
            variant_key: request.variant_key.clone(),
        });
    };
    let inserted = tx
        .execute(
            "INSERT INTO Assignment (userId, experimentId, variantId, createdAt)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (experimentId, userId) DO NOTHING",
            params![
                request.user_id.as_str(),
                request.experiment_id.as_str(),
                variant_id,
                unix_millis()
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let assignment = if inserted == 0 {
        query_assignment(&tx, &request.experiment_id, &request.user_id)?.ok_or_else(|| {
            SqliteStoreError::AssignmentNotFound {
                experiment_id: request.experiment_id.clone(),
                user_id: request.user_id.clone(),
            }
        })?
    } else {
        Assignment::new(
            request.experiment_id.clone(),
            request.user_id.clone(),
            request.variant_key.clone(),
        )
    };
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(assignment)
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Loads the assignment for a pair with its variant key.
fn query_assignment(
    connection: &Connection,
    experiment_id: &ExperimentId,
    user_id: &UserId,
) -> Result<Option<Assignment>, SqliteStoreError> {
    let row: Option<Option<String>> = connection
        .query_row(
            r#"SELECT v."key" FROM Assignment a
               LEFT JOIN Variant v ON v.id = a.variantId
               WHERE a.experimentId = ?1 AND a.userId = ?2
               LIMIT 1"#,
            params![experiment_id.as_str(), user_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match row {
        None => Ok(None),
        Some(None) => Err(SqliteStoreError::Corrupt(format!(
            "assignment for experiment {experiment_id} references a missing variant"
        ))),
        Some(Some(key)) => Ok(Some(Assignment::new(
            experiment_id.clone(),
            user_id.clone(),
            VariantKey::new(key),
        ))),
    }
}

/// Lists an experiment's variants in creation order.
fn query_variants(
    connection: &Connection,
    experiment_id: &ExperimentId,
) -> Result<Vec<Variant>, SqliteStoreError> {
    let mut statement = connection
        .prepare_cached(
            r#"SELECT "key", weight FROM Variant WHERE experimentId = ?1
               ORDER BY createdAt ASC, rowid ASC"#,
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = statement
        .query_map(params![experiment_id.as_str()], |row| {
            Ok(Variant::new(row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Runs a trivial query to prove the connection works.
fn select_one(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects work whose deadline already passed.
fn ensure_not_expired(deadline: &RequestDeadline) -> Result<(), SqliteStoreError> {
    if deadline.is_expired() {
        return Err(SqliteStoreError::Cancelled("request deadline exceeded".to_string()));
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    // journal_mode answers with the mode actually in effect.
    let applied: String = connection
        .pragma_update_and_check(None, "journal_mode", config.journal_mode.pragma_value(), |row| {
            row.get(0)
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if !applied.eq_ignore_ascii_case(config.journal_mode.pragma_value()) {
        tracing::warn!(
            requested = config.journal_mode.pragma_value(),
            applied = %applied,
            "sqlite journal mode not applied"
        );
    }
    connection
        .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                r#"CREATE TABLE IF NOT EXISTS Variant (
                    id TEXT PRIMARY KEY NOT NULL,
                    experimentId TEXT NOT NULL,
                    "key" TEXT NOT NULL,
                    weight INTEGER NOT NULL,
                    createdAt INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS Variant_experimentId_createdAt_idx
                    ON Variant (experimentId, createdAt);
                CREATE TABLE IF NOT EXISTS Assignment (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    userId TEXT NOT NULL,
                    experimentId TEXT NOT NULL,
                    variantId TEXT NOT NULL REFERENCES Variant (id),
                    createdAt INTEGER NOT NULL,
                    UNIQUE (experimentId, userId)
                );"#,
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Instant;

    use sticky_assign_core::RequestDeadline;
    use sticky_assign_core::StoreError;

    use std::sync::Mutex;
    use std::time::Duration;

    use rusqlite::Connection;

    use super::SqliteStoreError;
    use super::await_response;
    use super::lock_read_connection;
    use super::validate_store_path;

    #[test]
    fn overloaded_maps_to_store_overloaded() {
        let mapped: StoreError =
            SqliteStoreError::Overloaded("sqlite writer queue full".to_string()).into();
        assert_eq!(mapped, StoreError::Overloaded("sqlite writer queue full".to_string()));
    }

    #[test]
    fn await_response_gives_up_at_deadline() {
        let (_sender, receiver) = std::sync::mpsc::channel::<Result<(), SqliteStoreError>>();
        let err = await_response(&RequestDeadline::at(Instant::now()), &receiver).unwrap_err();
        assert!(matches!(err, SqliteStoreError::Cancelled(_)));
    }

    #[test]
    fn await_response_reports_closed_channel() {
        let (sender, receiver) = std::sync::mpsc::channel::<Result<(), SqliteStoreError>>();
        drop(sender);
        let err = await_response(&RequestDeadline::unbounded(), &receiver).unwrap_err();
        assert!(matches!(err, SqliteStoreError::Io(_)));
    }

    #[test]
    fn empty_path_is_invalid() {
        let err = validate_store_path(std::path::Path::new("")).unwrap_err();
        assert!(matches!(err, SqliteStoreError::Invalid(_)));
    }

    #[test]
    fn busy_read_connection_gives_up_at_deadline() {
        let slot = Mutex::new(Connection::open_in_memory().unwrap());
        let held = slot.lock().unwrap();
        let started = Instant::now();
        let err = lock_read_connection(&slot, &RequestDeadline::after(Duration::from_millis(50)))
            .unwrap_err();
        assert!(matches!(err, SqliteStoreError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(held);
        assert!(lock_read_connection(&slot, &RequestDeadline::after(Duration::from_secs(1))).is_ok());
    }
}

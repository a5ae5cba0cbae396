//! # Database Facade
//!
//! Opens and owns the persistence file, hands out scoped transactions,
//! registers subscriptions, and drains the after-transaction queue that
//! defers change emission past commit boundaries.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{Error, Result};
use crate::events::registry::{ChangeEvent, Registry};
use crate::events::{wrap_subscriber, Matcher, Operation, Ops, Subscription};
use crate::query::Query;
use crate::schema::Record;
use crate::tx::{AfterFn, Tx, TxInner};

/// Configuration for opening a database.
#[derive(Debug, Clone, Default)]
pub struct Options {
    cache_size: Option<usize>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// Substrate page-cache size in bytes.
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Open or create the database file at `path` with these options.
    /// The file is created with mode 0600.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Database> {
        let path = path.as_ref();
        let mut builder = redb::Database::builder();
        if let Some(bytes) = self.cache_size {
            builder.set_cache_size(bytes);
        }
        let db = builder.create(path)?;
        restrict_permissions(path)?;
        tracing::info!(path = %path.display(), "database opened");
        Ok(Database {
            db,
            registry: Arc::new(Registry::new()),
            after: Mutex::new(VecDeque::new()),
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// An embedded object store over a single persistence file.
///
/// Transactions are single-writer, multi-reader. Subscribers run on
/// their own worker threads and may keep the database in an `Arc` to
/// open transactions of their own; record hooks receive the database
/// directly.
pub struct Database {
    db: redb::Database,
    registry: Arc<Registry>,
    after: Mutex<VecDeque<AfterFn>>,
}

impl Database {
    /// Open or create the database file at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Options::new().open(path)
    }

    /// Configure before opening.
    pub fn options() -> Options {
        Options::new()
    }

    /// Close the database and release the persistence file. Open
    /// subscriptions are abandoned; their workers exit with the
    /// registry.
    pub fn close(self) -> Result<()> {
        tracing::info!("database closed");
        drop(self);
        Ok(())
    }

    /// Run `f` inside a read-only transaction, then drain the
    /// after-transaction queue.
    pub fn view<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Tx<'_>) -> Result<()>,
    {
        let txn = self.db.begin_read()?;
        let tx = Tx {
            inner: TxInner::Read(txn),
            db: self,
            pending: Vec::new(),
        };
        f(&tx)?;
        let Tx { pending, .. } = tx;
        self.append_pending(pending);
        self.run_after_transaction()
    }

    /// Run `f` inside a read-write transaction. On success the
    /// transaction commits, the transaction's deferred callbacks join
    /// the after-transaction queue, and the queue drains. On error the
    /// transaction rolls back and its deferred callbacks (including
    /// change emissions) are discarded.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<()>,
    {
        let txn = self.db.begin_write()?;
        let mut tx = Tx {
            inner: TxInner::Write(txn),
            db: self,
            pending: Vec::new(),
        };
        match f(&mut tx) {
            Ok(()) => {
                let Tx { inner, pending, .. } = tx;
                let TxInner::Write(txn) = inner else {
                    return Err(Error::ReadOnly);
                };
                txn.commit()?;
                self.append_pending(pending);
                self.run_after_transaction()
            }
            Err(err) => {
                let Tx { inner, .. } = tx;
                if let TxInner::Write(txn) = inner {
                    if let Err(abort_err) = txn.abort() {
                        tracing::warn!(error = %abort_err, "rollback failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// A query over records of type `T` that opens its own read
    /// transaction per execution.
    pub fn query<T: Record>(&self) -> Query<'_, T> {
        Query::in_database(self)
    }

    /// Append `f` to the callbacks run after the current transaction
    /// finishes; outside a transaction it runs after the next one. A
    /// callback error becomes the return value of `view`/`update`, but
    /// a mutating transaction has already committed by then.
    pub fn after_transaction(&self, f: impl FnOnce(&Database) -> Result<()> + Send + 'static) {
        self.after.lock().push_back(Box::new(f));
    }

    /// A subscription named `name` watching changes to the record with
    /// `record`'s type and id, for the operations in `ops`. Call
    /// [`Subscription::subscribe`] to activate it.
    pub fn subscription<T, F>(
        &self,
        name: impl Into<String>,
        record: &T,
        ops: Ops,
        subscriber: F,
    ) -> Subscription
    where
        T: Record,
        F: Fn(T, Operation) -> Result<()> + Send + 'static,
    {
        let wanted = record.id().clone();
        let matcher: Matcher = Arc::new(move |value| {
            let candidate: T = serde_json::from_value(value.clone())?;
            Ok(candidate.id() == &wanted)
        });
        Subscription::new(
            self.registry(),
            name.into(),
            T::TYPE_NAME,
            ops,
            matcher,
            wrap_subscriber(subscriber),
        )
    }

    /// Remove the named subscription.
    pub fn unsubscribe(&self, name: &str) {
        self.registry.remove(name);
    }

    /// Artificially emit an update of `record`: every update
    /// subscription matching it receives an update event, and its
    /// `updated` hook runs first. The chaining primitive for hooks.
    pub fn emit_update<T: Record>(&self, record: &T) -> Result<()> {
        self.emit(Some(record), Some(record))
    }

    /// Publish a committed change: run the record's hook, then hand the
    /// change envelope to every subscription of the type. A hook error
    /// aborts dispatch and surfaces to the transaction caller; the
    /// commit stands.
    pub(crate) fn emit<T: Record>(&self, old: Option<&T>, new: Option<&T>) -> Result<()> {
        match (old, new) {
            (Some(old), Some(new)) => new
                .updated(self, old)
                .map_err(|err| Error::Hook(Box::new(err)))?,
            (None, Some(new)) => new.created(self).map_err(|err| Error::Hook(Box::new(err)))?,
            (Some(old), None) => old.deleted(self).map_err(|err| Error::Hook(Box::new(err)))?,
            (None, None) => return Ok(()),
        }
        let event = ChangeEvent {
            type_name: T::TYPE_NAME,
            old: old.map(serde_json::to_value).transpose()?,
            new: new.map(serde_json::to_value).transpose()?,
        };
        self.registry.dispatch(event);
        Ok(())
    }

    pub(crate) fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    fn append_pending(&self, pending: Vec<AfterFn>) {
        if pending.is_empty() {
            return;
        }
        self.after.lock().extend(pending);
    }

    /// Drain the after-transaction queue FIFO, releasing the lock
    /// across each call so callbacks may enqueue further callbacks or
    /// start new transactions. A callback error stops the drain; the
    /// remainder runs after the next transaction.
    fn run_after_transaction(&self) -> Result<()> {
        loop {
            let next = self.after.lock().pop_front();
            match next {
                None => return Ok(()),
                Some(f) => f(self)?,
            }
        }
    }
}

impl Drop for Database {
    /// Workers park on their delivery channels; dropping the registry
    /// entries closes the channels so the threads exit.
    fn drop(&mut self) {
        self.registry.clear();
    }
}

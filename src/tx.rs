//! # Transactions
//!
//! Record-level operations inside one substrate transaction. Read-only
//! transactions hand out `&Tx`, so write operations (which take
//! `&mut self`) are unreachable from [`crate::Database::view`] at
//! compile time. Mutations enqueue their change emissions on the
//! transaction's pending list; the database appends that list to its
//! after-transaction queue only once the transaction commits, which
//! suppresses emission on rollback.

use chrono::Utc;
use redb::{ReadTransaction, TableError, WriteTransaction};

use crate::database::Database;
use crate::errors::{Error, Result};
use crate::query::{self, Query, QuerySpec};
use crate::schema::{Id, Record, SchemaError};
use crate::store::{bucket, deindex_record, index_record, BUCKETS, PRIMARY_KEY};

/// Callback deferred until after the surrounding transaction commits.
pub(crate) type AfterFn = Box<dyn FnOnce(&Database) -> Result<()> + Send>;

pub(crate) enum TxInner {
    Read(ReadTransaction),
    Write(WriteTransaction),
}

/// A scoped transaction handle.
///
/// One handle lives inside one [`crate::Database::view`] or
/// [`crate::Database::update`] closure call and must not outlive it.
pub struct Tx<'db> {
    pub(crate) inner: TxInner,
    pub(crate) db: &'db Database,
    pub(crate) pending: Vec<AfterFn>,
}

impl<'db> Tx<'db> {
    /// The database this transaction belongs to.
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Save `record`.
    ///
    /// An empty id gets fresh random bytes and the record is created.
    /// A known id updates the stored record: the old value is
    /// de-indexed, the new one indexed and saved. An unknown id
    /// creates. Creation stamps both timestamps; updates stamp
    /// `updated` and carry the stored `created` timestamp forward.
    pub fn set<T: Record>(&mut self, record: &mut T) -> Result<()> {
        if record.id().is_empty() {
            *record.id_mut() = Id::random();
            return self.create(record);
        }
        let id = record.id().clone();
        match self.load::<T>(&id) {
            Ok(old) => self.update_stored(old, record),
            Err(Error::NotFound) => self.create(record),
            Err(err) => Err(err),
        }
    }

    fn create<T: Record>(&mut self, record: &mut T) -> Result<()> {
        let now = Utc::now();
        record.stamp_created(now);
        record.stamp_updated(now);
        self.save(record, None)?;
        let new = record.clone();
        self.pending
            .push(Box::new(move |db| db.emit::<T>(None, Some(&new))));
        Ok(())
    }

    fn update_stored<T: Record>(&mut self, old: T, record: &mut T) -> Result<()> {
        record.stamp_updated(Utc::now());
        if let Some(created) = old.created_at() {
            record.stamp_created(created);
        }
        self.save(record, Some(&old))?;
        let new = record.clone();
        self.pending
            .push(Box::new(move |db| db.emit::<T>(Some(&old), Some(&new))));
        Ok(())
    }

    /// Serialize and write the primary entry, maintaining index leaves.
    /// Primary row and index rows land in the same substrate
    /// transaction.
    fn save<T: Record>(&mut self, record: &T, old: Option<&T>) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        let TxInner::Write(txn) = &self.inner else {
            return Err(Error::ReadOnly);
        };
        let mut table = txn.open_table(BUCKETS)?;
        if let Some(old) = old {
            deindex_record(&mut table, old)?;
        }
        index_record(&mut table, record)?;
        bucket::put(
            &mut table,
            &[PRIMARY_KEY, T::TYPE_NAME.as_bytes()],
            record.id().as_bytes(),
            &payload,
        )?;
        Ok(())
    }

    /// Load the stored record with `record`'s type and id into `record`.
    pub fn get<T: Record>(&self, record: &mut T) -> Result<()> {
        let loaded = self.load::<T>(record.id())?;
        *record = loaded;
        Ok(())
    }

    /// Delete the stored record with `record`'s type and id.
    ///
    /// Deleting an absent record is [`Error::NotFound`]. The stored
    /// pre-image (not the supplied value) is de-indexed and emitted.
    pub fn del<T: Record>(&mut self, record: &T) -> Result<()> {
        let old = self.load::<T>(record.id())?;
        let TxInner::Write(txn) = &self.inner else {
            return Err(Error::ReadOnly);
        };
        let mut table = txn.open_table(BUCKETS)?;
        deindex_record(&mut table, &old)?;
        bucket::delete(
            &mut table,
            &[PRIMARY_KEY, T::TYPE_NAME.as_bytes()],
            old.id().as_bytes(),
        )?;
        drop(table);
        self.pending
            .push(Box::new(move |db| db.emit::<T>(Some(&old), None)));
        Ok(())
    }

    /// Re-index `record`: the stored value is loaded and de-indexed,
    /// then the supplied value's index leaves are written. The primary
    /// entry is left untouched.
    pub fn index<T: Record>(&mut self, record: &T) -> Result<()> {
        if record.id().is_empty() {
            return Err(SchemaError::MissingId {
                type_name: T::TYPE_NAME,
            }
            .into());
        }
        let old = self.load::<T>(record.id())?;
        let TxInner::Write(txn) = &self.inner else {
            return Err(Error::ReadOnly);
        };
        let mut table = txn.open_table(BUCKETS)?;
        deindex_record(&mut table, &old)?;
        index_record(&mut table, record)?;
        Ok(())
    }

    /// Number of stored records of type `T`. A type never inserted
    /// counts zero.
    pub fn count<T: Record>(&self) -> Result<u64> {
        let path: [&[u8]; 2] = [PRIMARY_KEY, T::TYPE_NAME.as_bytes()];
        match &self.inner {
            TxInner::Read(txn) => match txn.open_table(BUCKETS) {
                Ok(table) => bucket::count(&table, &path),
                Err(TableError::TableDoesNotExist(_)) => Ok(0),
                Err(err) => Err(err.into()),
            },
            TxInner::Write(txn) => {
                let table = txn.open_table(BUCKETS)?;
                bucket::count(&table, &path)
            }
        }
    }

    /// Drop every stored record and index of every type.
    pub fn clear(&mut self) -> Result<()> {
        let TxInner::Write(txn) = &self.inner else {
            return Err(Error::ReadOnly);
        };
        let mut table = txn.open_table(BUCKETS)?;
        bucket::clear(&mut table)
    }

    /// A query over records of type `T`, running inside this
    /// transaction.
    pub fn query<T: Record>(&self) -> Query<'_, T> {
        Query::in_tx(self)
    }

    /// Defer `f` until after this transaction commits. Discarded if the
    /// transaction rolls back.
    pub fn after_transaction(
        &mut self,
        f: impl FnOnce(&Database) -> Result<()> + Send + 'static,
    ) {
        self.pending.push(Box::new(f));
    }

    fn load<T: Record>(&self, id: &Id) -> Result<T> {
        let path: [&[u8]; 2] = [PRIMARY_KEY, T::TYPE_NAME.as_bytes()];
        let payload = match &self.inner {
            TxInner::Read(txn) => match txn.open_table(BUCKETS) {
                Ok(table) => bucket::get(&table, &path, id.as_bytes())?,
                Err(TableError::TableDoesNotExist(_)) => None,
                Err(err) => return Err(err.into()),
            },
            TxInner::Write(txn) => {
                let table = txn.open_table(BUCKETS)?;
                bucket::get(&table, &path, id.as_bytes())?
            }
        };
        match payload {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(Error::NotFound),
        }
    }

    /// Execute a compiled query plan inside this transaction.
    pub(crate) fn run_query<T, F>(&self, spec: &QuerySpec<'_>, f: F) -> Result<()>
    where
        T: Record,
        F: FnMut(T) -> Result<bool>,
    {
        match &self.inner {
            TxInner::Read(txn) => match txn.open_table(BUCKETS) {
                Ok(table) => query::execute::<T, _, _>(&table, spec, f),
                Err(TableError::TableDoesNotExist(_)) => Ok(()),
                Err(err) => Err(err.into()),
            },
            TxInner::Write(txn) => {
                let table = txn.open_table(BUCKETS)?;
                query::execute::<T, _, _>(&table, spec, f)
            }
        }
    }
}

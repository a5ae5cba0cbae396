//! stratadb - an embedded, transactional object store
//!
//! Records are plain serde values implementing [`Record`]. They live in
//! a single persistence file, keyed by type name and a byte-string id,
//! with secondary index leaves maintained for every indexed field.
//! Queries compile `And`/`Or`/`Equals` filter trees into set-operator
//! pipelines over the index streams. Subscriptions deliver post-commit
//! Create/Update/Delete events, filtered by id or by a query predicate,
//! and record hooks allow one mutation to chain update events onto
//! related records.
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use stratadb::{Database, Filter, Id, IndexValue, Record};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct User {
//!     id: Id,
//!     name: String,
//! }
//!
//! impl Record for User {
//!     const TYPE_NAME: &'static str = "user";
//!     fn id(&self) -> &Id { &self.id }
//!     fn id_mut(&mut self) -> &mut Id { &mut self.id }
//!     fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
//!         vec![("name", IndexValue::from(self.name.as_str()))]
//!     }
//! }
//!
//! # fn main() -> stratadb::Result<()> {
//! let db = Database::open("users.strata")?;
//! let mut user = User { name: "hehu".into(), ..Default::default() };
//! db.update(|tx| tx.set(&mut user))?;
//! let found: Vec<User> = db
//!     .query::<User>()
//!     .filter(Filter::equals("name", "hehu"))
//!     .all()?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod errors;
pub mod events;
mod keys;
pub mod query;
pub mod schema;
pub mod setop;
mod store;
pub mod tx;

pub use database::{Database, Options};
pub use errors::{Error, Result, SubstrateError};
pub use events::{Operation, Ops, Subscription, UnsubscribeReason};
pub use query::{Filter, Query};
pub use schema::{Id, IndexValue, IndexedField, Record, SchemaError};
pub use tx::Tx;

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratadb::{Database, Id, IndexValue, IndexedField, Record};
use tempfile::TempDir;

/// The workhorse record: two indexed fields, one unindexed, both
/// timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Id,
    pub name: String,
    pub age: i64,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Person {
    const TYPE_NAME: &'static str = "person";

    fn id(&self) -> &Id {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Id {
        &mut self.id
    }

    fn indexed_fields(&self) -> Vec<IndexedField> {
        vec![
            ("name", IndexValue::from(self.name.as_str())),
            ("age", IndexValue::from(self.age)),
        ]
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn stamp_created(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn stamp_updated(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

pub fn person(name: &str, age: i64) -> Person {
    Person {
        name: name.to_string(),
        age,
        ..Default::default()
    }
}

/// A fresh database in its own scratch directory. Keep the directory
/// alive for as long as the database is used.
pub fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("scratch dir");
    let db = Database::open(dir.path().join("test.strata")).expect("open database");
    (dir, db)
}

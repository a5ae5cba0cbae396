//! Query execution: filter shapes, exclusion, limits, and agreement
//! between index scans and the in-memory predicate.

mod common;

use common::{open_db, person, Person};
use stratadb::Filter;

#[test]
fn test_query_shapes() {
    let (_dir, db) = open_db();

    let mut hehu = person("hehu", 12);
    db.update(|tx| tx.set(&mut hehu)).unwrap();
    let wanted = vec![hehu.clone()];

    let all: Vec<Person> = db.query::<Person>().all().unwrap();
    assert_eq!(all, wanted);

    let by_name: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "hehu"))
        .all()
        .unwrap();
    assert_eq!(by_name, wanted);

    let miss: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "blapp"))
        .all()
        .unwrap();
    assert!(miss.is_empty());

    let by_and: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "hehu"),
            Filter::equals("age", 12i64),
        ]))
        .all()
        .unwrap();
    assert_eq!(by_and, wanted);

    let and_miss: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "blapp"),
            Filter::equals("age", 11i64),
        ]))
        .all()
        .unwrap();
    assert!(and_miss.is_empty());

    let nested: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "hehu"),
            Filter::or([Filter::equals("age", 12i64), Filter::equals("age", 11i64)]),
        ]))
        .all()
        .unwrap();
    assert_eq!(nested, wanted);

    let nested_miss: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "blapp"),
            Filter::or([Filter::equals("age", 11i64), Filter::equals("age", 13i64)]),
        ]))
        .all()
        .unwrap();
    assert!(nested_miss.is_empty());

    let with_except: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "hehu"),
            Filter::or([Filter::equals("age", 12i64), Filter::equals("age", 11i64)]),
        ]))
        .except(Filter::equals("name", "blapp"))
        .all()
        .unwrap();
    assert_eq!(with_except, wanted);

    let excluded: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "hehu"))
        .except(Filter::equals("age", 12i64))
        .all()
        .unwrap();
    assert!(excluded.is_empty());

    let first = db
        .query::<Person>()
        .filter(Filter::and([
            Filter::equals("name", "hehu"),
            Filter::or([Filter::equals("age", 11i64), Filter::equals("age", 12i64)]),
        ]))
        .except(Filter::equals("name", "blapp"))
        .first()
        .unwrap();
    assert_eq!(first, Some(hehu));

    let none = db
        .query::<Person>()
        .filter(Filter::equals("name", "blapp"))
        .first()
        .unwrap();
    assert_eq!(none, None);
}

#[test]
fn test_query_multiple_records() {
    let (_dir, db) = open_db();

    let mut twelve_a = person("a", 12);
    let mut twelve_b = person("b", 12);
    let mut thirteen = person("c", 13);
    db.update(|tx| {
        tx.set(&mut twelve_a)?;
        tx.set(&mut twelve_b)?;
        tx.set(&mut thirteen)
    })
    .unwrap();

    let all: Vec<Person> = db.query::<Person>().all().unwrap();
    assert_eq!(all.len(), 3);

    let twelves: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("age", 12i64))
        .all()
        .unwrap();
    assert_eq!(twelves.len(), 2);
    assert!(twelves.iter().all(|p| p.age == 12));

    let not_b: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("age", 12i64))
        .except(Filter::equals("name", "b"))
        .all()
        .unwrap();
    assert_eq!(not_b.len(), 1);
    assert_eq!(not_b[0].name, "a");
}

#[test]
fn test_limit() {
    let (_dir, db) = open_db();

    for i in 0..5 {
        let mut record = person(&format!("p{}", i), 12);
        db.update(|tx| tx.set(&mut record)).unwrap();
    }

    let capped: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("age", 12i64))
        .limit(3)
        .all()
        .unwrap();
    assert_eq!(capped.len(), 3);

    let uncapped: Vec<Person> = db.query::<Person>().all().unwrap();
    assert_eq!(uncapped.len(), 5);
}

#[test]
fn test_query_inside_transaction_sees_own_writes() {
    let (_dir, db) = open_db();

    db.update(|tx| {
        let mut record = person("inside", 1);
        tx.set(&mut record)?;
        let found: Vec<Person> = tx
            .query::<Person>()
            .filter(Filter::equals("name", "inside"))
            .all()?;
        assert_eq!(found.len(), 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_scan_agrees_with_predicate() {
    let (_dir, db) = open_db();

    let mut records = vec![
        person("hehu", 12),
        person("hehu", 13),
        person("blapp", 12),
        person("blapp", 13),
    ];
    db.update(|tx| {
        for record in &mut records {
            tx.set(record)?;
        }
        Ok(())
    })
    .unwrap();

    let query = db
        .query::<Person>()
        .filter(Filter::equals("name", "hehu"))
        .except(Filter::equals("age", 13i64));
    let results = query.all().unwrap();
    for record in &records {
        let in_results = results.iter().any(|r| r.id == record.id);
        assert_eq!(
            in_results,
            query.matches(record).unwrap(),
            "scan and predicate disagree on {:?}",
            record.name
        );
    }
}

#[test]
fn test_deleted_records_leave_queries() {
    let (_dir, db) = open_db();

    let mut record = person("hehu", 12);
    db.update(|tx| tx.set(&mut record)).unwrap();
    db.update(|tx| tx.del(&record)).unwrap();

    let found: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "hehu"))
        .all()
        .unwrap();
    assert!(found.is_empty());
    let all: Vec<Person> = db.query::<Person>().all().unwrap();
    assert!(all.is_empty());
}

#[test]
fn test_update_moves_index_membership() {
    let (_dir, db) = open_db();

    let mut record = person("before", 1);
    db.update(|tx| tx.set(&mut record)).unwrap();

    record.name = "after".to_string();
    db.update(|tx| tx.set(&mut record)).unwrap();

    let stale: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "before"))
        .all()
        .unwrap();
    assert!(stale.is_empty());

    let fresh: Vec<Person> = db
        .query::<Person>()
        .filter(Filter::equals("name", "after"))
        .all()
        .unwrap();
    assert_eq!(fresh.len(), 1);
}

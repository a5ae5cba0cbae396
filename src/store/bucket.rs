//! Nested bucket navigation
//!
//! The substrate exposes flat ordered tables, so bucket chains live as
//! rows in one table: a bucket or leaf at path `p` is the row keyed by
//! the escaped join of `p`. The first value byte tags the row — `0x00`
//! for a bucket marker, `0x01` followed by the payload for a leaf. Every
//! descendant row of a bucket shares the bucket's key as a prefix, which
//! makes existence checks, counting, pruning and cursors range scans.

use std::ops::Bound;

use redb::{ReadableTable, Table};

use crate::errors::{Error, Result};
use crate::keys;

pub(crate) type KvTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

pub(crate) const BUCKET_TAG: u8 = 0;
pub(crate) const LEAF_TAG: u8 = 1;

/// Upper exclusive bound of a bucket's descendant range.
///
/// Encoded prefixes end with the component terminator `0x00 0x01`;
/// bumping the final byte to `0x02` bounds every extension of the
/// prefix from above.
pub(crate) fn prefix_upper(prefix: &[u8]) -> Vec<u8> {
    let mut upper = prefix.to_vec();
    if let Some(last) = upper.last_mut() {
        *last += 1;
    }
    upper
}

fn row_tag(value: &[u8]) -> Option<u8> {
    value.first().copied()
}

/// Walk the bucket chain along `path`, creating missing buckets.
pub(crate) fn dig(table: &mut KvTable<'_>, path: &[&[u8]]) -> Result<()> {
    for depth in 1..=path.len() {
        let key = keys::join(&path[..depth]);
        let tag = table
            .get(key.as_slice())?
            .map(|guard| row_tag(guard.value()));
        match tag {
            Some(Some(LEAF_TAG)) => {
                return Err(Error::Corrupt(
                    "bucket path collides with an existing leaf".into(),
                ))
            }
            Some(_) => {}
            None => {
                table.insert(key.as_slice(), [BUCKET_TAG].as_slice())?;
            }
        }
    }
    Ok(())
}

/// Whether the bucket at `path` exists.
pub(crate) fn exists<R>(table: &R, path: &[&[u8]]) -> Result<bool>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let key = keys::join(path);
    match table.get(key.as_slice())? {
        Some(guard) => Ok(row_tag(guard.value()) == Some(BUCKET_TAG)),
        None => Ok(false),
    }
}

/// Store a leaf under the bucket at `path`, creating the chain.
pub(crate) fn put(
    table: &mut KvTable<'_>,
    path: &[&[u8]],
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    dig(table, path)?;
    let mut full: Vec<&[u8]> = path.to_vec();
    full.push(key);
    let row = keys::join(&full);
    let mut tagged = Vec::with_capacity(value.len() + 1);
    tagged.push(LEAF_TAG);
    tagged.extend_from_slice(value);
    table.insert(row.as_slice(), tagged.as_slice())?;
    Ok(())
}

/// Load the leaf `key` under the bucket at `path`.
pub(crate) fn get<R>(table: &R, path: &[&[u8]], key: &[u8]) -> Result<Option<Vec<u8>>>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut full: Vec<&[u8]> = path.to_vec();
    full.push(key);
    let row = keys::join(&full);
    match table.get(row.as_slice())? {
        None => Ok(None),
        Some(guard) => match guard.value().split_first() {
            Some((&LEAF_TAG, payload)) => Ok(Some(payload.to_vec())),
            _ => Err(Error::Corrupt("expected a leaf row".into())),
        },
    }
}

/// Delete the leaf `key` under `path`, then prune emptied ancestors.
///
/// Returns whether a leaf was removed.
pub(crate) fn delete(table: &mut KvTable<'_>, path: &[&[u8]], key: &[u8]) -> Result<bool> {
    let mut full: Vec<&[u8]> = path.to_vec();
    full.push(key);
    let row = keys::join(&full);
    let removed = table.remove(row.as_slice())?.is_some();
    prune(table, path)?;
    Ok(removed)
}

/// Remove empty buckets from the deep end of `path` upward, stopping at
/// the first bucket that still has descendants.
pub(crate) fn prune(table: &mut KvTable<'_>, path: &[&[u8]]) -> Result<()> {
    for depth in (1..=path.len()).rev() {
        let prefix = keys::join(&path[..depth]);
        if has_descendants(&*table, &prefix)? {
            break;
        }
        table.remove(prefix.as_slice())?;
    }
    Ok(())
}

fn has_descendants<R>(table: &R, prefix: &[u8]) -> Result<bool>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let upper = prefix_upper(prefix);
    let mut range = table.range::<&[u8]>((
        Bound::Excluded(prefix),
        Bound::Excluded(upper.as_slice()),
    ))?;
    Ok(range.next().transpose()?.is_some())
}

/// Number of descendant rows under the bucket at `path`.
///
/// Under the primary-key bucket of a type every descendant is a record
/// leaf, so this is the record count. An absent chain counts zero.
pub(crate) fn count<R>(table: &R, path: &[&[u8]]) -> Result<u64>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let prefix = keys::join(path);
    let upper = prefix_upper(&prefix);
    let mut total = 0;
    for item in table.range::<&[u8]>((
        Bound::Excluded(prefix.as_slice()),
        Bound::Excluded(upper.as_slice()),
    ))? {
        item?;
        total += 1;
    }
    Ok(total)
}

/// Drop every row: all top-level buckets and everything below them.
pub(crate) fn clear(table: &mut KvTable<'_>) -> Result<()> {
    let rows: Vec<Vec<u8>> = table
        .range::<&[u8]>(..)?
        .map(|item| item.map(|(key, _)| key.value().to_vec()))
        .collect::<Result<_, redb::StorageError>>()?;
    for row in rows {
        table.remove(row.as_slice())?;
    }
    Ok(())
}

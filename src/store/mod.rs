//! # Storage Layout
//!
//! Maps typed records onto the nested-bucket structure carried by the
//! key-value substrate: a primary-key namespace (`pk/<Type>/<Id>` →
//! serialized record) and a secondary-index namespace
//! (`2i/<Type>/<Field>/<EncodedValue>/<Id>` → one zero byte). Index
//! maintenance lives here; the bucket mechanics live in [`bucket`].

pub(crate) mod bucket;
pub(crate) mod skipper;

use redb::TableDefinition;

use crate::errors::Result;
use crate::schema::Record;

/// The single substrate table holding every bucket row.
pub(crate) const BUCKETS: TableDefinition<'static, &'static [u8], &'static [u8]> =
    TableDefinition::new("buckets");

/// Top-level bucket of the primary-key namespace.
pub(crate) const PRIMARY_KEY: &[u8] = b"pk";

/// Top-level bucket of the secondary-index namespace.
pub(crate) const SECONDARY_INDEX: &[u8] = b"2i";

/// Value stored at every index leaf; only the leaf's existence matters.
const INDEX_LEAF: [u8; 1] = [0];

/// Write one index leaf per indexed field of `record`.
pub(crate) fn index_record<T: Record>(
    table: &mut bucket::KvTable<'_>,
    record: &T,
) -> Result<()> {
    let id = record.id().as_bytes();
    for (field, value) in record.indexed_fields() {
        let encoded = value.encode();
        let path: [&[u8]; 4] = [
            SECONDARY_INDEX,
            T::TYPE_NAME.as_bytes(),
            field.as_bytes(),
            &encoded,
        ];
        bucket::put(table, &path, id, &INDEX_LEAF)?;
    }
    Ok(())
}

/// Remove every index leaf of `record`, pruning emptied buckets.
pub(crate) fn deindex_record<T: Record>(
    table: &mut bucket::KvTable<'_>,
    record: &T,
) -> Result<()> {
    let id = record.id().as_bytes();
    for (field, value) in record.indexed_fields() {
        let encoded = value.encode();
        let path: [&[u8]; 4] = [
            SECONDARY_INDEX,
            T::TYPE_NAME.as_bytes(),
            field.as_bytes(),
            &encoded,
        ];
        bucket::delete(table, &path, id)?;
    }
    Ok(())
}

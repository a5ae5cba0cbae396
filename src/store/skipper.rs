//! Bucket cursor → skipper bridge
//!
//! Adapts a bucket's ordered leaf range into the skip-to-or-past stream
//! the set-operator engine consumes. Every skip that has to move
//! re-seeks the substrate range from the requested key, and the last
//! yielded entry is cached to honor the idempotent re-yield contract.
//!
//! Leaf components come back in encoded-row order. That matches raw
//! byte order except when one key is a proper prefix of another whose
//! next byte is zero; the engine only merges fixed-length id streams,
//! where the two orders coincide.

use std::ops::Bound;

use redb::ReadableTable;

use crate::errors::{Error, Result};
use crate::keys;
use crate::setop::{SetEntry, Skipper};

use super::bucket::{prefix_upper, LEAF_TAG};

/// Skipper over the leaves of one bucket.
pub(crate) struct BucketSkipper<'t, R>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    table: &'t R,
    prefix: Vec<u8>,
    upper: Vec<u8>,
    last: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'t, R> BucketSkipper<'t, R>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    pub(crate) fn new(table: &'t R, path: &[&[u8]]) -> Self {
        let prefix = keys::join(path);
        let upper = prefix_upper(&prefix);
        BucketSkipper {
            table,
            prefix,
            upper,
            last: None,
        }
    }

    /// First leaf at or after `lower` within the bucket's row range.
    fn lookup(&self, lower: Bound<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let lower = match lower {
            Bound::Unbounded => Bound::Excluded(self.prefix.as_slice()),
            bound => bound,
        };
        let mut range = self
            .table
            .range::<&[u8]>((lower, Bound::Excluded(self.upper.as_slice())))?;
        match range.next().transpose()? {
            None => Ok(None),
            Some((row, value)) => {
                let components = keys::split(&row.value()[self.prefix.len()..])?;
                let component = match components.as_slice() {
                    [component] => component.clone(),
                    _ => {
                        return Err(Error::Corrupt(
                            "bucket cursor crossed into a nested bucket".into(),
                        ))
                    }
                };
                match value.value().split_first() {
                    Some((&LEAF_TAG, payload)) => Ok(Some((component, payload.to_vec()))),
                    _ => Err(Error::Corrupt("expected a leaf row under cursor".into())),
                }
            }
        }
    }

    fn seek_key(&self, component: &[u8]) -> Vec<u8> {
        let mut row = self.prefix.clone();
        row.extend_from_slice(&keys::escape(component));
        row
    }
}

impl<R> Skipper for BucketSkipper<'_, R>
where
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    fn skip(&mut self, min: Option<&[u8]>, inclusive: bool) -> Result<Option<SetEntry>> {
        let mut entry = match (&self.last, min) {
            (None, None) => self.lookup(Bound::Unbounded)?,
            (Some(last), None) => Some(last.clone()),
            (Some(last), Some(m)) if m <= last.0.as_slice() => Some(last.clone()),
            (_, Some(m)) => {
                let seek = self.seek_key(m);
                self.lookup(Bound::Included(&seek))?
            }
        };
        if !inclusive {
            if let (Some(m), Some(current)) = (min, &entry) {
                if current.0.as_slice() == m {
                    let seek = self.seek_key(m);
                    entry = self.lookup(Bound::Excluded(&seek))?;
                }
            }
        }
        self.last = entry.clone();
        Ok(entry.map(|(key, value)| SetEntry { key, value }))
    }
}

//! # Set Operators
//!
//! Generic union/intersection/difference over sorted key streams. A
//! stream is anything implementing [`Skipper`]; operators are skippers
//! themselves, so expressions nest freely. Merging keeps the first
//! source's value for a given key.

use crate::errors::Result;

/// One entry of a sorted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A sorted stream supporting "advance to or past a key".
///
/// Contract:
/// - no entry yielded yet and `min` is `None` → yield the first entry;
/// - `min` is `None` after a yield, or `min` is at or before the last
///   yielded key → re-yield the last entry;
/// - otherwise seek to `min`; when `inclusive` is false and the landing
///   key equals `min`, step once more;
/// - `None` once the stream is exhausted.
pub trait Skipper {
    fn skip(&mut self, min: Option<&[u8]>, inclusive: bool) -> Result<Option<SetEntry>>;
}

/// A stream with no entries, used where an index bucket is absent.
pub struct EmptySkipper;

impl Skipper for EmptySkipper {
    fn skip(&mut self, _min: Option<&[u8]>, _inclusive: bool) -> Result<Option<SetEntry>> {
        Ok(None)
    }
}

/// Operator kind of a [`SetOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersection,
    Difference,
}

/// A set operator over child streams.
///
/// `Difference` subtracts every later source from the first one.
pub struct SetOp<'a> {
    kind: SetOpKind,
    sources: Vec<Box<dyn Skipper + 'a>>,
}

impl<'a> SetOp<'a> {
    pub fn new(kind: SetOpKind, sources: Vec<Box<dyn Skipper + 'a>>) -> Self {
        SetOp { kind, sources }
    }

    fn skip_union(&mut self, min: Option<&[u8]>, inclusive: bool) -> Result<Option<SetEntry>> {
        let mut best: Option<SetEntry> = None;
        for source in &mut self.sources {
            if let Some(entry) = source.skip(min, inclusive)? {
                match &best {
                    Some(current) if entry.key >= current.key => {}
                    _ => best = Some(entry),
                }
            }
        }
        Ok(best)
    }

    fn skip_intersection(
        &mut self,
        min: Option<&[u8]>,
        inclusive: bool,
    ) -> Result<Option<SetEntry>> {
        if self.sources.is_empty() {
            return Ok(None);
        }
        let mut target: Option<Vec<u8>> = min.map(<[u8]>::to_vec);
        let mut target_inclusive = inclusive;
        loop {
            let (first, rest) = match self.sources.split_first_mut() {
                Some(split) => split,
                None => return Ok(None),
            };
            let candidate = match first.skip(target.as_deref(), target_inclusive)? {
                Some(entry) => entry,
                None => return Ok(None),
            };
            let mut behind = None;
            for source in rest {
                let entry = match source.skip(Some(&candidate.key), true)? {
                    Some(entry) => entry,
                    None => return Ok(None),
                };
                if entry.key > candidate.key {
                    behind = Some(entry.key);
                    break;
                }
            }
            match behind {
                // all sources agree; the value is the first source's
                None => return Ok(Some(candidate)),
                Some(key) => {
                    target = Some(key);
                    target_inclusive = true;
                }
            }
        }
    }

    fn skip_difference(
        &mut self,
        min: Option<&[u8]>,
        inclusive: bool,
    ) -> Result<Option<SetEntry>> {
        if self.sources.is_empty() {
            return Ok(None);
        }
        let mut target: Option<Vec<u8>> = min.map(<[u8]>::to_vec);
        let mut target_inclusive = inclusive;
        loop {
            let (base, subtracted) = match self.sources.split_first_mut() {
                Some(split) => split,
                None => return Ok(None),
            };
            let candidate = match base.skip(target.as_deref(), target_inclusive)? {
                Some(entry) => entry,
                None => return Ok(None),
            };
            let mut excluded = false;
            for source in subtracted {
                if let Some(hit) = source.skip(Some(&candidate.key), true)? {
                    if hit.key == candidate.key {
                        excluded = true;
                        break;
                    }
                }
            }
            if !excluded {
                return Ok(Some(candidate));
            }
            target = Some(candidate.key);
            target_inclusive = false;
        }
    }
}

impl Skipper for SetOp<'_> {
    fn skip(&mut self, min: Option<&[u8]>, inclusive: bool) -> Result<Option<SetEntry>> {
        match self.kind {
            SetOpKind::Union => self.skip_union(min, inclusive),
            SetOpKind::Intersection => self.skip_intersection(min, inclusive),
            SetOpKind::Difference => self.skip_difference(min, inclusive),
        }
    }
}

/// Drive a skipper to exhaustion, applying `f` to every entry in key
/// order. `f` returning `false` stops the iteration.
pub fn for_each<F>(root: &mut dyn Skipper, mut f: F) -> Result<()>
where
    F: FnMut(SetEntry) -> Result<bool>,
{
    let mut last: Option<Vec<u8>> = None;
    loop {
        let entry = match &last {
            None => root.skip(None, true)?,
            Some(key) => root.skip(Some(key), false)?,
        };
        match entry {
            None => return Ok(()),
            Some(entry) => {
                let key = entry.key.clone();
                if !f(entry)? {
                    return Ok(());
                }
                last = Some(key);
            }
        }
    }
}

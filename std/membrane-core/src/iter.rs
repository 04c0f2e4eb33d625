//!
//! Iterator Protocol
//!
//! `Held::iter` creates an iterator object over a str, bytes, tuple, list,
//! dict (its keys) or set. Each `iter_next` step hands the caller one owned
//! element, or `None` once the source is exhausted. Iterators are single
//! pass; a fresh iterator over an unmutated container yields the same
//! sequence again.
//!
//! An iterator reads its source by position. Mutating a list, dict or set
//! while an iterator over it is in progress may skip or repeat elements;
//! it never yields a released element.
//!

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::exception::{KindId, NativeResult};
use crate::raise_fmt;
use crate::runtime::Held;
use crate::value::{Borrowed, IterState, Owned, Payload};

impl<'rt> Held<'rt> {
    /// Create an iterator over `obj`. An iterator is its own iterator.
    pub fn iter<'a>(&self, obj: impl Into<Borrowed<'a>>) -> NativeResult<Owned> {
        let obj = obj.into();
        self.check_owner(obj)?;
        match obj.payload() {
            Payload::Iter(_) => Ok(obj.into_owned()),
            Payload::Str(_)
            | Payload::Bytes(_)
            | Payload::Tuple(_)
            | Payload::List(_)
            | Payload::Dict(_)
            | Payload::Set(_) => self.alloc(Payload::Iter(IterState {
                source: obj.into_owned(),
                position: AtomicUsize::new(0),
            })),
            _ => Err(raise_fmt!(
                self,
                KindId::TYPE_ERROR,
                "'{}' object is not iterable",
                obj.value_type()
            )),
        }
    }

    /// Advance an iterator. `Ok(None)` signals the end of the sequence.
    pub fn iter_next<'a>(&self, iter: impl Into<Borrowed<'a>>) -> NativeResult<Option<Owned>> {
        let iter = iter.into();
        self.check_owner(iter)?;
        let state = match iter.payload() {
            Payload::Iter(state) => state,
            _ => return Err(self.expected("iterator", iter)),
        };

        // The lock serializes every step, so relaxed ordering is enough.
        let position = state.position.load(Ordering::Relaxed);
        let step = match &state.source.object().payload {
            Payload::Str(text) => match text[position.min(text.len())..].chars().next() {
                Some(ch) => Some((self.new_str(ch.to_string())?, ch.len_utf8())),
                None => None,
            },
            Payload::Bytes(bytes) => match bytes.get(position) {
                Some(&byte) => Some((self.new_int(byte)?, 1)),
                None => None,
            },
            Payload::Tuple(items) => items.get(position).map(|item| (item.clone_ref(self), 1)),
            Payload::List(cell) => cell
                .get(self)
                .get(position)
                .map(|item| (item.clone_ref(self), 1)),
            Payload::Dict(cell) => cell
                .get(self)
                .get_index(position)
                .map(|(_, (key, _))| (key.clone_ref(self), 1)),
            Payload::Set(cell) => cell
                .get(self)
                .get_index(position)
                .map(|(_, item)| (item.clone_ref(self), 1)),
            _ => None,
        };

        Ok(step.map(|(item, advance)| {
            state.position.store(position + advance, Ordering::Relaxed);
            item
        }))
    }

    /// Iterate `obj` as a Rust iterator of owned elements.
    pub fn iter_values<'h, 'a>(&'h self, obj: impl Into<Borrowed<'a>>) -> NativeResult<ValueIter<'h, 'rt>> {
        let iter = self.iter(obj)?;
        Ok(ValueIter {
            held: self,
            iter,
            done: false,
        })
    }
}

/// Rust `Iterator` adaptor over a runtime iterator object.
///
/// Yields `Err(Raised)` at most once, then stops.
pub struct ValueIter<'h, 'rt> {
    held: &'h Held<'rt>,
    iter: Owned,
    done: bool,
}

impl ValueIter<'_, '_> {
    /// The underlying iterator object
    pub fn as_object(&self) -> Borrowed<'_> {
        self.iter.borrowed()
    }
}

impl Iterator for ValueIter<'_, '_> {
    type Item = NativeResult<Owned>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.held.iter_next(&self.iter) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(raised) => {
                self.done = true;
                Some(Err(raised))
            }
        }
    }
}

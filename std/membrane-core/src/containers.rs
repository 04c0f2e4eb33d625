//!
//! Container Operations
//!
//! Insert operations take anything `IntoOwned`: an `Owned` is moved into the
//! container, a borrowed view acquires a new reference first. The container
//! never stores a borrowed reference. Overwriting or removing an entry
//! releases the evicted handle before the operation returns.
//!
//! Read operations return `Borrowed` views tied to the `Held` borrow, so no
//! mutation of any container can happen while a view is alive. Call
//! `into_owned` on a view to keep the element past that point.
//!
//! Dict keys and set members must be hashable (see `Payload::hash_key`).
//! Unhashable values raise `LookupError`.
//!

use indexmap::map::Entry;

use crate::exception::{KindId, NativeResult};
use crate::raise_fmt;
use crate::runtime::{Held, LockCell};
use crate::value::{Borrowed, DictEntries, HashKey, IntoOwned, Owned, Payload, SetEntries};

impl Held<'_> {
    fn owned_cell<'a, T>(&self, cell: &'a LockCell<T>, obj: Borrowed<'_>) -> NativeResult<&'a LockCell<T>> {
        if cell.belongs_to(self.runtime_id()) {
            Ok(cell)
        } else {
            Err(self.foreign_object(obj))
        }
    }

    fn list_cell<'a>(&self, obj: Borrowed<'a>) -> NativeResult<&'a LockCell<Vec<Owned>>> {
        match obj.payload() {
            Payload::List(cell) => self.owned_cell(cell, obj),
            _ => Err(self.expected("list", obj)),
        }
    }

    fn dict_cell<'a>(&self, obj: Borrowed<'a>) -> NativeResult<&'a LockCell<DictEntries>> {
        match obj.payload() {
            Payload::Dict(cell) => self.owned_cell(cell, obj),
            _ => Err(self.expected("dict", obj)),
        }
    }

    fn set_cell<'a>(&self, obj: Borrowed<'a>) -> NativeResult<&'a LockCell<SetEntries>> {
        match obj.payload() {
            Payload::Set(cell) => self.owned_cell(cell, obj),
            _ => Err(self.expected("set", obj)),
        }
    }

    /// Hash key of `obj`, raising `LookupError` for unhashable values.
    pub(crate) fn hash_key_of(&self, obj: Borrowed<'_>) -> NativeResult<HashKey> {
        self.check_owner(obj)?;
        match obj.payload().hash_key() {
            Some(key) => Ok(key),
            None => Err(raise_fmt!(self, KindId::LOOKUP_ERROR, "unhashable type: '{}'", obj.value_type())),
        }
    }

    fn adopt(&self, item: impl IntoOwned) -> NativeResult<Owned> {
        let item = item.into_owned();
        self.check_owner(item.borrowed())?;
        Ok(item)
    }

    // ========================================================================
    // Tuple
    // ========================================================================

    pub fn tuple_get<'a>(&self, tuple: impl Into<Borrowed<'a>>, index: usize) -> NativeResult<Borrowed<'a>> {
        let tuple = tuple.into();
        match tuple.payload() {
            Payload::Tuple(items) => match items.get(index) {
                Some(item) => Ok(item.borrowed()),
                None => Err(self.raise_simple(KindId::INDEX_ERROR, "tuple index out of range")),
            },
            _ => Err(self.expected("tuple", tuple)),
        }
    }

    // ========================================================================
    // List
    // ========================================================================

    pub fn list_append<'a>(&mut self, list: impl Into<Borrowed<'a>>, item: impl IntoOwned) -> NativeResult<()> {
        let cell = self.list_cell(list.into())?;
        let item = self.adopt(item)?;
        cell.get_mut(self).push(item);
        Ok(())
    }

    pub fn list_get<'a>(&'a self, list: impl Into<Borrowed<'a>>, index: usize) -> NativeResult<Borrowed<'a>> {
        let cell = self.list_cell(list.into())?;
        match cell.get(self).get(index) {
            Some(item) => Ok(item.borrowed()),
            None => Err(self.raise_simple(KindId::INDEX_ERROR, "list index out of range")),
        }
    }

    /// Replace the element at `index`, releasing the one it evicts.
    pub fn list_set<'a>(
        &mut self,
        list: impl Into<Borrowed<'a>>,
        index: usize,
        item: impl IntoOwned,
    ) -> NativeResult<()> {
        let cell = self.list_cell(list.into())?;
        let item = self.adopt(item)?;
        if index >= cell.get(self).len() {
            return Err(self.raise_simple(KindId::INDEX_ERROR, "list assignment index out of range"));
        }
        let evicted = std::mem::replace(&mut cell.get_mut(self)[index], item);
        drop(evicted);
        Ok(())
    }

    /// Remove and return the last element.
    pub fn list_pop<'a>(&mut self, list: impl Into<Borrowed<'a>>) -> NativeResult<Owned> {
        let cell = self.list_cell(list.into())?;
        let popped = cell.get_mut(self).pop();
        match popped {
            Some(item) => Ok(item),
            None => Err(self.raise_simple(KindId::INDEX_ERROR, "pop from empty list")),
        }
    }

    // ========================================================================
    // Dict
    // ========================================================================

    /// Insert or overwrite `key`. On overwrite the original key object is
    /// kept and the previous value is released.
    pub fn dict_set<'a>(
        &mut self,
        dict: impl Into<Borrowed<'a>>,
        key: impl IntoOwned,
        value: impl IntoOwned,
    ) -> NativeResult<()> {
        let cell = self.dict_cell(dict.into())?;
        let key = self.adopt(key)?;
        let value = self.adopt(value)?;
        let hash = self.hash_key_of(key.borrowed())?;

        match cell.get_mut(self).entry(hash) {
            Entry::Occupied(mut entry) => {
                let evicted = std::mem::replace(&mut entry.get_mut().1, value);
                drop(evicted);
            }
            Entry::Vacant(entry) => {
                entry.insert((key, value));
            }
        }
        Ok(())
    }

    pub fn dict_set_str<'a>(&mut self, dict: impl Into<Borrowed<'a>>, key: &str, value: impl IntoOwned) -> NativeResult<()> {
        let dict = dict.into();
        let key = self.new_str(key)?;
        self.dict_set(dict, key, value)
    }

    /// Value stored under `key`, `None` if absent.
    pub fn dict_get<'a, 'k>(
        &'a self,
        dict: impl Into<Borrowed<'a>>,
        key: impl Into<Borrowed<'k>>,
    ) -> NativeResult<Option<Borrowed<'a>>> {
        let cell = self.dict_cell(dict.into())?;
        let hash = self.hash_key_of(key.into())?;
        Ok(cell.get(self).get(&hash).map(|(_, value)| value.borrowed()))
    }

    pub fn dict_get_str<'a>(&'a self, dict: impl Into<Borrowed<'a>>, key: &str) -> NativeResult<Option<Borrowed<'a>>> {
        let cell = self.dict_cell(dict.into())?;
        let hash = HashKey::Str(key.into());
        Ok(cell.get(self).get(&hash).map(|(_, value)| value.borrowed()))
    }

    /// Remove `key`, releasing both the stored key and value.
    pub fn dict_del<'a, 'k>(&mut self, dict: impl Into<Borrowed<'a>>, key: impl Into<Borrowed<'k>>) -> NativeResult<()> {
        let cell = self.dict_cell(dict.into())?;
        let key = key.into();
        let hash = self.hash_key_of(key)?;
        let removed = cell.get_mut(self).shift_remove(&hash);
        match removed {
            Some(evicted) => {
                drop(evicted);
                Ok(())
            }
            None => {
                let shown = self.repr(key);
                Err(self.raise_simple(KindId::KEY_ERROR, shown))
            }
        }
    }

    /// Walk a dict by position: returns the entry at `*position` and
    /// advances it, or `None` past the end.
    pub fn dict_next<'a>(
        &'a self,
        dict: impl Into<Borrowed<'a>>,
        position: &mut usize,
    ) -> NativeResult<Option<(Borrowed<'a>, Borrowed<'a>)>> {
        let cell = self.dict_cell(dict.into())?;
        let entry = cell.get(self).get_index(*position);
        Ok(entry.map(|(_, (key, value))| {
            *position += 1;
            (key.borrowed(), value.borrowed())
        }))
    }

    // ========================================================================
    // Set
    // ========================================================================

    /// Add `item`; returns false if an equal member was already present.
    pub fn set_add<'a>(&mut self, set: impl Into<Borrowed<'a>>, item: impl IntoOwned) -> NativeResult<bool> {
        let cell = self.set_cell(set.into())?;
        let item = self.adopt(item)?;
        let hash = self.hash_key_of(item.borrowed())?;
        match cell.get_mut(self).entry(hash) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(item);
                Ok(true)
            }
        }
    }

    /// Remove `item` if present; returns whether it was.
    pub fn set_discard<'a, 'k>(&mut self, set: impl Into<Borrowed<'a>>, item: impl Into<Borrowed<'k>>) -> NativeResult<bool> {
        let cell = self.set_cell(set.into())?;
        let hash = self.hash_key_of(item.into())?;
        Ok(cell.get_mut(self).shift_remove(&hash).is_some())
    }

    pub fn set_contains<'a, 'k>(&self, set: impl Into<Borrowed<'a>>, item: impl Into<Borrowed<'k>>) -> NativeResult<bool> {
        let cell = self.set_cell(set.into())?;
        let hash = self.hash_key_of(item.into())?;
        Ok(cell.get(self).contains_key(&hash))
    }

    // ========================================================================
    // Generic
    // ========================================================================

    /// Membership test: element of a list or tuple, key of a dict, member of
    /// a set, substring of a str, byte of bytes.
    pub fn contains<'a, 'k>(&self, container: impl Into<Borrowed<'a>>, item: impl Into<Borrowed<'k>>) -> NativeResult<bool> {
        let (container, item) = (container.into(), item.into());
        match container.payload() {
            Payload::Tuple(items) => self.any_equal(items, item),
            Payload::List(_) => {
                let cell = self.list_cell(container)?;
                self.any_equal(cell.get(self), item)
            }
            Payload::Dict(_) => {
                let cell = self.dict_cell(container)?;
                let hash = self.hash_key_of(item)?;
                Ok(cell.get(self).contains_key(&hash))
            }
            Payload::Set(_) => self.set_contains(container, item),
            Payload::Str(haystack) => match item.payload() {
                Payload::Str(needle) => Ok(haystack.contains(&**needle)),
                _ => Err(self.expected("str", item)),
            },
            Payload::Bytes(haystack) => match item.payload() {
                Payload::Int(byte) => Ok(u8::try_from(*byte).is_ok_and(|b| haystack.contains(&b))),
                _ => Err(self.expected("int", item)),
            },
            _ => Err(raise_fmt!(
                self,
                KindId::TYPE_ERROR,
                "argument of type '{}' is not a container",
                container.value_type()
            )),
        }
    }

    fn any_equal(&self, items: &[Owned], item: Borrowed<'_>) -> NativeResult<bool> {
        for candidate in items {
            if self.equals(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Number of elements; characters for str.
    pub fn len<'a>(&self, obj: impl Into<Borrowed<'a>>) -> NativeResult<usize> {
        let obj = obj.into();
        match obj.payload() {
            Payload::Str(s) => Ok(s.chars().count()),
            Payload::Bytes(b) => Ok(b.len()),
            Payload::Tuple(items) => Ok(items.len()),
            Payload::List(_) => Ok(self.list_cell(obj)?.get(self).len()),
            Payload::Dict(_) => Ok(self.dict_cell(obj)?.get(self).len()),
            Payload::Set(_) => Ok(self.set_cell(obj)?.get(self).len()),
            _ => Err(raise_fmt!(
                self,
                KindId::TYPE_ERROR,
                "object of type '{}' has no len()",
                obj.value_type()
            )),
        }
    }

    /// Snapshot of a list's elements as new owned references
    pub fn list_items<'a>(&self, list: impl Into<Borrowed<'a>>) -> NativeResult<Vec<Owned>> {
        let cell = self.list_cell(list.into())?;
        Ok(cell.get(self).iter().map(|item| item.clone_ref(self)).collect())
    }
}

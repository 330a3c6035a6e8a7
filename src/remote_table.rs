//! A [`ToggleMap`] backed by a remote key-value table.
//!
//! There is a one-to-one correspondence between toggles and items in the table. Items carry the
//! toggle key in the [`KEY_ATTRIBUTE`] attribute and otherwise follow the [`ToggleRecord`]
//! shape (`toggle_value` is accepted in place of `value`).
//!
//! The table is consulted on every lookup, which usually means a network call. Wrap a
//! `RemoteTableToggleMap` in a [`CachingToggleMap`](crate::CachingToggleMap) to limit how often
//! the table is queried.
use std::{collections::HashSet, marker::PhantomData};

use serde::Deserialize;
use serde_json::Value;

use crate::{document::node, Error, Result, Toggle, ToggleMap, ToggleRecord};

/// Attribute holding the toggle key in table items.
pub const KEY_ATTRIBUTE: &str = "toggle_key";

/// Access to a remote keyed table. Timeouts and retries are the implementation's concern.
pub trait RemoteTable: Send + Sync {
    /// Fetch the item whose `key_attribute` equals `key`, as JSON text. `Ok(None)` signals
    /// absence.
    ///
    /// Network or service failures should be reported as [`Error::SourceUnavailable`].
    fn get_item(&self, key_attribute: &str, key: &str) -> Result<Option<String>>;

    /// Scan the whole table, returning items that carry only the `projection` attribute.
    fn scan(&self, projection: &str) -> Result<Vec<Value>>;
}

impl<R: RemoteTable + ?Sized> RemoteTable for std::sync::Arc<R> {
    fn get_item(&self, key_attribute: &str, key: &str) -> Result<Option<String>> {
        (**self).get_item(key_attribute, key)
    }

    fn scan(&self, projection: &str) -> Result<Vec<Value>> {
        (**self).scan(projection)
    }
}

/// A [`ToggleMap`] over a [`RemoteTable`].
pub struct RemoteTableToggleMap<R, T> {
    table: R,
    _input: PhantomData<fn(&T)>,
}

impl<R: RemoteTable, T> RemoteTableToggleMap<R, T> {
    /// Create a toggle map over `table`.
    pub fn new(table: R) -> RemoteTableToggleMap<R, T> {
        RemoteTableToggleMap {
            table,
            _input: PhantomData,
        }
    }

    /// The underlying table.
    pub fn table(&self) -> &R {
        &self.table
    }
}

impl<R: RemoteTable, T> ToggleMap<T> for RemoteTableToggleMap<R, T> {
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        let Some(item) = self.table.get_item(KEY_ATTRIBUTE, key)? else {
            log::debug!(target: "toggle", key; "toggle item not found in table");
            return Err(Error::not_found(key));
        };

        let Some(node) = node::from_str(&item) else {
            log::warn!(target: "toggle", key; "toggle item is not valid JSON");
            return Err(Error::not_found(key));
        };

        let record = ToggleRecord::deserialize(&node).map_err(|err| {
            log::warn!(target: "toggle", key; "toggle item is malformed: {:?}", err);
            Error::not_found(key)
        })?;

        Ok(Toggle::from_record(record))
    }

    fn keys(&self) -> Result<HashSet<String>> {
        let items = self.table.scan(KEY_ATTRIBUTE)?;
        Ok(items
            .iter()
            .filter_map(|item| item.get(KEY_ATTRIBUTE).and_then(Value::as_str))
            .map(str::to_owned)
            .collect())
    }
}

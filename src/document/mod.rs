//! A [`ToggleMap`] backed by a YAML or JSON toggle document.
//!
//! The document is an array of [`ToggleRecord`]s. It is re-read on every lookup, so toggle
//! complexity is `O(n)` for a document with `n` toggles. Wrap a `DocumentToggleMap` in a
//! [`CachingToggleMap`](crate::CachingToggleMap) to limit how often the document is consulted.
use std::{
    collections::HashSet,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result, Toggle, ToggleMap, ToggleRecord};

pub mod node;

type DocumentSource = dyn Fn() -> Vec<Value> + Send + Sync;

/// A [`ToggleMap`] over a document that is supplied fresh on every call.
pub struct DocumentToggleMap<T> {
    source: Arc<DocumentSource>,
    _input: PhantomData<fn(&T)>,
}

impl<T> DocumentToggleMap<T> {
    /// Create a map over the records produced by `source`.
    ///
    /// `source` is called on every lookup. It should return an empty sequence rather than fail
    /// when the document cannot be produced.
    pub fn new<F>(source: F) -> DocumentToggleMap<T>
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        DocumentToggleMap {
            source: Arc::new(source),
            _input: PhantomData,
        }
    }

    /// Create a map over a toggle specification file in YAML or JSON format.
    ///
    /// The file is re-read on every lookup. A missing or malformed file behaves as an empty
    /// document.
    ///
    /// ```no_run
    /// # use toggle::{DocumentToggleMap, ToggleMap};
    /// let toggles = DocumentToggleMap::<u64>::from_path("/etc/toggles.yml");
    /// let enabled = toggles
    ///     .resolve("/feature/new_checkout")
    ///     .map(|toggle| toggle.evaluate(&42))
    ///     .unwrap_or(false);
    /// ```
    pub fn from_path(path: impl Into<PathBuf>) -> DocumentToggleMap<T> {
        let path = path.into();
        DocumentToggleMap::new(move || {
            load_path(&path).unwrap_or_else(|err| {
                log::warn!(target: "toggle",
                           path:display = path.display();
                           "unable to load toggle document, treating it as empty: {:?}", err);
                Vec::new()
            })
        })
    }

    /// Create a map over a fixed set of record nodes.
    pub fn from_nodes(nodes: Vec<Value>) -> DocumentToggleMap<T> {
        DocumentToggleMap::new(move || nodes.clone())
    }
}

/// Read and decode the toggle document at `path`.
pub fn load_path(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    node::parse_document(&text)
}

impl<T> ToggleMap<T> for DocumentToggleMap<T> {
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        let nodes = (self.source)();

        let Some(node) = node::find_by_key(&nodes, key) else {
            log::debug!(target: "toggle", key, records = nodes.len(); "toggle key not found in document");
            return Err(Error::not_found(key));
        };

        let record = ToggleRecord::deserialize(node).map_err(|err| {
            log::warn!(target: "toggle", key; "toggle record is malformed: {:?}", err);
            Error::not_found(key)
        })?;

        Ok(Toggle::from_record(record))
    }

    fn keys(&self) -> Result<HashSet<String>> {
        Ok((self.source)()
            .iter()
            .filter_map(node::key_of)
            .map(str::to_owned)
            .collect())
    }
}

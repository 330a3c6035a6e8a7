use std::{collections::HashSet, sync::Arc};

use crate::{Result, Toggle};

/// A lookup from canonical toggle keys (feature names or paths) to [`Toggle`]s.
///
/// Implementations report a missing record as [`Error::ToggleNotFound`](crate::Error) and
/// source failures as one of the other lookup failures (see
/// [`Error::is_lookup_failure`](crate::Error::is_lookup_failure)). They never return a partially
/// valid toggle.
pub trait ToggleMap<T> {
    /// Look up the toggle for `key`.
    fn resolve(&self, key: &str) -> Result<Toggle<T>>;

    /// Keys currently known to the map.
    fn keys(&self) -> Result<HashSet<String>>;
}

impl<T, M: ToggleMap<T> + ?Sized> ToggleMap<T> for &M {
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        (**self).resolve(key)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        (**self).keys()
    }
}

impl<T, M: ToggleMap<T> + ?Sized> ToggleMap<T> for Box<M> {
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        (**self).resolve(key)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        (**self).keys()
    }
}

impl<T, M: ToggleMap<T> + ?Sized> ToggleMap<T> for Arc<M> {
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        (**self).resolve(key)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        (**self).keys()
    }
}

//! Feature toggles with weighted rollouts, cohort targeting, and cached lookups.
//!
//! # Overview
//!
//! A [`Toggle`] decides whether a feature is enabled for a given input. Toggles backed by a
//! [`ToggleRecord`] are probabilistic: each evaluation draws independently and succeeds with
//! probability `weight / 10000`. Records may carry cohort [`Filter`]s that substitute a different
//! weight when the toggle is evaluated on behalf of a matching cohort.
//!
//! Toggles are looked up by key through the [`ToggleMap`] trait. The crate provides:
//!
//! - [`DocumentToggleMap`], reading a YAML or JSON toggle document;
//! - [`RemoteTableToggleMap`], querying a remote keyed table through a [`RemoteTable`];
//! - [`CachingToggleMap`], a decorator adding a bounded cache and falling back to the last known
//!   good toggle when its underlying map fails.
//!
//! ```
//! # use serde_json::json;
//! use toggle::{CachingToggleMap, DocumentToggleMap, ToggleMap};
//!
//! let document = DocumentToggleMap::<String>::from_nodes(vec![
//!     json!({"key": "/feature/new_checkout", "value": 10000}),
//! ]);
//! let toggles = CachingToggleMap::new(document, "maximumSize=100")?;
//!
//! let new_checkout = toggles.resolve("/feature/new_checkout")?;
//! assert!(new_checkout.evaluate(&"user-42".to_owned()));
//! # Ok::<(), toggle::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Plain toggle maps report missing or unreadable toggles as errors. [`CachingToggleMap`] absorbs
//! those and answers with a fallback toggle, so that a flaky source never turns a feature check
//! into a failure. The remaining errors usually indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with the `toggle` target.
//! Consider integrating a `log`-compatible logger implementation for better visibility into
//! lookups, fallbacks, and refreshes.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod cache;
mod caching;
pub mod document;
mod error;
mod record;
pub mod remote_table;
mod toggle;
mod toggle_map;

pub use cache::CacheSpec;
pub use caching::CachingToggleMap;
pub use document::DocumentToggleMap;
pub use error::{Error, Result};
pub use record::{Filter, ToggleRecord, TryParse, Weight, WeightOutOfRange};
pub use remote_table::{RemoteTable, RemoteTableToggleMap};
pub use toggle::Toggle;
pub use toggle_map::ToggleMap;

//! Helpers over the generic document tree ([`serde_json::Value`]) that toggle documents are
//! decoded into.
use std::borrow::Borrow;

use serde_json::Value;

use crate::Result;

/// Field holding the toggle key in a document record.
pub const KEY_FIELD: &str = "key";
/// Alternative key field used by remote table items.
pub const TABLE_KEY_FIELD: &str = "toggle_key";

/// Decode a YAML or JSON toggle document into its records.
///
/// A document whose top level is not an array holds no records.
pub fn parse_document(text: &str) -> Result<Vec<Value>> {
    match serde_yaml::from_str::<Value>(text)? {
        Value::Array(nodes) => Ok(nodes),
        other => {
            log::warn!(target: "toggle", kind = kind_of(&other); "toggle document is not an array of records");
            Ok(Vec::new())
        }
    }
}

/// Parse a JSON string, returning `None` if it is malformed.
pub fn from_str(json: &str) -> Option<Value> {
    serde_json::from_str(json).ok()
}

/// Key of a record node, if it has a string key field.
pub fn key_of(node: &Value) -> Option<&str> {
    node.get(KEY_FIELD)
        .or_else(|| node.get(TABLE_KEY_FIELD))
        .and_then(Value::as_str)
}

/// First node in `nodes` whose key equals `key`.
pub fn find_by_key<I>(nodes: I, key: &str) -> Option<I::Item>
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
{
    nodes
        .into_iter()
        .find(|node| key_of(Borrow::<Value>::borrow(node)) == Some(key))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

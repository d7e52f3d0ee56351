//! Two-level merge of push payloads into a cached snapshot
//!
//! Top-level keys of the payload overwrite the snapshot, except when both
//! sides hold a mapping under the same key: then the cached mapping is
//! copied and updated field by field. Nothing deeper is merged; nested
//! mappings inside a level-two value replace outright.

use crate::api::Snapshot;
use serde_json::Value;

pub fn merge_two_level(old: &Snapshot, data: &Snapshot) -> Snapshot {
    let mut merged = old.clone();
    for (key, value) in data {
        let combined = match (value, old.get(key)) {
            (Value::Object(incoming), Some(Value::Object(existing))) => {
                let mut nested = existing.clone();
                for (k, v) in incoming {
                    nested.insert(k.clone(), v.clone());
                }
                Value::Object(nested)
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

#![no_main]
use evlink::api::Snapshot;
use evlink::entities::{VEHICLE_FIELDS, all_entities, resolve_path};
use evlink::merge::merge_two_level;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    // First half is the cached snapshot, second half the push payload
    let (left, right) = data.split_at(data.len() / 2);
    let parse = |bytes: &[u8]| match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        _ => Snapshot::new(),
    };
    let old = parse(left);
    let payload = parse(right);

    let merged = merge_two_level(&old, &payload);
    for key in payload.keys() {
        assert!(merged.contains_key(key));
    }
    for field in VEHICLE_FIELDS {
        let _ = resolve_path(&merged, field.path);
    }
    let _ = all_entities("fuzz", Some(&old), Some(&merged));
});

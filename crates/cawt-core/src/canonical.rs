//! Canonical JSON — the hash input for every signature in the system.
//!
//! One primitive, reused for terms hashes, verdict bundles, ballot hashes,
//! payload hashes and webhook signing: object keys sorted lexicographically at
//! every depth, no whitespace, values emitted verbatim. Nothing is dropped
//! here; the OCP terms canonicaliser strips nulls *before* calling this.

use serde_json::Value;

/// Serialise `value` canonically: recursively sorted keys, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json escaping into an in-memory buffer cannot fail.
            out.push_str(&serde_json::to_string(s).expect("string serialisation is infallible"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serialisation is infallible"));
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

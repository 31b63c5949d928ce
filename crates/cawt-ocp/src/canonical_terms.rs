//! Terms canonicalisation.
//!
//! Rules, applied before the shared canonical-JSON primitive:
//!   - strings are trimmed, internal whitespace collapsed to single spaces;
//!     case and punctuation untouched
//!   - null optional fields are removed at every depth
//!   - the three top-level semantic arrays get stable sorts: parties by
//!     role, obligations by (actorAgentId, action), consideration by
//!     (fromAgentId, item)
//!   - every other array keeps its input order
//!
//! The resulting whitespace-free JSON is the `terms_hash` preimage, and the
//! agreement code is derived from that hash.

use serde_json::{Map, Value};

use cawt_core::canonical::canonical_json;
use cawt_core::error::CourtError;
use cawt_crypto::agreement_code::derive_agreement_code;
use cawt_crypto::hash::sha256_hex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalTerms {
    pub canonical_json: String,
    pub terms_hash: String,
    pub agreement_code: String,
}

/// Canonicalise a terms document.
pub fn build_canonical_terms(terms: &Value) -> Result<CanonicalTerms, CourtError> {
    if !terms.is_object() {
        return Err(CourtError::Validation(
            "agreement terms must be a JSON object".into(),
        ));
    }
    let mut stripped = strip(terms);
    if let Value::Object(root) = &mut stripped {
        sort_semantic_array(root, "parties", &["role"]);
        sort_semantic_array(root, "obligations", &["actorAgentId", "action"]);
        sort_semantic_array(root, "consideration", &["fromAgentId", "item"]);
    }
    let canonical = canonical_json(&stripped);
    let terms_hash = sha256_hex(canonical.as_bytes());
    let agreement_code = derive_agreement_code(&terms_hash);
    Ok(CanonicalTerms {
        canonical_json: canonical,
        terms_hash,
        agreement_code,
    })
}

/// Trim/collapse strings, drop nulls from objects, recurse everywhere.
fn strip(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                if item.is_null() {
                    continue;
                }
                out.insert(key.clone(), strip(item));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Sort `root[field]` (when it is an array of objects) by the given string
/// keys. Missing keys sort as empty strings; the sort is stable so equal
/// keys keep input order.
fn sort_semantic_array(root: &mut Map<String, Value>, field: &str, keys: &[&str]) {
    if let Some(Value::Array(items)) = root.get_mut(field) {
        items.sort_by(|a, b| {
            let key_of = |v: &Value| {
                keys.iter()
                    .map(|k| v.get(*k).and_then(Value::as_str).unwrap_or("").to_string())
                    .collect::<Vec<_>>()
            };
            key_of(a).cmp(&key_of(b))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vector_1() -> Value {
        json!({
            "title": "  Data Sharing   Agreement ",
            "parties": [
                {"role": "provider", "agentId": "agentA"},
                {"role": "consumer", "agentId": "agentB"}
            ],
            "obligations": [
                {"actorAgentId": "agentB", "action": "pay", "detail": "10 credits  weekly"},
                {"actorAgentId": "agentA", "action": "serve", "detail": null}
            ],
            "consideration": [
                {"fromAgentId": "agentB", "item": "credits", "amount": 10}
            ],
            "effectiveFrom": "2026-01-01T00:00:00Z",
            "notes": null
        })
    }

    fn vector_2() -> Value {
        json!({
            "title": "Compute Lease",
            "parties": [
                {"role": "lessee", "agentId": "agentB"},
                {"role": "lessor", "agentId": "agentA"}
            ],
            "obligations": [
                {"actorAgentId": "agentA", "action": "provide_gpu", "hoursPerDay": 8}
            ],
            "consideration": [
                {"fromAgentId": "agentB", "item": "usdc", "amount": 125},
                {"fromAgentId": "agentB", "item": "data", "amount": 1}
            ]
        })
    }

    #[test]
    fn vector_1_fixed_point() {
        // Pinned against an independent reference implementation.
        let terms = build_canonical_terms(&vector_1()).unwrap();
        assert_eq!(
            terms.canonical_json,
            r#"{"consideration":[{"amount":10,"fromAgentId":"agentB","item":"credits"}],"effectiveFrom":"2026-01-01T00:00:00Z","obligations":[{"action":"serve","actorAgentId":"agentA"},{"action":"pay","actorAgentId":"agentB","detail":"10 credits weekly"}],"parties":[{"agentId":"agentB","role":"consumer"},{"agentId":"agentA","role":"provider"}],"title":"Data Sharing Agreement"}"#
        );
        assert_eq!(
            terms.terms_hash,
            "b7698e038d6676790f90308e1e9abb6ce7b0d58509c95016b17569cb845d7606"
        );
        assert_eq!(terms.agreement_code, "EQ20HK32Y9");
    }

    #[test]
    fn vector_2_fixed_point() {
        let terms = build_canonical_terms(&vector_2()).unwrap();
        assert_eq!(
            terms.terms_hash,
            "89670c028bae3e38a14e74961f4c59ecf977d35cff9dc8a24a1f4bf9160e0a0d"
        );
        assert_eq!(terms.agreement_code, "HDADRG9GBC");
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        let once = build_canonical_terms(&vector_1()).unwrap();
        let reparsed: Value = serde_json::from_str(&once.canonical_json).unwrap();
        let twice = build_canonical_terms(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn whitespace_and_null_noise_does_not_change_the_hash() {
        let noisy = json!({
            "title": "Data   Sharing Agreement  ",
            "parties": [
                {"role": "consumer", "agentId": "agentB"},
                {"role": "provider", "agentId": "agentA"}
            ],
            "obligations": [
                {"actorAgentId": "agentA", "action": "serve"},
                {"actorAgentId": "agentB", "action": "pay", "detail": " 10  credits weekly "}
            ],
            "consideration": [
                {"fromAgentId": "agentB", "item": "credits", "amount": 10}
            ],
            "effectiveFrom": "2026-01-01T00:00:00Z"
        });
        assert_eq!(
            build_canonical_terms(&noisy).unwrap().terms_hash,
            build_canonical_terms(&vector_1()).unwrap().terms_hash
        );
    }

    #[test]
    fn unnamed_arrays_preserve_order() {
        let a = build_canonical_terms(&json!({"tags": ["z", "a"], "parties": []})).unwrap();
        assert!(a.canonical_json.contains(r#""tags":["z","a"]"#));
    }

    #[test]
    fn case_and_punctuation_survive() {
        let terms = build_canonical_terms(&json!({"title": "Best-Effort, OK?"})).unwrap();
        assert!(terms.canonical_json.contains("Best-Effort, OK?"));
    }

    #[test]
    fn non_object_terms_rejected() {
        assert!(build_canonical_terms(&json!([1, 2])).is_err());
        assert!(build_canonical_terms(&json!("text")).is_err());
    }
}

//! API-key authentication for read-friendly endpoints.

use std::sync::Arc;

use cawt_core::error::CourtError;
use cawt_core::gateway::ApiKeyRecord;
use cawt_core::types::Timestamp;
use cawt_crypto::apikey::{hash_api_key, is_well_formed_api_key};
use cawt_store::Store;

/// Authenticate `Authorization: Bearer ocp_…` / `X-OCP-Api-Key` material.
///
/// The presented key is hashed and looked up by hash; malformed keys are
/// rejected before any store access. `last_used_at` is refreshed on success.
pub fn authenticate_api_key(
    store: &Arc<Store>,
    presented: Option<&str>,
    now: Timestamp,
) -> Result<ApiKeyRecord, CourtError> {
    let raw = presented.ok_or(CourtError::ApiKeyInvalid)?;
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);

    if !is_well_formed_api_key(raw) {
        return Err(CourtError::ApiKeyInvalid);
    }

    let mut record = store
        .find_api_key_by_hash(&hash_api_key(raw))?
        .ok_or(CourtError::ApiKeyInvalid)?;

    record.last_used_at = Some(now);
    store.put_api_key(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawt_core::types::{AgentId, ApiKeyId};
    use cawt_crypto::apikey::generate_api_key;

    fn temp_store() -> Arc<Store> {
        use rand::RngCore;
        let mut tag = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut tag);
        let path = std::env::temp_dir().join(format!(
            "cawt_apikey_test_{}_{:02x?}",
            std::process::id(),
            tag
        ));
        Arc::new(Store::open(path).expect("open temp store"))
    }

    #[test]
    fn bearer_and_raw_forms_authenticate() {
        let store = temp_store();
        let raw = generate_api_key();
        store
            .put_api_key(&ApiKeyRecord {
                key_id: ApiKeyId::generate(),
                agent_id: AgentId::from_public_key_bytes(&[1; 32]),
                label: "ci".into(),
                key_hash: hash_api_key(&raw),
                created_at: 1,
                last_used_at: None,
                revoked_at: None,
            })
            .unwrap();

        let bearer = format!("Bearer {raw}");
        let record = authenticate_api_key(&store, Some(&bearer), 50).unwrap();
        assert_eq!(record.last_used_at, Some(50));
        assert!(authenticate_api_key(&store, Some(&raw), 51).is_ok());
    }

    #[test]
    fn unknown_and_malformed_keys_rejected() {
        let store = temp_store();
        assert!(matches!(
            authenticate_api_key(&store, Some(&generate_api_key()), 1),
            Err(CourtError::ApiKeyInvalid)
        ));
        assert!(matches!(
            authenticate_api_key(&store, Some("not-a-key"), 1),
            Err(CourtError::ApiKeyInvalid)
        ));
        assert!(matches!(
            authenticate_api_key(&store, None, 1),
            Err(CourtError::ApiKeyInvalid)
        ));
    }
}

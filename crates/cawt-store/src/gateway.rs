//! Gateway repository operations: nonce consumption, idempotency claims,
//! treasury-tx replay prevention, API keys, webhook delivery audit.

use cawt_core::error::CourtError;
use cawt_core::gateway::{
    ApiKeyRecord, IdempotencyRecord, IdempotencyState, NonceRecord, WebhookDeliveryAttempt,
};
use cawt_core::types::{AgentId, ApiKeyId, Timestamp};

use crate::db::{codec_err, join_key, storage_err, Store};

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CourtError> {
    bincode::deserialize(bytes).map_err(codec_err)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CourtError> {
    bincode::serialize(value).map_err(codec_err)
}

impl Store {
    // ── Nonces ───────────────────────────────────────────────────────────────

    /// Consume (agent, nonce). A live record blocks the replay; an expired
    /// record is overwritten so the nonce becomes reusable after the window.
    pub fn consume_nonce(
        &self,
        agent: &AgentId,
        nonce: &str,
        now: Timestamp,
        ttl: i64,
    ) -> Result<(), CourtError> {
        let key = join_key(&[agent.as_str(), nonce]);
        let fresh = NonceRecord {
            agent_id: agent.clone(),
            nonce: nonce.to_string(),
            expires_at: now + ttl,
        };
        loop {
            let existing = self.nonces.get(&key).map_err(storage_err)?;
            if let Some(bytes) = &existing {
                let record: NonceRecord = decode(bytes)?;
                if record.expires_at > now {
                    return Err(CourtError::NonceReused);
                }
            }
            let swap = self
                .nonces
                .compare_and_swap(&key, existing, Some(encode(&fresh)?))
                .map_err(storage_err)?;
            match swap {
                Ok(()) => return Ok(()),
                // Someone consumed it between the read and the swap.
                Err(_) => continue,
            }
        }
    }

    /// Drop expired nonce rows. Called opportunistically from the tick.
    pub fn prune_nonces(&self, now: Timestamp) -> Result<usize, CourtError> {
        let mut pruned = 0;
        for item in self.nonces.iter() {
            let (key, bytes) = item.map_err(storage_err)?;
            let record: NonceRecord = decode(&bytes)?;
            if record.expires_at <= now {
                self.nonces.remove(key).map_err(storage_err)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    // ── Idempotency ──────────────────────────────────────────────────────────

    fn idem_key(agent: &AgentId, method: &str, path: &str, key: &str) -> Vec<u8> {
        join_key(&[agent.as_str(), method, path, key])
    }

    /// Claim an idempotency tuple before running the handler.
    ///
    /// Returns `Ok(None)` when this caller owns the claim, `Ok(Some(record))`
    /// when a completed record with the same request hash should be replayed,
    /// and `IDEMPOTENCY_CONFLICT` when the key is reused with a different
    /// body (or the first attempt is still in flight).
    pub fn claim_idempotency(
        &self,
        agent: &AgentId,
        method: &str,
        path: &str,
        key: &str,
        request_hash: &str,
        now: Timestamp,
        ttl: i64,
    ) -> Result<Option<IdempotencyRecord>, CourtError> {
        let tree_key = Self::idem_key(agent, method, path, key);
        let fresh = IdempotencyRecord {
            agent_id: agent.clone(),
            method: method.to_string(),
            path: path.to_string(),
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            state: IdempotencyState::Claimed,
            response_status: None,
            response_json: None,
            created_at: now,
        };
        loop {
            let existing = self.nonempty(&self.idempotency, &tree_key)?;
            if let Some((_, record)) = &existing {
                if record.created_at + ttl > now {
                    if record.request_hash != request_hash {
                        return Err(CourtError::IdempotencyConflict);
                    }
                    return match record.state {
                        IdempotencyState::Completed => Ok(Some(record.clone())),
                        // First attempt still running; a retry this early is a
                        // conflict rather than a duplicate execution.
                        IdempotencyState::Claimed => Err(CourtError::IdempotencyConflict),
                    };
                }
                // Expired record; fall through and overwrite it.
            }
            let old = existing.map(|(b, _)| b);
            let swap = self
                .idempotency
                .compare_and_swap(&tree_key, old, Some(encode(&fresh)?))
                .map_err(storage_err)?;
            match swap {
                Ok(()) => return Ok(None),
                Err(_) => continue,
            }
        }
    }

    /// Store the handler outcome for future replays.
    pub fn complete_idempotency(
        &self,
        agent: &AgentId,
        method: &str,
        path: &str,
        key: &str,
        status: u16,
        response_json: &str,
    ) -> Result<(), CourtError> {
        let tree_key = Self::idem_key(agent, method, path, key);
        if let Some((_, mut record)) = self.nonempty(&self.idempotency, &tree_key)? {
            record.state = IdempotencyState::Completed;
            record.response_status = Some(status);
            record.response_json = Some(response_json.to_string());
            self.idempotency
                .insert(tree_key, encode(&record)?)
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Drop the claim after a handler error so a genuine retry can proceed.
    pub fn release_idempotency(
        &self,
        agent: &AgentId,
        method: &str,
        path: &str,
        key: &str,
    ) -> Result<(), CourtError> {
        let tree_key = Self::idem_key(agent, method, path, key);
        if let Some((_, record)) = self.nonempty(&self.idempotency, &tree_key)? {
            if record.state == IdempotencyState::Claimed {
                self.idempotency.remove(tree_key).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    fn nonempty(
        &self,
        tree: &sled::Tree,
        key: &[u8],
    ) -> Result<Option<(sled::IVec, IdempotencyRecord)>, CourtError> {
        match tree.get(key).map_err(storage_err)? {
            Some(bytes) => {
                let record = decode(&bytes)?;
                Ok(Some((bytes, record)))
            }
            None => Ok(None),
        }
    }

    // ── Treasury tx replay prevention ────────────────────────────────────────

    /// Consume a treasury payment signature exactly once.
    pub fn consume_treasury_tx(&self, tx_sig: &str) -> Result<(), CourtError> {
        let swap = self
            .used_treasury
            .compare_and_swap(tx_sig.as_bytes(), None::<&[u8]>, Some(&[][..]))
            .map_err(storage_err)?;
        swap.map_err(|_| CourtError::TreasuryTxReplayed(tx_sig.to_string()))
    }

    // ── API keys ─────────────────────────────────────────────────────────────

    pub fn put_api_key(&self, record: &ApiKeyRecord) -> Result<(), CourtError> {
        self.api_keys
            .insert(record.key_id.as_str().as_bytes(), encode(record)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_api_key(&self, id: &ApiKeyId) -> Result<Option<ApiKeyRecord>, CourtError> {
        match self.api_keys.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Hash-indexed lookup for presentation-time auth.
    pub fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, CourtError> {
        for item in self.api_keys.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let record: ApiKeyRecord = decode(&bytes)?;
            if record.key_hash == key_hash && record.is_usable() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn api_keys_for_agent(&self, agent: &AgentId) -> Result<Vec<ApiKeyRecord>, CourtError> {
        let mut out = Vec::new();
        for item in self.api_keys.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let record: ApiKeyRecord = decode(&bytes)?;
            if record.agent_id == *agent {
                out.push(record);
            }
        }
        Ok(out)
    }

    // ── Webhook audit ────────────────────────────────────────────────────────

    pub fn log_webhook_attempt(&self, attempt: &WebhookDeliveryAttempt) -> Result<(), CourtError> {
        let mut key = attempt.event_id.as_str().as_bytes().to_vec();
        key.push(crate::db::SEP);
        key.extend_from_slice(&attempt.attempt.to_be_bytes());
        self.webhook_log
            .insert(key, encode(attempt)?)
            .map_err(storage_err)?;
        Ok(())
    }
}

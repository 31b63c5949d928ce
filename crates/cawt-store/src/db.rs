//! Persistent repository backed by sled (pure-Rust, no C dependencies).
//!
//! Named trees, one per entity family:
//!   agents            — agent_id utf8           → bincode(Agent)
//!   cases             — case_id utf8            → bincode(Case)
//!   claims            — case|claim              → bincode(Claim)
//!   evidence          — case|evidence           → bincode(Evidence)
//!   submissions       — case|side|phase         → bincode(Submission)
//!   ballots           — case|juror              → bincode(Ballot)
//!   panel             — case|juror              → bincode(JuryPanelMember)
//!   selection_runs    — case|seq be8            → bincode(JurySelectionRun)
//!   transcript        — case|seq be8            → bincode(TranscriptEvent)
//!   seal_jobs         — job_id utf8             → bincode(SealJob)
//!   seal_jobs_by_case — case_id utf8            → job_id utf8
//!   idempotency       — agent|method|path|key   → bincode(IdempotencyRecord)
//!   nonces            — agent|nonce             → bincode(NonceRecord)
//!   used_treasury     — tx sig utf8             → [] (membership set)
//!   agreements        — proposal_id utf8        → bincode(CanonicalAgreement)
//!   agreements_by_code— code utf8               → proposal_id utf8
//!   agreement_terms   — partyA|partyB|termsHash → proposal_id utf8 (active)
//!   agreement_sigs    — proposal|party          → bincode(AgreementSignature)
//!   receipts          — proposal_id utf8        → bincode(AgreementReceipt)
//!   decisions         — decision_id utf8        → bincode(Decision)
//!   decision_sigs     — decision|agent          → bincode(DecisionSignature)
//!   api_keys          — key_id utf8             → bincode(ApiKeyRecord)
//!   webhook_log       — event|attempt be4       → bincode(WebhookDeliveryAttempt)
//!   counters          — utf8 key                → u64 be bytes
//!   meta              — utf8 key                → raw bytes
//!
//! The store is the single-writer boundary of the service: compound
//! mutations take `write_guard()` for the duration of the change, and the
//! claim-once paths (nonce, idempotency, defence assignment, treasury tx,
//! ballots, seal-job transitions) go through `compare_and_swap` so a lost
//! race surfaces as a conflict, never as a double-write.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use cawt_core::error::CourtError;

/// Key-segment separator. Ids are prefixed hex/base58 strings and never
/// contain `|`.
pub(crate) const SEP: u8 = b'|';

pub(crate) fn join_key(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(part.as_bytes());
    }
    key
}

pub struct Store {
    pub(crate) _db: sled::Db,
    write_lock: Mutex<()>,
    pub(crate) agents: sled::Tree,
    pub(crate) cases: sled::Tree,
    pub(crate) claims: sled::Tree,
    pub(crate) evidence: sled::Tree,
    pub(crate) submissions: sled::Tree,
    pub(crate) ballots: sled::Tree,
    pub(crate) panel: sled::Tree,
    pub(crate) selection_runs: sled::Tree,
    pub(crate) transcript: sled::Tree,
    pub(crate) seal_jobs: sled::Tree,
    pub(crate) seal_jobs_by_case: sled::Tree,
    pub(crate) idempotency: sled::Tree,
    pub(crate) nonces: sled::Tree,
    pub(crate) used_treasury: sled::Tree,
    pub(crate) agreements: sled::Tree,
    pub(crate) agreements_by_code: sled::Tree,
    pub(crate) agreement_terms: sled::Tree,
    pub(crate) agreement_sigs: sled::Tree,
    pub(crate) receipts: sled::Tree,
    pub(crate) decisions: sled::Tree,
    pub(crate) decision_sigs: sled::Tree,
    pub(crate) api_keys: sled::Tree,
    pub(crate) webhook_log: sled::Tree,
    pub(crate) counters: sled::Tree,
    pub(crate) meta: sled::Tree,
}

pub(crate) fn storage_err(e: impl std::fmt::Display) -> CourtError {
    CourtError::Storage(e.to_string())
}

pub(crate) fn codec_err(e: impl std::fmt::Display) -> CourtError {
    CourtError::Serialization(e.to_string())
}

impl Store {
    /// Open or create the repository at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CourtError> {
        let db = sled::open(path).map_err(storage_err)?;
        let tree = |name: &str| db.open_tree(name).map_err(storage_err);
        let agents = tree("agents")?;
        let cases = tree("cases")?;
        let claims = tree("claims")?;
        let evidence = tree("evidence")?;
        let submissions = tree("submissions")?;
        let ballots = tree("ballots")?;
        let panel = tree("panel")?;
        let selection_runs = tree("selection_runs")?;
        let transcript = tree("transcript")?;
        let seal_jobs = tree("seal_jobs")?;
        let seal_jobs_by_case = tree("seal_jobs_by_case")?;
        let idempotency = tree("idempotency")?;
        let nonces = tree("nonces")?;
        let used_treasury = tree("used_treasury")?;
        let agreements = tree("agreements")?;
        let agreements_by_code = tree("agreements_by_code")?;
        let agreement_terms = tree("agreement_terms")?;
        let agreement_sigs = tree("agreement_sigs")?;
        let receipts = tree("receipts")?;
        let decisions = tree("decisions")?;
        let decision_sigs = tree("decision_sigs")?;
        let api_keys = tree("api_keys")?;
        let webhook_log = tree("webhook_log")?;
        let counters = tree("counters")?;
        let meta = tree("meta")?;
        drop(tree);
        Ok(Self {
            _db: db,
            write_lock: Mutex::new(()),
            agents,
            cases,
            claims,
            evidence,
            submissions,
            ballots,
            panel,
            selection_runs,
            transcript,
            seal_jobs,
            seal_jobs_by_case,
            idempotency,
            nonces,
            used_treasury,
            agreements,
            agreements_by_code,
            agreement_terms,
            agreement_sigs,
            receipts,
            decisions,
            decision_sigs,
            api_keys,
            webhook_log,
            counters,
            meta,
        })
    }

    /// Serialize a compound mutation. Poisoning is unrecoverable here: a
    /// writer that panicked mid-change leaves unknown state.
    pub fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Allocate the next value of a named monotonic counter (starts at 1).
    pub(crate) fn next_counter(&self, name: &str) -> Result<u64, CourtError> {
        let bytes = self
            .counters
            .update_and_fetch(name.as_bytes(), |old| {
                let current = old
                    .map(|b| {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&b[..8]);
                        u64::from_be_bytes(arr)
                    })
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(storage_err)?
            .ok_or_else(|| CourtError::Internal("counter update returned none".into()))?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes[..8]);
        Ok(u64::from_be_bytes(arr))
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), CourtError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, CourtError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage_err)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), CourtError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Store;
    use rand::RngCore;

    /// Open a throwaway store under the system temp dir.
    pub fn temp_store() -> Store {
        let mut tag = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut tag);
        let path = std::env::temp_dir().join(format!(
            "cawt_store_test_{}_{}",
            std::process::id(),
            hex_tag(&tag)
        ));
        Store::open(path).expect("open temp store")
    }

    fn hex_tag(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_layout() {
        assert_eq!(join_key(&["a", "b", "c"]), b"a|b|c".to_vec());
        assert_eq!(join_key(&["solo"]), b"solo".to_vec());
    }

    #[test]
    fn counters_are_monotonic() {
        let store = testutil::temp_store();
        assert_eq!(store.next_counter("t").unwrap(), 1);
        assert_eq!(store.next_counter("t").unwrap(), 2);
        assert_eq!(store.next_counter("other").unwrap(), 1);
    }
}

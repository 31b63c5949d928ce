//! OCP repository operations: agreements, their signatures and receipts, and
//! multisig decisions.

use cawt_core::agreement::{
    AgreementParty, AgreementReceipt, AgreementSignature, CanonicalAgreement, Decision,
    DecisionSignature,
};
use cawt_core::error::CourtError;
use cawt_core::types::{DecisionId, ProposalId};

use crate::db::{codec_err, join_key, storage_err, Store};

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CourtError> {
    bincode::deserialize(bytes).map_err(codec_err)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CourtError> {
    bincode::serialize(value).map_err(codec_err)
}

/// Key of the active-terms uniqueness index: one live agreement per ordered
/// (party_a, party_b, terms_hash).
fn terms_key(agreement: &CanonicalAgreement) -> Vec<u8> {
    join_key(&[
        agreement.party_a.as_str(),
        agreement.party_b.as_str(),
        &agreement.terms_hash,
    ])
}

impl Store {
    // ── Agreements ───────────────────────────────────────────────────────────

    /// Insert a new proposal, enforcing the duplicate-terms invariant. The
    /// index claim is the atomic step; losing it is `DUPLICATE_AGREEMENT`
    /// unless the indexed proposal has since left the blocking states.
    pub fn insert_agreement(&self, agreement: &CanonicalAgreement) -> Result<(), CourtError> {
        let index_key = terms_key(agreement);
        loop {
            let existing = self.agreement_terms.get(&index_key).map_err(storage_err)?;
            if let Some(prior_id) = &existing {
                let prior_id = ProposalId(String::from_utf8_lossy(prior_id).to_string());
                if let Some(prior) = self.get_agreement(&prior_id)? {
                    if prior.blocks_duplicates() {
                        return Err(CourtError::DuplicateAgreement);
                    }
                }
            }
            let swap = self
                .agreement_terms
                .compare_and_swap(
                    &index_key,
                    existing,
                    Some(agreement.proposal_id.as_str().as_bytes()),
                )
                .map_err(storage_err)?;
            match swap {
                Ok(()) => break,
                Err(_) => continue,
            }
        }

        self.agreements
            .insert(agreement.proposal_id.as_str().as_bytes(), encode(agreement)?)
            .map_err(storage_err)?;
        self.agreements_by_code
            .insert(
                agreement.agreement_code.as_bytes(),
                agreement.proposal_id.as_str().as_bytes(),
            )
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn put_agreement(&self, agreement: &CanonicalAgreement) -> Result<(), CourtError> {
        self.agreements
            .insert(agreement.proposal_id.as_str().as_bytes(), encode(agreement)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_agreement(
        &self,
        id: &ProposalId,
    ) -> Result<Option<CanonicalAgreement>, CourtError> {
        match self.agreements.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_agreement(&self, id: &ProposalId) -> Result<CanonicalAgreement, CourtError> {
        self.get_agreement(id)?.ok_or_else(|| CourtError::NotFound {
            entity: "agreement",
            id: id.to_string(),
        })
    }

    pub fn get_agreement_by_code(
        &self,
        code: &str,
    ) -> Result<Option<CanonicalAgreement>, CourtError> {
        match self.agreements_by_code.get(code.as_bytes()).map_err(storage_err)? {
            Some(id_bytes) => {
                let id = ProposalId(String::from_utf8_lossy(&id_bytes).to_string());
                self.get_agreement(&id)
            }
            None => Ok(None),
        }
    }

    /// Proposals still pending past their expiry (tick sweep input).
    pub fn expired_pending_agreements(
        &self,
        now: i64,
    ) -> Result<Vec<CanonicalAgreement>, CourtError> {
        let mut out = Vec::new();
        for item in self.agreements.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let agreement: CanonicalAgreement = decode(&bytes)?;
            if agreement.status == cawt_core::agreement::AgreementStatus::Pending
                && agreement.expires_at <= now
            {
                out.push(agreement);
            }
        }
        Ok(out)
    }

    /// Flip pending-past-expiry proposals to expired; returns the count.
    /// Shared by the OCP service and the session tick sweep.
    pub fn expire_pending_agreements(&self, now: i64) -> Result<usize, CourtError> {
        let expired = self.expired_pending_agreements(now)?;
        for mut agreement in expired.iter().cloned() {
            agreement.status = cawt_core::agreement::AgreementStatus::Expired;
            self.put_agreement(&agreement)?;
        }
        Ok(expired.len())
    }

    // ── Agreement signatures ─────────────────────────────────────────────────

    pub fn put_agreement_signature(&self, sig: &AgreementSignature) -> Result<(), CourtError> {
        let key = join_key(&[sig.proposal_id.as_str(), sig.party.as_str()]);
        self.agreement_sigs
            .insert(key, encode(sig)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_agreement_signature(
        &self,
        id: &ProposalId,
        party: AgreementParty,
    ) -> Result<Option<AgreementSignature>, CourtError> {
        let key = join_key(&[id.as_str(), party.as_str()]);
        match self.agreement_sigs.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Receipts ─────────────────────────────────────────────────────────────

    pub fn put_receipt(&self, receipt: &AgreementReceipt) -> Result<(), CourtError> {
        self.receipts
            .insert(receipt.proposal_id.as_str().as_bytes(), encode(receipt)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_receipt(&self, id: &ProposalId) -> Result<Option<AgreementReceipt>, CourtError> {
        match self.receipts.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Decisions ────────────────────────────────────────────────────────────

    pub fn put_decision(&self, decision: &Decision) -> Result<(), CourtError> {
        self.decisions
            .insert(decision.decision_id.as_str().as_bytes(), encode(decision)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_decision(&self, id: &DecisionId) -> Result<Option<Decision>, CourtError> {
        match self.decisions.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_decision(&self, id: &DecisionId) -> Result<Decision, CourtError> {
        self.get_decision(id)?.ok_or_else(|| CourtError::NotFound {
            entity: "decision",
            id: id.to_string(),
        })
    }

    /// Insert-once per (decision, signer).
    pub fn insert_decision_signature(&self, sig: &DecisionSignature) -> Result<(), CourtError> {
        let key = join_key(&[sig.decision_id.as_str(), sig.agent_id.as_str()]);
        let swap = self
            .decision_sigs
            .compare_and_swap(key, None::<&[u8]>, Some(encode(sig)?))
            .map_err(storage_err)?;
        swap.map_err(|_| CourtError::DecisionStateConflict)
    }

    pub fn decision_signatures(
        &self,
        id: &DecisionId,
    ) -> Result<Vec<DecisionSignature>, CourtError> {
        let mut prefix = id.as_str().as_bytes().to_vec();
        prefix.push(crate::db::SEP);
        let mut out = Vec::new();
        for item in self.decision_sigs.scan_prefix(prefix) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::temp_store;
    use cawt_core::agreement::{AgreementStatus, AgreementVisibility};
    use cawt_core::types::AgentId;

    fn agent(n: u8) -> AgentId {
        AgentId::from_public_key_bytes(&[n; 32])
    }

    fn pending(a: u8, b: u8, terms_hash: &str) -> CanonicalAgreement {
        CanonicalAgreement {
            proposal_id: ProposalId::generate(),
            party_a: agent(a),
            party_b: agent(b),
            visibility: AgreementVisibility::Public,
            canonical_terms_json: "{}".into(),
            terms_hash: terms_hash.into(),
            agreement_code: format!("CODE{a}{b}{}", &terms_hash[..4]),
            expires_at: 10_000,
            status: AgreementStatus::Pending,
            fee_tx_sig: None,
            created_at: 100,
            accepted_at: None,
            sealed_at: None,
        }
    }

    #[test]
    fn duplicate_terms_rejected_while_active() {
        let store = temp_store();
        let first = pending(1, 2, "aaaa1111");
        store.insert_agreement(&first).unwrap();

        let dup = pending(1, 2, "aaaa1111");
        assert!(matches!(
            store.insert_agreement(&dup),
            Err(CourtError::DuplicateAgreement)
        ));

        // Reversed party order is a different ordered pair.
        let reversed = pending(2, 1, "aaaa1111");
        store.insert_agreement(&reversed).unwrap();
    }

    #[test]
    fn cancelled_agreement_frees_the_terms() {
        let store = temp_store();
        let mut first = pending(1, 2, "bbbb2222");
        store.insert_agreement(&first).unwrap();

        first.status = AgreementStatus::Cancelled;
        store.put_agreement(&first).unwrap();

        let again = pending(1, 2, "bbbb2222");
        store.insert_agreement(&again).unwrap();
    }

    #[test]
    fn lookup_by_code() {
        let store = temp_store();
        let agreement = pending(3, 4, "cccc3333");
        store.insert_agreement(&agreement).unwrap();
        let found = store
            .get_agreement_by_code(&agreement.agreement_code)
            .unwrap()
            .expect("indexed");
        assert_eq!(found.proposal_id, agreement.proposal_id);
    }

    #[test]
    fn decision_signatures_insert_once() {
        let store = temp_store();
        let sig = DecisionSignature {
            decision_id: DecisionId::generate(),
            agent_id: agent(7),
            sig: "s".into(),
            signed_at: 1,
        };
        store.insert_decision_signature(&sig).unwrap();
        assert!(store.insert_decision_signature(&sig).is_err());
        assert_eq!(store.decision_signatures(&sig.decision_id).unwrap().len(), 1);
    }
}

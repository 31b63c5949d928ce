//! Agreement lifecycle: propose → accept → seal, plus the system-key
//! cancel/suspend paths and the expiry sweep driven by the session tick.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use cawt_core::agreement::{
    AgreementParty, AgreementReceipt, AgreementSignature, AgreementStatus, AgreementVisibility,
    CanonicalAgreement,
};
use cawt_core::error::CourtError;
use cawt_core::types::{to_iso, AgentId, ProposalId, Timestamp};
use cawt_core::Agent;
use cawt_clients::{MintWorkerClient, SolanaClient, TreasuryPayment};
use cawt_crypto::signing::{agreement_attestation_string, verify_attestation};
use cawt_notify::{WebhookDispatcher, WebhookEvent};
use cawt_store::Store;

use crate::canonical_terms::build_canonical_terms;

/// Treasury-fee requirements for proposals.
#[derive(Clone, Debug)]
pub struct FeePolicy {
    pub required: bool,
    pub min_lamports: u64,
    pub enforce_payer: bool,
}

impl FeePolicy {
    pub fn disabled() -> Self {
        Self {
            required: false,
            min_lamports: 0,
            enforce_payer: false,
        }
    }
}

pub struct OcpService {
    store: Arc<Store>,
    /// Cross-registration target. A split deployment points this at the main
    /// court database through a short-lived secondary handle; a single-store
    /// deployment passes the same handle twice.
    court_store: Arc<Store>,
    mint: MintWorkerClient,
    solana: SolanaClient,
    notify: Arc<WebhookDispatcher>,
    fee: FeePolicy,
}

/// Everything a verified `propose` request carries. The proposal id and
/// expiry are caller-chosen: they are bound into the attestation string, so
/// party A must know them before signing.
#[derive(Clone, Debug)]
pub struct ProposeInput {
    pub proposal_id: ProposalId,
    pub party_a: AgentId,
    pub party_b: AgentId,
    pub visibility: AgreementVisibility,
    pub terms: Value,
    pub expires_at: Timestamp,
    pub sig_a: String,
    pub fee: Option<TreasuryPayment>,
}

#[derive(Clone, Debug)]
pub struct AcceptInput {
    pub proposal_id: ProposalId,
    pub signer: AgentId,
    pub sig_b: String,
}

impl OcpService {
    pub fn new(
        store: Arc<Store>,
        court_store: Arc<Store>,
        mint: MintWorkerClient,
        solana: SolanaClient,
        notify: Arc<WebhookDispatcher>,
        fee: FeePolicy,
    ) -> Self {
        Self {
            store,
            court_store,
            mint,
            solana,
            notify,
            fee,
        }
    }

    fn attestation_for(&self, agreement: &CanonicalAgreement) -> String {
        agreement_attestation_string(
            agreement.proposal_id.as_str(),
            &agreement.terms_hash,
            &agreement.agreement_code,
            &agreement.party_a,
            &agreement.party_b,
            &to_iso(agreement.expires_at),
        )
    }

    // ── Propose ──────────────────────────────────────────────────────────────

    pub async fn propose(
        &self,
        input: ProposeInput,
        now: Timestamp,
    ) -> Result<CanonicalAgreement, CourtError> {
        if input.party_a == input.party_b {
            return Err(CourtError::Validation(
                "an agreement needs two distinct parties".into(),
            ));
        }
        if input.expires_at <= now {
            return Err(CourtError::Validation("expiry must be in the future".into()));
        }
        if self.store.get_agreement(&input.proposal_id)?.is_some() {
            return Err(CourtError::Validation(format!(
                "proposal id already used: {}",
                input.proposal_id
            )));
        }

        let terms = build_canonical_terms(&input.terms)?;

        let agreement = CanonicalAgreement {
            proposal_id: input.proposal_id.clone(),
            party_a: input.party_a.clone(),
            party_b: input.party_b.clone(),
            visibility: input.visibility,
            canonical_terms_json: terms.canonical_json,
            terms_hash: terms.terms_hash,
            agreement_code: terms.agreement_code,
            expires_at: input.expires_at,
            status: AgreementStatus::Pending,
            fee_tx_sig: input.fee.as_ref().map(|f| f.tx_sig.clone()),
            created_at: now,
            accepted_at: None,
            sealed_at: None,
        };

        verify_attestation(&input.party_a, &self.attestation_for(&agreement), &input.sig_a)?;

        if self.fee.required {
            let payment = input.fee.as_ref().ok_or_else(|| {
                CourtError::Validation("treasury fee payment required".into())
            })?;
            let payment = TreasuryPayment {
                tx_sig: payment.tx_sig.clone(),
                payer: if self.fee.enforce_payer {
                    payment.payer.clone()
                } else {
                    None
                },
            };
            self.solana
                .verify_treasury_payment(&payment, self.fee.min_lamports)
                .await?;
            self.store.consume_treasury_tx(&payment.tx_sig)?;
        }

        self.store.insert_agreement(&agreement)?;
        self.store.put_agreement_signature(&AgreementSignature {
            proposal_id: agreement.proposal_id.clone(),
            party: AgreementParty::PartyA,
            agent_id: input.party_a.clone(),
            sig: input.sig_a,
            signed_at: now,
        })?;

        info!(proposal = %agreement.proposal_id, code = %agreement.agreement_code, "agreement proposed");
        self.notify_party(
            &agreement.party_b,
            "agreement_proposed",
            &agreement,
            now,
        )?;
        Ok(agreement)
    }

    // ── Accept ───────────────────────────────────────────────────────────────

    pub async fn accept(
        &self,
        input: AcceptInput,
        now: Timestamp,
    ) -> Result<(CanonicalAgreement, AgreementReceipt), CourtError> {
        let mut agreement = self.store.require_agreement(&input.proposal_id)?;

        if agreement.status == AgreementStatus::Pending && agreement.expires_at <= now {
            agreement.status = AgreementStatus::Expired;
            self.store.put_agreement(&agreement)?;
            return Err(CourtError::AgreementExpired);
        }
        if agreement.status != AgreementStatus::Pending {
            return Err(CourtError::AgreementNotPending);
        }
        if input.signer != agreement.party_b {
            return Err(CourtError::WrongParty(
                "only the declared party B may accept".into(),
            ));
        }

        let attestation = self.attestation_for(&agreement);
        verify_attestation(&agreement.party_b, &attestation, &input.sig_b)?;

        // Both signatures must verify against the same canonical digest
        // before anything seals.
        let sig_a = self
            .store
            .get_agreement_signature(&agreement.proposal_id, AgreementParty::PartyA)?
            .ok_or_else(|| CourtError::Internal("pending agreement lost sigA".into()))?;
        verify_attestation(&agreement.party_a, &attestation, &sig_a.sig)?;

        self.store.put_agreement_signature(&AgreementSignature {
            proposal_id: agreement.proposal_id.clone(),
            party: AgreementParty::PartyB,
            agent_id: input.signer.clone(),
            sig: input.sig_b,
            signed_at: now,
        })?;

        agreement.status = AgreementStatus::Accepted;
        agreement.accepted_at = Some(now);
        self.store.put_agreement(&agreement)?;

        let mint = self
            .mint
            .seal_agreement(&agreement.agreement_code, &agreement.terms_hash)
            .await?;
        let receipt = AgreementReceipt {
            proposal_id: agreement.proposal_id.clone(),
            agreement_code: agreement.agreement_code.clone(),
            mint_status: mint.mint_status,
            asset_id: Some(mint.asset_id),
            tx_sig: Some(mint.tx_sig),
            metadata_uri: Some(mint.metadata_uri),
            minted_at: now,
        };
        self.store.put_receipt(&receipt)?;

        agreement.status = AgreementStatus::Sealed;
        agreement.sealed_at = Some(now);
        self.store.put_agreement(&agreement)?;

        self.cross_register(&agreement, now)?;

        info!(proposal = %agreement.proposal_id, "agreement sealed");
        self.notify_party(&agreement.party_a, "agreement_sealed", &agreement, now)?;
        self.notify_party(&agreement.party_b, "agreement_sealed", &agreement, now)?;
        Ok((agreement, receipt))
    }

    // ── System-key lifecycle ─────────────────────────────────────────────────

    pub fn cancel(&self, id: &ProposalId, now: Timestamp) -> Result<CanonicalAgreement, CourtError> {
        self.close_pending(id, AgreementStatus::Cancelled, now)
    }

    pub fn suspend(&self, id: &ProposalId, now: Timestamp) -> Result<CanonicalAgreement, CourtError> {
        self.close_pending(id, AgreementStatus::Suspended, now)
    }

    fn close_pending(
        &self,
        id: &ProposalId,
        to: AgreementStatus,
        _now: Timestamp,
    ) -> Result<CanonicalAgreement, CourtError> {
        let mut agreement = self.store.require_agreement(id)?;
        if agreement.status != AgreementStatus::Pending {
            return Err(CourtError::AgreementNotPending);
        }
        agreement.status = to;
        self.store.put_agreement(&agreement)?;
        Ok(agreement)
    }

    /// Flip pending-past-expiry proposals to expired. Returns the count.
    pub fn expire_sweep(&self, now: Timestamp) -> Result<usize, CourtError> {
        self.store.expire_pending_agreements(now)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// A sealed agreement is court-admissible evidence of a relationship:
    /// both parties get (or keep) rows in the court database.
    fn cross_register(
        &self,
        agreement: &CanonicalAgreement,
        now: Timestamp,
    ) -> Result<(), CourtError> {
        for party in [&agreement.party_a, &agreement.party_b] {
            if self.court_store.get_agent(party)?.is_none() {
                self.court_store.put_agent(&Agent::new(party.clone(), now))?;
            }
        }
        Ok(())
    }

    fn notify_party(
        &self,
        party: &AgentId,
        event: &str,
        agreement: &CanonicalAgreement,
        now: Timestamp,
    ) -> Result<(), CourtError> {
        let Some(agent) = self.store.get_agent(party)? else {
            return Ok(());
        };
        let Some(url) = agent.notify_url else {
            return Ok(());
        };
        self.notify.dispatch(
            &url,
            WebhookEvent {
                event: event.to_string(),
                agent_id: party.clone(),
                proposal_id: Some(agreement.proposal_id.to_string()),
                agreement_code: Some(agreement.agreement_code.clone()),
                body: json!({
                    "status": agreement.status,
                    "termsHash": agreement.terms_hash,
                }),
            },
            now,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawt_clients::MintWorkerClient;
    use cawt_crypto::ed25519::KeyPair;
    use cawt_crypto::signing::sign_attestation;
    use serde_json::json;

    fn temp_store() -> Arc<Store> {
        use rand::RngCore;
        let mut tag = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut tag);
        let path = std::env::temp_dir().join(format!(
            "cawt_ocp_test_{}_{:02x?}",
            std::process::id(),
            tag
        ));
        Arc::new(Store::open(path).expect("open temp store"))
    }

    fn service(store: &Arc<Store>, fee: FeePolicy, solana_accepts: bool) -> OcpService {
        OcpService::new(
            Arc::clone(store),
            Arc::clone(store),
            MintWorkerClient::stub(),
            SolanaClient::stub(solana_accepts),
            WebhookDispatcher::new(b"hook-secret".to_vec(), Arc::clone(store)),
            fee,
        )
    }

    fn terms() -> Value {
        json!({
            "title": "Data Sharing Agreement",
            "parties": [
                {"role": "provider", "agentId": "agentA"},
                {"role": "consumer", "agentId": "agentB"}
            ],
            "obligations": [],
            "consideration": []
        })
    }

    fn propose_input(a: &KeyPair, b: &KeyPair, expires_at: Timestamp) -> ProposeInput {
        let canonical = build_canonical_terms(&terms()).unwrap();
        let proposal_id = ProposalId::generate();
        let attestation = agreement_attestation_string(
            proposal_id.as_str(),
            &canonical.terms_hash,
            &canonical.agreement_code,
            &a.agent_id,
            &b.agent_id,
            &to_iso(expires_at),
        );
        ProposeInput {
            proposal_id,
            party_a: a.agent_id.clone(),
            party_b: b.agent_id.clone(),
            visibility: AgreementVisibility::Public,
            terms: terms(),
            expires_at,
            sig_a: sign_attestation(a, &attestation),
            fee: None,
        }
    }

    fn accept_input(b: &KeyPair, agreement: &CanonicalAgreement) -> AcceptInput {
        let attestation = agreement_attestation_string(
            agreement.proposal_id.as_str(),
            &agreement.terms_hash,
            &agreement.agreement_code,
            &agreement.party_a,
            &agreement.party_b,
            &to_iso(agreement.expires_at),
        );
        AcceptInput {
            proposal_id: agreement.proposal_id.clone(),
            signer: b.agent_id.clone(),
            sig_b: sign_attestation(b, &attestation),
        }
    }

    #[tokio::test]
    async fn happy_path_proposes_and_seals() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let agreement = svc.propose(propose_input(&a, &b, 10_000), 100).await.unwrap();
        assert_eq!(agreement.status, AgreementStatus::Pending);
        assert_eq!(agreement.agreement_code.len(), 10);

        let (sealed, receipt) = svc.accept(accept_input(&b, &agreement), 200).await.unwrap();
        assert_eq!(sealed.status, AgreementStatus::Sealed);
        assert_eq!(receipt.mint_status, "stub");
        assert!(receipt
            .metadata_uri
            .as_deref()
            .unwrap()
            .contains(&agreement.agreement_code));

        // Cross-registration created court rows for both parties.
        assert!(store.get_agent(&a.agent_id).unwrap().is_some());
        assert!(store.get_agent(&b.agent_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_terms_rejected_while_pending() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        svc.propose(propose_input(&a, &b, 10_000), 100).await.unwrap();
        let err = svc.propose(propose_input(&a, &b, 10_000), 101).await.unwrap_err();
        assert!(matches!(err, CourtError::DuplicateAgreement));
    }

    #[tokio::test]
    async fn accept_by_stranger_is_wrong_party() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let stranger = KeyPair::generate();

        let agreement = svc.propose(propose_input(&a, &b, 10_000), 100).await.unwrap();
        let mut input = accept_input(&stranger, &agreement);
        input.signer = stranger.agent_id.clone();
        assert!(matches!(
            svc.accept(input, 200).await,
            Err(CourtError::WrongParty(_))
        ));
    }

    #[tokio::test]
    async fn expired_proposal_flips_on_accept() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let agreement = svc.propose(propose_input(&a, &b, 500), 100).await.unwrap();
        let err = svc.accept(accept_input(&b, &agreement), 600).await.unwrap_err();
        assert!(matches!(err, CourtError::AgreementExpired));
        assert_eq!(
            store.require_agreement(&agreement.proposal_id).unwrap().status,
            AgreementStatus::Expired
        );
    }

    #[tokio::test]
    async fn fee_required_and_single_use() {
        let store = temp_store();
        let svc = service(
            &store,
            FeePolicy {
                required: true,
                min_lamports: 100,
                enforce_payer: false,
            },
            true,
        );
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        // No fee attached.
        let missing = svc.propose(propose_input(&a, &b, 10_000), 100).await;
        assert!(matches!(missing, Err(CourtError::Validation(_))));

        let mut with_fee = propose_input(&a, &b, 10_000);
        with_fee.fee = Some(TreasuryPayment {
            tx_sig: "fee-sig-1".into(),
            payer: None,
        });
        // fee_tx_sig participates in nothing hashed, so the attestation still
        // verifies.
        svc.propose(with_fee, 100).await.unwrap();

        // Replaying the same treasury tx on different terms fails.
        let c = KeyPair::generate();
        let mut replay = propose_input(&a, &c, 10_000);
        replay.fee = Some(TreasuryPayment {
            tx_sig: "fee-sig-1".into(),
            payer: None,
        });
        assert!(matches!(
            svc.propose(replay, 101).await,
            Err(CourtError::TreasuryTxReplayed(_))
        ));
    }

    #[tokio::test]
    async fn cancel_only_while_pending() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let agreement = svc.propose(propose_input(&a, &b, 10_000), 100).await.unwrap();
        svc.cancel(&agreement.proposal_id, 150).unwrap();
        assert!(matches!(
            svc.cancel(&agreement.proposal_id, 160),
            Err(CourtError::AgreementNotPending)
        ));
    }

    #[tokio::test]
    async fn expire_sweep_flips_stale_proposals() {
        let store = temp_store();
        let svc = service(&store, FeePolicy::disabled(), true);
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        svc.propose(propose_input(&a, &b, 500), 100).await.unwrap();
        assert_eq!(svc.expire_sweep(499).unwrap(), 0);
        assert_eq!(svc.expire_sweep(501).unwrap(), 1);
        assert_eq!(svc.expire_sweep(502).unwrap(), 0, "already expired");
    }
}

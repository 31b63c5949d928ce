//! Wire DTOs for the HTTP surface. Requests deserialize from camelCase
//! bodies; views render the subset of each record the API exposes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cawt_core::agreement::{AgreementReceipt, AgreementVisibility, CanonicalAgreement};
use cawt_core::case::{Case, CaseMode, ClaimVote, EvidenceKind, OverallVote};
use cawt_core::types::to_iso;

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterAgentRequest {
    pub notify_url: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub juror_eligible: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAgentRequest {
    pub notify_url: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub juror_eligible: Option<bool>,
}

// ── Cases ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClaimRequest {
    pub summary: String,
    pub requested_remedy: String,
    pub alleged_principles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DraftCaseRequest {
    pub mode: CaseMode,
    pub topic: String,
    pub stake_level: u8,
    pub requested_remedy: String,
    pub claim_summary: String,
    pub claims: Vec<ClaimRequest>,
    pub defendant_agent_id: Option<String>,
    #[serde(default)]
    pub open_defence: bool,
    pub scheduled_for: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvidenceRequest {
    pub kind: EvidenceKind,
    pub title: String,
    pub body: String,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageMessageRequest {
    pub text: String,
    #[serde(default)]
    pub principle_citations: Vec<String>,
    #[serde(default)]
    pub evidence_citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BallotRequest {
    pub votes: Vec<ClaimVoteRequest>,
    pub overall: OverallVote,
    pub reasoning_summary: String,
    pub principles_relied_on: Vec<String>,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClaimVoteRequest {
    pub claim_id: String,
    pub finding: cawt_core::case::Finding,
    pub severity: u8,
    pub recommended_remedy: Option<String>,
}

impl ClaimVoteRequest {
    pub fn into_vote(self) -> ClaimVote {
        ClaimVote {
            claim_id: cawt_core::types::ClaimId(self.claim_id),
            finding: self.finding,
            severity: self.severity,
            recommended_remedy: self.recommended_remedy,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidCaseRequest {
    pub detail: Option<String>,
}

// ── Agreements ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProposeAgreementRequest {
    pub proposal_id: String,
    pub party_b: String,
    #[serde(default = "default_visibility")]
    pub visibility: AgreementVisibility,
    pub terms: Value,
    pub expires_at: i64,
    pub sig_a: String,
    pub fee_tx_sig: Option<String>,
    pub fee_payer: Option<String>,
}

fn default_visibility() -> AgreementVisibility {
    AgreementVisibility::Public
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcceptAgreementRequest {
    pub sig_b: String,
}

// ── Decisions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DraftDecisionRequest {
    pub signers: Vec<String>,
    pub threshold: u32,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignDecisionRequest {
    pub signature: String,
}

// ── API keys ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateApiKeyRequest {
    pub label: String,
}

// ── Views ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseView {
    pub case_id: String,
    pub prosecution_agent_id: String,
    pub defendant_agent_id: Option<String>,
    pub defence_agent_id: Option<String>,
    pub open_defence: bool,
    pub mode: CaseMode,
    pub topic: String,
    pub status: cawt_core::case::CaseStatus,
    pub stage: String,
    pub scheduled_for: Option<String>,
    pub stage_deadline: Option<String>,
    pub outcome: Option<cawt_core::case::CaseOutcome>,
    pub void_reason: Option<String>,
    pub verdict_hash: Option<String>,
    pub seal_status: cawt_core::case::SealStatus,
    pub seal_asset_id: Option<String>,
    pub seal_tx_sig: Option<String>,
    pub metadata_uri: Option<String>,
}

impl From<&Case> for CaseView {
    fn from(case: &Case) -> Self {
        Self {
            case_id: case.case_id.to_string(),
            prosecution_agent_id: case.prosecution_agent_id.to_string(),
            defendant_agent_id: case.defendant_agent_id.as_ref().map(|a| a.to_string()),
            defence_agent_id: case.defence_agent_id.as_ref().map(|a| a.to_string()),
            open_defence: case.open_defence,
            mode: case.mode,
            topic: case.topic.clone(),
            status: case.status,
            stage: case.stage.as_str().to_string(),
            scheduled_for: case.scheduled_for.map(to_iso),
            stage_deadline: case.stage_deadline.map(to_iso),
            outcome: case.outcome,
            void_reason: case.void_reason.map(|r| r.as_str().to_string()),
            verdict_hash: case.verdict_hash.clone(),
            seal_status: case.seal_status,
            seal_asset_id: case.seal_asset_id.clone(),
            seal_tx_sig: case.seal_tx_sig.clone(),
            metadata_uri: case.metadata_uri.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementView {
    pub proposal_id: String,
    pub party_a: String,
    pub party_b: String,
    pub visibility: AgreementVisibility,
    pub status: cawt_core::agreement::AgreementStatus,
    pub terms_hash: String,
    pub agreement_code: String,
    pub expires_at: String,
    pub created_at: String,
}

impl From<&CanonicalAgreement> for AgreementView {
    fn from(a: &CanonicalAgreement) -> Self {
        Self {
            proposal_id: a.proposal_id.to_string(),
            party_a: a.party_a.to_string(),
            party_b: a.party_b.to_string(),
            visibility: a.visibility,
            status: a.status,
            terms_hash: a.terms_hash.clone(),
            agreement_code: a.agreement_code.clone(),
            expires_at: to_iso(a.expires_at),
            created_at: to_iso(a.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptView {
    pub proposal_id: String,
    pub agreement_code: String,
    pub mint_status: String,
    pub asset_id: Option<String>,
    pub tx_sig: Option<String>,
    pub metadata_uri: Option<String>,
}

impl From<&AgreementReceipt> for ReceiptView {
    fn from(r: &AgreementReceipt) -> Self {
        Self {
            proposal_id: r.proposal_id.to_string(),
            agreement_code: r.agreement_code.clone(),
            mint_status: r.mint_status.clone(),
            asset_id: r.asset_id.clone(),
            tx_sig: r.tx_sig.clone(),
            metadata_uri: r.metadata_uri.clone(),
        }
    }
}

//! OCP records: canonical agreements, their signatures and receipts, and the
//! N-of-M multisig decision objects that share the same attestation shape.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, DecisionId, ProposalId, Timestamp};

// ── Agreement ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementVisibility {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Pending,
    Accepted,
    Sealed,
    Expired,
    Cancelled,
    Suspended,
}

/// A canonicalised two-party contract proposal.
///
/// `canonical_terms_json` is the whitespace-free sorted-key rendering the
/// terms hash commits to; `agreement_code` is the 10-char Crockford handle
/// derived from that hash. At most one non-terminal agreement may exist per
/// ordered (party_a, party_b, terms_hash) triple.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalAgreement {
    pub proposal_id: ProposalId,
    pub party_a: AgentId,
    pub party_b: AgentId,
    pub visibility: AgreementVisibility,
    pub canonical_terms_json: String,
    pub terms_hash: String,
    pub agreement_code: String,
    pub expires_at: Timestamp,
    pub status: AgreementStatus,
    /// Treasury fee signature consumed by this proposal, when fees are on.
    pub fee_tx_sig: Option<String>,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub sealed_at: Option<Timestamp>,
}

impl CanonicalAgreement {
    /// Counts toward the duplicate-terms check while it can still complete.
    pub fn blocks_duplicates(&self) -> bool {
        matches!(
            self.status,
            AgreementStatus::Pending | AgreementStatus::Accepted | AgreementStatus::Sealed
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementParty {
    PartyA,
    PartyB,
}

impl AgreementParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementParty::PartyA => "party_a",
            AgreementParty::PartyB => "party_b",
        }
    }
}

/// One attestation signature per party per proposal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgreementSignature {
    pub proposal_id: ProposalId,
    pub party: AgreementParty,
    pub agent_id: AgentId,
    /// base64 Ed25519 signature over the attestation digest.
    pub sig: String,
    pub signed_at: Timestamp,
}

/// Mint receipt written when an agreement seals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgreementReceipt {
    pub proposal_id: ProposalId,
    pub agreement_code: String,
    /// `stub` or `rpc`, matching the mint client that produced it.
    pub mint_status: String,
    pub asset_id: Option<String>,
    pub tx_sig: Option<String>,
    pub metadata_uri: Option<String>,
    pub minted_at: Timestamp,
}

// ── Decisions (OCP multisig) ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Draft,
    Sealed,
    Cancelled,
}

/// An N-of-M co-signed payload: draft → collect signatures → seal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: DecisionId,
    pub created_by: AgentId,
    /// Agents allowed to sign.
    pub signers: Vec<AgentId>,
    /// Signatures required to seal.
    pub threshold: u32,
    /// Canonical JSON of the decision payload.
    pub canonical_payload_json: String,
    pub payload_hash: String,
    pub status: DecisionStatus,
    pub created_at: Timestamp,
    pub sealed_at: Option<Timestamp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionSignature {
    pub decision_id: DecisionId,
    pub agent_id: AgentId,
    pub sig: String,
    pub signed_at: Timestamp,
}

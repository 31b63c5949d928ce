use thiserror::Error;

/// Domain error for the court and OCP cores.
///
/// Every variant maps to a stable wire code and an HTTP class; the outer
/// middleware turns these into the `{error:{code,message}}` envelope.
#[derive(Debug, Error)]
pub enum CourtError {
    // ── Input (400) ──────────────────────────────────────────────────────────
    #[error("invalid agent id: {0}")]
    InvalidAgentId(String),

    #[error("{0}")]
    Validation(String),

    #[error("attachment url rejected: {0}")]
    InvalidUrl(String),

    // ── Auth (401) ───────────────────────────────────────────────────────────
    #[error("request timestamp outside the accepted window")]
    TimestampExpired,

    #[error("declared body hash does not match the request body")]
    BodyHashMismatch,

    #[error("nonce already used within the replay window")]
    NonceReused,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("api key missing or not recognised")]
    ApiKeyInvalid,

    #[error("worker token missing or not recognised")]
    WorkerTokenInvalid,

    #[error("system key missing or not recognised")]
    SystemKeyInvalid,

    // ── Authorisation (403) ──────────────────────────────────────────────────
    #[error("agent is suspended")]
    AgentSuspended,

    #[error("agent is banned from the {role} role")]
    RoleBanned { role: &'static str },

    #[error("wrong party for this action: {0}")]
    WrongParty(String),

    // ── Not found (404) ──────────────────────────────────────────────────────
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // ── Conflict (409) ───────────────────────────────────────────────────────
    #[error("an active agreement with identical terms already exists")]
    DuplicateAgreement,

    #[error("treasury transaction already consumed: {0}")]
    TreasuryTxReplayed(String),

    #[error("case is in stage {got}, expected {expected}")]
    StageMismatch { expected: String, got: String },

    #[error("deadline for this action has passed")]
    DeadlinePassed,

    #[error("ballot already submitted for this case")]
    BallotAlreadySubmitted,

    #[error("submission already received for this phase")]
    SubmissionAlreadyReceived,

    #[error("defence already assigned")]
    DefenceAlreadyAssigned,

    #[error("seal job already finalised with a different result")]
    SealResultConflict,

    #[error("idempotency key reused with a different request body")]
    IdempotencyConflict,

    #[error("agreement is not pending")]
    AgreementNotPending,

    #[error("agreement proposal has expired")]
    AgreementExpired,

    #[error("decision is not in a signable state")]
    DecisionStateConflict,

    // ── Quota (429) ──────────────────────────────────────────────────────────
    #[error("too many failed authentication attempts from this address")]
    RateLimited,

    #[error("daily filing cap reached")]
    FilingQuotaExceeded,

    // ── Dependency (502) ─────────────────────────────────────────────────────
    #[error("external dependency unavailable: {0}")]
    DependencyUnavailable(String),

    // ── Internal (500) ───────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl CourtError {
    /// Stable wire code for the error envelope.
    pub fn code(&self) -> &'static str {
        use CourtError::*;
        match self {
            InvalidAgentId(_) => "INVALID_AGENT_ID",
            Validation(_) => "VALIDATION_ERROR",
            InvalidUrl(_) => "INVALID_URL",
            TimestampExpired => "TIMESTAMP_EXPIRED",
            BodyHashMismatch => "BODY_HASH_MISMATCH",
            NonceReused => "NONCE_REUSED",
            SignatureInvalid => "SIGNATURE_INVALID",
            ApiKeyInvalid => "API_KEY_INVALID",
            WorkerTokenInvalid => "WORKER_TOKEN_INVALID",
            SystemKeyInvalid => "SYSTEM_KEY_INVALID",
            AgentSuspended => "AGENT_SUSPENDED",
            RoleBanned { .. } => "ROLE_BANNED",
            WrongParty(_) => "WRONG_PARTY",
            NotFound { .. } => "NOT_FOUND",
            DuplicateAgreement => "DUPLICATE_AGREEMENT",
            TreasuryTxReplayed(_) => "TREASURY_TX_REPLAYED",
            StageMismatch { .. } => "STAGE_MISMATCH",
            DeadlinePassed => "DEADLINE_PASSED",
            BallotAlreadySubmitted => "BALLOT_ALREADY_SUBMITTED",
            SubmissionAlreadyReceived => "SUBMISSION_ALREADY_RECEIVED",
            DefenceAlreadyAssigned => "DEFENCE_ALREADY_ASSIGNED",
            SealResultConflict => "SEAL_RESULT_CONFLICT",
            IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            AgreementNotPending => "AGREEMENT_NOT_PENDING",
            AgreementExpired => "AGREEMENT_EXPIRED",
            DecisionStateConflict => "DECISION_STATE_CONFLICT",
            RateLimited => "RATE_LIMITED",
            FilingQuotaExceeded => "FILING_QUOTA_EXCEEDED",
            DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            Storage(_) => "STORAGE_ERROR",
            Serialization(_) => "SERIALIZATION_ERROR",
            Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status class for the envelope.
    pub fn http_status(&self) -> u16 {
        use CourtError::*;
        match self {
            InvalidAgentId(_) | Validation(_) | InvalidUrl(_) => 400,
            TimestampExpired | BodyHashMismatch | NonceReused | SignatureInvalid
            | ApiKeyInvalid | WorkerTokenInvalid | SystemKeyInvalid => 401,
            AgentSuspended | RoleBanned { .. } | WrongParty(_) => 403,
            NotFound { .. } => 404,
            DuplicateAgreement
            | TreasuryTxReplayed(_)
            | StageMismatch { .. }
            | DeadlinePassed
            | BallotAlreadySubmitted
            | SubmissionAlreadyReceived
            | DefenceAlreadyAssigned
            | SealResultConflict
            | IdempotencyConflict
            | AgreementNotPending
            | AgreementExpired
            | DecisionStateConflict => 409,
            RateLimited | FilingQuotaExceeded => 429,
            DependencyUnavailable(_) => 502,
            Storage(_) | Serialization(_) | Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_http_classes() {
        assert_eq!(CourtError::TimestampExpired.http_status(), 401);
        assert_eq!(CourtError::BallotAlreadySubmitted.http_status(), 409);
        assert_eq!(CourtError::BallotAlreadySubmitted.code(), "BALLOT_ALREADY_SUBMITTED");
        assert_eq!(CourtError::RateLimited.http_status(), 429);
        assert_eq!(CourtError::DuplicateAgreement.code(), "DUPLICATE_AGREEMENT");
    }
}

//! ─── OpenCawt protocol constants ─────────────────────────────────────────────
//!
//! Timing windows, panel sizing, retry budgets, and the fixed domain strings
//! every signature in the system is derived from. Values that deployments are
//! expected to tune live in the node config; these are the protocol defaults.

// ── Signing-string domains ────────────────────────────────────────────────────

/// Prefix of the v1 request signing string:
/// `OCPv1|{method}|{path}|{unix_ts}|{nonce}|{sha256_hex(body)}`.
pub const SIGNING_PREFIX_V1: &str = "OCPv1";

/// Prefix of the legacy request signing string:
/// `OpenCawtReqV1|{method}|{path}||{ts}|{payloadHash}`.
pub const SIGNING_PREFIX_LEGACY: &str = "OpenCawtReqV1";

/// Domain prefix of the agreement attestation string.
pub const AGREEMENT_ATTESTATION_PREFIX: &str = "OPENCAWT_AGREEMENT_V1";

/// Domain prefix mixed into the agreement-code derivation hash.
pub const AGREEMENT_CODE_DOMAIN: &str = "OPENCAWT_AGREEMENT_CODE_V1";

/// Domain prefix of the decision attestation string.
pub const DECISION_ATTESTATION_PREFIX: &str = "OPENCAWT_DECISION_V1";

// ── Gateway ──────────────────────────────────────────────────────────────────

/// |now − request timestamp| must be within this window (seconds).
pub const AUTH_TIMESTAMP_WINDOW_SECS: i64 = 300;

/// A consumed nonce blocks replays for this long; afterwards it may recur.
pub const NONCE_TTL_SECS: i64 = 300;

pub const NONCE_MIN_LEN: usize = 8;
pub const NONCE_MAX_LEN: usize = 128;

/// Idempotency keys are capped at this length on the wire.
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

/// Completed idempotency records are replayable for this long (seconds).
pub const IDEMPOTENCY_TTL_SECS: i64 = 24 * 3600;

/// Failed-auth limiter: this many signature failures per IP per window → 429.
pub const FAILED_AUTH_MAX_PER_WINDOW: u32 = 10;
pub const FAILED_AUTH_WINDOW_SECS: i64 = 300;

/// Raw API keys are `ocp_` + 31–59 URL-safe characters.
pub const API_KEY_PREFIX: &str = "ocp_";
pub const API_KEY_SECRET_MIN_LEN: usize = 31;
pub const API_KEY_SECRET_MAX_LEN: usize = 59;

// ── Session engine ───────────────────────────────────────────────────────────

/// Default tick interval for the session engine (seconds).
pub const SESSION_TICK_INTERVAL_SECS: u64 = 5;

/// Panel size for jury-mode cases.
pub const JURY_PANEL_SIZE: usize = 11;

/// Readiness window granted to each panel member (seconds).
pub const JUROR_READY_WINDOW_SECS: i64 = 15 * 60;

/// Voting window granted to each juror once voting opens (seconds).
pub const JUROR_VOTING_WINDOW_SECS: i64 = 60 * 60;

/// A case tolerates at most this many consecutive readiness windows before
/// it voids with `jury_readiness_timeout`.
pub const MAX_READINESS_WINDOWS: u32 = 3;

/// Per-seat replacement cap; exceeding it voids the case.
pub const MAX_SEAT_REPLACEMENTS: u32 = 2;

/// Hard ceiling on the voting stage, measured from voting start (seconds).
pub const VOTING_HARD_WINDOW_SECS: i64 = 4 * 3600;

/// Default window for each addresses/evidence stage (seconds).
pub const STAGE_SUBMISSION_WINDOW_SECS: i64 = 6 * 3600;

/// Open-defence cases void if nobody volunteers within this window (seconds).
pub const DEFENCE_ASSIGNMENT_CUTOFF_SECS: i64 = 3600;

/// A juror may serve on at most this many panels per rolling week.
pub const WEEKLY_JURY_LIMIT: u32 = 5;

/// Soft cap on filings per agent per UTC day (enforce mode → 429).
pub const DAILY_FILING_SOFT_CAP: u32 = 10;

// ── Judge ────────────────────────────────────────────────────────────────────

/// Every judge call is raced against this timeout (seconds).
pub const JUDGE_TIMEOUT_SECS: u64 = 30;

/// Screening is retried with a fixed interval up to this many attempts.
pub const JUDGE_SCREENING_MAX_ATTEMPTS: u32 = 3;
pub const JUDGE_SCREENING_RETRY_INTERVAL_SECS: i64 = 60;

// ── Seal pipeline ────────────────────────────────────────────────────────────

/// The engine re-dispatches at most this many stale seal jobs per tick.
pub const SEAL_RETRY_BATCH_PER_TICK: usize = 5;

/// Transport attempts per dispatch before the job is marked failed.
pub const SEAL_DISPATCH_MAX_ATTEMPTS: u32 = 3;

/// Base backoff between seal dispatch attempts (milliseconds, jittered).
pub const SEAL_DISPATCH_BACKOFF_MS: u64 = 500;

// ── Webhooks ─────────────────────────────────────────────────────────────────

pub const WEBHOOK_MAX_ATTEMPTS: u32 = 6;
pub const WEBHOOK_BACKOFF_BASE_SECS: u64 = 1;
pub const WEBHOOK_BACKOFF_CAP_SECS: u64 = 30;
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

// ── Principles ───────────────────────────────────────────────────────────────

/// The court's fixed principle labels; claims and ballots cite subsets.
pub const PRINCIPLES: [&str; 12] = [
    "P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8", "P9", "P10", "P11", "P12",
];

/// A ballot must rely on between 1 and 3 principles.
pub const BALLOT_MIN_PRINCIPLES: usize = 1;
pub const BALLOT_MAX_PRINCIPLES: usize = 3;

// ── Input bounds ─────────────────────────────────────────────────────────────

pub const MAX_CLAIMS_PER_CASE: usize = 12;
pub const MAX_SUMMARY_LEN: usize = 2_000;
pub const MAX_SUBMISSION_LEN: usize = 20_000;
pub const MAX_EVIDENCE_BODY_LEN: usize = 50_000;
pub const MAX_REASONING_LEN: usize = 1_000;

/// Agreement proposals live at most this long without acceptance (seconds).
pub const AGREEMENT_DEFAULT_TTL_SECS: i64 = 7 * 24 * 3600;

/// Agreement codes are always this many Crockford base-32 characters.
pub const AGREEMENT_CODE_LEN: usize = 10;

//! LLM judge client: screening, tiebreaks, remedy recommendations and stage
//! advisories.
//!
//! The judge's prompting internals are not this service's concern — only the
//! request/response contract and the timeout semantics. A judge call never
//! returns `Err`: transport failures, timeouts and malformed responses all
//! collapse to `JudgeResult::fail`, and the session engine decides whether
//! to retry, fall through to stub behaviour, or void.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use cawt_core::case::Finding;
use cawt_core::constants::JUDGE_TIMEOUT_SECS;

/// `{ok, data | error}` — the judge contract.
#[derive(Clone, Debug)]
pub struct JudgeResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> JudgeResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreeningDecision {
    pub approved: bool,
    pub reason: String,
}

/// What the engine asks of the judge.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum JudgeCall {
    Screening {
        case_id: String,
        topic: String,
        claim_summary: String,
    },
    Tiebreak {
        case_id: String,
        claim_id: String,
        claim_summary: String,
        proven: u32,
        not_proven: u32,
    },
    Remedy {
        case_id: String,
        outcome: String,
    },
    StageAdvisory {
        case_id: String,
        stage: String,
    },
}

pub enum JudgeClient {
    /// Deterministic stand-in: approves screenings, breaks ties for the
    /// defence, recommends nothing.
    Stub { approve: bool },
    Http {
        client: reqwest::Client,
        base_url: String,
        timeout: Duration,
    },
}

impl JudgeClient {
    pub fn stub(approve: bool) -> Self {
        JudgeClient::Stub { approve }
    }

    pub fn http(base_url: impl Into<String>) -> Self {
        JudgeClient::Http {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(JUDGE_TIMEOUT_SECS),
        }
    }

    pub async fn screening(&self, call: JudgeCall) -> JudgeResult<ScreeningDecision> {
        match self {
            JudgeClient::Stub { approve } => JudgeResult::success(ScreeningDecision {
                approved: *approve,
                reason: if *approve {
                    "screening approved".into()
                } else {
                    "screening rejected".into()
                },
            }),
            JudgeClient::Http { .. } => self.post_json("/judge/screening", &call).await,
        }
    }

    pub async fn tiebreak(&self, call: JudgeCall) -> JudgeResult<Finding> {
        match self {
            JudgeClient::Stub { .. } => JudgeResult::success(Finding::NotProven),
            JudgeClient::Http { .. } => self.post_json("/judge/tiebreak", &call).await,
        }
    }

    pub async fn remedy(&self, call: JudgeCall) -> JudgeResult<String> {
        match self {
            JudgeClient::Stub { .. } => JudgeResult::success(String::new()),
            JudgeClient::Http { .. } => self.post_json("/judge/remedy", &call).await,
        }
    }

    pub async fn stage_advisory(&self, call: JudgeCall) -> JudgeResult<Value> {
        match self {
            JudgeClient::Stub { .. } => JudgeResult::success(Value::Null),
            JudgeClient::Http { .. } => self.post_json("/judge/advisory", &call).await,
        }
    }

    /// One bounded POST; the timeout is raced against the whole exchange.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        call: &JudgeCall,
    ) -> JudgeResult<T> {
        let JudgeClient::Http {
            client,
            base_url,
            timeout,
        } = self
        else {
            return JudgeResult::fail("not an http judge");
        };
        let url = format!("{base_url}{path}");
        let exchange = async {
            let response = client
                .post(&url)
                .json(call)
                .send()
                .await
                .map_err(|e| e.to_string())?
                .error_for_status()
                .map_err(|e| e.to_string())?;
            response.json::<T>().await.map_err(|e| e.to_string())
        };
        match tokio::time::timeout(*timeout, exchange).await {
            Ok(Ok(data)) => JudgeResult::success(data),
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "judge call failed");
                JudgeResult::fail(e)
            }
            Err(_) => {
                warn!(url = %url, "judge call timed out");
                JudgeResult::fail("judge timeout")
            }
        }
    }
}

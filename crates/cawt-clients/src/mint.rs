//! Mint worker client: commits a sealed case or agreement on chain.
//!
//! `stub` mode synthesises deterministic asset/tx identifiers so the full
//! pipeline (including receipts and webhooks) runs without a chain. `http`
//! mode POSTs the request to the worker with the shared token and bounded
//! retry; the worker's asynchronous callback path is handled by the gateway,
//! not here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cawt_core::constants::{SEAL_DISPATCH_BACKOFF_MS, SEAL_DISPATCH_MAX_ATTEMPTS};
use cawt_core::error::CourtError;
use cawt_core::seal::WorkerSealRequest;
use cawt_crypto::hash::sha256_hex;

use crate::retry::retry_with_backoff;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintResult {
    /// `stub` or `rpc`.
    pub mint_status: String,
    pub asset_id: String,
    pub tx_sig: String,
    pub metadata_uri: String,
}

pub enum MintWorkerClient {
    Stub,
    Http {
        client: reqwest::Client,
        base_url: String,
        worker_token: String,
        timeout: Duration,
    },
}

impl MintWorkerClient {
    pub fn stub() -> Self {
        MintWorkerClient::Stub
    }

    pub fn http(
        base_url: impl Into<String>,
        worker_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        MintWorkerClient::Http {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            worker_token: worker_token.into(),
            timeout,
        }
    }

    fn stub_result(tag: &str, payload_hash: &str, metadata_path: &str) -> MintResult {
        // Deterministic identifiers derived from the payload hash, so a
        // replayed stub mint reproduces the same receipt.
        let digest = sha256_hex(format!("{tag}|{payload_hash}").as_bytes());
        MintResult {
            mint_status: "stub".into(),
            asset_id: format!("stubasset{}", &digest[..16]),
            tx_sig: format!("stubtx{}", &digest[16..48]),
            metadata_uri: format!("https://mint.stub.opencawt.example/{metadata_path}"),
        }
    }

    /// Mint a sealed case. In http mode the worker replies asynchronously via
    /// the seal-result callback; a `202` here only means the job was taken.
    pub async fn seal_case(&self, request: &WorkerSealRequest) -> Result<MintResult, CourtError> {
        match self {
            MintWorkerClient::Stub => Ok(Self::stub_result(
                "case-seal",
                &request.verdict_hash,
                &format!("case/{}", request.case_id),
            )),
            MintWorkerClient::Http { .. } => self.post_worker("/worker/seal", request).await,
        }
    }

    /// Mint an accepted agreement. The metadata URI always embeds the
    /// agreement code — verifiers resolve codes through it.
    pub async fn seal_agreement(
        &self,
        agreement_code: &str,
        terms_hash: &str,
    ) -> Result<MintResult, CourtError> {
        match self {
            MintWorkerClient::Stub => Ok(Self::stub_result(
                "agreement-seal",
                terms_hash,
                &format!("agreement/{agreement_code}"),
            )),
            MintWorkerClient::Http { .. } => {
                #[derive(Serialize)]
                struct AgreementMintRequest<'a> {
                    agreement_code: &'a str,
                    terms_hash: &'a str,
                }
                self.post_worker(
                    "/worker/seal-agreement",
                    &AgreementMintRequest {
                        agreement_code,
                        terms_hash,
                    },
                )
                .await
            }
        }
    }

    async fn post_worker<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<MintResult, CourtError> {
        let MintWorkerClient::Http {
            client,
            base_url,
            worker_token,
            timeout,
        } = self
        else {
            return Err(CourtError::Internal("stub client has no transport".into()));
        };
        let url = format!("{base_url}{path}");
        let payload =
            serde_json::to_value(body).map_err(|e| CourtError::Serialization(e.to_string()))?;
        retry_with_backoff(
            SEAL_DISPATCH_MAX_ATTEMPTS,
            Duration::from_millis(SEAL_DISPATCH_BACKOFF_MS),
            |_| {
                let client = client.clone();
                let url = url.clone();
                let token = worker_token.clone();
                let payload = payload.clone();
                let timeout = *timeout;
                async move {
                    client
                        .post(&url)
                        .header("X-Worker-Token", token)
                        .json(&payload)
                        // Per-attempt deadline; reqwest aborts the in-flight
                        // request when it elapses.
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|e| {
                            CourtError::DependencyUnavailable(format!("mint worker: {e}"))
                        })?
                        .error_for_status()
                        .map_err(|e| {
                            CourtError::DependencyUnavailable(format!("mint worker: {e}"))
                        })?
                        .json::<MintResult>()
                        .await
                        .map_err(|e| {
                            CourtError::DependencyUnavailable(format!("mint worker: {e}"))
                        })
                }
            },
        )
        .await
    }
}

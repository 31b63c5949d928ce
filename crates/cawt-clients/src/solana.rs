//! Solana RPC client — only the treasury-payment verification contract.
//! Priority-fee estimation and transaction construction belong to the mint
//! worker, not this service.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use cawt_core::error::CourtError;

/// What a proposer claims about their fee payment.
#[derive(Clone, Debug)]
pub struct TreasuryPayment {
    pub tx_sig: String,
    pub payer: Option<String>,
}

pub enum SolanaClient {
    /// Accepts every payment (or none) without touching a chain.
    Stub { accept: bool },
    Rpc {
        client: reqwest::Client,
        rpc_url: String,
        treasury_address: String,
        timeout: Duration,
    },
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<serde_json::Value>,
}

impl SolanaClient {
    pub fn stub(accept: bool) -> Self {
        SolanaClient::Stub { accept }
    }

    pub fn rpc(
        rpc_url: impl Into<String>,
        treasury_address: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        SolanaClient::Rpc {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            treasury_address: treasury_address.into(),
            timeout,
        }
    }

    /// Verify that `payment` is a finalised transfer of at least
    /// `min_lamports` into the treasury, optionally from the claimed payer.
    /// Single-use consumption of the signature is the store's job, not ours.
    pub async fn verify_treasury_payment(
        &self,
        payment: &TreasuryPayment,
        min_lamports: u64,
    ) -> Result<(), CourtError> {
        match self {
            SolanaClient::Stub { accept } => {
                if *accept {
                    Ok(())
                } else {
                    Err(CourtError::Validation(format!(
                        "treasury payment rejected: {}",
                        payment.tx_sig
                    )))
                }
            }
            SolanaClient::Rpc {
                client,
                rpc_url,
                treasury_address,
                timeout,
            } => {
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "getTransaction",
                    "params": [
                        payment.tx_sig,
                        {"commitment": "finalized", "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}
                    ]
                });
                let envelope: RpcEnvelope = client
                    .post(rpc_url)
                    .json(&body)
                    .timeout(*timeout)
                    .send()
                    .await
                    .map_err(|e| CourtError::DependencyUnavailable(format!("solana rpc: {e}")))?
                    .json()
                    .await
                    .map_err(|e| CourtError::DependencyUnavailable(format!("solana rpc: {e}")))?;

                let tx = envelope.result.ok_or_else(|| {
                    CourtError::Validation(format!(
                        "treasury tx not found or not finalised: {}",
                        payment.tx_sig
                    ))
                })?;

                verify_transfer(&tx, treasury_address, min_lamports, payment.payer.as_deref())
            }
        }
    }
}

/// Inspect a `jsonParsed` transaction: the treasury balance must rise by at
/// least the fee, and when a payer is claimed it must be the first signer.
fn verify_transfer(
    tx: &serde_json::Value,
    treasury_address: &str,
    min_lamports: u64,
    expected_payer: Option<&str>,
) -> Result<(), CourtError> {
    let keys = tx["transaction"]["message"]["accountKeys"]
        .as_array()
        .ok_or_else(|| CourtError::Validation("malformed transaction: no account keys".into()))?;

    let treasury_index = keys
        .iter()
        .position(|k| {
            k.as_str()
                .or_else(|| k["pubkey"].as_str())
                .map(|s| s == treasury_address)
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            CourtError::Validation("transaction does not touch the treasury".into())
        })?;

    let pre = tx["meta"]["preBalances"][treasury_index].as_u64().unwrap_or(0);
    let post = tx["meta"]["postBalances"][treasury_index].as_u64().unwrap_or(0);
    if post < pre + min_lamports {
        return Err(CourtError::Validation(format!(
            "treasury credit {} below required fee {min_lamports}",
            post.saturating_sub(pre)
        )));
    }

    if let Some(payer) = expected_payer {
        let first_signer = keys
            .first()
            .and_then(|k| k.as_str().or_else(|| k["pubkey"].as_str()))
            .unwrap_or("");
        if first_signer != payer {
            return Err(CourtError::Validation(format!(
                "fee payer mismatch: expected {payer}, got {first_signer}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed_tx(pre: u64, post: u64, payer: &str) -> serde_json::Value {
        json!({
            "transaction": {"message": {"accountKeys": [
                {"pubkey": payer}, {"pubkey": "Treasury1111"}
            ]}},
            "meta": {"preBalances": [500, pre], "postBalances": [100, post]}
        })
    }

    #[test]
    fn accepts_sufficient_credit() {
        let tx = parsed_tx(1_000, 1_400, "PayerKey");
        assert!(verify_transfer(&tx, "Treasury1111", 400, Some("PayerKey")).is_ok());
    }

    #[test]
    fn rejects_short_credit() {
        let tx = parsed_tx(1_000, 1_200, "PayerKey");
        assert!(verify_transfer(&tx, "Treasury1111", 400, None).is_err());
    }

    #[test]
    fn rejects_payer_mismatch() {
        let tx = parsed_tx(1_000, 1_500, "SomeoneElse");
        assert!(verify_transfer(&tx, "Treasury1111", 400, Some("PayerKey")).is_err());
    }

    #[test]
    fn rejects_unrelated_transaction() {
        let tx = parsed_tx(1_000, 1_500, "PayerKey");
        assert!(verify_transfer(&tx, "OtherTreasury", 400, None).is_err());
    }

    #[tokio::test]
    async fn stub_follows_config() {
        let payment = TreasuryPayment {
            tx_sig: "sig".into(),
            payer: None,
        };
        assert!(SolanaClient::stub(true)
            .verify_treasury_payment(&payment, 1)
            .await
            .is_ok());
        assert!(SolanaClient::stub(false)
            .verify_treasury_payment(&payment, 1)
            .await
            .is_err());
    }
}

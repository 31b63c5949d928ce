//! Distributed-randomness beacon client. The (round, randomness) pair is the
//! only non-deterministic input to jury selection.

use std::time::Duration;

use serde::Deserialize;

use cawt_core::error::CourtError;
use cawt_crypto::hash::sha256_hex;

use crate::retry::retry_with_backoff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrandRound {
    pub round: u64,
    pub randomness: String,
}

#[derive(Deserialize)]
struct DrandWire {
    round: u64,
    randomness: String,
}

pub enum DrandClient {
    /// Deterministic beacon for tests and stub deployments: randomness is a
    /// pure function of (seed, round).
    Stub { seed: String },
    Http {
        client: reqwest::Client,
        base_url: String,
        timeout: Duration,
    },
}

impl DrandClient {
    pub fn stub(seed: impl Into<String>) -> Self {
        DrandClient::Stub { seed: seed.into() }
    }

    pub fn http(base_url: impl Into<String>, timeout: Duration) -> Self {
        DrandClient::Http {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn stub_round(seed: &str, round: u64) -> DrandRound {
        DrandRound {
            round,
            randomness: sha256_hex(format!("{seed}|{round}").as_bytes()),
        }
    }

    /// Latest beacon output.
    pub async fn latest(&self) -> Result<DrandRound, CourtError> {
        match self {
            DrandClient::Stub { seed } => Ok(Self::stub_round(seed, 1)),
            DrandClient::Http {
                client,
                base_url,
                timeout,
            } => {
                let url = format!("{base_url}/public/latest");
                let wire: DrandWire = retry_with_backoff(3, Duration::from_millis(250), |_| {
                    let client = client.clone();
                    let url = url.clone();
                    let timeout = *timeout;
                    async move {
                        client
                            .get(&url)
                            .timeout(timeout)
                            .send()
                            .await
                            .map_err(|e| CourtError::DependencyUnavailable(format!("drand: {e}")))?
                            .error_for_status()
                            .map_err(|e| CourtError::DependencyUnavailable(format!("drand: {e}")))?
                            .json::<DrandWire>()
                            .await
                            .map_err(|e| CourtError::DependencyUnavailable(format!("drand: {e}")))
                    }
                })
                .await?;
                Ok(DrandRound {
                    round: wire.round,
                    randomness: wire.randomness,
                })
            }
        }
    }

    /// The round strictly after `after` — used for replacement selections
    /// that must not reuse the original randomness.
    pub async fn round_after(&self, after: u64) -> Result<DrandRound, CourtError> {
        match self {
            DrandClient::Stub { seed } => Ok(Self::stub_round(seed, after + 1)),
            DrandClient::Http { .. } => {
                // Public beacons only serve history + latest; latest is
                // guaranteed past any round we stored earlier.
                let latest = self.latest().await?;
                if latest.round > after {
                    Ok(latest)
                } else {
                    Err(CourtError::DependencyUnavailable(format!(
                        "drand: no round after {after}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_is_deterministic() {
        let a = DrandClient::stub("seed");
        let b = DrandClient::stub("seed");
        assert_eq!(a.latest().await.unwrap(), b.latest().await.unwrap());
        assert_eq!(
            a.round_after(1).await.unwrap(),
            b.round_after(1).await.unwrap()
        );
    }

    #[tokio::test]
    async fn stub_rounds_advance() {
        let c = DrandClient::stub("seed");
        let first = c.latest().await.unwrap();
        let next = c.round_after(first.round).await.unwrap();
        assert_eq!(next.round, first.round + 1);
        assert_ne!(next.randomness, first.randomness);
    }
}

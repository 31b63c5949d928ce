//! Node configuration: collaborator endpoints, shared secrets, timing knobs.
//! Loaded from a JSON file; every field has a stub-mode default so a bare
//! `cawt-node` comes up self-contained.

use std::time::Duration;

use serde::Deserialize;

use cawt_clients::{DrandClient, JudgeClient, MintWorkerClient, SolanaClient};
use cawt_ocp::FeePolicy;
use cawt_session::EngineConfig;

fn default_mode() -> String {
    "stub".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrandSettings {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeSettings {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Stub behaviour: whether screenings approve.
    #[serde(default = "default_true")]
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintSettings {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaSettings {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub treasury_address: Option<String>,
    /// Stub behaviour: whether payments verify.
    #[serde(default = "default_true")]
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSettings {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_lamports: u64,
    #[serde(default)]
    pub enforce_payer: bool,
}

fn default_true() -> bool {
    true
}

fn default_worker_token() -> String {
    "dev-worker-token".into()
}

fn default_system_key() -> String {
    "dev-system-key".into()
}

fn default_webhook_secret() -> String {
    "dev-webhook-secret".into()
}

fn default_tick_secs() -> u64 {
    cawt_core::constants::SESSION_TICK_INTERVAL_SECS
}

fn default_panel_size() -> usize {
    cawt_core::constants::JURY_PANEL_SIZE
}

fn default_decision_base_url() -> String {
    "https://court.opencawt.example".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default = "default_worker_token")]
    pub worker_token: String,
    #[serde(default = "default_system_key")]
    pub system_key: String,
    #[serde(default = "default_webhook_secret")]
    pub webhook_secret: String,
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_panel_size")]
    pub panel_size: usize,
    #[serde(default = "default_decision_base_url")]
    pub decision_base_url: String,
    #[serde(default = "default_drand")]
    pub drand: DrandSettings,
    #[serde(default = "default_judge")]
    pub judge: JudgeSettings,
    #[serde(default = "default_mint")]
    pub mint: MintSettings,
    #[serde(default = "default_solana")]
    pub solana: SolanaSettings,
    #[serde(default = "default_fee")]
    pub fee: FeeSettings,
}

fn default_drand() -> DrandSettings {
    DrandSettings {
        mode: default_mode(),
        url: None,
        seed: None,
    }
}

fn default_judge() -> JudgeSettings {
    JudgeSettings {
        mode: default_mode(),
        url: None,
        approve: true,
    }
}

fn default_mint() -> MintSettings {
    MintSettings {
        mode: default_mode(),
        url: None,
    }
}

fn default_solana() -> SolanaSettings {
    SolanaSettings {
        mode: default_mode(),
        rpc_url: None,
        treasury_address: None,
        accept: true,
    }
}

fn default_fee() -> FeeSettings {
    FeeSettings {
        required: false,
        min_lamports: 0,
        enforce_payer: false,
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        // An empty JSON object resolves every field to its default.
        serde_json::from_str("{}").expect("defaults are total")
    }
}

impl NodeConfig {
    pub fn drand_client(&self) -> DrandClient {
        match (self.drand.mode.as_str(), &self.drand.url) {
            ("http", Some(url)) => DrandClient::http(url.clone(), Duration::from_secs(10)),
            _ => DrandClient::stub(self.drand.seed.clone().unwrap_or_else(|| "drand-seed".into())),
        }
    }

    pub fn judge_client(&self) -> JudgeClient {
        match (self.judge.mode.as_str(), &self.judge.url) {
            ("http", Some(url)) => JudgeClient::http(url.clone()),
            _ => JudgeClient::stub(self.judge.approve),
        }
    }

    pub fn mint_client(&self) -> MintWorkerClient {
        match (self.mint.mode.as_str(), &self.mint.url) {
            ("http", Some(url)) | ("rpc", Some(url)) => MintWorkerClient::http(
                url.clone(),
                self.worker_token.clone(),
                Duration::from_secs(30),
            ),
            _ => MintWorkerClient::stub(),
        }
    }

    pub fn solana_client(&self) -> SolanaClient {
        match (self.solana.mode.as_str(), &self.solana.rpc_url) {
            ("rpc", Some(url)) => SolanaClient::rpc(
                url.clone(),
                self.solana.treasury_address.clone().unwrap_or_default(),
                Duration::from_secs(15),
            ),
            _ => SolanaClient::stub(self.solana.accept),
        }
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            required: self.fee.required,
            min_lamports: self.fee.min_lamports,
            enforce_payer: self.fee.enforce_payer,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            panel_size: self.panel_size,
            decision_base_url: self.decision_base_url.clone(),
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_stub_everything() {
        let config = NodeConfig::default();
        assert_eq!(config.drand.mode, "stub");
        assert!(matches!(config.drand_client(), DrandClient::Stub { .. }));
        assert!(matches!(config.mint_client(), MintWorkerClient::Stub));
        assert!(!config.fee.required);
    }

    #[test]
    fn http_modes_select_http_clients() {
        let config: NodeConfig = serde_json::from_str(
            r#"{
                "drand": {"mode": "http", "url": "https://drand.example"},
                "judge": {"mode": "http", "url": "https://judge.example"},
                "mint": {"mode": "http", "url": "https://worker.example"},
                "solana": {"mode": "rpc", "rpcUrl": "https://rpc.example", "treasuryAddress": "T1"}
            }"#,
        )
        .unwrap();
        assert!(matches!(config.drand_client(), DrandClient::Http { .. }));
        assert!(matches!(config.judge_client(), JudgeClient::Http { .. }));
        assert!(matches!(config.mint_client(), MintWorkerClient::Http { .. }));
        assert!(matches!(config.solana_client(), SolanaClient::Rpc { .. }));
    }
}

//! Registered agents and their court-facing standing.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Timestamp};

// ── AgentStatus ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
}

// ── RoleBans ─────────────────────────────────────────────────────────────────

/// Reversible per-role bans. A banned role rejects the matching action with
/// `ROLE_BANNED`; the agent record itself is never deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBans {
    #[serde(default)]
    pub filing: bool,
    #[serde(default)]
    pub defence: bool,
    #[serde(default)]
    pub jury: bool,
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// One record per external actor, created on first self-signed `register`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    /// HTTPS webhook target; validated against the SSRF filter on write.
    pub notify_url: Option<String>,
    pub status: AgentStatus,
    pub bans: RoleBans,
    /// Opt-in flag for the jury pool; bans still exclude a willing juror.
    pub juror_eligible: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Agent {
    pub fn new(agent_id: AgentId, now: Timestamp) -> Self {
        Self {
            agent_id,
            notify_url: None,
            status: AgentStatus::Active,
            bans: RoleBans::default(),
            juror_eligible: false,
            display_name: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// True when the agent may be drawn into a jury pool.
    pub fn may_serve_jury(&self) -> bool {
        self.is_active() && self.juror_eligible && !self.bans.jury
    }
}

/// Reject webhook targets the dispatcher must never call: only absolute
/// `https://` URLs with a hostname, and never loopback/link-local/RFC-1918
/// literals.
pub fn validate_notify_url(url: &str) -> Result<(), crate::error::CourtError> {
    let rejected = |why: &str| {
        Err(crate::error::CourtError::InvalidUrl(format!(
            "{url}: {why}"
        )))
    };

    let Some(rest) = url.strip_prefix("https://") else {
        return rejected("scheme must be https");
    };
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    if host.is_empty() {
        return rejected("missing host");
    }
    if host.eq_ignore_ascii_case("localhost") {
        return rejected("loopback host");
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        let private = match ip {
            std::net::IpAddr::V4(v4) => {
                v4.is_loopback()
                    || v4.is_private()
                    || v4.is_link_local()
                    || v4.is_unspecified()
            }
            std::net::IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
        if private {
            return rejected("private or loopback address");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_url_filter() {
        assert!(validate_notify_url("https://agent.example/hooks").is_ok());
        assert!(validate_notify_url("http://agent.example").is_err());
        assert!(validate_notify_url("https://localhost/x").is_err());
        assert!(validate_notify_url("https://127.0.0.1/x").is_err());
        assert!(validate_notify_url("https://10.0.0.8/x").is_err());
        assert!(validate_notify_url("https://169.254.1.1/x").is_err());
        assert!(validate_notify_url("https://").is_err());
    }

    #[test]
    fn jury_service_requires_opt_in_and_no_ban() {
        let id = AgentId::from_public_key_bytes(&[1u8; 32]);
        let mut agent = Agent::new(id, 0);
        assert!(!agent.may_serve_jury());
        agent.juror_eligible = true;
        assert!(agent.may_serve_jury());
        agent.bans.jury = true;
        assert!(!agent.may_serve_jury());
    }
}

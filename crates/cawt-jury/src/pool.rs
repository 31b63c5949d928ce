//! Eligible-pool construction: which agents a selection run may draw from.

use std::collections::HashSet;

use cawt_core::agent::Agent;
use cawt_core::constants::WEEKLY_JURY_LIMIT;
use cawt_core::types::AgentId;

/// Filters applied on top of per-agent standing.
#[derive(Clone, Debug, Default)]
pub struct PoolFilter {
    /// Case parties and the sitting panel — never selectable.
    pub exclusions: HashSet<AgentId>,
    /// When set, only these ids are considered at all.
    pub allowlist: Option<HashSet<AgentId>>,
}

/// Build the eligible juror pool.
///
/// `weekly_service` reports how many panels an agent joined in the current
/// rolling week; agents at the limit sit this one out.
pub fn eligible_pool(
    agents: &[Agent],
    filter: &PoolFilter,
    weekly_service: impl Fn(&AgentId) -> u32,
) -> Vec<AgentId> {
    agents
        .iter()
        .filter(|a| a.may_serve_jury())
        .filter(|a| !filter.exclusions.contains(&a.agent_id))
        .filter(|a| {
            filter
                .allowlist
                .as_ref()
                .map(|list| list.contains(&a.agent_id))
                .unwrap_or(true)
        })
        .filter(|a| weekly_service(&a.agent_id) < WEEKLY_JURY_LIMIT)
        .map(|a| a.agent_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawt_core::agent::AgentStatus;

    fn eligible_agent(n: u8) -> Agent {
        let mut agent = Agent::new(AgentId::from_public_key_bytes(&[n; 32]), 0);
        agent.juror_eligible = true;
        agent
    }

    #[test]
    fn filters_standing_and_exclusions() {
        let mut banned = eligible_agent(1);
        banned.bans.jury = true;
        let mut suspended = eligible_agent(2);
        suspended.status = AgentStatus::Suspended;
        let excluded = eligible_agent(3);
        let ok = eligible_agent(4);

        let filter = PoolFilter {
            exclusions: [excluded.agent_id.clone()].into_iter().collect(),
            allowlist: None,
        };
        let pool = eligible_pool(
            &[banned, suspended, excluded, ok.clone()],
            &filter,
            |_| 0,
        );
        assert_eq!(pool, vec![ok.agent_id]);
    }

    #[test]
    fn weekly_limit_excludes_busy_jurors() {
        let busy = eligible_agent(1);
        let fresh = eligible_agent(2);
        let busy_id = busy.agent_id.clone();
        let pool = eligible_pool(&[busy, fresh.clone()], &PoolFilter::default(), |id| {
            if *id == busy_id {
                WEEKLY_JURY_LIMIT
            } else {
                0
            }
        });
        assert_eq!(pool, vec![fresh.agent_id]);
    }

    #[test]
    fn allowlist_narrows_the_pool() {
        let a = eligible_agent(1);
        let b = eligible_agent(2);
        let filter = PoolFilter {
            exclusions: HashSet::new(),
            allowlist: Some([a.agent_id.clone()].into_iter().collect()),
        };
        let pool = eligible_pool(&[a.clone(), b], &filter, |_| 0);
        assert_eq!(pool, vec![a.agent_id]);
    }
}

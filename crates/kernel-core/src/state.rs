//! Authoritative episode state, created at reset and mutated in place until the episode ends.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use contracts::{Location, Utterance};
use serde::Serialize;

use crate::economy::{Allocation, InvariantBreach};
use crate::voting::VotingTally;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRoundState {
    /// Request fed to the allocator this round (zero while suspended).
    pub wanted: u64,
    /// Quantity the agent actually submitted this round.
    pub submitted: u64,
    pub collected_total: u64,
    pub last_collected: u64,
    pub location: Location,
    pub time: NaiveDateTime,
}

impl AgentRoundState {
    fn new(start_time: NaiveDateTime) -> Self {
        Self {
            wanted: 0,
            submitted: 0,
            collected_total: 0,
            last_collected: 0,
            location: Location::Pool,
            time: start_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundState {
    pub pool_quantity: u64,
    pub pool_before_harvest: u64,
    pub threshold: u64,
    pub agents: BTreeMap<String, AgentRoundState>,
    pub suspended: BTreeSet<String>,
    pub votes: VotingTally,
    /// Transcript of the current round's negotiation, empty until the chat happens.
    pub conversation: Vec<Utterance>,
    pub resource_limit_agreed: Option<u64>,
}

/// Per-agent sustainable harvest: half the pool split evenly, rounded down.
pub fn sustainability_threshold(pool_quantity: u64, num_agents: usize) -> u64 {
    let agents = (num_agents as u64).max(1);
    pool_quantity / 2 / agents
}

impl RoundState {
    pub fn new(agent_ids: &[String], initial_pool: u64, start_time: NaiveDateTime) -> Self {
        Self {
            pool_quantity: initial_pool,
            pool_before_harvest: initial_pool,
            threshold: sustainability_threshold(initial_pool, agent_ids.len()),
            agents: agent_ids
                .iter()
                .map(|agent_id| (agent_id.clone(), AgentRoundState::new(start_time)))
                .collect(),
            suspended: BTreeSet::new(),
            votes: VotingTally::default(),
            conversation: Vec::new(),
            resource_limit_agreed: None,
        }
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentRoundState> {
        self.agents.get(agent_id)
    }

    pub fn is_suspended(&self, agent_id: &str) -> bool {
        self.suspended.contains(agent_id)
    }

    /// Register a harvest request; a suspended agent's request is forced to zero.
    /// Returns the effective request.
    pub fn record_request(&mut self, agent_id: &str, quantity: u64) -> u64 {
        let effective = if self.suspended.contains(agent_id) {
            0
        } else {
            quantity
        };
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.submitted = quantity;
            agent.wanted = effective;
            agent.location = Location::Pool;
        }
        effective
    }

    pub fn wanted(&self) -> BTreeMap<String, u64> {
        self.agents
            .iter()
            .map(|(agent_id, agent)| (agent_id.clone(), agent.wanted))
            .collect()
    }

    /// Apply a verified allocation: shrink the pool and credit every agent.
    pub fn apply_allocation(&mut self, allocation: &Allocation) -> Result<(), InvariantBreach> {
        let granted = allocation.total_granted();
        let remaining = self
            .pool_quantity
            .checked_sub(granted)
            .ok_or(InvariantBreach::OverAllocated {
                granted,
                pool: self.pool_quantity,
            })?;
        if remaining != allocation.remaining_pool {
            return Err(InvariantBreach::RemainingMismatch {
                pool: self.pool_quantity,
                granted,
                remaining: allocation.remaining_pool,
            });
        }
        for (agent_id, agent) in &mut self.agents {
            let collected = allocation.granted_to(agent_id);
            agent.collected_total += collected;
            agent.last_collected = collected;
        }
        self.pool_quantity = remaining;
        Ok(())
    }

    /// Regrow the pool for the next round: double it, capped at `capacity`.
    pub fn regrow(&mut self, capacity: u64) {
        self.pool_quantity = self.pool_quantity.saturating_mul(2).min(capacity);
        self.pool_before_harvest = self.pool_quantity;
        self.threshold = sustainability_threshold(self.pool_quantity, self.agents.len());
        self.conversation.clear();
        self.resource_limit_agreed = None;
    }

    pub fn move_all(&mut self, location: Location) {
        for agent in self.agents.values_mut() {
            agent.location = location;
        }
    }

    pub fn location_by_agent(&self) -> BTreeMap<String, Location> {
        self.agents
            .iter()
            .map(|(agent_id, agent)| (agent_id.clone(), agent.location))
            .collect()
    }
}

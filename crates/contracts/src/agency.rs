//! Agent-facing contracts: submitted actions and the per-phase observations returned to drivers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Location, Phase};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utterance {
    pub speaker_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Harvest,
    Chat,
    Vote,
    Bare,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Harvest => "harvest",
            ActionKind::Chat => "chat",
            ActionKind::Vote => "vote",
            ActionKind::Bare => "bare",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    Harvest {
        agent_id: String,
        location: Location,
        quantity: u64,
    },
    /// One group conversation standing in for every agent at the restaurant.
    Chat {
        agent_id: String,
        location: Location,
        #[serde(default)]
        transcript: Vec<Utterance>,
        #[serde(default)]
        resource_limit_agreed: Option<u64>,
    },
    Vote {
        agent_id: String,
        location: Location,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        reason: String,
    },
    /// Presence only; carries no decision.
    Bare { agent_id: String, location: Location },
}

impl AgentAction {
    pub fn harvest(agent_id: impl Into<String>, quantity: u64) -> Self {
        Self::Harvest {
            agent_id: agent_id.into(),
            location: Location::Pool,
            quantity,
        }
    }

    pub fn chat(
        agent_id: impl Into<String>,
        transcript: Vec<Utterance>,
        resource_limit_agreed: Option<u64>,
    ) -> Self {
        Self::Chat {
            agent_id: agent_id.into(),
            location: Location::Restaurant,
            transcript,
            resource_limit_agreed,
        }
    }

    pub fn vote(
        agent_id: impl Into<String>,
        target: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Vote {
            agent_id: agent_id.into(),
            location: Location::VotingRoom,
            target,
            reason: reason.into(),
        }
    }

    pub fn bare(agent_id: impl Into<String>, location: Location) -> Self {
        Self::Bare {
            agent_id: agent_id.into(),
            location,
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Self::Harvest { agent_id, .. }
            | Self::Chat { agent_id, .. }
            | Self::Vote { agent_id, .. }
            | Self::Bare { agent_id, .. } => agent_id,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Self::Harvest { location, .. }
            | Self::Chat { location, .. }
            | Self::Vote { location, .. }
            | Self::Bare { location, .. } => *location,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Harvest { .. } => ActionKind::Harvest,
            Self::Chat { .. } => ActionKind::Chat,
            Self::Vote { .. } => ActionKind::Vote,
            Self::Bare { .. } => ActionKind::Bare,
        }
    }
}

/// A piece of context handed to memory/retrieval collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextEvent {
    pub text: String,
    pub created: NaiveDateTime,
    pub expiration: NaiveDateTime,
    pub always_include: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceView {
    Amount(u64),
    Suspended,
}

impl ResourceView {
    pub fn amount(self) -> Option<u64> {
        match self {
            ResourceView::Amount(value) => Some(value),
            ResourceView::Suspended => None,
        }
    }
}

impl fmt::Display for ResourceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceView::Amount(value) => write!(f, "{value}"),
            ResourceView::Suspended => f.write_str("SUSPENDED"),
        }
    }
}

/// Read-only snapshot for the active agent; `phase` selects which fields carry meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    pub phase: Phase,
    pub current_location: Location,
    pub location_by_agent: BTreeMap<String, Location>,
    pub current_time: NaiveDateTime,
    pub events: Vec<ContextEvent>,
    pub context: String,
    pub chat: Option<Vec<Utterance>>,
    pub pool_quantity: u64,
    pub pool_before_harvest: u64,
    pub agent_resources: BTreeMap<String, ResourceView>,
    pub threshold: u64,
    pub suspended_agents: BTreeSet<String>,
}

impl Observation {
    pub fn is_suspended(&self, agent_id: &str) -> bool {
        self.suspended_agents.contains(agent_id)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Phase: {}", self.phase)?;
        writeln!(f, "Current Location: {}", self.current_location)?;
        if !self.location_by_agent.is_empty() {
            writeln!(f, "Agents at Locations:")?;
            for (agent_id, location) in &self.location_by_agent {
                writeln!(f, "  {agent_id}: {location}")?;
            }
        }
        writeln!(f, "Current Time: {}", self.current_time)?;
        writeln!(f, "Resources in Pool: {}", self.pool_quantity)?;
        writeln!(f, "Resources Before Harvesting: {}", self.pool_before_harvest)?;
        writeln!(f, "Sustainability Threshold: {}", self.threshold)?;
        if !self.agent_resources.is_empty() {
            writeln!(f, "Agent Resources:")?;
            for (agent_id, view) in &self.agent_resources {
                writeln!(f, "  {agent_id}: {view}")?;
            }
        }
        if !self.suspended_agents.is_empty() {
            let suspended = self
                .suspended_agents
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "Suspended: {suspended}")?;
        }
        if !self.events.is_empty() {
            writeln!(f, "Events:")?;
            for event in &self.events {
                writeln!(f, "  [{}] {}", event.created, event.text)?;
            }
        }
        if let Some(chat) = &self.chat {
            writeln!(f, "Chat:")?;
            for line in chat {
                writeln!(f, "  {}: {}", line.speaker_id, line.text)?;
            }
        }
        if !self.context.is_empty() {
            writeln!(f, "Context: {}", self.context)?;
        }
        Ok(())
    }
}

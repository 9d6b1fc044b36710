//! v1 cross-boundary contracts for the commons kernel, API facade, and persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod agency;
pub mod records;
mod serde_u64_string;

pub use agency::{
    ActionKind, AgentAction, ContextEvent, Observation, ResourceView, Utterance,
};
pub use records::LogRecord;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const DEFAULT_AGENT_COUNT: usize = 5;
pub const DEFAULT_POOL_CAPACITY: u64 = 100;
/// Below this many units left after a round the commons is considered collapsed.
pub const COLLAPSE_POOL_QUANTITY: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Harvest,
    PostHarvestObservation,
    Negotiation,
    Voting,
    Settlement,
}

impl Phase {
    pub const ORDER: [Phase; 5] = [
        Phase::Harvest,
        Phase::PostHarvestObservation,
        Phase::Negotiation,
        Phase::Voting,
        Phase::Settlement,
    ];

    /// Location every action submitted in this phase must declare.
    pub fn expected_location(self) -> Location {
        match self {
            Phase::Harvest | Phase::PostHarvestObservation => Location::Pool,
            Phase::Negotiation => Location::Restaurant,
            Phase::Voting => Location::VotingRoom,
            Phase::Settlement => Location::Home,
        }
    }

    pub fn expected_action(self) -> ActionKind {
        match self {
            Phase::Harvest => ActionKind::Harvest,
            Phase::PostHarvestObservation | Phase::Settlement => ActionKind::Bare,
            Phase::Negotiation => ActionKind::Chat,
            Phase::Voting => ActionKind::Vote,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Harvest => "harvest",
            Phase::PostHarvestObservation => "post_harvest_observation",
            Phase::Negotiation => "negotiation",
            Phase::Voting => "voting",
            Phase::Settlement => "settlement",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Pool,
    Restaurant,
    VotingRoom,
    Home,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Pool => "pool",
            Location::Restaurant => "restaurant",
            Location::VotingRoom => "voting_room",
            Location::Home => "home",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    Stochastic,
    Proportional,
}

impl AllocationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationStrategy::Stochastic => "stochastic",
            AllocationStrategy::Proportional => "proportional",
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "stochastic" => Ok(Self::Stochastic),
            "proportional" => Ok(Self::Proportional),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HarvestingOrder {
    Fixed,
    RandomSequential,
}

impl FromStr for HarvestingOrder {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "fixed" => Ok(Self::Fixed),
            "random-sequential" => Ok(Self::RandomSequential),
            other => Err(ConfigError::UnknownHarvestingOrder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown assign_resource_strategy: {0:?} (expected \"stochastic\" or \"proportional\")")]
    UnknownStrategy(String),
    #[error("unknown harvesting_order: {0:?} (expected \"fixed\" or \"random-sequential\")")]
    UnknownHarvestingOrder(String),
    #[error("num_agents must be at least 1, got {0}")]
    InvalidAgentCount(usize),
}

/// Episode configuration as supplied by a config file or the CLI.
///
/// Strategy and turn order stay raw strings so that an unrecognized value is
/// reported by [`RunConfig::validate`] instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub num_agents: usize,
    pub initial_resource_in_pool: u64,
    pub assign_resource_strategy: String,
    pub max_num_rounds: u64,
    pub harvesting_order: String,
    pub inject_universalization: bool,
    pub agent_names: BTreeMap<String, String>,
    pub start_time: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<EnvSettings, ConfigError> {
        if self.num_agents == 0 {
            return Err(ConfigError::InvalidAgentCount(self.num_agents));
        }
        Ok(EnvSettings {
            num_agents: self.num_agents,
            pool_capacity: self.initial_resource_in_pool,
            strategy: self.assign_resource_strategy.parse()?,
            harvesting_order: self.harvesting_order.parse()?,
            max_rounds: self.max_num_rounds,
            inject_universalization: self.inject_universalization,
        })
    }

    pub fn display_name<'a>(&'a self, agent_id: &'a str) -> &'a str {
        self.agent_names
            .get(agent_id)
            .map(String::as_str)
            .unwrap_or(agent_id)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "commons_local_001".to_string(),
            seed: 1337,
            num_agents: DEFAULT_AGENT_COUNT,
            initial_resource_in_pool: DEFAULT_POOL_CAPACITY,
            assign_resource_strategy: AllocationStrategy::Stochastic.as_str().to_string(),
            max_num_rounds: 12,
            harvesting_order: "fixed".to_string(),
            inject_universalization: false,
            agent_names: BTreeMap::new(),
            start_time: default_start_time(),
            notes: None,
        }
    }
}

pub fn default_start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|date| date.and_hms_opt(1, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Validated, typed view of a [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSettings {
    pub num_agents: usize,
    pub pool_capacity: u64,
    pub strategy: AllocationStrategy,
    pub harvesting_order: HarvestingOrder,
    pub max_rounds: u64,
    pub inject_universalization: bool,
}

//! The commons environment: a turn-based state machine over five phases.
//!
//! One `Environment` owns the episode state, both turn cyclers, the seeded
//! RNG stream and the buffer of structured records for the current round.
//! Drivers call [`Environment::reset`] once and then [`Environment::step`]
//! with the active agent's action until every agent is terminated.
use std::collections::BTreeMap;

mod init;
mod step;

pub use init::default_agent_ids;

use contracts::{
    AgentAction, EnvSettings, HarvestingOrder, Location, LogRecord, Observation, Phase, RunConfig,
    Utterance, COLLAPSE_POOL_QUANTITY,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::calendar::{discussion_day, reflection_day};
use crate::economy::allocate;
use crate::error::{ContractViolation, EnvError};
use crate::perception::ObservationBuilder;
use crate::prompts::{PromptTextProvider, StandardPrompts};
use crate::scheduler::TurnCycler;
use crate::sink::{MemoryLogSink, SinkError, StructuredLogSink};
use crate::state::{sustainability_threshold, RoundState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Explicit agent ids in turn order; defaults to `persona_0 .. persona_{N-1}`.
    pub agent_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub next_agent: String,
    pub observation: Observation,
    /// Cumulative granted quantity per agent since reset.
    pub rewards: BTreeMap<String, u64>,
    pub terminations: BTreeMap<String, bool>,
}

pub struct Environment<S: StructuredLogSink = MemoryLogSink> {
    config: RunConfig,
    settings: EnvSettings,
    prompts: Box<dyn PromptTextProvider>,
    sink: S,
    episode: Option<Episode>,
}

#[derive(Debug, Clone)]
struct Episode {
    /// Agent ids in the order given at reset.
    agents: Vec<String>,
    state: RoundState,
    agent_cycle: TurnCycler<String>,
    phase_cycle: TurnCycler<Phase>,
    rng: StdRng,
    /// Completed rounds.
    round: u64,
    terminated: bool,
    /// Records of the round in progress, handed to the sink at settlement.
    pending: Vec<LogRecord>,
    /// The sink already holds this round's `RoundSettled` record.
    settled_logged: bool,
}

impl Episode {
    fn phase(&self) -> Phase {
        self.phase_cycle.current().copied().unwrap_or(Phase::Harvest)
    }

    fn active_agent(&self) -> Option<&str> {
        self.agent_cycle.current().map(String::as_str)
    }

    fn rewards(&self) -> BTreeMap<String, u64> {
        self.state
            .agents
            .iter()
            .map(|(agent_id, agent)| (agent_id.clone(), agent.collected_total))
            .collect()
    }

    fn terminations(&self) -> BTreeMap<String, bool> {
        self.agents
            .iter()
            .map(|agent_id| (agent_id.clone(), self.terminated))
            .collect()
    }
}

impl<S: StructuredLogSink> Environment<S> {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    /// Agent ids in reset order; empty before the first reset.
    pub fn agents(&self) -> &[String] {
        self.episode
            .as_ref()
            .map(|episode| episode.agents.as_slice())
            .unwrap_or(&[])
    }

    pub fn phase(&self) -> Option<Phase> {
        self.episode.as_ref().map(Episode::phase)
    }

    pub fn active_agent(&self) -> Option<&str> {
        self.episode.as_ref().and_then(Episode::active_agent)
    }

    /// Number of completed rounds.
    pub fn round(&self) -> u64 {
        self.episode.as_ref().map_or(0, |episode| episode.round)
    }

    pub fn state(&self) -> Option<&RoundState> {
        self.episode.as_ref().map(|episode| &episode.state)
    }

    pub fn rewards(&self) -> BTreeMap<String, u64> {
        self.episode
            .as_ref()
            .map(Episode::rewards)
            .unwrap_or_default()
    }

    pub fn terminations(&self) -> BTreeMap<String, bool> {
        self.episode
            .as_ref()
            .map(Episode::terminations)
            .unwrap_or_default()
    }

    pub fn is_terminated(&self) -> bool {
        self.episode
            .as_ref()
            .is_some_and(|episode| episode.terminated)
    }

    /// Records buffered for the round in progress.
    pub fn pending_records(&self) -> &[LogRecord] {
        self.episode
            .as_ref()
            .map(|episode| episode.pending.as_slice())
            .unwrap_or(&[])
    }

    pub fn log_sink(&self) -> &S {
        &self.sink
    }

    pub fn log_sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Observation for `agent_id` in the current phase.
    pub fn observe(&self, agent_id: &str) -> Result<Observation, EnvError> {
        let episode = self.episode.as_ref().ok_or(EnvError::NotReset)?;
        observe_episode(episode, &self.config, self.prompts.as_ref(), agent_id)
    }
}

fn observe_episode(
    episode: &Episode,
    config: &RunConfig,
    prompts: &dyn PromptTextProvider,
    agent_id: &str,
) -> Result<Observation, EnvError> {
    ObservationBuilder::new(&episode.state, config, prompts)
        .build(episode.phase(), agent_id)
        .ok_or_else(|| ContractViolation::UnknownAgent(agent_id.to_string()).into())
}

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use rand::SeedableRng;

use super::*;

impl Environment<MemoryLogSink> {
    /// Build an environment that keeps its structured records in memory.
    pub fn new(config: RunConfig) -> Result<Self, EnvError> {
        Self::with_sink(config, MemoryLogSink::default())
    }
}

impl<S: StructuredLogSink> Environment<S> {
    /// Validate `config` and attach `sink`. An unknown strategy or turn order fails here,
    /// never later during a step.
    pub fn with_sink(config: RunConfig, sink: S) -> Result<Self, EnvError> {
        let settings = config.validate()?;
        Ok(Self {
            config,
            settings,
            prompts: Box::new(StandardPrompts),
            sink,
            episode: None,
        })
    }

    pub fn with_prompts(mut self, prompts: impl PromptTextProvider + 'static) -> Self {
        self.prompts = Box::new(prompts);
        self
    }

    /// Start a fresh episode and return the first agent to act with its observation.
    ///
    /// Any episode in progress is discarded, including its unflushed records.
    pub fn reset(
        &mut self,
        seed: u64,
        options: ResetOptions,
    ) -> Result<(String, Observation), EnvError> {
        let agents = match options.agent_ids {
            Some(agent_ids) => checked_agent_ids(agent_ids, self.settings.num_agents)?,
            None => default_agent_ids(self.settings.num_agents),
        };
        let invalid = || ContractViolation::InvalidResetOptions("empty agent list".to_string());
        let mut agent_cycle = TurnCycler::new(agents.clone()).ok_or_else(invalid)?;
        let mut phase_cycle = TurnCycler::new(Phase::ORDER.to_vec()).ok_or_else(invalid)?;
        let first_agent = agent_cycle.next().clone();
        phase_cycle.next();

        let episode = Episode {
            state: RoundState::new(&agents, self.settings.pool_capacity, self.config.start_time),
            agents,
            agent_cycle,
            phase_cycle,
            rng: StdRng::seed_from_u64(seed),
            round: 0,
            terminated: false,
            pending: Vec::new(),
            settled_logged: false,
        };
        info!(
            run_id = %self.config.run_id,
            seed,
            agents = episode.agents.len(),
            pool = episode.state.pool_quantity,
            strategy = self.settings.strategy.as_str(),
            "episode reset"
        );
        let observation =
            observe_episode(&episode, &self.config, self.prompts.as_ref(), &first_agent)?;
        self.episode = Some(episode);
        Ok((first_agent, observation))
    }
}

pub fn default_agent_ids(num_agents: usize) -> Vec<String> {
    (0..num_agents).map(|idx| format!("persona_{idx}")).collect()
}

fn checked_agent_ids(
    agent_ids: Vec<String>,
    num_agents: usize,
) -> Result<Vec<String>, ContractViolation> {
    if agent_ids.len() != num_agents {
        return Err(ContractViolation::InvalidResetOptions(format!(
            "expected {num_agents} agent ids, got {}",
            agent_ids.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for agent_id in &agent_ids {
        if agent_id.trim().is_empty() {
            return Err(ContractViolation::InvalidResetOptions(
                "agent ids must not be blank".to_string(),
            ));
        }
        if !seen.insert(agent_id.as_str()) {
            return Err(ContractViolation::InvalidResetOptions(format!(
                "duplicate agent id {agent_id}"
            )));
        }
    }
    Ok(agent_ids)
}

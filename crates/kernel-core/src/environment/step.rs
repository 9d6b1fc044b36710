use chrono::Duration;

use super::*;

impl<S: StructuredLogSink> Environment<S> {
    /// Apply the active agent's action and return the next agent with its observation.
    ///
    /// Returns `Ok(None)` without touching anything once the episode has terminated.
    pub fn step(&mut self, action: AgentAction) -> Result<Option<StepOutcome>, EnvError> {
        let episode = self.episode.as_mut().ok_or(EnvError::NotReset)?;
        if episode.terminated {
            debug!(agent = action.agent_id(), "step ignored, episode terminated");
            return Ok(None);
        }
        let phase = episode.phase();
        episode.validate(phase, &action)?;
        debug!(
            agent = action.agent_id(),
            phase = %phase,
            round = episode.round,
            "step"
        );

        match (phase, action) {
            (Phase::Harvest, AgentAction::Harvest { agent_id, quantity, .. }) => {
                episode.step_harvest(&self.settings, &agent_id, quantity)?;
            }
            (Phase::PostHarvestObservation, AgentAction::Bare { agent_id, .. }) => {
                episode.step_post_harvest(&agent_id);
            }
            (
                Phase::Negotiation,
                AgentAction::Chat {
                    agent_id,
                    transcript,
                    resource_limit_agreed,
                    ..
                },
            ) => {
                episode.step_negotiation(&agent_id, transcript, resource_limit_agreed);
            }
            (
                Phase::Voting,
                AgentAction::Vote {
                    agent_id,
                    target,
                    reason,
                    ..
                },
            ) => {
                episode.step_voting(&agent_id, target.as_deref(), &reason);
            }
            (Phase::Settlement, AgentAction::Bare { agent_id, .. }) => {
                episode.step_settlement(&self.settings, &mut self.sink, &agent_id)?;
            }
            (phase, action) => {
                return Err(ContractViolation::UnexpectedAction {
                    phase,
                    expected: phase.expected_action(),
                    actual: action.kind(),
                }
                .into());
            }
        }

        let next_agent = episode
            .active_agent()
            .map(str::to_string)
            .ok_or(EnvError::NotReset)?;
        let observation =
            observe_episode(episode, &self.config, self.prompts.as_ref(), &next_agent)?;
        Ok(Some(StepOutcome {
            next_agent,
            observation,
            rewards: episode.rewards(),
            terminations: episode.terminations(),
        }))
    }

    /// Hand the records buffered for the round in progress to the sink and flush it.
    pub fn flush_log(&mut self) -> Result<(), EnvError> {
        let Some(episode) = self.episode.as_mut() else {
            return Ok(());
        };
        episode.drain_pending(&mut self.sink)?;
        self.sink.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Episode {
    fn validate(&self, phase: Phase, action: &AgentAction) -> Result<(), ContractViolation> {
        let expected = self.active_agent().unwrap_or_default();
        if action.agent_id() != expected {
            return Err(ContractViolation::WrongAgent {
                expected: expected.to_string(),
                actual: action.agent_id().to_string(),
            });
        }
        if action.kind() != phase.expected_action() {
            return Err(ContractViolation::UnexpectedAction {
                phase,
                expected: phase.expected_action(),
                actual: action.kind(),
            });
        }
        if action.location() != phase.expected_location() {
            return Err(ContractViolation::WrongLocation {
                phase,
                expected: phase.expected_location(),
                actual: action.location(),
            });
        }
        if let AgentAction::Vote {
            target: Some(target),
            ..
        } = action
        {
            if !self.state.agents.contains_key(target) {
                return Err(ContractViolation::UnknownAgent(target.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Phase handlers
// ---------------------------------------------------------------------------

impl Episode {
    fn step_harvest(
        &mut self,
        settings: &EnvSettings,
        agent_id: &str,
        quantity: u64,
    ) -> Result<(), EnvError> {
        let effective = self.state.record_request(agent_id, quantity);
        if effective != quantity {
            debug!(agent = agent_id, quantity, "suspended agent's request forced to zero");
        }
        if self.agent_cycle.is_last() {
            self.allocate_pool(settings)?;
            self.phase_cycle.next();
        }
        self.agent_cycle.next();
        Ok(())
    }

    fn allocate_pool(&mut self, settings: &EnvSettings) -> Result<(), EnvError> {
        let pool_before = self.state.pool_quantity;
        let wanted = self.state.wanted();
        let allocation = allocate(settings.strategy, pool_before, &wanted, &mut self.rng)?;
        self.state.apply_allocation(&allocation)?;

        for agent_id in self.agent_cycle.tokens() {
            let Some(agent) = self.state.agent(agent_id) else {
                continue;
            };
            self.pending.push(LogRecord::Harvest {
                round: self.round,
                agent_id: agent_id.clone(),
                pool_before_harvest: pool_before,
                pool_after_harvest: self.state.pool_quantity,
                wanted: agent.submitted,
                effective_wanted: agent.wanted,
                collected: allocation.granted_to(agent_id),
                suspended: self.state.is_suspended(agent_id),
            });
        }
        info!(
            round = self.round,
            strategy = settings.strategy.as_str(),
            pool_before,
            pool_after = self.state.pool_quantity,
            granted = allocation.total_granted(),
            "harvest allocated"
        );
        Ok(())
    }

    fn step_post_harvest(&mut self, agent_id: &str) {
        if let Some(agent) = self.state.agents.get_mut(agent_id) {
            agent.location = Location::Restaurant;
            agent.time = discussion_day(agent.time);
        }
        if self.agent_cycle.is_last() {
            self.phase_cycle.next();
        }
        self.agent_cycle.next();
    }

    /// One chat closes the negotiation for everybody.
    fn step_negotiation(
        &mut self,
        agent_id: &str,
        transcript: Vec<Utterance>,
        resource_limit: Option<u64>,
    ) {
        for utterance in &transcript {
            self.pending.push(LogRecord::Utterance {
                round: self.round,
                agent_id: utterance.speaker_id.clone(),
                resource_limit,
                text: utterance.text.clone(),
            });
        }
        self.pending.push(LogRecord::ConversationSummary {
            round: self.round,
            reported_by: agent_id.to_string(),
            resource_limit,
            utterances: transcript.len(),
        });
        debug!(
            reported_by = agent_id,
            utterances = transcript.len(),
            ?resource_limit,
            "negotiation closed"
        );
        self.state.conversation = transcript;
        self.state.resource_limit_agreed = resource_limit;

        for agent in self.state.agents.values_mut() {
            agent.location = Location::VotingRoom;
            agent.time = reflection_day(agent.time);
        }
        self.phase_cycle.next();
        self.agent_cycle.reset();
    }

    fn step_voting(&mut self, agent_id: &str, target: Option<&str>, reason: &str) {
        if self.agent_cycle.is_first() {
            self.state.votes.begin_round(&mut self.state.suspended);
        }
        self.state.votes.cast(agent_id, target, reason);

        if self.agent_cycle.is_last() {
            let outcome = self
                .state
                .votes
                .tally(self.agents.len(), &mut self.state.suspended);
            info!(
                round = self.round,
                active_agents = outcome.active_agents,
                votes = ?outcome.vote_counts,
                suspended = ?self.state.suspended,
                "votes tallied"
            );
            self.pending.push(LogRecord::VoteTally {
                round: self.round,
                vote_counts: outcome.vote_counts,
                reasons: outcome.reasons,
                suspended: self.state.suspended.clone(),
            });
            self.state.move_all(Location::Home);
            self.phase_cycle.next();
        }
        self.agent_cycle.next();
    }

    fn step_settlement<S: StructuredLogSink>(
        &mut self,
        settings: &EnvSettings,
        sink: &mut S,
        agent_id: &str,
    ) -> Result<(), EnvError> {
        if !self.agent_cycle.is_last() {
            self.head_back_to_pool(agent_id);
            self.agent_cycle.next();
            return Ok(());
        }

        // Everything that can fail runs before the round is committed.
        let completed = self.round + 1;
        let terminated =
            self.state.pool_quantity < COLLAPSE_POOL_QUANTITY || completed >= settings.max_rounds;
        let next_pool = self
            .state
            .pool_quantity
            .saturating_mul(2)
            .min(settings.pool_capacity);
        let next_threshold = sustainability_threshold(next_pool, self.agents.len());
        // A retried settlement resumes after whatever the sink already accepted.
        self.drain_pending(sink)?;
        if !self.settled_logged {
            sink.append(LogRecord::RoundSettled {
                round: self.round,
                pool_after_growth: next_pool,
                threshold: next_threshold,
                terminated,
            })?;
            self.settled_logged = true;
        }
        sink.flush()?;
        self.settled_logged = false;

        self.head_back_to_pool(agent_id);
        let pool_left = self.state.pool_quantity;
        self.round = completed;
        self.terminated = terminated;
        self.state.regrow(settings.pool_capacity);
        self.phase_cycle.next();
        if settings.harvesting_order == HarvestingOrder::RandomSequential {
            let mut order = self.agents.clone();
            order.shuffle(&mut self.rng);
            self.agent_cycle.reinit(order);
        }
        self.agent_cycle.next();
        info!(
            round = self.round,
            pool_left,
            pool = self.state.pool_quantity,
            threshold = self.state.threshold,
            terminated,
            "round settled"
        );
        Ok(())
    }

    /// Append buffered records in order, dropping each one the sink accepted.
    fn drain_pending<S: StructuredLogSink>(&mut self, sink: &mut S) -> Result<(), SinkError> {
        let mut written = 0;
        let result: Result<(), SinkError> = self.pending.iter().try_for_each(|record| {
            sink.append(record.clone())?;
            written += 1;
            Ok(())
        });
        self.pending.drain(..written);
        result
    }

    fn head_back_to_pool(&mut self, agent_id: &str) {
        if let Some(agent) = self.state.agents.get_mut(agent_id) {
            agent.location = Location::Pool;
            agent.time += Duration::days(1);
        }
    }
}

//! Observation building: projects `RoundState` and the current phase into the
//! snapshot handed to the active agent.
//!
//! Each phase reveals a different slice of the state. During harvest the
//! per-agent column is zeroed (nobody has fished yet); during negotiation it
//! shows what everyone caught; during voting it also marks suspended agents.

use std::collections::BTreeMap;

use chrono::Duration;
use contracts::{ContextEvent, Observation, Phase, ResourceView, RunConfig};

use crate::calendar::{discussion_day, event_expiration};
use crate::prompts::{HarvestResult, PromptTextProvider};
use crate::state::{AgentRoundState, RoundState};

pub const NEGOTIATION_CONTEXT: &str = "Conversation phase";
pub const VOTING_CONTEXT: &str =
    "Voting phase: You may vote to suspend one agent from harvesting in the next round";

// ---------------------------------------------------------------------------
// ObservationBuilder
// ---------------------------------------------------------------------------

/// Borrowed view over everything an observation is derived from.
pub struct ObservationBuilder<'a> {
    pub state: &'a RoundState,
    pub config: &'a RunConfig,
    pub prompts: &'a dyn PromptTextProvider,
}

impl<'a> ObservationBuilder<'a> {
    pub fn new(
        state: &'a RoundState,
        config: &'a RunConfig,
        prompts: &'a dyn PromptTextProvider,
    ) -> Self {
        Self {
            state,
            config,
            prompts,
        }
    }

    /// Observation for `agent_id` in `phase`, or `None` if the agent is not in the episode.
    pub fn build(&self, phase: Phase, agent_id: &str) -> Option<Observation> {
        let agent = self.state.agent(agent_id)?;
        let observation = match phase {
            Phase::Harvest => self.observe_pool(phase, agent),
            Phase::PostHarvestObservation => self.observe_harvest_result(phase, agent_id, agent),
            Phase::Negotiation => self.observe_restaurant(phase, agent),
            Phase::Voting => self.observe_voting(phase, agent),
            Phase::Settlement => self.base(phase, agent),
        };
        Some(observation)
    }

    /// Shared fields; events empty and per-agent resources hidden.
    fn base(&self, phase: Phase, agent: &AgentRoundState) -> Observation {
        Observation {
            phase,
            current_location: agent.location,
            location_by_agent: self.state.location_by_agent(),
            current_time: agent.time,
            events: Vec::new(),
            context: String::new(),
            chat: None,
            pool_quantity: self.state.pool_quantity,
            pool_before_harvest: self.state.pool_before_harvest,
            agent_resources: self
                .state
                .agents
                .keys()
                .map(|agent_id| (agent_id.clone(), ResourceView::Amount(0)))
                .collect(),
            threshold: self.state.threshold,
            suspended_agents: self.state.suspended.clone(),
        }
    }

    fn observe_pool(&self, phase: Phase, agent: &AgentRoundState) -> Observation {
        let mut observation = self.base(phase, agent);
        observation.events.push(ContextEvent {
            text: self.prompts.pool_quantity(self.state.pool_quantity),
            created: agent.time,
            expiration: event_expiration(agent.time),
            always_include: true,
        });
        if self.config.inject_universalization {
            observation.events.push(ContextEvent {
                text: self.prompts.universalization(self.state.threshold),
                created: agent.time,
                expiration: event_expiration(agent.time),
                always_include: true,
            });
        }
        observation
    }

    fn observe_harvest_result(
        &self,
        phase: Phase,
        agent_id: &str,
        agent: &AgentRoundState,
    ) -> Observation {
        let mut observation = self.base(phase, agent);
        let text = self.prompts.harvest_result(HarvestResult {
            agent_id,
            submitted: agent.submitted,
            collected: agent.last_collected,
            pool_before: self.state.pool_before_harvest,
            pool_after: self.state.pool_quantity,
            suspended: self.state.is_suspended(agent_id),
        });
        // One minute early so it sorts ahead of anything else dated on the discussion day.
        observation.events.push(ContextEvent {
            text,
            created: discussion_day(agent.time) - Duration::minutes(1),
            expiration: event_expiration(agent.time),
            always_include: true,
        });
        observation
    }

    fn observe_restaurant(&self, phase: Phase, agent: &AgentRoundState) -> Observation {
        let mut observation = self.base(phase, agent);
        observation.context = NEGOTIATION_CONTEXT.to_string();
        observation.agent_resources = self
            .state
            .agents
            .iter()
            .map(|(agent_id, entry)| (agent_id.clone(), ResourceView::Amount(entry.last_collected)))
            .collect();
        observation
    }

    /// Display name, or the id itself when the name would clash with another agent's entry.
    fn report_label(&self, agent_id: &str) -> String {
        let name = self.config.display_name(agent_id);
        let ambiguous = self.state.agents.keys().any(|other_id| {
            other_id != agent_id
                && (other_id == name || self.config.display_name(other_id) == name)
        });
        if ambiguous {
            agent_id.to_string()
        } else {
            name.to_string()
        }
    }

    fn observe_voting(&self, phase: Phase, agent: &AgentRoundState) -> Observation {
        let mut observation = self.base(phase, agent);
        let resources = self
            .state
            .agents
            .iter()
            .map(|(agent_id, entry)| {
                let view = if self.state.is_suspended(agent_id) {
                    ResourceView::Suspended
                } else {
                    ResourceView::Amount(entry.last_collected)
                };
                (agent_id.clone(), view)
            })
            .collect::<BTreeMap<_, _>>();
        let report = resources
            .iter()
            .map(|(agent_id, view)| (self.report_label(agent_id), *view))
            .collect::<BTreeMap<_, _>>();

        observation.events.push(ContextEvent {
            text: self.prompts.harvest_report(&report),
            created: agent.time,
            expiration: event_expiration(agent.time),
            always_include: true,
        });
        observation.context = VOTING_CONTEXT.to_string();
        observation.chat = Some(self.state.conversation.clone());
        observation.agent_resources = resources;
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::StandardPrompts;
    use contracts::Location;

    fn fixture() -> (RoundState, RunConfig) {
        let ids = vec!["persona_0".to_string(), "persona_1".to_string()];
        let config = RunConfig {
            num_agents: 2,
            ..RunConfig::default()
        };
        let mut state = RoundState::new(&ids, 100, config.start_time);
        for (agent_id, collected) in [("persona_0", 12_u64), ("persona_1", 30_u64)] {
            if let Some(agent) = state.agents.get_mut(agent_id) {
                agent.last_collected = collected;
                agent.submitted = collected;
            }
        }
        state.pool_quantity = 58;
        (state, config)
    }

    #[test]
    fn harvest_observation_hides_resources_and_reports_pool() {
        let (state, mut config) = fixture();
        config.inject_universalization = true;
        let builder = ObservationBuilder::new(&state, &config, &StandardPrompts);
        let observation = builder.build(Phase::Harvest, "persona_0").expect("known agent");
        assert_eq!(observation.events.len(), 2);
        assert!(observation.events.iter().all(|event| event.always_include));
        assert!(observation
            .agent_resources
            .values()
            .all(|view| *view == ResourceView::Amount(0)));
        assert_eq!(observation.current_location, Location::Pool);
    }

    #[test]
    fn post_harvest_event_is_dated_before_discussion_day() {
        let (state, config) = fixture();
        let builder = ObservationBuilder::new(&state, &config, &StandardPrompts);
        let observation = builder
            .build(Phase::PostHarvestObservation, "persona_1")
            .expect("known agent");
        let event = &observation.events[0];
        assert_eq!(event.created, discussion_day(state.agents["persona_1"].time) - Duration::minutes(1));
        assert!(event.text.contains("caught 30"));
    }

    #[test]
    fn voting_observation_marks_suspended_and_uses_names() {
        let (mut state, mut config) = fixture();
        state.suspended.insert("persona_1".to_string());
        config
            .agent_names
            .insert("persona_0".to_string(), "John".to_string());
        let builder = ObservationBuilder::new(&state, &config, &StandardPrompts);
        let observation = builder.build(Phase::Voting, "persona_0").expect("known agent");
        assert_eq!(observation.agent_resources["persona_1"], ResourceView::Suspended);
        assert_eq!(observation.agent_resources["persona_0"], ResourceView::Amount(12));
        assert!(observation.events[0].text.contains("John: 12"));
        assert!(observation.events[0].text.contains("persona_1: SUSPENDED"));
        assert_eq!(observation.context, VOTING_CONTEXT);
        assert_eq!(observation.chat, Some(Vec::new()));
    }

    #[test]
    fn voting_report_keeps_agents_sharing_a_name_apart() {
        let (state, mut config) = fixture();
        for agent_id in ["persona_0", "persona_1"] {
            config
                .agent_names
                .insert(agent_id.to_string(), "Alex".to_string());
        }
        let builder = ObservationBuilder::new(&state, &config, &StandardPrompts);
        let observation = builder.build(Phase::Voting, "persona_0").expect("known agent");
        let report = &observation.events[0].text;
        assert!(report.contains("persona_0: 12"));
        assert!(report.contains("persona_1: 30"));
        assert!(!report.contains("Alex"));
    }

    #[test]
    fn negotiation_shows_last_collected_and_settlement_hides_it() {
        let (state, config) = fixture();
        let builder = ObservationBuilder::new(&state, &config, &StandardPrompts);
        let talk = builder.build(Phase::Negotiation, "persona_0").expect("known agent");
        assert_eq!(talk.agent_resources["persona_1"], ResourceView::Amount(30));
        assert_eq!(talk.context, NEGOTIATION_CONTEXT);

        let home = builder.build(Phase::Settlement, "persona_0").expect("known agent");
        assert!(home.events.is_empty());
        assert_eq!(home.agent_resources["persona_1"], ResourceView::Amount(0));
        assert!(builder.build(Phase::Settlement, "nobody").is_none());
    }
}

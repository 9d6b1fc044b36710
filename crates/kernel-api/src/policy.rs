//! Scripted baseline that drives episodes without a language model.

use contracts::{AgentAction, Observation, Phase, Utterance};

/// Plays the sustainable strategy: fish up to the threshold, agree on it,
/// vote against whoever overshot it the most.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptedPolicy {
    fixed_harvest: Option<u64>,
}

impl ScriptedPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always request `quantity` instead of the threshold.
    pub fn with_fixed_harvest(quantity: u64) -> Self {
        Self {
            fixed_harvest: Some(quantity),
        }
    }

    pub fn act(&self, agent_id: &str, observation: &Observation) -> AgentAction {
        match observation.phase {
            Phase::Harvest => {
                let quantity = if observation.is_suspended(agent_id) {
                    0
                } else {
                    self.fixed_harvest
                        .unwrap_or(observation.threshold)
                        .min(observation.pool_quantity)
                };
                AgentAction::harvest(agent_id, quantity)
            }
            Phase::Negotiation => {
                let limit = observation.threshold;
                let transcript = vec![Utterance {
                    speaker_id: agent_id.to_string(),
                    text: format!("Let's each catch at most {limit} tons this month."),
                }];
                AgentAction::chat(agent_id, transcript, Some(limit))
            }
            Phase::Voting => match worst_offender(agent_id, observation) {
                Some((target, collected)) => AgentAction::vote(
                    agent_id,
                    Some(target),
                    format!(
                        "caught {collected} tons against a limit of {}",
                        observation.threshold
                    ),
                ),
                None => AgentAction::vote(agent_id, None, ""),
            },
            phase @ (Phase::PostHarvestObservation | Phase::Settlement) => {
                AgentAction::bare(agent_id, phase.expected_location())
            }
        }
    }
}

/// Agent other than `voter` whose last harvest exceeded the threshold by the most.
fn worst_offender(voter: &str, observation: &Observation) -> Option<(String, u64)> {
    let mut worst: Option<(String, u64)> = None;
    for (agent_id, view) in &observation.agent_resources {
        let Some(collected) = view.amount() else {
            continue;
        };
        if agent_id == voter || collected <= observation.threshold {
            continue;
        }
        if worst.as_ref().map_or(true, |(_, best)| collected > *best) {
            worst = Some((agent_id.clone(), collected));
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use contracts::{default_start_time, Location, ResourceView};

    use super::*;

    fn observation(phase: Phase, resources: &[(&str, ResourceView)]) -> Observation {
        Observation {
            phase,
            current_location: phase.expected_location(),
            location_by_agent: BTreeMap::new(),
            current_time: default_start_time(),
            events: Vec::new(),
            context: String::new(),
            chat: None,
            pool_quantity: 40,
            pool_before_harvest: 100,
            agent_resources: resources
                .iter()
                .map(|(agent_id, view)| (agent_id.to_string(), *view))
                .collect(),
            threshold: 10,
            suspended_agents: BTreeSet::new(),
        }
    }

    #[test]
    fn harvests_threshold_capped_by_pool() {
        let mut obs = observation(Phase::Harvest, &[]);
        let action = ScriptedPolicy::new().act("persona_0", &obs);
        assert_eq!(action, AgentAction::harvest("persona_0", 10));

        let greedy = ScriptedPolicy::with_fixed_harvest(60).act("persona_0", &obs);
        assert_eq!(greedy, AgentAction::harvest("persona_0", 40));

        obs.suspended_agents.insert("persona_0".to_string());
        let suspended = ScriptedPolicy::with_fixed_harvest(60).act("persona_0", &obs);
        assert_eq!(suspended, AgentAction::harvest("persona_0", 0));
    }

    #[test]
    fn votes_against_largest_overshoot_but_not_self() {
        let obs = observation(
            Phase::Voting,
            &[
                ("persona_0", ResourceView::Amount(30)),
                ("persona_1", ResourceView::Amount(12)),
                ("persona_2", ResourceView::Amount(25)),
                ("persona_3", ResourceView::Suspended),
            ],
        );
        let policy = ScriptedPolicy::new();
        assert!(matches!(
            policy.act("persona_1", &obs),
            AgentAction::Vote { target: Some(ref target), .. } if target == "persona_0"
        ));
        assert!(matches!(
            policy.act("persona_0", &obs),
            AgentAction::Vote { target: Some(ref target), .. } if target == "persona_2"
        ));
    }

    #[test]
    fn abstains_when_nobody_overshot() {
        let obs = observation(
            Phase::Voting,
            &[
                ("persona_0", ResourceView::Amount(10)),
                ("persona_1", ResourceView::Amount(3)),
            ],
        );
        assert!(matches!(
            ScriptedPolicy::new().act("persona_1", &obs),
            AgentAction::Vote { target: None, .. }
        ));
    }

    #[test]
    fn presence_phases_declare_expected_location() {
        let policy = ScriptedPolicy::new();
        let home = policy.act("persona_0", &observation(Phase::Settlement, &[]));
        assert_eq!(home, AgentAction::bare("persona_0", Location::Home));
        let lake = policy.act("persona_0", &observation(Phase::PostHarvestObservation, &[]));
        assert_eq!(lake, AgentAction::bare("persona_0", Location::Pool));
        let chat = policy.act("persona_0", &observation(Phase::Negotiation, &[]));
        assert!(matches!(
            chat,
            AgentAction::Chat { resource_limit_agreed: Some(10), ref transcript, .. } if transcript.len() == 1
        ));
    }
}

use super::*;
use contracts::{ConfigError, ResourceView};

fn config(strategy: &str, max_rounds: u64) -> RunConfig {
    RunConfig {
        assign_resource_strategy: strategy.to_string(),
        max_num_rounds: max_rounds,
        ..RunConfig::default()
    }
}

fn ready(config: RunConfig) -> Environment {
    let mut env = Environment::new(config).expect("valid config");
    env.reset(7, ResetOptions::default()).expect("reset");
    env
}

fn active(env: &Environment) -> String {
    env.active_agent().expect("episode running").to_string()
}

fn harvest_all(env: &mut Environment, quantity: impl Fn(&str) -> u64) -> StepOutcome {
    let mut last = None;
    for _ in 0..env.agents().len() {
        let agent = active(env);
        let q = quantity(&agent);
        last = env.step(AgentAction::harvest(agent, q)).expect("harvest step");
    }
    last.expect("outcome")
}

fn bare_all(env: &mut Environment, location: Location) {
    for _ in 0..env.agents().len() {
        let agent = active(env);
        env.step(AgentAction::bare(agent, location))
            .expect("bare step");
    }
}

fn chat(env: &mut Environment) {
    let agent = active(env);
    let transcript = vec![
        Utterance {
            speaker_id: agent.clone(),
            text: "Let's keep it at ten each.".to_string(),
        },
        Utterance {
            speaker_id: "persona_1".to_string(),
            text: "Agreed.".to_string(),
        },
    ];
    env.step(AgentAction::chat(agent, transcript, Some(10)))
        .expect("chat step");
}

fn vote_all(env: &mut Environment, ballot: impl Fn(&str) -> Option<String>) {
    for _ in 0..env.agents().len() {
        let agent = active(env);
        let target = ballot(&agent);
        env.step(AgentAction::vote(agent, target, "took too much"))
            .expect("vote step");
    }
}

fn play_round(
    env: &mut Environment,
    quantity: impl Fn(&str) -> u64,
    ballot: impl Fn(&str) -> Option<String>,
) {
    harvest_all(env, quantity);
    bare_all(env, Location::Pool);
    chat(env);
    vote_all(env, ballot);
    bare_all(env, Location::Home);
}

#[test]
fn reset_returns_first_agent_in_harvest_phase() {
    let mut env = Environment::new(RunConfig::default()).expect("valid config");
    let (agent, observation) = env.reset(1, ResetOptions::default()).expect("reset");
    assert_eq!(agent, "persona_0");
    assert_eq!(observation.phase, Phase::Harvest);
    assert_eq!(observation.pool_quantity, 100);
    assert_eq!(observation.threshold, 10);
    assert_eq!(env.agents().len(), 5);
    assert_eq!(env.round(), 0);
    assert!(!env.is_terminated());
}

#[test]
fn unknown_strategy_fails_at_construction() {
    let result = Environment::new(config("greedy", 12));
    assert!(matches!(
        result,
        Err(EnvError::Config(ConfigError::UnknownStrategy(ref value))) if value == "greedy"
    ));
}

#[test]
fn step_before_reset_is_rejected() {
    let mut env = Environment::new(RunConfig::default()).expect("valid config");
    let result = env.step(AgentAction::harvest("persona_0", 3));
    assert!(matches!(result, Err(EnvError::NotReset)));
}

#[test]
fn proportional_harvest_splits_pool_evenly() {
    let mut env = ready(config("proportional", 12));
    let outcome = harvest_all(&mut env, |_| 30);
    assert_eq!(env.phase(), Some(Phase::PostHarvestObservation));
    assert_eq!(outcome.next_agent, "persona_0");
    assert!(outcome.rewards.values().all(|granted| *granted == 20));
    assert_eq!(env.state().map(|state| state.pool_quantity), Some(0));
    assert_eq!(env.pending_records().len(), 5);
}

#[test]
fn proportional_harvest_accepts_requests_summing_past_u64() {
    let mut env = ready(config("proportional", 12));
    let outcome = harvest_all(&mut env, |_| u64::MAX / 2);
    assert!(outcome.rewards.values().all(|granted| *granted == 20));
    assert_eq!(env.state().map(|state| state.pool_quantity), Some(0));
    let state = env.state().expect("state");
    assert!(state.agents.values().all(|agent| agent.wanted == u64::MAX / 2));
}

#[test]
fn negotiation_closes_for_everyone_after_one_chat() {
    let mut env = ready(config("stochastic", 12));
    harvest_all(&mut env, |_| 5);
    bare_all(&mut env, Location::Pool);
    assert_eq!(env.phase(), Some(Phase::Negotiation));

    chat(&mut env);
    assert_eq!(env.phase(), Some(Phase::Voting));
    assert_eq!(env.active_agent(), Some("persona_0"));
    let state = env.state().expect("state");
    assert!(state
        .agents
        .values()
        .all(|agent| agent.location == Location::VotingRoom
            && agent.time == reflection_day(contracts::default_start_time())));
    assert_eq!(state.resource_limit_agreed, Some(10));

    let observation = env.observe("persona_2").expect("observe");
    assert_eq!(observation.chat.map(|chat| chat.len()), Some(2));
}

#[test]
fn round_records_reach_sink_in_causal_order() {
    let mut env = ready(config("stochastic", 12));
    play_round(&mut env, |_| 8, |_| None);

    let labels = env
        .log_sink()
        .records()
        .iter()
        .map(LogRecord::label)
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            "harvest",
            "harvest",
            "harvest",
            "harvest",
            "harvest",
            "utterance",
            "utterance",
            "conversation_summary",
            "vote_tally",
            "round_settled",
        ]
    );
    assert_eq!(env.log_sink().flush_count(), 1);
    assert!(env.pending_records().is_empty());
    assert_eq!(env.round(), 1);
    assert_eq!(env.phase(), Some(Phase::Harvest));
}

#[test]
fn majority_vote_suspends_for_next_harvest() {
    let mut env = ready(config("stochastic", 12));
    let voters = ["persona_0", "persona_1", "persona_2"];
    play_round(
        &mut env,
        |_| 10,
        |agent| voters.contains(&agent).then(|| "persona_4".to_string()),
    );
    let suspended = &env.state().expect("state").suspended;
    assert!(suspended.contains("persona_4"));
    assert_eq!(suspended.len(), 1);

    let observation = env.observe("persona_0").expect("observe");
    assert!(observation.is_suspended("persona_4"));

    harvest_all(&mut env, |_| 10);
    let state = env.state().expect("state");
    assert_eq!(state.agent("persona_4").map(|a| a.last_collected), Some(0));
    assert_eq!(state.agent("persona_0").map(|a| a.last_collected), Some(10));
    let record = env
        .pending_records()
        .iter()
        .find(|record| record.agent_id() == Some("persona_4"))
        .expect("harvest record for suspended agent");
    assert!(matches!(
        record,
        LogRecord::Harvest {
            wanted: 10,
            effective_wanted: 0,
            collected: 0,
            suspended: true,
            ..
        }
    ));
}

#[test]
fn voting_observation_marks_prior_suspensions() {
    let mut env = ready(config("stochastic", 12));
    play_round(&mut env, |_| 10, |_| Some("persona_3".to_string()));
    harvest_all(&mut env, |_| 10);
    bare_all(&mut env, Location::Pool);
    chat(&mut env);
    let observation = env.observe("persona_0").expect("observe");
    assert_eq!(
        observation.agent_resources.get("persona_3"),
        Some(&ResourceView::Suspended)
    );
}

#[test]
fn two_votes_of_five_do_not_suspend() {
    let mut env = ready(config("stochastic", 12));
    let voters = ["persona_0", "persona_1"];
    play_round(
        &mut env,
        |_| 10,
        |agent| voters.contains(&agent).then(|| "persona_4".to_string()),
    );
    assert!(env.state().expect("state").suspended.is_empty());
}

#[test]
fn settlement_regrows_pool_with_cap() {
    let mut env = ready(config("proportional", 12));
    play_round(&mut env, |_| 8, |_| None);
    let state = env.state().expect("state");
    // 100 - 40 = 60 doubles to 120, capped at 100.
    assert_eq!(state.pool_quantity, 100);
    assert_eq!(state.pool_before_harvest, 100);
    assert_eq!(state.threshold, 10);
    assert!(state
        .agents
        .values()
        .all(|agent| agent.location == Location::Pool));
}

#[test]
fn max_rounds_terminates_everyone_and_further_steps_are_ignored() {
    let mut env = ready(config("stochastic", 1));
    play_round(&mut env, |_| 1, |_| None);
    assert!(env.is_terminated());
    assert!(env.terminations().values().all(|terminated| *terminated));

    let agent = active(&env);
    let before = env.state().cloned();
    let result = env.step(AgentAction::harvest(agent, 5)).expect("no error");
    assert!(result.is_none());
    assert_eq!(env.state().cloned(), before);
}

#[test]
fn collapse_terminates_before_regrowth() {
    let mut env = ready(config("proportional", 12));
    play_round(&mut env, |_| 30, |_| None);
    assert!(env.is_terminated());
    assert_eq!(env.round(), 1);
    assert_eq!(env.state().map(|state| state.pool_quantity), Some(0));
    let settled = env.log_sink().records().last().expect("settled record");
    assert!(matches!(
        settled,
        LogRecord::RoundSettled {
            round: 0,
            pool_after_growth: 0,
            terminated: true,
            ..
        }
    ));
}

#[test]
fn rejected_steps_leave_episode_untouched() {
    let mut env = ready(config("stochastic", 12));
    let before = env.state().cloned();

    let wrong_agent = env.step(AgentAction::harvest("persona_3", 5));
    assert!(matches!(
        wrong_agent,
        Err(EnvError::ContractViolation(ContractViolation::WrongAgent { .. }))
    ));

    let wrong_kind = env.step(AgentAction::bare("persona_0", Location::Pool));
    assert!(matches!(
        wrong_kind,
        Err(EnvError::ContractViolation(ContractViolation::UnexpectedAction { .. }))
    ));

    let wrong_location = env.step(AgentAction::Harvest {
        agent_id: "persona_0".to_string(),
        location: Location::Restaurant,
        quantity: 5,
    });
    assert!(matches!(
        wrong_location,
        Err(EnvError::ContractViolation(ContractViolation::WrongLocation { .. }))
    ));

    assert_eq!(env.state().cloned(), before);
    assert_eq!(env.active_agent(), Some("persona_0"));
    assert_eq!(env.phase(), Some(Phase::Harvest));
}

#[test]
fn vote_for_unknown_agent_is_rejected() {
    let mut env = ready(config("stochastic", 12));
    harvest_all(&mut env, |_| 2);
    bare_all(&mut env, Location::Pool);
    chat(&mut env);
    let result = env.step(AgentAction::vote(
        "persona_0",
        Some("stranger".to_string()),
        "",
    ));
    assert!(matches!(
        result,
        Err(EnvError::ContractViolation(ContractViolation::UnknownAgent(ref id))) if id == "stranger"
    ));
}

#[test]
fn reset_options_are_checked() {
    let mut env = Environment::new(RunConfig::default()).expect("valid config");
    let short = ResetOptions {
        agent_ids: Some(vec!["a".to_string()]),
    };
    assert!(env.reset(1, short).is_err());

    let duplicated = ResetOptions {
        agent_ids: Some(["a", "b", "c", "d", "a"].map(str::to_string).to_vec()),
    };
    assert!(env.reset(1, duplicated).is_err());

    let named = ResetOptions {
        agent_ids: Some(["e", "d", "c", "b", "a"].map(str::to_string).to_vec()),
    };
    let (first, _) = env.reset(1, named).expect("reset");
    assert_eq!(first, "e");
}

#[test]
fn random_sequential_order_is_a_reproducible_permutation() {
    let run = || {
        let mut env = ready(RunConfig {
            harvesting_order: "random-sequential".to_string(),
            ..RunConfig::default()
        });
        let mut orders = Vec::new();
        for _ in 0..3 {
            play_round(&mut env, |_| 4, |_| None);
            let mut order = Vec::new();
            for _ in 0..env.agents().len() {
                let agent = active(&env);
                order.push(agent.clone());
                env.step(AgentAction::harvest(agent, 4)).expect("harvest");
            }
            orders.push(order);
            bare_all(&mut env, Location::Pool);
            chat(&mut env);
            vote_all(&mut env, |_| None);
            bare_all(&mut env, Location::Home);
        }
        orders
    };
    let first = run();
    assert_eq!(first, run());
    for order in &first {
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, default_agent_ids(5));
    }
}

#[test]
fn flush_log_forces_pending_records_out() {
    let mut env = ready(config("stochastic", 12));
    harvest_all(&mut env, |_| 3);
    env.flush_log().expect("flush");
    assert_eq!(env.log_sink().records().len(), 5);
    assert_eq!(env.log_sink().flush_count(), 1);
    assert!(env.pending_records().is_empty());
}

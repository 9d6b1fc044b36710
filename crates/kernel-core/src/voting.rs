//! Suspension vote: one ballot per agent per voting round, strict majority suspends.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ballot {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyOutcome {
    pub vote_counts: BTreeMap<String, u32>,
    pub reasons: BTreeMap<String, Vec<String>>,
    /// Number of agents eligible to vote when the tally ran.
    pub active_agents: usize,
    pub newly_suspended: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VotingTally {
    ballots: BTreeMap<String, Ballot>,
}

impl VotingTally {
    /// Open a voting round: last round's suspensions lapse before any ballot is cast.
    pub fn begin_round(&mut self, suspended: &mut BTreeSet<String>) {
        suspended.clear();
        self.ballots.clear();
    }

    /// Record `voter`'s ballot. A later ballot from the same voter replaces the earlier one;
    /// an abstention (`None`) leaves any earlier ballot in place.
    pub fn cast(&mut self, voter: &str, target: Option<&str>, reason: &str) {
        if let Some(target) = target {
            self.ballots.insert(
                voter.to_string(),
                Ballot {
                    target: target.to_string(),
                    reason: reason.to_string(),
                },
            );
        }
    }

    pub fn ballots(&self) -> &BTreeMap<String, Ballot> {
        &self.ballots
    }

    /// Count ballots and add every target with `votes > active / 2` to `suspended`.
    ///
    /// `active` is `total_agents - suspended.len()` at the moment of counting.
    /// Ballots are cleared afterwards.
    pub fn tally(&mut self, total_agents: usize, suspended: &mut BTreeSet<String>) -> TallyOutcome {
        let mut outcome = TallyOutcome {
            active_agents: total_agents.saturating_sub(suspended.len()),
            ..TallyOutcome::default()
        };
        for ballot in self.ballots.values() {
            *outcome.vote_counts.entry(ballot.target.clone()).or_insert(0) += 1;
            outcome
                .reasons
                .entry(ballot.target.clone())
                .or_default()
                .push(ballot.reason.clone());
        }
        for (target, votes) in &outcome.vote_counts {
            // votes > active / 2 without the fractional half.
            if u64::from(*votes) * 2 > outcome.active_agents as u64 {
                suspended.insert(target.clone());
                outcome.newly_suspended.insert(target.clone());
            }
        }
        self.ballots.clear();
        outcome
    }
}

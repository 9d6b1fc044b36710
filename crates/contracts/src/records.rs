//! Append-only structured records emitted by the environment, one stream per episode.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Harvest {
        round: u64,
        agent_id: String,
        pool_before_harvest: u64,
        pool_after_harvest: u64,
        /// Quantity the agent submitted.
        wanted: u64,
        /// Quantity fed to the allocator; zero while suspended.
        effective_wanted: u64,
        collected: u64,
        suspended: bool,
    },
    Utterance {
        round: u64,
        agent_id: String,
        resource_limit: Option<u64>,
        text: String,
    },
    ConversationSummary {
        round: u64,
        reported_by: String,
        resource_limit: Option<u64>,
        utterances: usize,
    },
    VoteTally {
        round: u64,
        vote_counts: BTreeMap<String, u32>,
        reasons: BTreeMap<String, Vec<String>>,
        suspended: BTreeSet<String>,
    },
    RoundSettled {
        round: u64,
        pool_after_growth: u64,
        threshold: u64,
        terminated: bool,
    },
}

impl LogRecord {
    pub fn round(&self) -> u64 {
        match self {
            Self::Harvest { round, .. }
            | Self::Utterance { round, .. }
            | Self::ConversationSummary { round, .. }
            | Self::VoteTally { round, .. }
            | Self::RoundSettled { round, .. } => *round,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Harvest { agent_id, .. } | Self::Utterance { agent_id, .. } => Some(agent_id),
            Self::ConversationSummary { reported_by, .. } => Some(reported_by),
            Self::VoteTally { .. } | Self::RoundSettled { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Harvest { .. } => "harvest",
            Self::Utterance { .. } => "utterance",
            Self::ConversationSummary { .. } => "conversation_summary",
            Self::VoteTally { .. } => "vote_tally",
            Self::RoundSettled { .. } => "round_settled",
        }
    }
}

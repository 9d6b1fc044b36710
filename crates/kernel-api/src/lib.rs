//! In-process API facade over one commons episode, with config loading and SQLite persistence.

mod config;
mod persistence;
mod policy;

use std::collections::BTreeSet;
use std::path::Path;

use contracts::{AgentAction, LogRecord, Observation, RunConfig};
use kernel_core::{EnvError, Environment, MemoryLogSink, ResetOptions, StepOutcome};
use persistence::SqliteRunStore;
use tracing::warn;

pub use config::{load_run_config, parse_run_config, render_toml, ConfigFormat, ConfigLoadError};
pub use persistence::{PersistedRunSummary, PersistenceError, RunProgress};
pub use policy::ScriptedPolicy;

#[derive(Debug)]
struct PersistenceState {
    store: SqliteRunStore,
    persisted_record_count: usize,
    persisted_progress: Option<RunProgress>,
}

/// One settled round, folded from the structured records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u64,
    pub harvested: u64,
    pub pool_after_growth: u64,
    pub threshold: u64,
    pub suspended: BTreeSet<String>,
    pub terminated: bool,
}

pub struct EpisodeApi {
    env: Environment<MemoryLogSink>,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
    rejected_steps: u64,
}

impl EpisodeApi {
    pub fn from_config(config: RunConfig) -> Result<Self, EnvError> {
        Ok(Self {
            env: Environment::new(config)?,
            persistence: None,
            last_persistence_error: None,
            rejected_steps: 0,
        })
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteRunStore::open(path)?;
        self.persistence = Some(PersistenceState {
            store,
            persisted_record_count: 0,
            persisted_progress: None,
        });
        Ok(())
    }

    pub fn initialize_run_storage(
        &mut self,
        replace_existing_run: bool,
    ) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let run_id = self.env.config().run_id.clone();
        if state.store.run_exists(&run_id)? {
            if replace_existing_run {
                state.store.delete_run(&run_id)?;
            } else {
                return Err(PersistenceError::RunAlreadyExists(run_id));
            }
        }

        let progress = progress_of(&self.env);
        state
            .store
            .persist_delta(self.env.config(), progress, state.persisted_record_count, &[])?;
        state.persisted_progress = Some(progress);
        self.last_persistence_error = None;
        Ok(())
    }

    /// Write records appended since the last flush, plus the run's progress.
    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let records = self.env.log_sink().records();
        let new_records = &records[state.persisted_record_count.min(records.len())..];
        let progress = progress_of(&self.env);
        if new_records.is_empty() && state.persisted_progress == Some(progress) {
            return Ok(());
        }

        state.store.persist_delta(
            self.env.config(),
            progress,
            state.persisted_record_count,
            new_records,
        )?;
        state.persisted_record_count = records.len();
        state.persisted_progress = Some(progress);
        self.last_persistence_error = None;
        Ok(())
    }

    /// Reset with `seed`, or the configured seed when `None`.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<(String, Observation), EnvError> {
        self.reset_with(seed, ResetOptions::default())
    }

    pub fn reset_with(
        &mut self,
        seed: Option<u64>,
        options: ResetOptions,
    ) -> Result<(String, Observation), EnvError> {
        let seed = seed.unwrap_or(self.env.config().seed);
        let first = self.env.reset(seed, options)?;
        self.flush_persistence_if_enabled();
        Ok(first)
    }

    pub fn step(&mut self, action: AgentAction) -> Result<Option<StepOutcome>, EnvError> {
        match self.env.step(action) {
            Ok(outcome) => {
                self.flush_persistence_if_enabled();
                Ok(outcome)
            }
            Err(err) => {
                if err.as_contract_violation().is_some() {
                    self.rejected_steps += 1;
                }
                warn!(run_id = %self.env.config().run_id, error = %err, "step rejected");
                Err(err)
            }
        }
    }

    /// Reset and drive the episode with `policy` until every agent is terminated.
    pub fn run_scripted_episode(
        &mut self,
        policy: &ScriptedPolicy,
        seed: Option<u64>,
    ) -> Result<Vec<RoundSummary>, EnvError> {
        let (mut agent, mut observation) = self.reset(seed)?;
        while !self.env.is_terminated() {
            let action = policy.act(&agent, &observation);
            let Some(outcome) = self.step(action)? else {
                break;
            };
            agent = outcome.next_agent;
            observation = outcome.observation;
        }
        Ok(round_summaries(self.env.log_sink().records()))
    }

    pub fn load_records(&self, run_id: &str) -> Result<Vec<LogRecord>, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_records(run_id)
    }

    pub fn load_round_records(
        &self,
        run_id: &str,
        round: u64,
    ) -> Result<Vec<LogRecord>, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_round_records(run_id, round)
    }

    pub fn run_summary(&self, run_id: &str) -> Result<Option<PersistedRunSummary>, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_run_summary(run_id)
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn run_id(&self) -> &str {
        &self.env.config().run_id
    }

    pub fn config(&self) -> &RunConfig {
        self.env.config()
    }

    pub fn environment(&self) -> &Environment<MemoryLogSink> {
        &self.env
    }

    pub fn records(&self) -> &[LogRecord] {
        self.env.log_sink().records()
    }

    pub fn rejected_steps(&self) -> u64 {
        self.rejected_steps
    }

    /// Current round state as JSON, `Value::Null` before the first reset.
    pub fn state_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.env.state())
    }

    fn flush_persistence_if_enabled(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        if let Err(err) = self.flush_persistence_checked() {
            warn!(run_id = %self.env.config().run_id, error = %err, "persistence flush failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }
}

fn progress_of(env: &Environment<MemoryLogSink>) -> RunProgress {
    RunProgress {
        rounds_completed: env.round(),
        terminated: env.is_terminated(),
    }
}

/// Fold settled rounds out of a record stream; rounds without a settlement record are skipped.
pub fn round_summaries(records: &[LogRecord]) -> Vec<RoundSummary> {
    let mut summaries = Vec::new();
    let mut harvested = 0_u64;
    let mut suspended = BTreeSet::new();
    for record in records {
        match record {
            LogRecord::Harvest { collected, .. } => harvested += collected,
            LogRecord::VoteTally {
                suspended: outcome, ..
            } => suspended = outcome.clone(),
            LogRecord::RoundSettled {
                round,
                pool_after_growth,
                threshold,
                terminated,
            } => {
                summaries.push(RoundSummary {
                    round: *round,
                    harvested,
                    pool_after_growth: *pool_after_growth,
                    threshold: *threshold,
                    suspended: std::mem::take(&mut suspended),
                    terminated: *terminated,
                });
                harvested = 0;
            }
            LogRecord::Utterance { .. } | LogRecord::ConversationSummary { .. } => {}
        }
    }
    summaries
}

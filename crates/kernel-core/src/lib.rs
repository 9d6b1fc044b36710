//! Turn-based commons environment: phase state machine, pool allocation, suspension votes
//! and per-phase observations.

pub mod calendar;
pub mod economy;
pub mod environment;
pub mod error;
pub mod perception;
pub mod prompts;
pub mod scheduler;
pub mod sink;
pub mod state;
pub mod voting;

pub use economy::{allocate, Allocation, InvariantBreach};
pub use environment::{default_agent_ids, Environment, ResetOptions, StepOutcome};
pub use error::{ContractViolation, EnvError};
pub use perception::ObservationBuilder;
pub use prompts::{HarvestResult, PromptTextProvider, StandardPrompts};
pub use scheduler::TurnCycler;
pub use sink::{MemoryLogSink, SinkError, StructuredLogSink};
pub use state::{sustainability_threshold, AgentRoundState, RoundState};
pub use voting::{Ballot, TallyOutcome, VotingTally};

use contracts::{ActionKind, ConfigError, Location, Phase};

use crate::economy::InvariantBreach;
use crate::sink::SinkError;

/// A submitted action or reset request that does not fit the current turn.
/// Always detected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("it is {expected}'s turn, got an action from {actual}")]
    WrongAgent { expected: String, actual: String },
    #[error("{phase} phase expects a {expected} action, got {actual}")]
    UnexpectedAction {
        phase: Phase,
        expected: ActionKind,
        actual: ActionKind,
    },
    #[error("{phase} phase expects actions at {expected}, got {actual}")]
    WrongLocation {
        phase: Phase,
        expected: Location,
        actual: Location,
    },
    #[error("unknown agent {0}")]
    UnknownAgent(String),
    #[error("invalid reset options: {0}")]
    InvalidResetOptions(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("environment was stepped before reset")]
    NotReset,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
    #[error("invariant breach: {0}")]
    InvariantBreach(#[from] InvariantBreach),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl EnvError {
    pub fn as_contract_violation(&self) -> Option<&ContractViolation> {
        match self {
            EnvError::ContractViolation(violation) => Some(violation),
            _ => None,
        }
    }
}

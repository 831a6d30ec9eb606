use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the engine for a single unit of work, i.e. one
/// (district, year, scenario) combination, or by configuration checks.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Scenario '{0}' not recognised")]
    UnknownScenario(String),
    #[error("Optimisation constraints admit no solution: {0}")]
    InfeasibleConstraints(String),
    #[error("No linear program solver available: {0}")]
    SolverUnavailable(String),
    #[error("Consistency check failed: {0}")]
    Consistency(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::UnknownScenario(_) => ErrorKind::UnknownScenario,
            EngineError::InfeasibleConstraints(_) => ErrorKind::InfeasibleConstraints,
            EngineError::SolverUnavailable(_) => ErrorKind::SolverUnavailable,
            EngineError::Consistency(_) => ErrorKind::Consistency,
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        EngineError::InvalidInput(message.into())
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        EngineError::Consistency(message.into())
    }
}

/// A copyable tag for an [`EngineError`], used when reporting failed triples.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnknownScenario,
    InfeasibleConstraints,
    SolverUnavailable,
    Consistency,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInputError",
            ErrorKind::UnknownScenario => "UnknownScenarioError",
            ErrorKind::InfeasibleConstraints => "InfeasibleConstraintsError",
            ErrorKind::SolverUnavailable => "SolverUnavailableError",
            ErrorKind::Consistency => "ConsistencyError",
        };
        write!(f, "{name}")
    }
}

/// Failures reported by a linear program backend.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolverError {
    #[error("solver backend unavailable: {0}")]
    Unavailable(String),
    #[error("problem is infeasible")]
    Infeasible,
    #[error("solver did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("solver failed: {0}")]
    Failed(String),
}

impl From<SolverError> for EngineError {
    fn from(error: SolverError) -> Self {
        match error {
            SolverError::Infeasible => EngineError::InfeasibleConstraints(
                "the solver reported the problem as infeasible".to_string(),
            ),
            other => EngineError::SolverUnavailable(other.to_string()),
        }
    }
}

//! Error types for the state machine.

use thiserror::Error;

use crate::state::MachineState;

/// Result type alias for table construction.
pub type Result<T> = std::result::Result<T, TableError>;

/// Invalid transition table or initial state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The state set is empty.
    #[error("state set is empty")]
    NoStates,

    /// A state appears twice in the state set.
    #[error("state {0} listed twice")]
    DuplicateState(String),

    /// A transition pair or the initial state names a state outside the set.
    #[error("state {0} is not in the state set")]
    UnknownState(String),
}

/// A rejected transition request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError<S: MachineState> {
    /// `(from, to)` is not in the transition table. Nothing changed.
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: S, to: S },
}

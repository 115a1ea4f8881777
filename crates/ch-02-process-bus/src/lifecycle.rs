//! The lifecycle transition table.

use ch_01_state_machine::{TableError, TransitionTable};
use shared_types::LifecycleState::{self, Error, Exited, Idle, Serving, Starting, Stopping};

/// Legal lifecycle moves.
///
/// ERROR is reachable from every non-terminal state. EXITED only from the
/// three running states. Nothing leaves EXITED or ERROR.
pub const LIFECYCLE_PAIRS: [(LifecycleState, LifecycleState); 11] = [
    (Idle, Starting),
    (Starting, Serving),
    (Serving, Stopping),
    (Stopping, Idle),
    (Starting, Exited),
    (Serving, Exited),
    (Stopping, Exited),
    (Idle, Error),
    (Starting, Error),
    (Serving, Error),
    (Stopping, Error),
];

/// Build the lifecycle table.
pub fn lifecycle_table() -> Result<TransitionTable<LifecycleState>, TableError> {
    TransitionTable::new(LifecycleState::ALL, LIFECYCLE_PAIRS)
}

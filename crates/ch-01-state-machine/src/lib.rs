//! # CH-01 State Machine
//!
//! A fixed set of states, an immutable table of legal `(from, to)` pairs and
//! a current state, layered over [`shared_bus::EventBus`]. Every applied
//! transition publishes on the channel named after its target state.
//!
//! ## Guarantees
//!
//! - The current state is always a member of the state set.
//! - An illegal request changes nothing and publishes nothing.
//! - Requesting the current state is a silent no-op: nothing is published.
//! - The state is updated before the publish, so handlers observe the new
//!   state through [`StateMachine::current_state`].
//! - Transitions are totally ordered. A handler may request a transition;
//!   the nested one completes, fan-out included, before the outer fan-out
//!   resumes. Other threads wait until the outer transition is done.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod machine;
pub mod state;
pub mod table;

pub use error::{TableError, TransitionError};
pub use machine::{StateMachine, TransitionOutcome};
pub use state::MachineState;
pub use table::TransitionTable;

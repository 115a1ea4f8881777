//! State bound for [`StateMachine`](crate::StateMachine).

use std::fmt;
use std::hash::Hash;

/// Anything small, comparable and printable can be a machine state.
///
/// The channel a transition publishes on is the state's `Display` output.
pub trait MachineState:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Channel name used when entering this state.
    fn channel(&self) -> String {
        self.to_string()
    }
}

impl<T> MachineState for T where T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{}

//! # Transition Table
//!
//! The legal `(from, to)` pairs. Fixed at construction and never mutated.

use std::collections::HashSet;

use crate::error::{Result, TableError};
use crate::state::MachineState;

/// Immutable set of states and legal transitions between them.
#[derive(Debug, Clone)]
pub struct TransitionTable<S: MachineState> {
    states: Vec<S>,
    legal: HashSet<(S, S)>,
}

impl<S: MachineState> TransitionTable<S> {
    /// Build a table. Every state named by a pair must be in `states`.
    ///
    /// Self-loops are allowed in `pairs` but redundant: the machine treats
    /// every same-state request as a no-op.
    pub fn new(
        states: impl IntoIterator<Item = S>,
        pairs: impl IntoIterator<Item = (S, S)>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for state in states {
            if !seen.insert(state) {
                return Err(TableError::DuplicateState(state.to_string()));
            }
            ordered.push(state);
        }
        if ordered.is_empty() {
            return Err(TableError::NoStates);
        }

        let mut legal = HashSet::new();
        for (from, to) in pairs {
            for state in [from, to] {
                if !seen.contains(&state) {
                    return Err(TableError::UnknownState(state.to_string()));
                }
            }
            legal.insert((from, to));
        }

        Ok(Self {
            states: ordered,
            legal,
        })
    }

    /// True when `(from, to)` is a legal pair.
    #[must_use]
    pub fn allows(&self, from: S, to: S) -> bool {
        self.legal.contains(&(from, to))
    }

    /// True when `state` is in the state set.
    #[must_use]
    pub fn contains(&self, state: S) -> bool {
        self.states.contains(&state)
    }

    /// The state set, in the order it was given.
    #[must_use]
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Legal targets from `from`, in state-set order.
    #[must_use]
    pub fn targets(&self, from: S) -> Vec<S> {
        self.states
            .iter()
            .copied()
            .filter(|to| self.allows(from, *to))
            .collect()
    }

    /// Number of legal pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.legal.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legal.is_empty()
    }
}

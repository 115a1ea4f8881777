//! # State Machine
//!
//! Guarded transitions over an [`EventBus`].

use std::time::Duration;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use shared_bus::{EventBus, PublishReport, SubscriptionHandle};
use tracing::{info, warn};

use crate::error::{TableError, TransitionError};
use crate::state::MachineState;
use crate::table::TransitionTable;

/// What a successful `transition` did.
#[derive(Debug)]
pub enum TransitionOutcome<S> {
    /// Target equals the current state. Nothing was published.
    Unchanged(S),
    /// The state changed and the target channel was published.
    Applied {
        from: S,
        to: S,
        report: PublishReport,
    },
}

impl<S: Copy> TransitionOutcome<S> {
    /// State after the request.
    #[must_use]
    pub fn state(&self) -> S {
        match self {
            TransitionOutcome::Unchanged(state) => *state,
            TransitionOutcome::Applied { to, .. } => *to,
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Current state + transition table + event bus.
pub struct StateMachine<S: MachineState, P> {
    name: String,
    table: TransitionTable<S>,

    /// Current state. Never held across a publish.
    current: Mutex<S>,
    changed: Condvar,

    /// Serializes transitions. Re-entrant so a handler running on the
    /// transitioning thread can request the next transition.
    dispatch: ReentrantMutex<()>,

    bus: EventBus<P>,
}

impl<S: MachineState, P> StateMachine<S, P> {
    /// Build a machine in `initial`.
    pub fn new(
        name: impl Into<String>,
        initial: S,
        table: TransitionTable<S>,
    ) -> Result<Self, TableError> {
        if !table.contains(initial) {
            return Err(TableError::UnknownState(initial.to_string()));
        }
        Ok(Self {
            name: name.into(),
            table,
            current: Mutex::new(initial),
            changed: Condvar::new(),
            dispatch: ReentrantMutex::new(()),
            bus: EventBus::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn current_state(&self) -> S {
        *self.current.lock()
    }

    #[must_use]
    pub fn table(&self) -> &TransitionTable<S> {
        &self.table
    }

    /// True iff `(current, to)` is legal or `to` is the current state.
    #[must_use]
    pub fn can_transition(&self, to: S) -> bool {
        let current = self.current_state();
        current == to || self.table.allows(current, to)
    }

    /// Move to `to` and publish `payload` on its channel.
    pub fn transition(
        &self,
        to: S,
        payload: P,
    ) -> Result<TransitionOutcome<S>, TransitionError<S>> {
        self.transition_with(to, move |_| payload)
    }

    /// Like [`transition`](Self::transition), with the payload built from
    /// the state being left. `make` runs only when the transition applies.
    pub fn transition_with(
        &self,
        to: S,
        make: impl FnOnce(S) -> P,
    ) -> Result<TransitionOutcome<S>, TransitionError<S>> {
        let _token = self.dispatch.lock();

        let from = {
            let mut current = self.current.lock();
            let from = *current;
            if from == to {
                return Ok(TransitionOutcome::Unchanged(from));
            }
            if !self.table.allows(from, to) {
                warn!(machine = %self.name, from = %from, to = %to, "Illegal transition rejected");
                return Err(TransitionError::Illegal { from, to });
            }
            *current = to;
            from
        };
        info!(machine = %self.name, from = %from, to = %to, "Transition applied");

        let payload = make(from);
        let report = self.bus.publish(&to.channel(), &payload);
        // Waiters wake only after the fan-out for `to` has completed.
        self.changed.notify_all();

        Ok(TransitionOutcome::Applied { from, to, report })
    }

    /// Block until `done(current)` holds or `timeout` elapses.
    ///
    /// Returns the matching state, or `None` on timeout. A state is only
    /// reported once its handlers have run.
    pub fn wait_for(&self, mut done: impl FnMut(S) -> bool, timeout: Duration) -> Option<S> {
        let mut current = {
            // Let an in-progress fan-out finish before the first look.
            let _token = self.dispatch.lock();
            self.current.lock()
        };
        if done(*current) {
            return Some(*current);
        }
        self.changed
            .wait_while_for(&mut current, |state| !done(*state), timeout);
        done(*current).then_some(*current)
    }

    /// Attach a handler to `channel`. State channels are named after the
    /// state's `Display` output.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(channel, handler)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    /// Publish on a non-state channel. Serialized with transitions.
    pub fn publish(&self, channel: &str, payload: &P) -> PublishReport {
        let _token = self.dispatch.lock();
        self.bus.publish(channel, payload)
    }

    /// The underlying bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus<P> {
        &self.bus
    }
}

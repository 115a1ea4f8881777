//! # Transition Table Properties
//!
//! Random request sequences against the lifecycle table, on a bare
//! [`StateMachine`] and on a [`ProcessBus`] without plugins.
//!
//! [`StateMachine`]: ch_01_state_machine::StateMachine
//! [`ProcessBus`]: ch_02_process_bus::ProcessBus

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ch_01_state_machine::{StateMachine, TransitionError, TransitionOutcome};
    use ch_02_process_bus::{lifecycle_table, BusConfig, ProcessBus};
    use proptest::prelude::*;
    use shared_types::{BusError, LifecycleState};

    fn any_state() -> impl Strategy<Value = LifecycleState> {
        prop::sample::select(LifecycleState::ALL.to_vec())
    }

    fn machine() -> StateMachine<LifecycleState, ()> {
        StateMachine::new("prop", LifecycleState::Idle, lifecycle_table().unwrap()).unwrap()
    }

    proptest! {
        #[test]
        fn prop_requests_follow_the_table(requests in prop::collection::vec(any_state(), 1..40)) {
            let machine = machine();
            let table = lifecycle_table().unwrap();
            let published = Arc::new(AtomicUsize::new(0));
            for state in LifecycleState::ALL {
                let published = Arc::clone(&published);
                machine.subscribe(state.as_str(), move |_| {
                    published.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }

            let mut applied = 0;
            for to in requests {
                let from = machine.current_state();
                let legal = table.allows(from, to);
                prop_assert!(machine.can_transition(to) == (legal || from == to));

                match machine.transition(to, ()) {
                    Ok(TransitionOutcome::Unchanged(state)) => {
                        prop_assert_eq!(from, to);
                        prop_assert_eq!(state, from);
                    }
                    Ok(TransitionOutcome::Applied { from: left, to: entered, report }) => {
                        prop_assert!(legal);
                        prop_assert_eq!((left, entered), (from, to));
                        prop_assert_eq!(report.delivered, 1);
                        applied += 1;
                    }
                    Err(TransitionError::Illegal { from: rejected_from, to: rejected_to }) => {
                        prop_assert!(!legal && from != to);
                        prop_assert_eq!((rejected_from, rejected_to), (from, to));
                        prop_assert_eq!(machine.current_state(), from);
                    }
                }
            }
            prop_assert_eq!(published.load(Ordering::SeqCst), applied);
        }

        #[test]
        fn prop_self_transition_is_always_a_noop(target in any_state()) {
            let machine = machine();
            // Walk to `target` along the main path where possible.
            let path = [
                LifecycleState::Starting,
                LifecycleState::Serving,
                LifecycleState::Stopping,
            ];
            if target.is_terminal() {
                machine.transition(LifecycleState::Starting, ()).unwrap();
                machine.transition(target, ()).unwrap();
            } else {
                for step in path {
                    if machine.current_state() == target {
                        break;
                    }
                    machine.transition(step, ()).unwrap();
                }
            }
            prop_assert_eq!(machine.current_state(), target);

            prop_assert!(machine.can_transition(target));
            let outcome = machine.transition(target, ()).unwrap();
            prop_assert!(!outcome.is_applied());
            prop_assert_eq!(machine.current_state(), target);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_bus_rejects_illegal_requests_without_moving(
            requests in prop::collection::vec(any_state(), 1..12)
        ) {
            let bus = ProcessBus::new("prop", BusConfig::default()).unwrap();
            let table = lifecycle_table().unwrap();

            for to in requests {
                let from = bus.current_state();
                match bus.transition(to) {
                    Ok(_) => prop_assert!(from == to || table.allows(from, to)),
                    Err(BusError::IllegalTransition { from: rejected, to: requested }) => {
                        prop_assert_eq!((rejected, requested), (from, to));
                        prop_assert_eq!(bus.current_state(), from);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
        }
    }
}

//! # Fan-out Scenarios
//!
//! Subscriber ordering and failure isolation, on a bare [`EventBus`] and
//! on lifecycle channels of a running bus.
//!
//! [`EventBus`]: shared_bus::EventBus

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::bail;
    use ch_02_process_bus::{BusConfig, ProcessBus};
    use parking_lot::Mutex;
    use shared_bus::EventBus;
    use shared_types::{BusError, FailureKind, LifecycleState};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str) -> impl Fn(&u32) -> anyhow::Result<()> {
        let log = Arc::clone(log);
        move |_| {
            log.lock().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_handlers_fire_in_subscription_order_across_resubscribe() {
        let bus = EventBus::<u32>::new();
        let log: Log = Arc::default();
        let mut handles: Vec<_> = ["A", "B", "C"]
            .into_iter()
            .map(|name| bus.subscribe("tick", recorder(&log, name)))
            .collect();

        for _ in 0..3 {
            bus.publish("tick", &1);
        }
        assert_eq!(log.lock().as_slice(), ["A", "B", "C"].repeat(3).as_slice());

        for handle in &handles {
            assert!(bus.unsubscribe(handle));
        }
        assert_eq!(bus.subscriber_count("tick"), 0);
        handles = ["A", "B", "C"]
            .into_iter()
            .map(|name| bus.subscribe("tick", recorder(&log, name)))
            .collect();
        log.lock().clear();

        let report = bus.publish("tick", &2);

        assert_eq!(report.delivered, 3);
        assert_eq!(log.lock().as_slice(), ["A", "B", "C"]);
        assert_eq!(handles.len(), 3);
    }

    #[test]
    fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::<u32>::new();
        let log: Log = Arc::default();
        bus.subscribe("tick", recorder(&log, "A"));
        bus.subscribe("tick", |_| bail!("B refuses"));
        bus.subscribe("tick", recorder(&log, "C"));
        bus.subscribe("tick", |_| panic!("D blew up"));
        bus.subscribe("tick", recorder(&log, "E"));

        let report = bus.publish("tick", &7);

        assert_eq!(log.lock().as_slice(), ["A", "C", "E"]);
        assert_eq!(report.delivered, 5);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.failures[0].is_panic());
        assert!(report.failures[1].is_panic());
    }

    #[test]
    fn test_failing_serving_handler_does_not_stop_the_bus() {
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let log: Log = Arc::default();
        for name in ["A", "B", "C"] {
            let log = Arc::clone(&log);
            bus.subscribe("SERVING", move |_, _| {
                log.lock().push(name);
                if name == "B" {
                    bail!("B cannot serve");
                }
                Ok(())
            })
            .unwrap();
        }

        bus.run().unwrap();

        assert_eq!(log.lock().as_slice(), ["A", "B", "C"]);
        assert_eq!(bus.current_state(), LifecycleState::Serving);
    }

    #[test]
    fn test_failing_starting_handler_fails_startup_after_full_fanout() {
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let log: Log = Arc::default();
        for name in ["A", "B", "C"] {
            let log = Arc::clone(&log);
            bus.subscribe("STARTING", move |_, _| {
                log.lock().push(name);
                if name == "B" {
                    panic!("B cannot start");
                }
                Ok(())
            })
            .unwrap();
        }

        let err = bus.run().unwrap_err();

        assert_eq!(log.lock().as_slice(), ["A", "B", "C"]);
        assert!(matches!(err, BusError::StartupFailed(_)));
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].kind, FailureKind::SubscriberFailure);
        assert_eq!(bus.current_state(), LifecycleState::Error);
    }
}

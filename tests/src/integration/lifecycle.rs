//! # Lifecycle Scenarios
//!
//! `run`, `graceful` and `exit` against the real content server, worker
//! pool and announcer plugins.
//!
//! | Scenario | Buses | Plugins |
//! |----------|-------|---------|
//! | ephemeral bind + service URLs | server | content-server |
//! | distinct ephemeral ports | server | content-server, zip-content-server |
//! | bounded drain | worker | worker-pool |
//! | restart cycles | server | all server plugins |

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use ch_02_process_bus::{BusConfig, ProcessBus};
    use ch_03_content_server::{ContentServerConfig, ContentServerPlugin, ZipContentServerPlugin};
    use ch_04_network_announcer::{InMemoryRegistrar, NetworkAnnouncerPlugin};
    use ch_05_worker_pool::{
        InMemoryJobStore, JobState, RunnerRegistry, WorkerPoolConfig, WorkerPoolPlugin,
    };
    use ch_06_host_bridge::testing::RecordingNotifier;
    use ch_06_host_bridge::ForegroundPlugin;
    use shared_types::{LifecycleState, ServiceRole};
    use tokio::runtime::Runtime;

    use crate::integration::support::wait_until;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn content_server(runtime: &Runtime, role: ServiceRole) -> ContentServerPlugin {
        ContentServerPlugin::new(
            ContentServerConfig::new(role, "/srv/content"),
            runtime.handle().clone(),
        )
    }

    /// Worker bus whose `simulate` jobs sleep for `job_time`.
    fn worker_bus(
        runtime: &Runtime,
        job_time: Duration,
        drain_deadline: Duration,
    ) -> (ProcessBus, WorkerPoolPlugin) {
        let bus = ProcessBus::new(
            "worker",
            BusConfig::default().with_drain_deadline(drain_deadline),
        )
        .unwrap();
        let runners = RunnerRegistry::new().with("simulate", move |_| {
            thread::sleep(job_time);
            Ok(())
        });
        let pool = WorkerPoolPlugin::new(
            WorkerPoolConfig::default()
                .with_scheduled(Vec::new())
                .with_poll_interval(Duration::from_millis(20)),
            Arc::new(InMemoryJobStore::new()),
            runners,
            runtime.handle().clone(),
        );
        bus.attach(&pool).unwrap();
        (bus, pool)
    }

    // =========================================================================
    // SERVER BUS
    // =========================================================================

    #[test]
    fn test_run_binds_ephemeral_port_and_recognises_service_urls() {
        let runtime = Runtime::new().unwrap();
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let server = content_server(&runtime, ServiceRole::Primary);
        bus.attach(&server).unwrap();
        assert_eq!(bus.current_state(), LifecycleState::Idle);

        let payload = bus.run().unwrap();

        assert_eq!(bus.current_state(), LifecycleState::Serving);
        let port = bus.bound_port().unwrap();
        assert_ne!(port, 0);
        assert_eq!(payload.port, port);
        assert!(bus.is_service_url(&format!("http://127.0.0.1:{port}/x")));
        assert!(!bus.is_service_url("http://example.com/"));
    }

    #[test]
    fn test_two_ephemeral_listeners_get_distinct_ports() {
        let runtime = Runtime::new().unwrap();
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let primary = content_server(&runtime, ServiceRole::Primary);
        let zip = ZipContentServerPlugin::new(
            ContentServerConfig::new(ServiceRole::Secondary, "/srv/zip"),
            runtime.handle().clone(),
        );
        bus.attach(&primary).unwrap();
        bus.attach(&zip).unwrap();

        let payload = bus.run().unwrap();

        let zip_port = payload.zip_port.unwrap();
        assert_ne!(payload.port, 0);
        assert_ne!(zip_port, 0);
        assert_ne!(payload.port, zip_port);
        assert_eq!(primary.descriptor().bound_port, Some(payload.port));
        assert_eq!(zip.descriptor().bound_port, Some(zip_port));
    }

    #[test]
    fn test_restart_cycles_keep_subscriptions_and_listeners_stable() {
        let runtime = Runtime::new().unwrap();
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let primary = content_server(&runtime, ServiceRole::Primary);
        let zip = ZipContentServerPlugin::new(
            ContentServerConfig::new(ServiceRole::Secondary, "/srv/zip"),
            runtime.handle().clone(),
        );
        let registrar = Arc::new(InMemoryRegistrar::new());
        let announcer = NetworkAnnouncerPlugin::new(registrar.clone(), "host-a");
        let notifier = Arc::new(RecordingNotifier::new());
        let foreground = ForegroundPlugin::new(notifier.clone(), "Content host", "Serving.");
        bus.attach(&primary).unwrap();
        bus.attach(&zip).unwrap();
        bus.attach(&announcer).unwrap();
        bus.attach(&foreground).unwrap();

        let channels = ["STARTING", "SERVING", "STOPPING", "IDLE", "EXITED", "ERROR"];
        let counts = |bus: &ProcessBus| -> Vec<usize> {
            channels.iter().map(|c| bus.subscriber_count(c)).collect()
        };
        let before = counts(&bus);

        for cycle in 1..=4u64 {
            let payload = bus.run().unwrap();
            assert_ne!(payload.port, 0);
            assert!(payload.zip_port.is_some());
            assert!(registrar.is_registered("host-a"));
            assert_eq!(registrar.record("host-a").unwrap().port, payload.port);

            bus.transition(LifecycleState::Stopping).unwrap();
            bus.transition(LifecycleState::Idle).unwrap();

            assert!(!registrar.is_registered("host-a"));
            assert_eq!(registrar.registrations(), cycle);
            assert_eq!(bus.bound_port(), None);
            assert_eq!(counts(&bus), before);
        }
        assert_eq!(notifier.foregrounded(), 1);
        assert_eq!(bus.exit().unwrap(), LifecycleState::Idle);
    }

    #[test]
    fn test_repeated_serving_request_does_not_refire_handlers() {
        let runtime = Runtime::new().unwrap();
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let server = content_server(&runtime, ServiceRole::Primary);
        bus.attach(&server).unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);
        bus.subscribe("SERVING", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        let first = bus.run().unwrap();
        let second = bus.run().unwrap();
        assert_eq!(bus.transition(LifecycleState::Serving).unwrap(), LifecycleState::Serving);

        assert_eq!(first, second);
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_from_serving_releases_socket() {
        let runtime = Runtime::new().unwrap();
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        let server = content_server(&runtime, ServiceRole::Primary);
        bus.attach(&server).unwrap();
        let port = bus.run().unwrap().port;

        assert_eq!(bus.exit().unwrap(), LifecycleState::Exited);

        assert!(!bus.is_service_url(&format!("http://127.0.0.1:{port}/")));
        std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
        assert!(bus.run().is_err());
    }

    // =========================================================================
    // WORKER BUS
    // =========================================================================

    #[test]
    fn test_graceful_stop_waits_for_running_job() {
        let runtime = Runtime::new().unwrap();
        let (bus, pool) = worker_bus(&runtime, Duration::from_millis(500), Duration::from_secs(5));
        bus.graceful().unwrap();
        let id = pool.submit("simulate", serde_json::json!({})).unwrap();
        wait_until("job to start", || pool.in_flight() == 1);

        let started = Instant::now();
        bus.commands().request(LifecycleState::Stopping).unwrap();
        let exiting = {
            let bus = bus.clone();
            thread::spawn(move || bus.exit())
        };
        thread::sleep(Duration::from_millis(100));
        assert_eq!(bus.current_state(), LifecycleState::Stopping);

        assert_eq!(exiting.join().unwrap().unwrap(), LifecycleState::Exited);
        assert_eq!(pool.store().get(&id).unwrap().state, JobState::Done);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_drain_deadline_bounds_stop() {
        let runtime = Runtime::new().unwrap();
        let (bus, pool) = worker_bus(&runtime, Duration::from_secs(3), Duration::from_millis(200));
        bus.graceful().unwrap();
        let id = pool.submit("simulate", serde_json::json!({})).unwrap();
        wait_until("job to start", || pool.in_flight() == 1);

        let started = Instant::now();
        bus.commands().request(LifecycleState::Stopping).unwrap();
        assert_eq!(bus.exit().unwrap(), LifecycleState::Exited);

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pool.store().get(&id).unwrap().state, JobState::Running);
        runtime.shutdown_timeout(Duration::from_millis(100));
    }

    #[test]
    fn test_worker_bus_keeps_running_while_server_bus_idles() {
        let runtime = Runtime::new().unwrap();
        let server = ProcessBus::new("server", BusConfig::default()).unwrap();
        let content = content_server(&runtime, ServiceRole::Primary);
        server.attach(&content).unwrap();
        let (worker, pool) =
            worker_bus(&runtime, Duration::from_millis(10), Duration::from_secs(1));
        worker.graceful().unwrap();
        server.run().unwrap();

        server.transition(LifecycleState::Stopping).unwrap();
        server.transition(LifecycleState::Idle).unwrap();
        let id = pool.submit("simulate", serde_json::json!({})).unwrap();

        wait_until("job to finish", || {
            pool.store().get(&id).is_some_and(|job| job.state == JobState::Done)
        });
        assert_eq!(worker.current_state(), LifecycleState::Serving);
        assert_eq!(server.current_state(), LifecycleState::Idle);
    }
}

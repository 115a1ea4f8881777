//! # Process Bus
//!
//! Lifecycle state machine driven by a dedicated dispatch thread.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};

use ch_01_state_machine::{StateMachine, TransitionError, TransitionOutcome};
use host_telemetry::metrics::{
    BOUND_LISTENERS, ILLEGAL_TRANSITIONS, STARTUP_FAILURES, SUBSCRIBER_FAILURES, TRANSITIONS,
};
use parking_lot::Mutex;
use shared_bus::{PublishReport, SubscriptionHandle};
use shared_types::{
    channels, AppKey, BusError, BusEvent, BusFailure, DrainPolicy, FailureKind, LifecycleState,
    PluginError, ServiceRole, ServingPayload,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::command::{Command, CommandSender, Envelope};
use crate::config::BusConfig;
use crate::error::BuildError;
use crate::lifecycle::lifecycle_table;
use crate::plugin::BusPlugin;
use crate::startup::{Readiness, StartupTracker};

struct Inner {
    name: String,
    config: BusConfig,
    machine: StateMachine<LifecycleState, BusEvent>,
    startup: Mutex<StartupTracker>,
    session_key: OnceLock<AppKey>,
    drain: Mutex<DrainPolicy>,
    /// Cleared when the bus first leaves IDLE.
    registration_open: AtomicBool,
    commands: CommandSender,
    dispatch_thread: OnceLock<ThreadId>,
}

/// Service lifecycle bus.
///
/// Cheap to clone; clones share one bus. Handlers receive the bus by
/// reference and must not store it: plugins that need to report back later
/// keep a [`CommandSender`] instead.
#[derive(Clone)]
pub struct ProcessBus {
    inner: Arc<Inner>,
}

impl ProcessBus {
    /// Build a bus in IDLE and start its dispatch thread.
    pub fn new(name: impl Into<String>, config: BusConfig) -> Result<Self, BuildError> {
        let name = name.into();
        let machine = StateMachine::new(name.clone(), LifecycleState::Idle, lifecycle_table()?)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            commands: CommandSender::new(name.clone(), tx),
            name,
            config,
            machine,
            startup: Mutex::new(StartupTracker::default()),
            session_key: OnceLock::new(),
            drain: Mutex::new(DrainPolicy::Immediate),
            registration_open: AtomicBool::new(true),
            dispatch_thread: OnceLock::new(),
        });

        let weak = Arc::downgrade(&inner);
        let handle = thread::Builder::new()
            .name(format!("{}-dispatch", inner.name))
            .spawn(move || dispatch_loop(weak, rx))?;
        // Nothing can be queued before `new` returns, so the id is in place
        // before the first command is applied.
        let _ = inner.dispatch_thread.set(handle.thread().id());

        info!(bus = %inner.name, "[Bus] Created in IDLE");
        Ok(Self { inner })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Attach `handler` to `channel`.
    ///
    /// Fails with [`BusError::RegistrationClosed`] once the bus has started.
    pub fn subscribe<F>(
        &self,
        channel: impl Into<String>,
        handler: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&ProcessBus, &BusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ensure_registration_open()?;
        let weak = Arc::downgrade(&self.inner);
        Ok(self.inner.machine.subscribe(channel, move |event| {
            match weak.upgrade() {
                Some(inner) => handler(&ProcessBus { inner }, event),
                None => Ok(()),
            }
        }))
    }

    /// Remove a handler. Allowed at any time.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.machine.unsubscribe(handle)
    }

    /// Announce that a listener for `role` will bind during STARTING.
    /// SERVING is withheld until it reports back.
    pub fn register_listener(&self, role: ServiceRole) -> Result<(), BusError> {
        self.ensure_registration_open()?;
        if self.inner.startup.lock().expect(role) {
            debug!(bus = %self.inner.name, role = %role, "Listener registered");
        }
        Ok(())
    }

    /// Attach a plugin.
    pub fn attach(&self, plugin: &dyn BusPlugin) -> Result<(), PluginError> {
        plugin.subscribe(self)?;
        info!(bus = %self.inner.name, plugin = plugin.name(), "[Bus] Plugin attached");
        Ok(())
    }

    fn ensure_registration_open(&self) -> Result<(), BusError> {
        if self.inner.registration_open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::RegistrationClosed)
        }
    }

    // =========================================================================
    // Transition API
    // =========================================================================

    #[must_use]
    pub fn current_state(&self) -> LifecycleState {
        self.inner.machine.current_state()
    }

    /// True iff `to` is the current state or a legal move from it.
    #[must_use]
    pub fn can_transition(&self, to: LifecycleState) -> bool {
        self.inner.machine.can_transition(to)
    }

    /// Request `to` and wait until it has been applied, fan-out included.
    ///
    /// Returns the state once the request has settled, which may be later
    /// than `to` when handlers moved on (STARTING on a bus without
    /// listeners settles straight into SERVING).
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, BusError> {
        self.execute(Command::Transition(to))
    }

    /// Start and block until SERVING.
    ///
    /// Returns at once when already serving. Fails with the recorded
    /// failures when startup ends in ERROR, and forces ERROR when the
    /// startup timeout elapses first.
    pub fn run(&self) -> Result<ServingPayload, BusError> {
        if self.on_dispatch_thread() {
            return Err(BusError::BlockingOnDispatcher);
        }
        match self.current_state() {
            LifecycleState::Serving => return Ok(self.serving_payload()),
            LifecycleState::Starting => {}
            _ => {
                self.execute(Command::Transition(LifecycleState::Starting))?;
            }
        }
        self.await_serving()
    }

    /// [`run`](Self::run), and let in-flight work drain for up to the
    /// configured deadline when the bus is later stopped.
    pub fn graceful(&self) -> Result<ServingPayload, BusError> {
        self.set_drain_policy(DrainPolicy::Graceful(self.inner.config.drain_deadline));
        self.run()
    }

    /// Shut down for good and return the final state.
    ///
    /// SERVING goes through STOPPING to EXITED; STARTING and STOPPING go
    /// straight to EXITED. IDLE has nothing running and is left alone, as
    /// are the terminal states.
    pub fn exit(&self) -> Result<LifecycleState, BusError> {
        self.execute(Command::Exit)
    }

    fn await_serving(&self) -> Result<ServingPayload, BusError> {
        let timeout = self.inner.config.startup_timeout;
        let reached = self
            .inner
            .machine
            .wait_for(|state| state != LifecycleState::Starting, timeout);

        let state = match reached {
            Some(state) => state,
            None => self.execute(Command::StartupTimeout(timeout))?,
        };
        match state {
            LifecycleState::Serving => Ok(self.serving_payload()),
            LifecycleState::Error if reached.is_none() => Err(BusError::StartupTimeout(timeout)),
            LifecycleState::Error => Err(BusError::StartupFailed(self.startup_failures())),
            other => Err(BusError::Interrupted(other)),
        }
    }

    // =========================================================================
    // Plugin reporting (never blocks)
    // =========================================================================

    /// Queue handle for host callbacks and plugin tasks.
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        self.inner.commands.clone()
    }

    pub fn listener_bound(&self, role: ServiceRole, addr: SocketAddr) -> Result<(), BusError> {
        self.inner.commands.listener_bound(role, addr)
    }

    pub fn listener_failed(
        &self,
        role: ServiceRole,
        addr: SocketAddr,
        reason: impl std::fmt::Display,
    ) -> Result<(), BusError> {
        self.inner.commands.listener_failed(role, addr, reason)
    }

    /// Publish on a custom channel. Always queued, so an event published
    /// from a handler is delivered after the current fan-out.
    pub fn publish(&self, channel: impl Into<String>, event: BusEvent) -> Result<(), BusError> {
        self.inner.commands.publish(channel, event)
    }

    /// Record an unrecoverable failure and move to ERROR. Waits for the
    /// transition unless called from the dispatch thread.
    pub fn fail(&self, failure: BusFailure) -> Result<LifecycleState, BusError> {
        self.execute(Command::Fail(failure))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Resolved port of the primary listener while it is bound.
    #[must_use]
    pub fn bound_port(&self) -> Option<u16> {
        self.inner.startup.lock().port(ServiceRole::Primary)
    }

    /// Resolved port of the secondary listener while it is bound.
    #[must_use]
    pub fn zip_port(&self) -> Option<u16> {
        self.inner.startup.lock().port(ServiceRole::Secondary)
    }

    #[must_use]
    pub fn serving_payload(&self) -> ServingPayload {
        self.inner.startup.lock().payload()
    }

    /// Failures of the latest startup attempt.
    #[must_use]
    pub fn startup_failures(&self) -> Vec<BusFailure> {
        self.inner.startup.lock().failures().to_vec()
    }

    /// True when `url` points at one of this bus's bound listeners.
    ///
    /// Scheme, host and port must match exactly.
    #[must_use]
    pub fn is_service_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if parsed.scheme() != self.inner.config.service_scheme {
            return false;
        }
        let (Some(host), Some(port)) = (parsed.host_str(), parsed.port_or_known_default()) else {
            return false;
        };
        if !self.inner.config.service_hosts.iter().any(|h| h == host) {
            return false;
        }
        self.inner.startup.lock().bound_ports().contains(&port)
    }

    #[must_use]
    pub fn session_key(&self) -> Option<AppKey> {
        self.inner.session_key.get().cloned()
    }

    /// Install the session key. It can be set once per bus.
    pub fn set_session_key(&self, key: AppKey) -> Result<(), BusError> {
        self.inner
            .session_key
            .set(key)
            .map_err(|_| BusError::SessionKeyAlreadySet)
    }

    #[must_use]
    pub fn drain_policy(&self) -> DrainPolicy {
        *self.inner.drain.lock()
    }

    pub fn set_drain_policy(&self, policy: DrainPolicy) {
        *self.inner.drain.lock() = policy;
    }

    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.machine.bus().subscriber_count(channel)
    }

    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.inner.machine.bus().total_subscribers()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn on_dispatch_thread(&self) -> bool {
        self.inner.dispatch_thread.get() == Some(&thread::current().id())
    }

    /// Apply `command` and return the resulting state. Direct when already
    /// on the dispatch thread, queued and awaited otherwise.
    fn execute(&self, command: Command) -> Result<LifecycleState, BusError> {
        if self.on_dispatch_thread() {
            return self.apply(command);
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BusError::AsyncContext);
        }
        let (reply, response) = oneshot::channel();
        self.inner.commands.send(command, Some(reply))?;
        response
            .blocking_recv()
            .map_err(|_| BusError::DispatcherGone)?
    }

    fn apply(&self, command: Command) -> Result<LifecycleState, BusError> {
        match command {
            Command::Transition(to) => self.apply_transition(to),
            Command::Exit => self.apply_exit(),
            Command::ListenerBound { role, addr } => {
                self.on_listener_bound(role, addr);
                Ok(self.current_state())
            }
            Command::ListenerFailed { role, addr, reason } => {
                self.on_listener_failed(role, addr, reason);
                Ok(self.current_state())
            }
            Command::Fail(failure) => self.apply_failure(failure),
            Command::StartupTimeout(timeout) => {
                if self.current_state() == LifecycleState::Starting {
                    error!(bus = %self.inner.name, ?timeout, "Startup timed out");
                    return self.apply_failure(BusFailure::startup_timeout(timeout));
                }
                Ok(self.current_state())
            }
            Command::Publish { channel, event } => {
                let report = self.inner.machine.publish(&channel, &event);
                self.count_failures(&report);
                Ok(self.current_state())
            }
        }
    }

    fn apply_transition(&self, to: LifecycleState) -> Result<LifecycleState, BusError> {
        let current = self.current_state();
        if current == LifecycleState::Idle && to == LifecycleState::Starting {
            self.inner.registration_open.store(false, Ordering::SeqCst);
            self.inner.startup.lock().begin_attempt();
        }

        let outcome = self
            .inner
            .machine
            .transition_with(to, |from| self.event_for(from, to))
            .map_err(|TransitionError::Illegal { from, to }| {
                ILLEGAL_TRANSITIONS
                    .with_label_values(&[self.inner.name.as_str()])
                    .inc();
                BusError::IllegalTransition { from, to }
            })?;

        if let TransitionOutcome::Applied { from, to, report } = outcome {
            TRANSITIONS
                .with_label_values(&[self.inner.name.as_str(), from.as_str(), to.as_str()])
                .inc();
            self.count_failures(&report);
            self.after_entered(to, report);
        }
        Ok(self.current_state())
    }

    fn event_for(&self, from: LifecycleState, to: LifecycleState) -> BusEvent {
        match to {
            LifecycleState::Serving => BusEvent::Serving(self.serving_payload()),
            LifecycleState::Error => BusEvent::Failed {
                failures: self.startup_failures(),
            },
            _ => BusEvent::Entered { from, to },
        }
    }

    fn after_entered(&self, state: LifecycleState, report: PublishReport) {
        match state {
            LifecycleState::Starting => {
                {
                    let mut startup = self.inner.startup.lock();
                    for failure in report.into_failures() {
                        startup.fail(BusFailure::new(
                            FailureKind::SubscriberFailure,
                            format!("{} subscriber {}", failure.channel, failure.subscription),
                            failure.cause.to_string(),
                        ));
                    }
                }
                self.settle_startup();
            }
            LifecycleState::Serving => {
                info!(
                    bus = %self.inner.name,
                    port = ?self.bound_port(),
                    zip_port = ?self.zip_port(),
                    "[Bus] Serving"
                );
            }
            LifecycleState::Idle | LifecycleState::Exited | LifecycleState::Error => {
                self.inner.startup.lock().release();
                for role in [ServiceRole::Primary, ServiceRole::Secondary] {
                    BOUND_LISTENERS
                        .with_label_values(&[self.inner.name.as_str(), role.as_str()])
                        .set(0);
                }
            }
            LifecycleState::Stopping => {}
        }
    }

    /// Leave STARTING once the outcome is known.
    fn settle_startup(&self) {
        if self.current_state() != LifecycleState::Starting {
            return;
        }
        let readiness = self.inner.startup.lock().readiness();
        match readiness {
            Readiness::Pending(missing) => {
                debug!(bus = %self.inner.name, ?missing, "Waiting for listeners");
            }
            Readiness::Ready(_) => {
                if let Err(e) = self.apply_transition(LifecycleState::Serving) {
                    warn!(bus = %self.inner.name, error = %e, "Could not enter SERVING");
                }
            }
            Readiness::Failed(failures) => {
                for failure in &failures {
                    error!(bus = %self.inner.name, failure = %failure, "Startup failure");
                    STARTUP_FAILURES
                        .with_label_values(&[self.inner.name.as_str(), kind_label(failure.kind)])
                        .inc();
                }
                if let Err(e) = self.apply_transition(LifecycleState::Error) {
                    warn!(bus = %self.inner.name, error = %e, "Could not enter ERROR");
                }
            }
        }
    }

    fn apply_exit(&self) -> Result<LifecycleState, BusError> {
        match self.current_state() {
            LifecycleState::Serving => {
                self.apply_transition(LifecycleState::Stopping)?;
                self.apply_transition(LifecycleState::Exited)
            }
            LifecycleState::Starting | LifecycleState::Stopping => {
                self.apply_transition(LifecycleState::Exited)
            }
            state => {
                debug!(bus = %self.inner.name, state = %state, "Exit requested with nothing running");
                Ok(state)
            }
        }
    }

    fn apply_failure(&self, failure: BusFailure) -> Result<LifecycleState, BusError> {
        let state = self.current_state();
        if state.is_terminal() {
            warn!(bus = %self.inner.name, state = %state, failure = %failure, "Failure after shutdown ignored");
            return Ok(state);
        }
        error!(bus = %self.inner.name, failure = %failure, "Unrecoverable failure");
        STARTUP_FAILURES
            .with_label_values(&[self.inner.name.as_str(), kind_label(failure.kind)])
            .inc();
        self.inner.startup.lock().fail(failure);
        self.apply_transition(LifecycleState::Error)
    }

    fn on_listener_bound(&self, role: ServiceRole, addr: SocketAddr) {
        if self.current_state() != LifecycleState::Starting {
            debug!(bus = %self.inner.name, role = %role, %addr, "Late bind report ignored");
            return;
        }
        if !self.inner.startup.lock().bind(role, addr) {
            warn!(bus = %self.inner.name, role = %role, "Bind report for unregistered listener");
            return;
        }
        BOUND_LISTENERS
            .with_label_values(&[self.inner.name.as_str(), role.as_str()])
            .set(1);
        info!(bus = %self.inner.name, role = %role, port = addr.port(), "Listener bound");

        let report = self
            .inner
            .machine
            .publish(channels::LISTENER_BOUND, &BusEvent::ListenerBound { role, addr });
        self.count_failures(&report);
        self.settle_startup();
    }

    fn on_listener_failed(&self, role: ServiceRole, addr: SocketAddr, reason: String) {
        error!(bus = %self.inner.name, role = %role, %addr, reason = %reason, "Listener failed to bind");
        let event = BusEvent::ListenerFailed {
            role,
            addr,
            reason: reason.clone(),
        };
        let report = self.inner.machine.publish(channels::LISTENER_FAILED, &event);
        self.count_failures(&report);

        if self.current_state() == LifecycleState::Starting {
            self.inner
                .startup
                .lock()
                .fail(BusFailure::bind(role, addr, reason));
            self.settle_startup();
        }
    }

    fn count_failures(&self, report: &PublishReport) {
        if !report.is_clean() {
            SUBSCRIBER_FAILURES
                .with_label_values(&[self.inner.name.as_str(), report.channel.as_str()])
                .inc_by(report.failures.len() as u64);
        }
    }
}

impl std::fmt::Debug for ProcessBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBus")
            .field("name", &self.inner.name)
            .field("state", &self.current_state())
            .finish()
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::BindFailure => "bind",
        FailureKind::SubscriberFailure => "subscriber",
        FailureKind::StartupTimeout => "timeout",
        FailureKind::Plugin => "plugin",
    }
}

/// Consume commands until the queue closes or the bus is dropped.
fn dispatch_loop(bus: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(Envelope { command, reply }) = rx.blocking_recv() {
        let Some(inner) = bus.upgrade() else {
            break;
        };
        let bus = ProcessBus { inner };
        let result = bus.apply(command);
        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!(bus = %bus.inner.name, error = %e, "Queued command rejected");
                }
            }
        }
    }
    debug!("Dispatch thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bus() -> ProcessBus {
        ProcessBus::new("test", BusConfig::default()).unwrap()
    }

    fn record(bus: &ProcessBus, channel: &'static str, log: &Arc<Mutex<Vec<String>>>) {
        let log = Arc::clone(log);
        bus.subscribe(channel, move |_, _| {
            log.lock().push(channel.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Reports a bind from another thread, the way a listener task does.
    fn bind_later(bus: &ProcessBus, role: ServiceRole, port: u16) {
        let commands = bus.commands();
        bus.subscribe(LifecycleState::Starting.as_str(), move |_, _| {
            let commands = commands.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let _ = commands.listener_bound(role, SocketAddr::from(([127, 0, 0, 1], port)));
            });
            Ok(())
        })
        .unwrap();
        bus.register_listener(role).unwrap();
    }

    #[test]
    fn test_new_bus_is_idle() {
        let bus = bus();
        assert_eq!(bus.current_state(), LifecycleState::Idle);
        assert!(bus.can_transition(LifecycleState::Starting));
        assert!(bus.can_transition(LifecycleState::Idle));
        assert!(!bus.can_transition(LifecycleState::Serving));
        assert!(!bus.can_transition(LifecycleState::Exited));
    }

    #[test]
    fn test_run_without_listeners_serves_immediately() {
        let bus = bus();
        let payload = bus.run().unwrap();
        assert_eq!(payload, ServingPayload::default());
        assert_eq!(bus.current_state(), LifecycleState::Serving);
    }

    #[test]
    fn test_run_waits_for_registered_listeners() {
        let bus = bus();
        bind_later(&bus, ServiceRole::Primary, 45001);
        bind_later(&bus, ServiceRole::Secondary, 45002);

        let payload = bus.run().unwrap();

        assert_eq!(payload.port, 45001);
        assert_eq!(payload.zip_port, Some(45002));
        assert_eq!(bus.bound_port(), Some(45001));
        assert_eq!(bus.zip_port(), Some(45002));
    }

    #[test]
    fn test_serving_event_carries_resolved_ports() {
        let bus = bus();
        bind_later(&bus, ServiceRole::Primary, 45003);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.subscribe(LifecycleState::Serving.as_str(), move |_, event| {
            *sink.lock() = event.serving();
            Ok(())
        })
        .unwrap();

        bus.run().unwrap();

        assert_eq!(seen.lock().map(|p| p.port), Some(45003));
    }

    #[test]
    fn test_bind_failure_moves_to_error() {
        let bus = bus();
        let commands = bus.commands();
        bus.subscribe(LifecycleState::Starting.as_str(), move |_, _| {
            let addr = SocketAddr::from(([127, 0, 0, 1], 80));
            commands.listener_failed(ServiceRole::Primary, addr, "permission denied")?;
            Ok(())
        })
        .unwrap();
        bus.register_listener(ServiceRole::Primary).unwrap();

        let err = bus.run().unwrap_err();

        assert!(matches!(err, BusError::StartupFailed(_)));
        assert_eq!(err.failures()[0].kind, FailureKind::BindFailure);
        assert_eq!(bus.current_state(), LifecycleState::Error);
        assert_eq!(bus.bound_port(), None);
    }

    #[test]
    fn test_failing_starting_handler_moves_to_error() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(LifecycleState::Starting.as_str(), |_, _| {
            Err(anyhow::anyhow!("worker pool unavailable"))
        })
        .unwrap();
        record(&bus, "STARTING", &log);
        record(&bus, "ERROR", &log);

        let err = bus.run().unwrap_err();

        assert_eq!(err.failures()[0].kind, FailureKind::SubscriberFailure);
        assert!(err.to_string().contains("worker pool unavailable"));
        // The failing handler did not stop the next one.
        assert_eq!(*log.lock(), vec!["STARTING", "ERROR"]);
    }

    #[test]
    fn test_error_is_terminal() {
        let bus = bus();
        bus.fail(BusFailure::new(FailureKind::Plugin, "test", "broken"))
            .unwrap();
        assert_eq!(bus.current_state(), LifecycleState::Error);

        for state in LifecycleState::ALL {
            if state != LifecycleState::Error {
                assert!(!bus.can_transition(state));
                assert!(bus.transition(state).is_err());
            }
        }
        assert_eq!(bus.current_state(), LifecycleState::Error);
    }

    #[test]
    fn test_startup_timeout_forces_error() {
        let config = BusConfig::default().with_startup_timeout(Duration::from_millis(50));
        let bus = ProcessBus::new("slow", config).unwrap();
        bus.register_listener(ServiceRole::Primary).unwrap();

        let err = bus.run().unwrap_err();

        assert!(matches!(err, BusError::StartupTimeout(_)));
        assert_eq!(bus.current_state(), LifecycleState::Error);
        assert_eq!(
            bus.startup_failures()[0].kind,
            FailureKind::StartupTimeout
        );
    }

    #[test]
    fn test_registration_closes_at_first_start() {
        let bus = bus();
        bus.run().unwrap();

        let err = bus.subscribe("SERVING", |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, BusError::RegistrationClosed));
        assert!(matches!(
            bus.register_listener(ServiceRole::Primary),
            Err(BusError::RegistrationClosed)
        ));
    }

    #[test]
    fn test_self_transition_does_not_republish() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "SERVING", &log);
        bus.run().unwrap();

        assert_eq!(bus.transition(LifecycleState::Serving).unwrap(), LifecycleState::Serving);
        bus.run().unwrap();

        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_illegal_request_leaves_state() {
        let bus = bus();
        let err = bus.transition(LifecycleState::Stopping).unwrap_err();
        assert!(matches!(
            err,
            BusError::IllegalTransition {
                from: LifecycleState::Idle,
                to: LifecycleState::Stopping
            }
        ));
        assert_eq!(bus.current_state(), LifecycleState::Idle);
    }

    #[test]
    fn test_exit_from_serving_goes_through_stopping() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "STOPPING", &log);
        record(&bus, "EXITED", &log);
        bus.run().unwrap();

        assert_eq!(bus.exit().unwrap(), LifecycleState::Exited);
        assert_eq!(*log.lock(), vec!["STOPPING", "EXITED"]);
        assert_eq!(bus.exit().unwrap(), LifecycleState::Exited);
    }

    #[test]
    fn test_exit_from_idle_is_noop() {
        let bus = bus();
        assert_eq!(bus.exit().unwrap(), LifecycleState::Idle);
    }

    #[test]
    fn test_queued_requests_apply_in_order() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&bus, "STOPPING", &log);
        record(&bus, "IDLE", &log);
        record(&bus, "STARTING", &log);
        bus.run().unwrap();

        let commands = bus.commands();
        commands.request(LifecycleState::Stopping).unwrap();
        commands.request(LifecycleState::Idle).unwrap();
        commands.request(LifecycleState::Starting).unwrap();
        // A blocking call is queued behind the three requests.
        bus.transition(LifecycleState::Serving).unwrap();

        assert_eq!(*log.lock(), vec!["STARTING", "STOPPING", "IDLE", "STARTING"]);
        assert_eq!(bus.current_state(), LifecycleState::Serving);
    }

    #[test]
    fn test_handler_may_transition_reentrantly() {
        let bus = bus();
        bus.subscribe("SERVING", |bus, _| {
            bus.transition(LifecycleState::Stopping)?;
            Ok(())
        })
        .unwrap();

        // The nested move happens before `run` gets to observe SERVING.
        assert!(matches!(
            bus.run(),
            Err(BusError::Interrupted(LifecycleState::Stopping))
        ));
        assert_eq!(bus.current_state(), LifecycleState::Stopping);
    }

    #[test]
    fn test_run_from_handler_is_rejected() {
        let bus = bus();
        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        bus.subscribe("SERVING", move |bus, _| {
            *sink.lock() = Some(bus.run().map(|_| ()));
            Ok(())
        })
        .unwrap();

        bus.run().unwrap();
        assert!(matches!(
            result.lock().take(),
            Some(Err(BusError::BlockingOnDispatcher))
        ));
    }

    #[test]
    fn test_blocking_call_inside_async_task_is_rejected() {
        let bus = bus();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = runtime
            .block_on(async { bus.transition(LifecycleState::Starting) })
            .unwrap_err();
        assert!(matches!(err, BusError::AsyncContext));
        assert_eq!(bus.current_state(), LifecycleState::Idle);
    }

    #[test]
    fn test_is_service_url_matches_bound_endpoints_only() {
        let bus = bus();
        bind_later(&bus, ServiceRole::Primary, 45010);
        bus.run().unwrap();

        assert!(bus.is_service_url("http://127.0.0.1:45010/learn/#/topics"));
        assert!(!bus.is_service_url("https://127.0.0.1:45010/"));
        assert!(!bus.is_service_url("http://127.0.0.1:45011/"));
        assert!(!bus.is_service_url("http://example.com/"));
        assert!(!bus.is_service_url("not a url"));

        bus.exit().unwrap();
        assert!(!bus.is_service_url("http://127.0.0.1:45010/"));
    }

    #[test]
    fn test_session_key_is_set_once() {
        let bus = bus();
        assert!(bus.session_key().is_none());
        bus.set_session_key(AppKey::new("first")).unwrap();
        assert!(matches!(
            bus.set_session_key(AppKey::new("second")),
            Err(BusError::SessionKeyAlreadySet)
        ));
        assert_eq!(bus.session_key().unwrap().as_str(), "first");
    }

    #[test]
    fn test_graceful_sets_drain_deadline() {
        let config = BusConfig::default().with_drain_deadline(Duration::from_secs(3));
        let bus = ProcessBus::new("workers", config).unwrap();
        assert_eq!(bus.drain_policy(), DrainPolicy::Immediate);

        bus.graceful().unwrap();
        assert_eq!(
            bus.drain_policy(),
            DrainPolicy::Graceful(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_custom_events_are_delivered_after_current_fanout() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Arc::clone(&log);
        bus.subscribe("SERVING", move |bus, _| {
            bus.publish(
                "ANNOUNCED",
                BusEvent::Custom {
                    name: "announced".into(),
                    data: serde_json::Value::Null,
                },
            )?;
            outer.lock().push("serving:first".to_string());
            Ok(())
        })
        .unwrap();
        record(&bus, "SERVING", &log);
        record(&bus, "ANNOUNCED", &log);

        bus.run().unwrap();
        // Queued behind the publish.
        bus.transition(LifecycleState::Serving).unwrap();

        assert_eq!(*log.lock(), vec!["serving:first", "SERVING", "ANNOUNCED"]);
    }

    #[test]
    fn test_cycles_keep_subscriber_counts_stable() {
        let bus = bus();
        bind_later(&bus, ServiceRole::Primary, 45020);
        let before = bus.total_subscribers();

        for _ in 0..5 {
            bus.run().unwrap();
            bus.transition(LifecycleState::Stopping).unwrap();
            bus.transition(LifecycleState::Idle).unwrap();
        }

        assert_eq!(bus.total_subscribers(), before);
    }
}

//! # Host Activity
//!
//! Maps the mobile host's activity callbacks onto the two buses.
//!
//! | Callback | Server bus | Worker bus |
//! |----------|------------|------------|
//! | created | `run` on a starter thread | `graceful` on a starter thread |
//! | resumed | IDLE: request STARTING | - |
//! | stopped | SERVING: save path, request STOPPING then IDLE | - |
//! | save state | persist the path to reopen | - |
//! | destroyed | `exit` | `exit` (drains) |
//!
//! Callbacks run on the host's UI thread and never wait for a transition.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use shared_types::{keys, BusError, LifecycleState, ServingPayload};
use tracing::{debug, info, warn};
use url::Url;

use ch_06_host_bridge::service_path;

use crate::container::HostContext;

type StartResult = Result<ServingPayload, BusError>;

/// Results of the initial start of both buses.
#[derive(Debug)]
pub struct StartupOutcome {
    pub server: StartResult,
    pub worker: StartResult,
}

/// Starter threads spawned by [`HostActivity::on_created`].
#[derive(Debug)]
pub struct StartupHandle {
    server: JoinHandle<StartResult>,
    worker: JoinHandle<StartResult>,
}

impl StartupHandle {
    /// Wait for both buses to settle.
    pub fn join(self) -> StartupOutcome {
        StartupOutcome {
            server: joined(self.server),
            worker: joined(self.worker),
        }
    }
}

fn joined(handle: JoinHandle<StartResult>) -> StartResult {
    // A panicking starter thread leaves nothing to report back through.
    handle.join().unwrap_or(Err(BusError::DispatcherGone))
}

pub struct HostActivity {
    context: Arc<HostContext>,
    /// Path captured when the server was last stopped.
    last_path: Mutex<Option<String>>,
}

impl HostActivity {
    #[must_use]
    pub fn new(context: Arc<HostContext>) -> Self {
        Self {
            context,
            last_path: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    /// Show the loading page and start both buses in the background.
    pub fn on_created(&self) -> io::Result<StartupHandle> {
        self.show_loading_page();

        let worker = self.context.worker().clone();
        let worker = thread::Builder::new()
            .name("worker-bus-start".into())
            .spawn(move || {
                let started = worker.graceful();
                if let Err(e) = &started {
                    warn!(error = %e, "Worker bus did not start");
                }
                started
            })?;

        let server = self.context.server().clone();
        let server = thread::Builder::new()
            .name("server-bus-start".into())
            .spawn(move || {
                let started = server.run();
                match &started {
                    Ok(payload) => info!(port = payload.port, zip_port = ?payload.zip_port, "Server bus serving"),
                    Err(e) => warn!(error = %e, "Server bus did not start"),
                }
                started
            })?;

        Ok(StartupHandle { server, worker })
    }

    pub fn on_resumed(&self) {
        let server = self.context.server();
        let state = server.current_state();
        if state != LifecycleState::Starting && server.can_transition(LifecycleState::Starting) {
            self.last_path.lock().take();
            self.show_loading_page();
            if let Err(e) = server.commands().request(LifecycleState::Starting) {
                warn!(error = %e, "Cannot restart server bus");
            }
        } else if matches!(state, LifecycleState::Starting | LifecycleState::Serving) {
            debug!(state = %state, "Server bus already up");
        } else {
            warn!(state = %state, "Cannot resume server bus");
        }
    }

    pub fn on_stopped(&self) {
        let server = self.context.server();
        let state = server.current_state();
        if state != LifecycleState::Stopping && server.can_transition(LifecycleState::Stopping) {
            let path = self.current_path();
            if let Some(path) = &path {
                self.save_path(path);
            }
            *self.last_path.lock() = path;
            self.show_loading_page();

            let commands = server.commands();
            let stopped = commands
                .request(LifecycleState::Stopping)
                .and_then(|()| commands.request(LifecycleState::Idle));
            if let Err(e) = stopped {
                warn!(error = %e, "Cannot stop server bus");
            }
        } else if matches!(state, LifecycleState::Idle | LifecycleState::Stopping) {
            debug!(state = %state, "Server bus already stopped");
        } else {
            warn!(state = %state, "Cannot stop server bus");
        }
    }

    /// Persist the path to reopen. Keeps the previous value when no service
    /// page is showing.
    pub fn on_save_instance_state(&self) {
        let path = self.last_path.lock().take().or_else(|| self.current_path());
        if let Some(path) = path {
            self.save_path(&path);
        }
    }

    /// Exit the worker bus, then the server bus.
    pub fn on_destroyed(&self) -> Result<(), BusError> {
        let worker = self.context.worker().exit();
        let server = self.context.server().exit();
        info!(worker = ?worker, server = ?server, "Host activity destroyed");
        worker.and(server).map(|_| ())
    }

    /// Path of the service page currently showing, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<String> {
        let current = self.context.adapter().current_url()?;
        if !self.context.server().is_service_url(&current) {
            return None;
        }
        Url::parse(&current).ok().map(|url| service_path(&url))
    }

    fn save_path(&self, path: &str) {
        match self.context.store().set(keys::SAVED_PATH, path) {
            Ok(()) => debug!(path, "Saved path"),
            Err(e) => warn!(error = %e, "Cannot save path"),
        }
    }

    fn show_loading_page(&self) {
        if let Err(e) = self.context.adapter().show_loading_page() {
            warn!(error = %e, "Cannot show loading page");
        }
    }
}

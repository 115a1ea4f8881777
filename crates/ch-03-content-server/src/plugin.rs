//! # Content Server Plugins

use std::sync::Arc;

use ch_02_process_bus::{BusPlugin, CommandSender, ProcessBus};
use parking_lot::Mutex;
use shared_types::{
    AppKey, HostStore, LifecycleState, PluginError, ServiceDescriptor, ServiceRole,
};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::ContentServerConfig;
use crate::handler::{ConnectionHandler, StatusPageHandler};
use crate::listener::RunningListener;

/// State shared between the plugin and its bus handlers.
struct Server {
    config: ContentServerConfig,
    runtime: Handle,
    handler: Arc<dyn ConnectionHandler>,
    descriptor: Arc<Mutex<ServiceDescriptor>>,
    running: Mutex<Option<RunningListener>>,
}

impl Server {
    fn start(&self, commands: CommandSender) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!(role = %self.config.role, "Listener already running");
            return;
        }
        *running = Some(RunningListener::spawn(
            &self.runtime,
            self.config.role,
            self.config.bind_addr(),
            Arc::clone(&self.handler),
            Arc::clone(&self.descriptor),
            commands,
        ));
    }

    fn stop(&self, state: LifecycleState) {
        let Some(listener) = self.running.lock().take() else {
            return;
        };
        if !listener.stop(&self.runtime, self.config.stop_timeout) {
            warn!(
                role = %self.config.role,
                timeout = ?self.config.stop_timeout,
                "Listener did not stop in time"
            );
        }
        self.descriptor.lock().clear();
        info!(role = %self.config.role, state = %state, "Listener released");
    }
}

/// Primary HTTP content server.
///
/// On STARTING it binds `config.bind_addr()` on the runtime and reports the
/// resolved port; on STOPPING, EXITED or ERROR it releases the socket.
pub struct ContentServerPlugin {
    server: Arc<Server>,
    session_store: Option<Arc<dyn HostStore>>,
}

impl ContentServerPlugin {
    /// Serve the status page until another handler is set.
    #[must_use]
    pub fn new(config: ContentServerConfig, runtime: Handle) -> Self {
        let handler = Arc::new(StatusPageHandler::new(
            config.role,
            config.content_root.clone(),
        ));
        Self::with_handler(config, runtime, handler)
    }

    #[must_use]
    pub fn with_handler(
        config: ContentServerConfig,
        runtime: Handle,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        let descriptor = ServiceDescriptor::new(config.role, config.port);
        Self {
            server: Arc::new(Server {
                config,
                runtime,
                handler,
                descriptor: Arc::new(Mutex::new(descriptor)),
                running: Mutex::new(None),
            }),
            session_store: None,
        }
    }

    /// Load (or mint) the session key from `store` when attaching and
    /// install it on the bus.
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn HostStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Snapshot of this server's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> ServiceDescriptor {
        *self.server.descriptor.lock()
    }

    #[must_use]
    pub fn role(&self) -> ServiceRole {
        self.server.config.role
    }

    fn install_session_key(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        let Some(store) = &self.session_store else {
            return Ok(());
        };
        let key = AppKey::load_or_create(store.as_ref()).map_err(|e| PluginError::Collaborator {
            name: "host store".to_string(),
            reason: e.to_string(),
        })?;
        bus.set_session_key(key)?;
        Ok(())
    }
}

impl BusPlugin for ContentServerPlugin {
    fn name(&self) -> &'static str {
        match self.server.config.role {
            ServiceRole::Primary => "content-server",
            ServiceRole::Secondary => "zip-content-server",
        }
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        self.install_session_key(bus)?;
        bus.register_listener(self.server.config.role)?;

        let server = Arc::clone(&self.server);
        bus.subscribe(LifecycleState::Starting.as_str(), move |bus, _| {
            server.start(bus.commands());
            Ok(())
        })?;

        for state in [
            LifecycleState::Stopping,
            LifecycleState::Exited,
            LifecycleState::Error,
        ] {
            let server = Arc::clone(&self.server);
            bus.subscribe(state.as_str(), move |_, _| {
                server.stop(state);
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Secondary server for zipped content. Same lifecycle as the primary,
/// reported as `zip_port` in the SERVING payload.
pub struct ZipContentServerPlugin(ContentServerPlugin);

impl ZipContentServerPlugin {
    #[must_use]
    pub fn new(mut config: ContentServerConfig, runtime: Handle) -> Self {
        config.role = ServiceRole::Secondary;
        Self(ContentServerPlugin::new(config, runtime))
    }

    #[must_use]
    pub fn descriptor(&self) -> ServiceDescriptor {
        self.0.descriptor()
    }
}

impl BusPlugin for ZipContentServerPlugin {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        self.0.subscribe(bus)
    }
}

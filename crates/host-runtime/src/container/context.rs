//! # Host Context
//!
//! The single owner of a host process's resources.
//!
//! ## Construction order
//!
//! 1. Validate configuration, create the home directory
//! 2. Lock the home directory (one host per home)
//! 3. Open the host store and the job store
//! 4. Start the async runtime
//! 5. Build the server and worker buses and attach their plugins
//!
//! ## Release order (on drop)
//!
//! Worker bus exits, then the server bus, then the runtime shuts down. The
//! home lock goes last.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ch_02_process_bus::{BuildError, ProcessBus};
use ch_03_content_server::{ContentServerConfig, ContentServerPlugin, ZipContentServerPlugin};
use ch_04_network_announcer::{NetworkAnnouncerPlugin, UdpAnnouncer};
use ch_05_worker_pool::{
    JobRecord, JobStore, JobStoreError, JsonFileJobStore, RunnerRegistry, WorkerPoolConfig,
    WorkerPoolPlugin,
};
use ch_06_host_bridge::{AppBridgePlugin, ForegroundNotifier, ForegroundPlugin, HostAdapter};
use shared_types::{HostStore, PluginError, ServiceRole, StoreError};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use crate::adapters::{HomeLock, JsonFileStore, LockError};
use crate::container::config::{ConfigError, HostConfig};
use crate::plugins::ServicePlugin;

/// How long the runtime gets to wind down its tasks on drop.
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot create home directory {}: {source}", .path.display())]
    Home {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("host store: {0}")]
    Store(#[from] StoreError),

    #[error("job store: {0}")]
    Jobs(#[from] JobStoreError),

    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("cannot build bus: {0}")]
    Bus(#[from] BuildError),

    #[error("cannot attach plugin: {0}")]
    Plugin(#[from] PluginError),
}

pub struct HostContext {
    config: HostConfig,
    server: ProcessBus,
    worker: ProcessBus,
    server_plugins: Vec<ServicePlugin>,
    worker_plugins: Vec<ServicePlugin>,
    store: Arc<JsonFileStore>,
    jobs: Arc<JsonFileJobStore>,
    adapter: Arc<dyn HostAdapter>,
    runtime: Option<Runtime>,
    _lock: HomeLock,
}

impl HostContext {
    pub fn new(
        config: HostConfig,
        adapter: Arc<dyn HostAdapter>,
        notifier: Arc<dyn ForegroundNotifier>,
        runners: RunnerRegistry,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        let home = &config.paths.home;
        fs::create_dir_all(home).map_err(|source| ContextError::Home {
            path: home.clone(),
            source,
        })?;
        let lock = HomeLock::acquire(config.paths.lock_file())?;

        let store = Arc::new(JsonFileStore::open(config.paths.store_file())?);
        let jobs = Arc::new(JsonFileJobStore::open(config.paths.jobs_file())?);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("content-host-rt")
            .enable_all()
            .build()
            .map_err(ContextError::Runtime)?;
        let handle = runtime.handle().clone();

        let server = ProcessBus::new("server", config.bus.clone())?;
        let worker = ProcessBus::new("worker", config.bus.clone())?;

        let server_plugins = server_plugins(&config, &handle, &store, &adapter, &notifier);
        for plugin in &server_plugins {
            plugin.attach(&server)?;
        }
        let worker_plugins = worker_plugins(&config, &handle, &jobs, &notifier, runners);
        for plugin in &worker_plugins {
            plugin.attach(&worker)?;
        }

        info!(
            home = %home.display(),
            server_plugins = server_plugins.len(),
            worker_plugins = worker_plugins.len(),
            "Host context ready"
        );
        Ok(Self {
            config,
            server,
            worker,
            server_plugins,
            worker_plugins,
            store,
            jobs,
            adapter,
            runtime: Some(runtime),
            _lock: lock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Content servers, announcer and app bridge.
    #[must_use]
    pub fn server(&self) -> &ProcessBus {
        &self.server
    }

    /// Background job workers.
    #[must_use]
    pub fn worker(&self) -> &ProcessBus {
        &self.worker
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn HostStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn jobs(&self) -> Arc<dyn JobStore> {
        self.jobs.clone()
    }

    #[must_use]
    pub fn adapter(&self) -> Arc<dyn HostAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Handle of the runtime running listeners, announcements and jobs.
    #[must_use]
    pub fn runtime_handle(&self) -> Option<Handle> {
        self.runtime.as_ref().map(|rt| rt.handle().clone())
    }

    #[must_use]
    pub fn server_plugin_names(&self) -> Vec<&'static str> {
        self.server_plugins.iter().map(ServicePlugin::name).collect()
    }

    #[must_use]
    pub fn worker_plugin_names(&self) -> Vec<&'static str> {
        self.worker_plugins.iter().map(ServicePlugin::name).collect()
    }

    #[must_use]
    pub fn worker_pool(&self) -> Option<&WorkerPoolPlugin> {
        self.worker_plugins.iter().find_map(|plugin| match plugin {
            ServicePlugin::WorkerPool(pool) => Some(pool),
            _ => None,
        })
    }

    /// Queue a background job on the worker bus.
    pub fn submit_job(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<String, JobStoreError> {
        match self.worker_pool() {
            Some(pool) => pool.submit(kind, payload),
            None => {
                let job = JobRecord::new(kind, payload);
                let id = job.id.clone();
                self.jobs.insert(job)?;
                Ok(id)
            }
        }
    }
}

impl Drop for HostContext {
    fn drop(&mut self) {
        for bus in [&self.worker, &self.server] {
            match bus.exit() {
                Ok(state) => info!(bus = %bus.name(), state = %state, "Bus shut down"),
                Err(e) => warn!(bus = %bus.name(), error = %e, "Bus did not shut down cleanly"),
            }
        }
        if let Some(runtime) = self.runtime.take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
            }
        }
        info!("Host context released");
    }
}

fn server_plugins(
    config: &HostConfig,
    handle: &Handle,
    store: &Arc<JsonFileStore>,
    adapter: &Arc<dyn HostAdapter>,
    notifier: &Arc<dyn ForegroundNotifier>,
) -> Vec<ServicePlugin> {
    let server = &config.server;
    let paths = &config.paths;
    let store: Arc<dyn HostStore> = store.clone();

    let mut plugins = vec![
        ServicePlugin::ContentServer(
            ContentServerPlugin::new(
                ContentServerConfig::new(ServiceRole::Primary, paths.content_root())
                    .with_port(server.port)
                    .with_bind_host(server.bind_host),
                handle.clone(),
            )
            .with_session_store(Arc::clone(&store)),
        ),
        ServicePlugin::ZipContentServer(ZipContentServerPlugin::new(
            ContentServerConfig::new(ServiceRole::Secondary, paths.zip_content_root())
                .with_port(server.zip_port)
                .with_bind_host(server.bind_host),
            handle.clone(),
        )),
    ];

    if server.zeroconf {
        let instance = format!("content-host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        plugins.push(ServicePlugin::NetworkAnnouncer(
            NetworkAnnouncerPlugin::new(Arc::new(UdpAnnouncer::new(handle.clone())), instance)
                .with_attribute("version", env!("CARGO_PKG_VERSION")),
        ));
    }

    let mut bridge = AppBridgePlugin::new(Arc::clone(adapter), store);
    if let Some(path) = &server.initialize_path {
        bridge = bridge.with_initialize_path(path.clone());
    }
    plugins.push(ServicePlugin::AppBridge(bridge));
    plugins.push(ServicePlugin::Foreground(ForegroundPlugin::new(
        Arc::clone(notifier),
        "Content host",
        "Serving content.",
    )));
    plugins
}

fn worker_plugins(
    config: &HostConfig,
    handle: &Handle,
    jobs: &Arc<JsonFileJobStore>,
    notifier: &Arc<dyn ForegroundNotifier>,
    runners: RunnerRegistry,
) -> Vec<ServicePlugin> {
    let pool_config = WorkerPoolConfig::default()
        .with_workers(config.worker.workers)
        .with_poll_interval(config.worker.poll_interval);
    vec![
        ServicePlugin::WorkerPool(WorkerPoolPlugin::new(
            pool_config,
            jobs.clone(),
            runners,
            handle.clone(),
        )),
        ServicePlugin::Foreground(ForegroundPlugin::new(
            Arc::clone(notifier),
            "Content host",
            "Running tasks.",
        )),
    ]
}

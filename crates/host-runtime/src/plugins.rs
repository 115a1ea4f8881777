//! # Service Plugins
//!
//! The closed set of plugins a host attaches to its buses.

use ch_02_process_bus::{BusPlugin, ProcessBus};
use ch_03_content_server::{ContentServerPlugin, ZipContentServerPlugin};
use ch_04_network_announcer::NetworkAnnouncerPlugin;
use ch_05_worker_pool::WorkerPoolPlugin;
use ch_06_host_bridge::{AppBridgePlugin, ForegroundPlugin};
use shared_types::PluginError;

pub enum ServicePlugin {
    ContentServer(ContentServerPlugin),
    ZipContentServer(ZipContentServerPlugin),
    NetworkAnnouncer(NetworkAnnouncerPlugin),
    WorkerPool(WorkerPoolPlugin),
    AppBridge(AppBridgePlugin),
    Foreground(ForegroundPlugin),
}

impl ServicePlugin {
    fn as_plugin(&self) -> &dyn BusPlugin {
        match self {
            ServicePlugin::ContentServer(p) => p,
            ServicePlugin::ZipContentServer(p) => p,
            ServicePlugin::NetworkAnnouncer(p) => p,
            ServicePlugin::WorkerPool(p) => p,
            ServicePlugin::AppBridge(p) => p,
            ServicePlugin::Foreground(p) => p,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.as_plugin().name()
    }

    pub fn attach(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        bus.attach(self.as_plugin())
    }
}

impl std::fmt::Debug for ServicePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServicePlugin").field(&self.name()).finish()
    }
}

//! The capability every service plugin implements.

use shared_types::PluginError;

use crate::bus::ProcessBus;

/// A unit that attaches handlers to a bus and manages one external
/// resource from them.
///
/// `subscribe` is called once, before the bus is first started. Plugins
/// never call each other; they only react to and publish bus events.
pub trait BusPlugin {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Attach this plugin's handlers to `bus`.
    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError>;
}

//! # Foreground Plugin

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ch_02_process_bus::{BusPlugin, ProcessBus};
use shared_types::{LifecycleState, PluginError};
use tracing::info;

use crate::ports::ForegroundNotifier;

struct Foreground {
    notifier: Arc<dyn ForegroundNotifier>,
    title: String,
    text: String,
    active: AtomicBool,
}

/// Foregrounds the host process the first time the bus starts and releases
/// it when the bus is done for good.
pub struct ForegroundPlugin {
    inner: Arc<Foreground>,
}

impl ForegroundPlugin {
    #[must_use]
    pub fn new(
        notifier: Arc<dyn ForegroundNotifier>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Foreground {
                notifier,
                title: title.into(),
                text: text.into(),
                active: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

impl BusPlugin for ForegroundPlugin {
    fn name(&self) -> &'static str {
        "foreground"
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        let inner = Arc::clone(&self.inner);
        bus.subscribe(LifecycleState::Starting.as_str(), move |bus, _| {
            if inner.active.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            if let Err(e) = inner.notifier.make_foreground(&inner.title, &inner.text) {
                inner.active.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
            info!(bus = %bus.name(), title = %inner.title, "Process foregrounded");
            Ok(())
        })?;

        for state in [LifecycleState::Exited, LifecycleState::Error] {
            let inner = Arc::clone(&self.inner);
            bus.subscribe(state.as_str(), move |bus, _| {
                if !inner.active.swap(false, Ordering::SeqCst) {
                    return Ok(());
                }
                inner.notifier.release()?;
                info!(bus = %bus.name(), state = %state, "Foreground released");
                Ok(())
            })?;
        }
        Ok(())
    }
}

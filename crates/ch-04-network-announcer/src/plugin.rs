//! # Network Announcer Plugin

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use ch_02_process_bus::{BusPlugin, ProcessBus};
use parking_lot::Mutex;
use shared_types::{channels, BusEvent, LifecycleState, PluginError, ServingPayload};
use tracing::{debug, info};

use crate::record::DiscoveryRecord;
use crate::registrar::DiscoveryRegistrar;

struct Announcer {
    registrar: Arc<dyn DiscoveryRegistrar>,
    instance: String,
    attributes: BTreeMap<String, String>,
    /// Instance name while a record is out.
    announced: Mutex<Option<String>>,
}

impl Announcer {
    fn announce(&self, bus: &ProcessBus, payload: ServingPayload) -> anyhow::Result<()> {
        if payload.port == 0 {
            debug!(bus = %bus.name(), "No bound port to announce");
            return Ok(());
        }
        let mut record = DiscoveryRecord::for_payload(self.instance.clone(), payload);
        record.txt.extend(self.attributes.clone());

        self.registrar
            .register(&record)
            .with_context(|| format!("registering discovery record {}", record.instance))?;
        *self.announced.lock() = Some(record.instance.clone());
        info!(bus = %bus.name(), instance = %record.instance, port = record.port, "Discovery record registered");

        bus.publish(
            channels::ANNOUNCED,
            BusEvent::Custom {
                name: "announced".to_string(),
                data: serde_json::to_value(&record)?,
            },
        )?;
        Ok(())
    }

    fn withdraw(&self, state: LifecycleState) -> anyhow::Result<()> {
        let Some(instance) = self.announced.lock().take() else {
            return Ok(());
        };
        self.registrar
            .deregister(&instance)
            .with_context(|| format!("deregistering discovery record {instance}"))?;
        info!(instance = %instance, state = %state, "Discovery record withdrawn");
        Ok(())
    }
}

/// Advertises the bound port on the local network while the bus serves.
pub struct NetworkAnnouncerPlugin {
    announcer: Arc<Announcer>,
}

impl NetworkAnnouncerPlugin {
    #[must_use]
    pub fn new(registrar: Arc<dyn DiscoveryRegistrar>, instance: impl Into<String>) -> Self {
        Self {
            announcer: Arc::new(Announcer {
                registrar,
                instance: instance.into(),
                attributes: BTreeMap::new(),
                announced: Mutex::new(None),
            }),
        }
    }

    /// Extra attribute advertised with every record. Ignored once the
    /// plugin has been attached.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(announcer) = Arc::get_mut(&mut self.announcer) {
            announcer.attributes.insert(key.into(), value.into());
        }
        self
    }

    #[must_use]
    pub fn instance(&self) -> &str {
        &self.announcer.instance
    }

    #[must_use]
    pub fn is_announced(&self) -> bool {
        self.announcer.announced.lock().is_some()
    }
}

impl BusPlugin for NetworkAnnouncerPlugin {
    fn name(&self) -> &'static str {
        "network-announcer"
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        let announcer = Arc::clone(&self.announcer);
        bus.subscribe(LifecycleState::Serving.as_str(), move |bus, event| {
            match event.serving() {
                Some(payload) => announcer.announce(bus, payload),
                None => Ok(()),
            }
        })?;

        for state in [
            LifecycleState::Stopping,
            LifecycleState::Exited,
            LifecycleState::Error,
        ] {
            let announcer = Arc::clone(&self.announcer);
            bus.subscribe(state.as_str(), move |_, _| announcer.withdraw(state))?;
        }
        Ok(())
    }
}

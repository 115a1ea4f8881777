//! # App Bridge Plugin
//!
//! Points the embedded browser view at the server once it is SERVING,
//! resuming at the path the user was on when the host last went away.

use std::sync::Arc;

use ch_02_process_bus::{BusPlugin, ProcessBus};
use shared_types::{keys, HostStore, LifecycleState, PluginError, ServingPayload};
use tracing::info;
use url::Url;

use crate::ports::HostAdapter;

/// Cookies are set per host, so the port is left out.
pub const COOKIE_URL: &str = "http://127.0.0.1";

/// Root URL of a server listening on `port`.
pub fn base_url(port: u16) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{COOKIE_URL}:{port}/"))
}

/// Path, query and fragment of `url`, without scheme or authority. This is
/// what gets saved so the same page can be reopened on another port.
#[must_use]
pub fn service_path(url: &Url) -> String {
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        path.push('#');
        path.push_str(fragment);
    }
    path
}

struct Bridge {
    adapter: Arc<dyn HostAdapter>,
    store: Arc<dyn HostStore>,
    initialize_path: Option<String>,
}

impl Bridge {
    fn start_url(&self, payload: ServingPayload) -> anyhow::Result<Url> {
        let base = base_url(payload.port)?;
        let next = match self.store.get(keys::SAVED_PATH)? {
            Some(saved) => Some(saved),
            None => self.initialize_path.clone(),
        };
        Ok(match next.as_deref() {
            Some(path) if !path.is_empty() => base.join(path)?,
            _ => base,
        })
    }

    fn redirect(&self, bus: &ProcessBus, payload: ServingPayload) -> anyhow::Result<()> {
        let url = self.start_url(payload)?;
        if let Some(key) = bus.session_key() {
            self.adapter
                .set_app_key_cookie(&Url::parse(COOKIE_URL)?, &key)?;
        }
        self.adapter.replace_url(&url)?;
        info!(bus = %bus.name(), url = %url, "Browser view pointed at server");
        Ok(())
    }
}

/// Hands the server URL to the host on every SERVING.
pub struct AppBridgePlugin {
    bridge: Arc<Bridge>,
}

impl AppBridgePlugin {
    #[must_use]
    pub fn new(adapter: Arc<dyn HostAdapter>, store: Arc<dyn HostStore>) -> Self {
        Self {
            bridge: Arc::new(Bridge {
                adapter,
                store,
                initialize_path: None,
            }),
        }
    }

    /// Path opened when nothing was saved, e.g. the first-run setup page.
    #[must_use]
    pub fn with_initialize_path(mut self, path: impl Into<String>) -> Self {
        if let Some(bridge) = Arc::get_mut(&mut self.bridge) {
            bridge.initialize_path = Some(path.into());
        }
        self
    }
}

impl BusPlugin for AppBridgePlugin {
    fn name(&self) -> &'static str {
        "app-bridge"
    }

    fn subscribe(&self, bus: &ProcessBus) -> Result<(), PluginError> {
        let bridge = Arc::clone(&self.bridge);
        bus.subscribe(LifecycleState::Serving.as_str(), move |bus, event| {
            match event.serving() {
                Some(payload) => bridge.redirect(bus, payload),
                None => Ok(()),
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HostCall, RecordingHostAdapter};
    use ch_02_process_bus::BusConfig;
    use shared_types::{AppKey, InMemoryHostStore, ServiceRole};

    fn serving_bus(plugin: &AppBridgePlugin, port: u16) -> ProcessBus {
        let bus = ProcessBus::new("server", BusConfig::default()).unwrap();
        bus.register_listener(ServiceRole::Primary).unwrap();
        bus.set_session_key(AppKey::new("k3y")).unwrap();
        bus.attach(plugin).unwrap();
        bus.transition(LifecycleState::Starting).unwrap();
        bus.listener_bound(ServiceRole::Primary, ([127, 0, 0, 1], port).into())
            .unwrap();
        bus.run().unwrap();
        bus
    }

    #[test]
    fn test_service_path_keeps_query_and_fragment() {
        let url = Url::parse("http://127.0.0.1:8080/learn/?q=1#/topics/abc").unwrap();
        assert_eq!(service_path(&url), "/learn/?q=1#/topics/abc");
        assert_eq!(service_path(&base_url(8080).unwrap()), "/");
    }

    #[test]
    fn test_serving_loads_saved_path_on_new_port() {
        let adapter = Arc::new(RecordingHostAdapter::new());
        let store = Arc::new(InMemoryHostStore::new());
        store.set(keys::SAVED_PATH, "/learn/#/topics/abc").unwrap();
        let plugin = AppBridgePlugin::new(adapter.clone(), store);

        serving_bus(&plugin, 9100);

        assert_eq!(
            adapter.calls(),
            vec![
                HostCall::Cookie {
                    url: "http://127.0.0.1/".into(),
                    key: "k3y".into()
                },
                HostCall::Replace("http://127.0.0.1:9100/learn/#/topics/abc".into()),
            ]
        );
    }

    #[test]
    fn test_initialize_path_used_without_saved_path() {
        let adapter = Arc::new(RecordingHostAdapter::new());
        let plugin = AppBridgePlugin::new(adapter.clone(), Arc::new(InMemoryHostStore::new()))
            .with_initialize_path("/app/setup");

        serving_bus(&plugin, 9101);

        assert_eq!(
            adapter.last_replaced().as_deref(),
            Some("http://127.0.0.1:9101/app/setup")
        );
    }

    #[test]
    fn test_base_url_without_any_path() {
        let adapter = Arc::new(RecordingHostAdapter::new());
        let plugin = AppBridgePlugin::new(adapter.clone(), Arc::new(InMemoryHostStore::new()));

        serving_bus(&plugin, 9102);

        assert_eq!(
            adapter.last_replaced().as_deref(),
            Some("http://127.0.0.1:9102/")
        );
    }
}

//! Host adapter for runs without an embedded browser view.

use parking_lot::Mutex;
use shared_types::AppKey;
use tracing::info;
use url::Url;

use ch_06_host_bridge::{BridgeError, ForegroundNotifier, HostAdapter};

/// Logs every host call and remembers the last URL it was told to show.
#[derive(Debug, Default)]
pub struct LoggingHostAdapter {
    current: Mutex<Option<String>>,
}

impl LoggingHostAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostAdapter for LoggingHostAdapter {
    fn replace_url(&self, url: &Url) -> Result<(), BridgeError> {
        info!(url = %url, "[Host] Open");
        *self.current.lock() = Some(url.to_string());
        Ok(())
    }

    fn set_app_key_cookie(&self, url: &Url, _key: &AppKey) -> Result<(), BridgeError> {
        info!(url = %url, "[Host] Session cookie set");
        Ok(())
    }

    fn show_loading_page(&self) -> Result<(), BridgeError> {
        info!("[Host] Loading page");
        *self.current.lock() = None;
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

impl ForegroundNotifier for LoggingHostAdapter {
    fn make_foreground(&self, title: &str, text: &str) -> Result<(), BridgeError> {
        info!(title, text, "[Host] Foreground notification shown");
        Ok(())
    }

    fn release(&self) -> Result<(), BridgeError> {
        info!("[Host] Foreground notification removed");
        Ok(())
    }
}

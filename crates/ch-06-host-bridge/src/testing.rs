//! Recording host adapters for tests.

use parking_lot::Mutex;
use shared_types::AppKey;
use url::Url;

use crate::ports::{BridgeError, ForegroundNotifier, HostAdapter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Replace(String),
    Cookie { url: String, key: String },
    Loading,
}

/// Records every call; `current_url` returns what was set last.
#[derive(Debug, Default)]
pub struct RecordingHostAdapter {
    calls: Mutex<Vec<HostCall>>,
    current: Mutex<Option<String>>,
}

impl RecordingHostAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the user navigated to `url`.
    pub fn navigate(&self, url: impl Into<String>) {
        *self.current.lock() = Some(url.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn last_replaced(&self) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            HostCall::Replace(url) => Some(url.clone()),
            _ => None,
        })
    }
}

impl HostAdapter for RecordingHostAdapter {
    fn replace_url(&self, url: &Url) -> Result<(), BridgeError> {
        self.calls.lock().push(HostCall::Replace(url.to_string()));
        *self.current.lock() = Some(url.to_string());
        Ok(())
    }

    fn set_app_key_cookie(&self, url: &Url, key: &AppKey) -> Result<(), BridgeError> {
        self.calls.lock().push(HostCall::Cookie {
            url: url.to_string(),
            key: key.as_str().to_string(),
        });
        Ok(())
    }

    fn show_loading_page(&self) -> Result<(), BridgeError> {
        self.calls.lock().push(HostCall::Loading);
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    foregrounded: Mutex<usize>,
    released: Mutex<usize>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn foregrounded(&self) -> usize {
        *self.foregrounded.lock()
    }

    #[must_use]
    pub fn released(&self) -> usize {
        *self.released.lock()
    }
}

impl ForegroundNotifier for RecordingNotifier {
    fn make_foreground(&self, _title: &str, _text: &str) -> Result<(), BridgeError> {
        *self.foregrounded.lock() += 1;
        Ok(())
    }

    fn release(&self) -> Result<(), BridgeError> {
        *self.released.lock() += 1;
        Ok(())
    }
}

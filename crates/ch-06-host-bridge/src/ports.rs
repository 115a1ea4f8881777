//! Host-side ports.

use shared_types::AppKey;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host call {call} failed: {reason}")]
    Host { call: &'static str, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The embedded browser view.
pub trait HostAdapter: Send + Sync {
    /// Replace the current page with `url`, dropping it from history.
    fn replace_url(&self, url: &Url) -> Result<(), BridgeError>;

    /// Set the session cookie for `url`'s host. Cookies apply across ports.
    fn set_app_key_cookie(&self, url: &Url, key: &AppKey) -> Result<(), BridgeError>;

    /// Show the local loading page while the server is not serving.
    fn show_loading_page(&self) -> Result<(), BridgeError>;

    /// URL currently shown, if any.
    fn current_url(&self) -> Option<String>;
}

/// Keeps the host process alive while work is running.
pub trait ForegroundNotifier: Send + Sync {
    fn make_foreground(&self, title: &str, text: &str) -> Result<(), BridgeError>;

    fn release(&self) -> Result<(), BridgeError>;
}

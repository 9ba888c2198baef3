//! Dev-server endpoint publication.
//!
//! The Electron main process learns where the renderer is served from the
//! `VITE_DEV_SERVER_URL` environment variable. The endpoint is published
//! once, on the first successful bind of the dev server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Environment variable the application reads at startup.
pub const DEV_SERVER_URL_ENV: &str = "VITE_DEV_SERVER_URL";

/// Format a bound address as a URL (`http://127.0.0.1:5173`, `http://[::1]:5173`).
#[must_use]
pub fn format_endpoint(addr: &SocketAddr) -> String {
    format!("http://{addr}")
}

/// The dev server's externally reachable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEndpoint {
    /// Full URL.
    pub url: String,
    /// Bound address.
    pub addr: SocketAddr,
    /// Server mode when the listener fired.
    pub mode: String,
}

impl PublishedEndpoint {
    /// Environment pairs to hand to the build and the application.
    #[must_use]
    pub fn env(&self) -> Vec<(String, String)> {
        vec![(DEV_SERVER_URL_ENV.to_string(), self.url.clone())]
    }
}

/// Fires at most once per dev server.
#[derive(Debug, Default)]
pub struct EndpointListener {
    fired: AtomicBool,
}

impl EndpointListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the endpoint has been published already.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Publish the endpoint for `addr`.
    ///
    /// Returns `None` on every call after the first.
    pub fn fire(&self, addr: SocketAddr, mode: &str) -> Option<PublishedEndpoint> {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(%addr, "Dev server listening again, endpoint already published");
            return None;
        }

        let url = format_endpoint(&addr);
        info!(url = %url, mode, "Dev server endpoint published");
        Some(PublishedEndpoint {
            url,
            addr,
            mode: mode.to_string(),
        })
    }
}

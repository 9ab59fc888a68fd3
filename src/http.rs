//! Blocking bridge to the async HTTP client.
//!
//! Translation and synthesis run on the session's worker threads, which are
//! not tokio threads. The bridge captures a runtime handle at construction
//! and blocks on it per request.

use crate::error::{Result, SpeechError};
use std::future::Future;
use std::time::Duration;

/// Timeout applied to every service request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared `reqwest` client plus the runtime that drives it.
#[derive(Clone)]
pub struct HttpBridge {
    client: reqwest::Client,
    handle: tokio::runtime::Handle,
}

impl HttpBridge {
    /// Captures the current tokio runtime. Must be called from inside one.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SpeechError::Other(format!("No tokio runtime for HTTP backends: {e}")))?;
        Self::with_handle(handle)
    }

    pub fn with_handle(handle: tokio::runtime::Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpeechError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, handle })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Runs `future` to completion from a non-runtime thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

impl std::fmt::Debug for HttpBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBridge").finish_non_exhaustive()
    }
}

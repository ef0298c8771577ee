use std::sync::Arc;
use thiserror::Error;

use crate::backoff::ExponentialBackoff;
use crate::network::HttpClient;
use crate::shutdown::ShutdownSignal;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Shutdown requested while waiting for the target to come back")]
    Cancelled,

    #[error("Target still unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
}

/// Checks that the crawl target is reachable before each fetch.
pub trait LivenessProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// HEAD request against a fixed URL; any HTTP response counts as reachable.
pub struct HttpProbe {
    client: Arc<HttpClient>,
    url: String,
}

impl HttpProbe {
    pub fn new(client: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl LivenessProbe for HttpProbe {
    fn is_reachable(&self) -> bool {
        match self.client.head(&self.url) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}

/// Probe until reachable, sleeping with exponential backoff between failures.
///
/// Checks `shutdown` before every attempt and throughout each sleep.
pub fn wait_until_reachable(
    probe: &dyn LivenessProbe,
    backoff: &ExponentialBackoff,
    max_attempts: u32,
    shutdown: &ShutdownSignal,
) -> Result<(), ProbeError> {
    for attempt in 0..max_attempts {
        if shutdown.is_triggered() {
            return Err(ProbeError::Cancelled);
        }
        if probe.is_reachable() {
            if attempt > 0 {
                tracing::info!(attempts = attempt + 1, "Target reachable again");
            }
            return Ok(());
        }

        if attempt + 1 == max_attempts {
            break;
        }
        let delay = backoff.delay(attempt);
        tracing::warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Target unreachable, backing off");
        if !shutdown.sleep(delay) {
            return Err(ProbeError::Cancelled);
        }
    }

    Err(ProbeError::Unreachable {
        attempts: max_attempts,
    })
}

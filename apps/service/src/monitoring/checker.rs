use anyhow::Result;
use std::time::{Duration, Instant};

use super::types::ProbeOutcome;

/// User agent sent with every probe
pub const USER_AGENT: &str = "PageWatch/1.0";

/// Checker trait for liveness probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe the target. Failures are reported in the outcome, never as errors.
    async fn check(&self, target: &str) -> ProbeOutcome;
}

/// HTTP/HTTPS checker
///
/// Certificate verification is disabled so self-signed targets can still be
/// reported as up.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> ProbeOutcome {
        let start = Instant::now();

        match self.client.get(target).send().await {
            Ok(response) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                ProbeOutcome::from_status(response.status().as_u16(), elapsed)
            }
            Err(e) => {
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                let reason = if e.is_timeout() { "timed out".to_string() } else { e.to_string() };
                ProbeOutcome::failure(reason, elapsed)
            }
        }
    }
}

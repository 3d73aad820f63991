//! Server readiness probe
//!
//! The tunnel must not route traffic before the server accepts connections.
//! After the grace period the probe polls the server with bounded retries
//! and exponential backoff.

use relay_core::{ProbeKind, ReadinessConfig, RelayError, Result, RetryPolicy};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Polls the server until it answers
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    kind: ProbeKind,
    host: String,
    port: u16,
    path: String,
    attempt_timeout: Duration,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl ReadinessProbe {
    pub fn new(config: &ReadinessConfig, host: impl Into<String>, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RelayError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            kind: config.probe,
            host: host.into(),
            port,
            path: config.path.clone(),
            attempt_timeout: config.timeout(),
            policy: config.retry_policy(),
            client,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL requested by the HTTP probe
    pub fn url(&self) -> Result<url::Url> {
        url::Url::parse(&format!("http://{}/", self.address()))
            .and_then(|base| base.join(&self.path))
            .map_err(|e| RelayError::ConfigError(format!("Invalid readiness URL: {e}")))
    }

    /// A single probe attempt
    pub async fn probe_once(&self) -> Result<()> {
        match self.kind {
            ProbeKind::None => Ok(()),
            ProbeKind::Tcp => {
                let connect = TcpStream::connect((self.host.as_str(), self.port));
                match timeout(self.attempt_timeout, connect).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(RelayError::ProbeFailed(format!("{}: {e}", self.address()))),
                    Err(_) => Err(RelayError::ProbeFailed(format!(
                        "{}: connect timed out",
                        self.address()
                    ))),
                }
            }
            ProbeKind::Http => {
                let url = self.url()?;
                // Any HTTP response means the server is accepting requests
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| RelayError::ProbeFailed(format!("{url}: {e}")))?;
                debug!("Readiness probe {} answered {}", url, response.status());
                Ok(())
            }
        }
    }

    /// Retry [`probe_once`](Self::probe_once) until it succeeds or the policy is exhausted
    pub async fn wait_until_ready(&self) -> Result<()> {
        if self.kind == ProbeKind::None {
            return Ok(());
        }

        info!("Waiting for server at {} to accept connections", self.address());

        self.policy
            .execute("readiness probe", || self.probe_once())
            .await
            .map_err(|e| match e {
                RelayError::ProbeFailed(_) => RelayError::ReadinessTimeout {
                    address: self.address(),
                    attempts: self.policy.max_attempts,
                },
                other => other,
            })
    }
}

//! Readiness detection for spawned processes

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use rigger_common::{OrchestratorConfig, ReadinessSpec};

use crate::error::{HarnessError, HarnessResult};
use crate::output::OutputLines;

/// Decides when a freshly spawned process is able to serve
///
/// `await_ready` returns only once the process is confirmed ready. It never
/// fails on transient probe errors; the owning handle bounds it with a
/// timeout and abandons it if the process exits first.
#[async_trait]
pub trait ReadinessMonitor: Send + Sync {
    async fn await_ready(&self, output: &mut OutputLines);

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Ready once a line of combined output contains a marker
pub struct OutputMatch {
    pattern: String,
}

impl OutputMatch {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.pattern)
    }
}

#[async_trait]
impl ReadinessMonitor for OutputMatch {
    async fn await_ready(&self, output: &mut OutputLines) {
        while let Some(line) = output.next_line().await {
            if self.matches(&line.text) {
                debug!("Matched readiness marker {:?} on {}", self.pattern, line.stream);
                return;
            }
        }
        // Output closed without the marker: the process is exiting, which
        // the owning handle observes on its own.
        std::future::pending::<()>().await
    }

    fn describe(&self) -> String {
        format!("output contains {:?}", self.pattern)
    }
}

/// Ready once an HTTP endpoint answers
pub struct HttpProbe {
    url: reqwest::Url,
    check_status: bool,
    interval: Duration,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(
        url: &str,
        check_status: bool,
        interval: Duration,
        request_timeout: Duration,
    ) -> HarnessResult<Self> {
        let parsed = reqwest::Url::parse(url).map_err(|e| HarnessError::InvalidProbe {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            url: parsed,
            check_status,
            interval,
            client,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl ReadinessMonitor for HttpProbe {
    async fn await_ready(&self, _output: &mut OutputLines) {
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;

            match self.client.get(self.url.clone()).send().await {
                Ok(resp) if !self.check_status || resp.status().is_success() => {
                    debug!(
                        "{} answered {} after {} attempt(s)",
                        self.url,
                        resp.status(),
                        attempts
                    );
                    return;
                }
                Ok(resp) => {
                    debug!("{} answered {}, waiting for 2xx", self.url, resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} ...", self.url);
                    }
                    // Connection refused is expected while the server is starting
                    if !e.is_connect() && !e.is_timeout() {
                        warn!("Probe of {} failed: {}", self.url, e);
                    }
                }
            }

            sleep(self.interval).await;
        }
    }

    fn describe(&self) -> String {
        if self.check_status {
            format!("2xx from {}", self.url)
        } else {
            format!("any response from {}", self.url)
        }
    }
}

/// Build the monitor described by a process spec
pub fn monitor_for(
    spec: &ReadinessSpec,
    defaults: &OrchestratorConfig,
) -> HarnessResult<Box<dyn ReadinessMonitor>> {
    match spec {
        ReadinessSpec::Output { pattern } => Ok(Box::new(OutputMatch::new(pattern.clone()))),
        ReadinessSpec::Http {
            url,
            check_status,
            interval_ms,
        } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| defaults.probe_interval());
            let probe = HttpProbe::new(
                url,
                *check_status,
                interval,
                defaults.probe_request_timeout(),
            )?;
            Ok(Box::new(probe))
        }
    }
}

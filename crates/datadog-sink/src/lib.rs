//! Datadog Logs intake (v2) sink.
//!
//! Records are posted as a JSON array to
//! `https://http-intake.logs.<site>/api/v2/logs`. Verbose mode logs a
//! preview of the first records, with hashes and addresses masked unless
//! masking is disabled.

pub mod preview;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use starky::etl::record::ProcessedLogRecord;
use starky::etl::sink::LogSink;

pub use preview::{mask_value, preview_record};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PREVIEW: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum DatadogConfigError {
    #[error("DD_SITE is not set")]
    MissingSite,
    #[error("DD_API_KEY is not set")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct DatadogConfig {
    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    pub site: String,
    pub api_key: String,
    pub timeout: Duration,
    pub verbose: bool,
    /// Records previewed per batch in verbose mode.
    pub preview: usize,
    pub mask: bool,
    /// Each batch payload is also written here, overwriting the previous one.
    pub dump_file: Option<PathBuf>,
}

impl DatadogConfig {
    pub fn new(site: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
            preview: DEFAULT_PREVIEW,
            mask: true,
            dump_file: None,
        }
    }

    pub fn intake_url(&self) -> String {
        intake_url(&self.site)
    }
}

pub fn intake_url(site: &str) -> String {
    format!("https://http-intake.logs.{}/api/v2/logs", site.trim())
}

pub struct DatadogSink {
    client: reqwest::Client,
    intake_url: String,
    config: DatadogConfig,
}

impl DatadogSink {
    pub fn new(config: DatadogConfig) -> Result<Self, DatadogConfigError> {
        if config.site.trim().is_empty() {
            return Err(DatadogConfigError::MissingSite);
        }
        if config.api_key.trim().is_empty() {
            return Err(DatadogConfigError::MissingApiKey);
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        tracing::info!(
            target: "starky::sink::datadog",
            site = %config.site,
            verbose = config.verbose,
            mask = config.mask,
            "Datadog sink initialized"
        );

        Ok(Self {
            client,
            intake_url: config.intake_url(),
            config,
        })
    }

    fn log_preview(&self, payload: &[serde_json::Value]) {
        tracing::info!(
            target: "starky::sink::datadog",
            records = payload.len(),
            url = %self.intake_url,
            "Posting logs"
        );
        for (i, entry) in payload.iter().take(self.config.preview).enumerate() {
            let shown = preview_record(entry, self.config.mask);
            tracing::info!(
                target: "starky::sink::datadog",
                sample = i + 1,
                entry = %shown,
                "Preview"
            );
        }
    }

    fn dump(&self, payload: &[serde_json::Value]) {
        let Some(path) = &self.config.dump_file else {
            return;
        };
        let written = serde_json::to_string_pretty(payload)
            .map_err(anyhow::Error::from)
            .and_then(|body| std::fs::write(path, body).map_err(anyhow::Error::from));
        match written {
            Ok(()) if self.config.verbose => tracing::info!(
                target: "starky::sink::datadog",
                path = %path.display(),
                "Payload dumped"
            ),
            Ok(()) => {}
            Err(e) => tracing::warn!(
                target: "starky::sink::datadog",
                path = %path.display(),
                error = %e,
                "Could not write dump file"
            ),
        }
    }
}

#[async_trait]
impl LogSink for DatadogSink {
    fn name(&self) -> &str {
        "datadog"
    }

    async fn send(&self, records: &[ProcessedLogRecord]) -> Result<u16> {
        let payload = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to encode records")?;

        if self.config.verbose {
            self.log_preview(&payload);
        }
        self.dump(&payload);

        let response = self
            .client
            .post(&self.intake_url)
            .header("DD-API-KEY", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context("Datadog logs intake request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Datadog logs intake returned {status}: {body}");
        }

        if self.config.verbose {
            tracing::info!(
                target: "starky::sink::datadog",
                status = status.as_u16(),
                "Datadog intake accepted batch"
            );
        }
        Ok(status.as_u16())
    }
}

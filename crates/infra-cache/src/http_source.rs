// HTTP Artifact Source
// Streams the response body straight to disk; archives can be hundreds of MB.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use doorstop_harness_core::port::ArtifactSource;
use doorstop_harness_core::{HarnessError, Result};

const USER_AGENT_VALUE: &str = concat!("doorstop-harness/", env!("CARGO_PKG_VERSION"));

/// Connect timeout only; large bodies are allowed to take their time
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpArtifactSource {
    client: reqwest::Client,
}

impl HttpArtifactSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let failed = |message: String| HarnessError::Download {
            url: url.to_string(),
            message,
        };
        let started = Instant::now();
        debug!(url = %url, destination = %destination.display(), "Fetching artifact");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(
            url = %url,
            bytes = %written,
            elapsed_ms = %started.elapsed().as_millis(),
            "Downloaded artifact"
        );
        Ok(written)
    }
}

//! Remote selection: HTTP endpoint or a file-backed in-memory remote.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use flotilla_core::client::{HttpClient, MemoryClient, MemorySnapshot, RemoteClient};
use tracing::debug;

pub struct Remote {
    client: Arc<dyn RemoteClient>,
    /// Set for the file-backed remote; saved after mutating commands.
    state: Option<(Arc<MemoryClient>, PathBuf)>,
}

impl Remote {
    pub async fn open(
        endpoint: Option<&str>,
        state: Option<&Path>,
        request_timeout: Duration,
    ) -> Result<Self> {
        match (endpoint, state) {
            (Some(endpoint), _) => {
                let client = HttpClient::new(endpoint, request_timeout)
                    .with_context(|| format!("Failed to set up remote at {endpoint}"))?;
                Ok(Self {
                    client: Arc::new(client),
                    state: None,
                })
            }
            (None, Some(path)) => {
                let memory = Arc::new(MemoryClient::from_snapshot(load_snapshot(path).await?));
                Ok(Self {
                    client: memory.clone(),
                    state: Some((memory, path.to_path_buf())),
                })
            }
            (None, None) => bail!("No remote configured: pass --endpoint or --state"),
        }
    }

    pub fn client(&self) -> Arc<dyn RemoteClient> {
        self.client.clone()
    }

    /// Persist the file-backed remote. No-op for HTTP.
    pub async fn save(&self) -> Result<()> {
        let Some((memory, path)) = &self.state else {
            return Ok(());
        };
        let snapshot = memory.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write state file {}", path.display()))?;
        debug!(path = %path.display(), resources = snapshot.resources.len(), "Saved state");
        Ok(())
    }
}

async fn load_snapshot(path: &Path) -> Result<MemorySnapshot> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "State file missing, starting empty");
        return Ok(MemorySnapshot::default());
    }
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed state file {}", path.display()))
}

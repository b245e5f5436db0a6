//! The [`RegistrarClient`] facade.
//!
//! Owns the configuration, the transport and the table extractor. Operations
//! live next to their domain (`catalog`, `document`, `scrape`) as
//! `impl RegistrarClient` blocks and funnel their I/O through the helpers
//! here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::catalog::parse_envelope;
use crate::config::ClientConfig;
use crate::document::{LatticeExtractor, TableExtractor};
use crate::error::Result;
use crate::http_client::{HttpTransport, Transport, TransportResponse};

/// Client for the registrar's catalog, downloads and schedules endpoints.
///
/// Cheap to clone; clones share the transport and extractor.
#[derive(Clone)]
pub struct RegistrarClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn TableExtractor>,
    timeout: Duration,
}

impl std::fmt::Debug for RegistrarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarClient")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RegistrarClient {
    /// Client with the default endpoints and timeouts.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Client over HTTP with the lattice extractor.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::from_parts(
            config,
            Arc::new(transport),
            Arc::new(LatticeExtractor::default()),
        ))
    }

    /// Assemble a client from its collaborators.
    pub fn from_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn TableExtractor>,
    ) -> Self {
        let timeout = config.timeout();
        Self {
            config: Arc::new(config),
            transport,
            extractor,
            timeout,
        }
    }

    /// Same client, with `timeout` applied to every request it makes.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `fields` to the catalog endpoint and unwrap the JSON envelope.
    pub(crate) async fn post_catalog(&self, fields: &[(String, String)]) -> Result<Value> {
        let response = self
            .transport
            .post_form(&self.config.catalog_url, fields, self.timeout)
            .await?;
        parse_envelope(&response.body)
    }

    pub(crate) async fn get(&self, url: &str, query: &[(String, String)]) -> Result<TransportResponse> {
        self.transport.get(url, query, self.timeout).await
    }

    pub(crate) fn extractor(&self) -> Arc<dyn TableExtractor> {
        Arc::clone(&self.extractor)
    }
}

//! HTTP location catalog
//!
//! One GET per level endpoint, `?parent_id=` for every level below river.

use super::{decode_features, FeatureCollection, LocationCatalog, Result};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use anyhow::Context;
use async_trait::async_trait;
use basin_types::{Level, LocationId, LocationNode};
use reqwest::Client;
use url::Url;

/// Catalog backed by the GIS location service.
pub struct HttpCatalog {
    http: Client,
    base_url: Url,
    config: CatalogConfig,
}

impl HttpCatalog {
    /// Create a client from catalog configuration. `base_url` should end
    /// with `/` so endpoint paths join beneath it.
    pub fn new(config: CatalogConfig) -> anyhow::Result<Self> {
        let base_url = config.base_url()?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// URL for fetching `level` children of `parent`
    pub fn endpoint_url(&self, level: Level, parent: Option<&LocationId>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&self.config.endpoint(level))
            .map_err(|e| CatalogError::Transport(format!("bad endpoint for {level}: {e}")))?;
        if let Some(parent) = parent {
            url.query_pairs_mut().append_pair("parent_id", parent.as_str());
        }
        Ok(url)
    }

    async fn get_collection(&self, url: Url) -> Result<FeatureCollection> {
        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl LocationCatalog for HttpCatalog {
    async fn children(
        &self,
        level: Level,
        parent: Option<&LocationId>,
    ) -> Result<Vec<LocationNode>> {
        let url = self.endpoint_url(level, parent)?;
        tracing::debug!(%level, %url, "Fetching catalog level");

        let collection = self.get_collection(url).await?;
        let nodes = decode_features(level, collection)?;

        tracing::debug!(%level, count = nodes.len(), "Catalog level fetched");
        Ok(nodes)
    }
}

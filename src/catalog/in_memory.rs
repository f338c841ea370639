//! In-memory catalog
//!
//! Serves a fixed list of nodes. Used offline by the CLI and as the default
//! catalog in tests.

use super::{decode_features, FeatureCollection, LocationCatalog, Result};
use anyhow::Context;
use async_trait::async_trait;
use basin_types::{Level, LocationId, LocationNode};
use std::collections::HashMap;

/// Catalog over a fixed node list. Order of insertion is the order served.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    nodes: Vec<LocationNode>,
}

/// File format: one FeatureCollection per level.
type CatalogFile = HashMap<Level, FeatureCollection>;

impl StaticCatalog {
    pub fn new(nodes: Vec<LocationNode>) -> Self {
        Self { nodes }
    }

    /// Load from JSON shaped as `{ "river": FeatureCollection, "stretch": ... }`
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let mut file: CatalogFile =
            serde_json::from_str(content).context("Failed to parse catalog JSON")?;

        let mut nodes = Vec::new();
        for level in Level::ALL {
            if let Some(collection) = file.remove(&level) {
                nodes.extend(decode_features(level, collection)?);
            }
        }
        Ok(Self { nodes })
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {path}"))?;
        Self::from_json(&content)
    }

    pub fn push(&mut self, node: LocationNode) {
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl LocationCatalog for StaticCatalog {
    async fn children(
        &self,
        level: Level,
        parent: Option<&LocationId>,
    ) -> Result<Vec<LocationNode>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.level() == level && n.parent_id() == parent)
            .cloned()
            .collect())
    }
}

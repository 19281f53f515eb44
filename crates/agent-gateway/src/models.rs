//! Model catalog read from a `|`-separated model list.
//!
//! Each usable line has at least five fields: model name, (ignored),
//! model id, region, (ignored).

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::error::{GatewayError, Result};

pub const DEFAULT_MODEL_FILE: &str = "model_tooluse.txt";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: String,
    /// `"{name} ({region})"`
    pub name: String,
    pub region: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelCatalog {
    models: Vec<ModelOption>,
    regions: Vec<String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let model = |id: &str, name: &str| ModelOption {
            id: id.into(),
            name: format!("{name} (local)"),
            region: "local".into(),
        };
        Self {
            models: vec![model("llama3.2", "Llama 3.2"), model("qwen2.5", "Qwen 2.5")],
            regions: vec!["local".into()],
        }
    }
}

impl ModelCatalog {
    pub fn parse(text: &str) -> Self {
        // (model name, region, id) in first-seen order; later ids win
        let mut entries: Vec<(String, String, String)> = Vec::new();
        let mut regions = BTreeSet::new();

        for line in text.lines() {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < 5 {
                continue;
            }
            let (name, id, region) = (parts[0], parts[2], parts[3]);

            match entries.iter_mut().find(|(n, r, _)| n == name && r == region) {
                Some(entry) => entry.2 = id.to_string(),
                None => entries.push((name.to_string(), region.to_string(), id.to_string())),
            }
            regions.insert(region.to_string());
        }

        Self {
            models: entries
                .into_iter()
                .map(|(name, region, id)| ModelOption {
                    id,
                    name: format!("{name} ({region})"),
                    region,
                })
                .collect(),
            regions: regions.into_iter().collect(),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("read {}: {e}", path.display())))?;
        Ok(Self::parse(&text))
    }

    /// Load `path`, falling back to the built-in catalog when the file is
    /// unreadable or lists nothing.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path).await {
            Ok(catalog) if !catalog.models.is_empty() => catalog,
            Ok(_) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Using default model list");
                Self::default()
            }
        }
    }

    pub fn models(&self) -> &[ModelOption] {
        &self.models
    }

    /// Distinct regions, sorted
    pub fn regions(&self) -> &[String] {
        &self.regions
    }
}

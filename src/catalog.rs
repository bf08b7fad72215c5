use std::path::Path;

use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::ModelDescriptor;

/// Static list of selectable models, parsed from `id, displayName` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    /// Blank lines and `#` comments are ignored. A line without a comma uses
    /// the id as its display name.
    pub fn parse(text: &str) -> Self {
        let models = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (id, name) = match line.split_once(',') {
                    Some((id, name)) => (id.trim(), name.trim()),
                    None => (line, line),
                };
                if id.is_empty() {
                    return None;
                }
                let display_name = if name.is_empty() { id } else { name };
                Some(ModelDescriptor {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                })
            })
            .collect();
        Self { models }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|source| {
            warn!("Failed to read model catalog {}: {source}", path.display());
            AppError::CatalogUnreadable { path: path.display().to_string(), source }
        })?;
        let catalog = Self::parse(&text);
        debug!("Loaded {} models from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Display name for `id`, or the id itself when it is not in the catalog.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|m| m.display_name.as_str()).unwrap_or(id)
    }

    /// Initial per-panel selection: the first `panels` ids, or nothing at all
    /// when the catalog is too short to fill every panel.
    pub fn default_panel_selection(&self, panels: usize) -> Vec<String> {
        if self.models.len() >= panels {
            self.models.iter().take(panels).map(|m| m.id.clone()).collect()
        } else {
            vec![String::new(); panels]
        }
    }

    /// Initial dialogue pairing: a `gpt` model against a `claude` model when
    /// the catalog has them, otherwise the first two entries.
    pub fn default_dialogue_pair(&self) -> Option<(String, String)> {
        if self.models.len() < 2 {
            return None;
        }
        let a = self
            .models
            .iter()
            .find(|m| m.id.contains("gpt"))
            .unwrap_or(&self.models[0]);
        let b = self
            .models
            .iter()
            .find(|m| m.id.contains("claude"))
            .unwrap_or(&self.models[1]);
        Some((a.id.clone(), b.id.clone()))
    }
}

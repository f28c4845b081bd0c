//! On-disk workflow definition read by `validate` and `import`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use engine::{validate_integrity, validate_structure, Edge, Node, Violation};

#[derive(Debug, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Problems found in a graph file, split by what they block.
#[derive(Debug, Default)]
pub struct Report {
    /// Block saving.
    pub structure: Vec<Violation>,
    /// Block publishing only.
    pub integrity: Vec<Violation>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.structure.is_empty() && self.integrity.is_empty()
    }
}

impl GraphFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid workflow file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn check(&self) -> Report {
        let structure = validate_structure(&self.nodes, &self.edges).err().unwrap_or_default();
        // Integrity re-reports the structural findings; keep only the new ones.
        let integrity = validate_integrity(&self.nodes, &self.edges)
            .err()
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !structure.contains(v))
            .collect();
        Report { structure, integrity }
    }
}

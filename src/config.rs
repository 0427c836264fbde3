//! Runtime configuration, loaded from TOML
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Role names that carry special meaning for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleNames {
    /// Passes every permission check.
    pub administrator: String,
    /// May only review reports of their own department.
    pub area_director: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            administrator: "Administrador".to_string(),
            area_director: "Director de Área".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub roles: RoleNames,
    pub rejection_reason_min: usize,
    pub rejection_reason_max: usize,
    pub comments_max: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub attachment_dir: PathBuf,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            roles: RoleNames::default(),
            rejection_reason_min: 10,
            rejection_reason_max: 1000,
            comments_max: 1000,
            default_page_size: 10,
            max_page_size: 100,
            attachment_dir: PathBuf::from("uploads/progress-reports"),
        }
    }
}

impl ApprovalConfig {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents).context("invalid approval configuration")?;
        if config.rejection_reason_min > config.rejection_reason_max {
            anyhow::bail!(
                "rejection_reason_min ({}) exceeds rejection_reason_max ({})",
                config.rejection_reason_min,
                config.rejection_reason_max
            );
        }
        if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
            anyhow::bail!(
                "default_page_size must be within 1..={}",
                config.max_page_size
            );
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

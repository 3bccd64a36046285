use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Collection names must be unique and addressable on the wire
        let mut collection_names = std::collections::HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty() {
                anyhow::bail!("collection name must not be empty");
            }
            if collection.name.contains('.') {
                anyhow::bail!(
                    "collection name must not contain '.': {}",
                    collection.name
                );
            }
            if !collection_names.insert(&collection.name) {
                anyhow::bail!("duplicate collection name: {}", collection.name);
            }

            // Rules must compile (regex patterns, time windows)
            collection.rules.compile().with_context(|| {
                format!("invalid rules for collection: {}", collection.name)
            })?;
        }

        // Token values must be unique
        let mut tokens = std::collections::HashSet::new();
        for entry in &self.identity.tokens {
            if entry.token.is_empty() {
                anyhow::bail!("identity token must not be empty");
            }
            if !tokens.insert(&entry.token) {
                anyhow::bail!("duplicate identity token");
            }
        }

        if self.admin.enabled && self.admin.address == self.server.address {
            anyhow::bail!("admin and server addresses must differ");
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

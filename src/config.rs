// src/config.rs

//! Operator-facing provisioning configuration
//!
//! A small TOML file declares the inputs the pipeline derives everything
//! else from: operating identity, domain, source repositories, plugin
//! names, and the low-memory override. Every field has a default so an
//! empty file (or no file at all) produces a usable local environment.
//!
//! # Example drydock.toml
//!
//! ```toml
//! user = "webapp"
//! group = "webapp"
//! domain = "app.local"
//! install_root = "/srv/app"
//! plugins = ["gold"]
//! allow_low_memory = false
//!
//! [[repositories]]
//! name = "app"
//! url = "https://example.com/git/app.git"
//!
//! [[repositories]]
//! name = "gold"
//! url = "https://example.com/git/app-plugin-gold.git"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default path for the operator config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/drydock.toml";

/// A declared source repository, cloned under the source root by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

/// Declared provisioning inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Operating identity the stack runs as (never the privileged principal)
    #[serde(default = "default_user")]
    pub user: String,

    /// Group for the operating identity
    #[serde(default = "default_user")]
    pub group: String,

    /// Public domain the stack serves
    #[serde(default = "default_domain")]
    pub domain: String,

    /// OAuth domain; derived as `oauth.{domain}` when unset
    #[serde(default)]
    pub oauth_domain: Option<String>,

    /// Shared secret for broker and database principals; defaults to the user name
    #[serde(default)]
    pub secret: Option<String>,

    /// Installation root for the stack
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Source checkout root; defaults to `{install_root}/src`
    #[serde(default)]
    pub source_root: Option<PathBuf>,

    /// Declared plugin names, probed against the source root at synthesis time
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Auxiliary long-running services to supervise
    #[serde(default = "default_services")]
    pub services: Vec<String>,

    /// Source repositories to fetch
    #[serde(default)]
    pub repositories: Vec<Repository>,

    /// Proceed past the minimum-memory check without prompting
    #[serde(default)]
    pub allow_low_memory: bool,
}

fn default_user() -> String {
    "webapp".to_string()
}

fn default_domain() -> String {
    "app.local".to_string()
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/srv/app")
}

fn default_services() -> Vec<String> {
    vec!["websockets".to_string(), "activity".to_string()]
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            group: default_user(),
            domain: default_domain(),
            oauth_domain: None,
            secret: None,
            install_root: default_install_root(),
            source_root: None,
            plugins: Vec::new(),
            services: default_services(),
            repositories: Vec::new(),
            allow_low_memory: false,
        }
    }
}

impl ProvisionConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: ProvisionConfig =
            toml::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path if it exists, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Basic structural validation, independent of host state
    pub fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(Error::Config("user must not be empty".to_string()));
        }
        if self.domain.is_empty() {
            return Err(Error::Config("domain must not be empty".to_string()));
        }
        for repo in &self.repositories {
            if repo.name.is_empty() || repo.name.contains('/') {
                return Err(Error::Config(format!(
                    "repository name `{}` must be a plain directory name",
                    repo.name
                )));
            }
        }
        Ok(())
    }
}

// src/env.rs

//! Host environment snapshot and derived filesystem layout
//!
//! `HostEnvironment` is constructed exactly once at pipeline start from the
//! operator config and is read-only afterwards; every downstream component
//! takes it by shared reference. `Layout` holds the derived artifact paths
//! so tests can root the whole tree under a tempdir.

use crate::config::{ProvisionConfig, Repository};
use std::path::{Path, PathBuf};

/// Environment variables exported for downstream tooling (helper CLIs and
/// the consumer-manager) to locate the installed stack.
pub const ENV_ROOT: &str = "DRYDOCK_ROOT";
pub const ENV_SRC: &str = "DRYDOCK_SRC";
pub const ENV_INI: &str = "DRYDOCK_INI";
pub const ENV_USER: &str = "DRYDOCK_USER";
pub const ENV_GROUP: &str = "DRYDOCK_GROUP";
pub const ENV_CONSUMER_ROOT: &str = "DRYDOCK_CONSUMER_ROOT";

/// Derived paths for every artifact the pipeline writes
#[derive(Debug, Clone)]
pub struct Layout {
    /// Application configuration artifact (create/patch target)
    pub app_config: PathBuf,
    /// Queue consumer registry root (the consumer-manager contract surface)
    pub registry_root: PathBuf,
    /// Media document root served by the proxy
    pub media_root: PathBuf,
    /// Directory for supervisor unit definitions
    pub unit_dir: PathBuf,
    /// Periodic job table
    pub cron_file: PathBuf,
    /// Reverse proxy configuration
    pub proxy_config: PathBuf,
    /// Load balancer configuration
    pub balancer_config: PathBuf,
    /// Cache router route configuration
    pub cache_router_config: PathBuf,
    /// Shell profile exporting the process environment contract
    pub env_profile: PathBuf,
}

impl Layout {
    /// Standard system locations
    pub fn system(install_root: &Path) -> Self {
        Self {
            app_config: install_root.join("app.ini"),
            registry_root: install_root.join("consumer-counts"),
            media_root: install_root.join("media"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            cron_file: PathBuf::from("/etc/cron.d/drydock-jobs"),
            proxy_config: PathBuf::from("/etc/nginx/conf.d/drydock.conf"),
            balancer_config: PathBuf::from("/etc/haproxy/haproxy.cfg"),
            cache_router_config: PathBuf::from("/etc/mcrouter/mcrouter.conf"),
            env_profile: PathBuf::from("/etc/profile.d/drydock.sh"),
        }
    }

    /// Everything under one root, for tests
    pub fn rooted(root: &Path) -> Self {
        Self {
            app_config: root.join("app.ini"),
            registry_root: root.join("consumer-counts"),
            media_root: root.join("media"),
            unit_dir: root.join("etc/systemd/system"),
            cron_file: root.join("etc/cron.d/drydock-jobs"),
            proxy_config: root.join("etc/nginx/conf.d/drydock.conf"),
            balancer_config: root.join("etc/haproxy/haproxy.cfg"),
            cache_router_config: root.join("etc/mcrouter/mcrouter.conf"),
            env_profile: root.join("etc/profile.d/drydock.sh"),
        }
    }
}

/// Immutable snapshot of the declared provisioning inputs
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub user: String,
    pub group: String,
    pub domain: String,
    pub oauth_domain: String,
    pub secret: String,
    pub install_root: PathBuf,
    pub source_root: PathBuf,
    pub plugins: Vec<String>,
    pub services: Vec<String>,
    pub repositories: Vec<Repository>,
    pub allow_low_memory: bool,
    pub layout: Layout,
}

impl HostEnvironment {
    /// Construct from the operator config with system layout
    pub fn from_config(config: ProvisionConfig) -> Self {
        let layout = Layout::system(&config.install_root);
        Self::with_layout(config, layout)
    }

    /// Construct with an explicit layout (tests root it under a tempdir)
    pub fn with_layout(config: ProvisionConfig, layout: Layout) -> Self {
        let oauth_domain = config
            .oauth_domain
            .unwrap_or_else(|| format!("oauth.{}", config.domain));
        let secret = config.secret.unwrap_or_else(|| config.user.clone());
        let source_root = config
            .source_root
            .unwrap_or_else(|| config.install_root.join("src"));

        Self {
            user: config.user,
            group: config.group,
            domain: config.domain,
            oauth_domain,
            secret,
            install_root: config.install_root,
            source_root,
            plugins: config.plugins,
            services: config.services,
            repositories: config.repositories,
            allow_low_memory: config.allow_low_memory,
            layout,
        }
    }

    /// The named environment variables downstream tooling relies on
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_ROOT, self.install_root.display().to_string()),
            (ENV_SRC, self.source_root.display().to_string()),
            (ENV_INI, self.layout.app_config.display().to_string()),
            (ENV_USER, self.user.clone()),
            (ENV_GROUP, self.group.clone()),
            (
                ENV_CONSUMER_ROOT,
                self.layout.registry_root.display().to_string(),
            ),
        ]
    }

    /// Export the contract into this process so spawned helpers inherit it
    pub fn apply_process_env(&self) {
        for (key, value) in self.env_vars() {
            std::env::set_var(key, value);
        }
    }

    /// Render the profile script form of the contract
    pub fn render_profile(&self) -> String {
        let mut out = String::from("# generated by drydock; do not edit\n");
        for (key, value) in self.env_vars() {
            out.push_str(&format!("export {}=\"{}\"\n", key, value));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;

    #[test]
    fn test_derived_fields() {
        let env = HostEnvironment::from_config(ProvisionConfig::default());
        assert_eq!(env.oauth_domain, "oauth.app.local");
        assert_eq!(env.secret, "webapp");
        assert_eq!(env.source_root, PathBuf::from("/srv/app/src"));
    }

    #[test]
    fn test_declared_oauth_domain_wins() {
        let mut config = ProvisionConfig::default();
        config.oauth_domain = Some("auth.example.test".to_string());
        let env = HostEnvironment::from_config(config);
        assert_eq!(env.oauth_domain, "auth.example.test");
    }

    #[test]
    fn test_profile_contains_every_contract_var() {
        let env = HostEnvironment::from_config(ProvisionConfig::default());
        let profile = env.render_profile();
        for (key, _) in env.env_vars() {
            assert!(profile.contains(&format!("export {}=", key)));
        }
    }
}

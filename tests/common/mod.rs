// tests/common/mod.rs

//! Shared helpers for the provisioning integration tests.

use drydock::preflight::HostFacts;
use drydock::{HostEnvironment, Layout, ProvisionConfig, Repository};
use std::path::Path;

/// Facts for a host that passes every preflight check.
pub fn good_facts() -> HostFacts {
    HostFacts {
        is_root: true,
        arch: "x86_64".to_string(),
        os_id: "ubuntu".to_string(),
        os_version: "24.04".to_string(),
        memory_kb: 4_000_000,
    }
}

/// An environment rooted under a tempdir, declaring the app repo plus one
/// repo per plugin name so the fetch stage materializes plugin checkouts.
pub fn test_env(root: &Path, plugins: &[&str]) -> HostEnvironment {
    let mut config = ProvisionConfig::default();
    config.install_root = root.to_path_buf();
    config.source_root = Some(root.join("src"));
    config.plugins = plugins.iter().map(|s| s.to_string()).collect();
    config.repositories = vec![Repository {
        name: "app".to_string(),
        url: "https://example.com/git/app.git".to_string(),
    }];
    for plugin in plugins {
        // The missing plugin stays missing: no repo declared for it.
        if *plugin != "missingplugin" {
            config.repositories.push(Repository {
                name: plugin.to_string(),
                url: format!("https://example.com/git/plugin-{}.git", plugin),
            });
        }
    }
    HostEnvironment::with_layout(config, Layout::rooted(root))
}

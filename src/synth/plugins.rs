// src/synth/plugins.rs

//! Plugin presence probing
//!
//! Declared plugin names are checked against the fetched workspace. A
//! missing plugin is logged and excluded, never fatal; descriptors are
//! derived fresh each run and never persisted.

use crate::env::HostEnvironment;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub present: bool,
    pub setup_script: Option<PathBuf>,
}

/// Probe every declared plugin against the source root, in declared order
pub fn probe_plugins(env: &HostEnvironment) -> Vec<PluginDescriptor> {
    env.plugins
        .iter()
        .map(|name| {
            let dir = env.source_root.join(name);
            let present = dir.is_dir();
            if present {
                debug!("plugin {} present at {}", name, dir.display());
            } else {
                warn!(
                    "declared plugin {} not found under {}; excluding it",
                    name,
                    env.source_root.display()
                );
            }
            let setup_script = dir.join("setup.py");
            PluginDescriptor {
                name: name.clone(),
                present,
                setup_script: setup_script.is_file().then_some(setup_script),
            }
        })
        .collect()
}

/// Ordered, comma-joined list of the plugins actually available
pub fn available_plugin_list(env: &HostEnvironment) -> String {
    probe_plugins(env)
        .iter()
        .filter(|p| p.present)
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

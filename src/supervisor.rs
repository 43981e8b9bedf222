// src/supervisor.rs

//! Supervisor unit generation for auxiliary services
//!
//! One systemd-style unit per auxiliary service, written only when absent:
//! operators may hand-tune a unit after first creation and the generator
//! never edits an existing file. Units encode the bind address, a bounded
//! respawn rate, and a shutdown timeout.

use crate::env::HostEnvironment;
use crate::error::{Error, Result};
use crate::pipeline::{Context, Stage};
use std::path::PathBuf;
use tracing::{debug, info};

/// An auxiliary long-running service of the application layer
#[derive(Debug, Clone, Copy)]
pub struct AuxService {
    pub name: &'static str,
    pub port: u16,
    pub description: &'static str,
}

/// The fixed auxiliary service set
pub const AUX_SERVICES: &[AuxService] = &[
    AuxService {
        name: "websockets",
        port: 8002,
        description: "websocket fan-out daemon",
    },
    AuxService {
        name: "activity",
        port: 8003,
        description: "activity tracking daemon",
    },
];

/// Look up a fixed service by name
pub fn aux_service(name: &str) -> Option<&'static AuxService> {
    AUX_SERVICES.iter().find(|s| s.name == name)
}

/// Path of the unit file for a service
pub fn unit_path(env: &HostEnvironment, name: &str) -> PathBuf {
    env.layout.unit_dir.join(format!("{}.service", name))
}

/// Render the unit definition for one auxiliary service
pub fn render_unit(env: &HostEnvironment, service: &AuxService) -> String {
    format!(
        "\
[Unit]
Description={description}
After=network.target
StartLimitIntervalSec=60
StartLimitBurst=10

[Service]
User={user}
Group={group}
ExecStart={root}/bin/{name} --bind 127.0.0.1:{port} --ini {ini}
Restart=always
RestartSec=2
TimeoutStopSec=30

[Install]
WantedBy=multi-user.target
",
        description = service.description,
        user = env.user,
        group = env.group,
        root = env.install_root.display(),
        name = service.name,
        port = service.port,
        ini = env.layout.app_config.display(),
    )
}

/// Write units for every declared service that lacks one
pub fn write_units(env: &HostEnvironment) -> Result<Vec<String>> {
    std::fs::create_dir_all(&env.layout.unit_dir)?;
    let mut written = Vec::new();
    for name in &env.services {
        let service = aux_service(name).ok_or_else(|| {
            Error::Config(format!("unknown auxiliary service `{}`", name))
        })?;
        let path = unit_path(env, name);
        if path.is_file() {
            debug!("unit {} already present, leaving untouched", path.display());
            continue;
        }
        info!("writing unit {}", path.display());
        std::fs::write(&path, render_unit(env, service))?;
        written.push(name.clone());
    }
    Ok(written)
}

pub struct SupervisorStage;

impl Stage for SupervisorStage {
    fn name(&self) -> &'static str {
        "supervisor-units"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        Ok(ctx
            .env
            .services
            .iter()
            .all(|name| unit_path(ctx.env, name).is_file()))
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        write_units(ctx.env)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::env::{HostEnvironment, Layout};

    fn env(root: &std::path::Path) -> HostEnvironment {
        let mut config = ProvisionConfig::default();
        config.install_root = root.to_path_buf();
        HostEnvironment::with_layout(config, Layout::rooted(root))
    }

    #[test]
    fn test_unit_content() {
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());
        let unit = render_unit(&env, aux_service("websockets").unwrap());
        assert!(unit.contains("--bind 127.0.0.1:8002"));
        assert!(unit.contains("Restart=always"));
        assert!(unit.contains("StartLimitBurst=10"));
        assert!(unit.contains("TimeoutStopSec=30"));
        assert!(unit.contains("User=webapp"));
    }

    #[test]
    fn test_existing_unit_never_overwritten() {
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());

        write_units(&env).unwrap();
        let path = unit_path(&env, "websockets");
        std::fs::write(&path, "# tuned by hand\n").unwrap();

        let written = write_units(&env).unwrap();
        assert!(written.is_empty());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# tuned by hand\n"
        );
    }

    #[test]
    fn test_unknown_service_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = ProvisionConfig::default();
        config.install_root = temp.path().to_path_buf();
        config.services = vec!["mystery".to_string()];
        let env = HostEnvironment::with_layout(config, Layout::rooted(temp.path()));
        assert!(write_units(&env).is_err());
    }
}

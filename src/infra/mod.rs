// src/infra/mod.rs

//! One-time infrastructure service setup
//!
//! Each leaf infrastructure service carries a descriptor: an idempotency
//! probe and the setup actions to apply when the probe is false. The
//! configurator evaluates the probe through the control surface, applies
//! actions only on a false probe, re-verifies, and batches one refresh per
//! touched service at the end so a run never restarts a service twice.
//! A failed action is fatal; resources that already exist are not errors.

use crate::env::HostEnvironment;
use crate::error::{Error, Result};
use crate::host::{HostController, Permissions, SERVICE_BROKER, SERVICE_DATABASE};
use crate::pipeline::{Context, Stage};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Idempotency predicate for one descriptor
#[derive(Debug, Clone)]
pub enum Probe {
    PrincipalExists { service: String, principal: String },
    NamespaceExists { service: String, namespace: String },
    FileExists(PathBuf),
}

impl Probe {
    pub fn evaluate(&self, host: &mut dyn HostController) -> Result<bool> {
        match self {
            Probe::PrincipalExists { service, principal } => {
                host.principal_exists(service, principal)
            }
            Probe::NamespaceExists { service, namespace } => {
                host.namespace_exists(service, namespace)
            }
            Probe::FileExists(path) => Ok(path.is_file()),
        }
    }
}

/// One step of a descriptor's setup
#[derive(Debug, Clone)]
pub enum SetupAction {
    CreateNamespace {
        service: String,
        namespace: String,
    },
    CreatePrincipal {
        service: String,
        principal: String,
        secret: String,
    },
    SetPermission {
        service: String,
        principal: String,
        namespace: String,
        perms: Permissions,
    },
    EnableExtension {
        service: String,
        namespace: String,
        extension: String,
    },
    /// Render a config file locally (cache router route config)
    WriteFile {
        path: PathBuf,
        content: String,
    },
}

impl SetupAction {
    fn apply(&self, host: &mut dyn HostController) -> Result<()> {
        match self {
            SetupAction::CreateNamespace { service, namespace } => {
                host.create_namespace(service, namespace)
            }
            SetupAction::CreatePrincipal {
                service,
                principal,
                secret,
            } => host.create_principal(service, principal, secret),
            SetupAction::SetPermission {
                service,
                principal,
                namespace,
                perms,
            } => host.set_permission(service, principal, namespace, perms),
            SetupAction::EnableExtension {
                service,
                namespace,
                extension,
            } => host.enable_extension(service, namespace, extension),
            SetupAction::WriteFile { path, content } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
                Ok(())
            }
        }
    }
}

/// How a touched service is refreshed after configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Reload,
    Restart,
}

/// One infrastructure service: probe, actions, and the unit to refresh
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub unit: &'static str,
    pub refresh: Refresh,
    pub probe: Probe,
    pub actions: Vec<SetupAction>,
}

/// The fixed descriptor set derived from the host environment
pub fn standard_descriptors(env: &HostEnvironment) -> Vec<ServiceDescriptor> {
    let broker_vhost = "/".to_string();
    let database = env.user.clone();

    vec![
        ServiceDescriptor {
            name: "broker",
            unit: "rabbitmq-server",
            refresh: Refresh::Reload,
            probe: Probe::PrincipalExists {
                service: SERVICE_BROKER.to_string(),
                principal: env.user.clone(),
            },
            actions: vec![
                SetupAction::CreateNamespace {
                    service: SERVICE_BROKER.to_string(),
                    namespace: broker_vhost.clone(),
                },
                SetupAction::CreatePrincipal {
                    service: SERVICE_BROKER.to_string(),
                    principal: env.user.clone(),
                    secret: env.secret.clone(),
                },
                SetupAction::SetPermission {
                    service: SERVICE_BROKER.to_string(),
                    principal: env.user.clone(),
                    namespace: broker_vhost,
                    perms: Permissions::all(),
                },
                SetupAction::EnableExtension {
                    service: SERVICE_BROKER.to_string(),
                    namespace: "/".to_string(),
                    extension: "rabbitmq_management".to_string(),
                },
            ],
        },
        ServiceDescriptor {
            name: "database",
            unit: "postgresql",
            refresh: Refresh::Reload,
            probe: Probe::PrincipalExists {
                service: SERVICE_DATABASE.to_string(),
                principal: env.user.clone(),
            },
            actions: vec![
                SetupAction::CreatePrincipal {
                    service: SERVICE_DATABASE.to_string(),
                    principal: env.user.clone(),
                    secret: env.secret.clone(),
                },
                SetupAction::CreateNamespace {
                    service: SERVICE_DATABASE.to_string(),
                    namespace: database.clone(),
                },
                SetupAction::SetPermission {
                    service: SERVICE_DATABASE.to_string(),
                    principal: env.user.clone(),
                    namespace: database.clone(),
                    perms: Permissions::all(),
                },
                SetupAction::EnableExtension {
                    service: SERVICE_DATABASE.to_string(),
                    namespace: database,
                    extension: "citext".to_string(),
                },
            ],
        },
        ServiceDescriptor {
            name: "cache-router",
            unit: "mcrouter",
            refresh: Refresh::Restart,
            probe: Probe::FileExists(env.layout.cache_router_config.clone()),
            actions: vec![SetupAction::WriteFile {
                path: env.layout.cache_router_config.clone(),
                content: render_cache_routes(),
            }],
        },
    ]
}

/// Route config pointing the cache router at the local memcached pool
fn render_cache_routes() -> String {
    concat!(
        "{\n",
        "  \"pools\": {\n",
        "    \"local\": {\n",
        "      \"servers\": [\"127.0.0.1:11211\"]\n",
        "    }\n",
        "  },\n",
        "  \"route\": \"PoolRoute|local\"\n",
        "}\n"
    )
    .to_string()
}

/// Apply every descriptor, then refresh touched units once each
pub fn configure(
    env: &HostEnvironment,
    host: &mut dyn HostController,
) -> Result<Vec<&'static str>> {
    let mut touched: BTreeMap<&'static str, Refresh> = BTreeMap::new();

    for descriptor in standard_descriptors(env) {
        if descriptor.probe.evaluate(host)? {
            debug!("service {} already configured, skipping", descriptor.name);
            continue;
        }

        info!("configuring service {}", descriptor.name);
        for action in &descriptor.actions {
            action.apply(host)?;
        }

        if !descriptor.probe.evaluate(host)? {
            return Err(Error::ProbeUnsatisfied {
                service: descriptor.name.to_string(),
            });
        }
        touched.insert(descriptor.unit, descriptor.refresh);
    }

    for (unit, refresh) in &touched {
        match refresh {
            Refresh::Reload => host.reload_service(unit)?,
            Refresh::Restart => host.restart_service(unit)?,
        }
    }

    Ok(touched.into_keys().collect())
}

pub struct InfraStage;

impl Stage for InfraStage {
    fn name(&self) -> &'static str {
        "infrastructure"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        for descriptor in standard_descriptors(ctx.env) {
            if !descriptor.probe.evaluate(ctx.host)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        configure(ctx.env, ctx.host)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::env::{HostEnvironment, Layout};
    use crate::host::FakeHost;

    fn env(root: &std::path::Path) -> HostEnvironment {
        let mut config = ProvisionConfig::default();
        config.install_root = root.to_path_buf();
        HostEnvironment::with_layout(config, Layout::rooted(root))
    }

    #[test]
    fn test_configure_applies_all_then_refreshes_once_per_unit() {
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());
        let mut host = FakeHost::new();

        let touched = configure(&env, &mut host).unwrap();
        assert_eq!(touched, vec!["mcrouter", "postgresql", "rabbitmq-server"]);

        assert_eq!(host.count_ops("reload rabbitmq-server"), 1);
        assert_eq!(host.count_ops("reload postgresql"), 1);
        assert_eq!(host.count_ops("restart mcrouter"), 1);
        assert!(env.layout.cache_router_config.is_file());
        assert!(host.principals.contains("broker:webapp"));
        assert!(host.principals.contains("database:webapp"));
    }

    #[test]
    fn test_configure_rerun_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());
        let mut host = FakeHost::new();

        configure(&env, &mut host).unwrap();
        let ops_after_first = host.ops.len();

        let touched = configure(&env, &mut host).unwrap();
        assert!(touched.is_empty());
        assert_eq!(host.ops.len(), ops_after_first);
    }

    #[test]
    fn test_failed_action_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());
        let mut host = FakeHost::new();
        host.fail_on = Some("set-permission broker".to_string());

        let err = configure(&env, &mut host).unwrap_err();
        assert!(matches!(err, Error::ControlAction { .. }));
        // Nothing was refreshed after the failure
        assert_eq!(host.count_ops("reload"), 0);
        assert_eq!(host.count_ops("restart"), 0);
    }

    #[test]
    fn test_partial_external_state_converges() {
        // Broker already configured by hand; only database and cache run
        let temp = tempfile::tempdir().unwrap();
        let env = env(temp.path());
        let mut host = FakeHost::new();
        host.principals.insert("broker:webapp".to_string());

        configure(&env, &mut host).unwrap();
        assert_eq!(host.count_ops("create-principal broker"), 0);
        assert_eq!(host.count_ops("create-principal database"), 1);
        assert_eq!(host.count_ops("reload rabbitmq-server"), 0);
    }
}

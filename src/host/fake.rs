// src/host/fake.rs

//! Recording host controller for tests
//!
//! Tracks every operation in order and keeps just enough state (installed
//! packages, namespaces, principals) for the idempotency probes to behave
//! like a real host across repeated pipeline runs.

use super::{HostController, Permissions};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Default)]
pub struct FakeHost {
    /// Every operation, in invocation order, as `verb arg arg ...`
    pub ops: Vec<String>,
    pub installed: BTreeSet<String>,
    /// `service:namespace`
    pub namespaces: BTreeSet<String>,
    /// `service:principal`
    pub principals: BTreeSet<String>,
    /// `service:namespace:extension`
    pub extensions: BTreeSet<String>,
    /// When set, any op starting with this prefix fails
    pub fail_on: Option<String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded ops starting with `prefix`
    pub fn count_ops(&self, prefix: &str) -> usize {
        self.ops.iter().filter(|op| op.starts_with(prefix)).count()
    }

    /// Index of the first recorded op starting with `prefix`
    pub fn first_op(&self, prefix: &str) -> Option<usize> {
        self.ops.iter().position(|op| op.starts_with(prefix))
    }

    fn record(&mut self, op: String) -> Result<()> {
        if let Some(prefix) = &self.fail_on {
            if op.starts_with(prefix.as_str()) {
                self.ops.push(op.clone());
                return Err(Error::ControlAction {
                    service: "fake".to_string(),
                    action: op,
                    reason: "injected failure".to_string(),
                });
            }
        }
        self.ops.push(op);
        Ok(())
    }
}

impl HostController for FakeHost {
    fn package_installed(&mut self, package: &str) -> Result<bool> {
        Ok(self.installed.contains(package))
    }

    fn install_packages(&mut self, packages: &[String]) -> Result<()> {
        self.record(format!("install-packages {}", packages.join(" ")))?;
        for p in packages {
            self.installed.insert(p.clone());
        }
        Ok(())
    }

    fn clone_repository(&mut self, url: &str, dest: &Path) -> Result<()> {
        self.record(format!("clone {} {}", url, dest.display()))?;
        // Materialize the checkout so presence probes see it on rerun
        std::fs::create_dir_all(dest)?;
        Ok(())
    }

    fn namespace_exists(&mut self, service: &str, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.contains(&format!("{}:{}", service, namespace)))
    }

    fn principal_exists(&mut self, service: &str, principal: &str) -> Result<bool> {
        Ok(self.principals.contains(&format!("{}:{}", service, principal)))
    }

    fn create_namespace(&mut self, service: &str, namespace: &str) -> Result<()> {
        self.record(format!("create-namespace {} {}", service, namespace))?;
        self.namespaces.insert(format!("{}:{}", service, namespace));
        Ok(())
    }

    fn create_principal(&mut self, service: &str, principal: &str, _secret: &str) -> Result<()> {
        self.record(format!("create-principal {} {}", service, principal))?;
        self.principals.insert(format!("{}:{}", service, principal));
        Ok(())
    }

    fn set_permission(
        &mut self,
        service: &str,
        principal: &str,
        namespace: &str,
        perms: &Permissions,
    ) -> Result<()> {
        self.record(format!(
            "set-permission {} {} {} {}/{}/{}",
            service, principal, namespace, perms.configure, perms.write, perms.read
        ))
    }

    fn enable_extension(&mut self, service: &str, namespace: &str, extension: &str) -> Result<()> {
        self.record(format!(
            "enable-extension {} {} {}",
            service, namespace, extension
        ))?;
        self.extensions
            .insert(format!("{}:{}:{}", service, namespace, extension));
        Ok(())
    }

    fn reload_service(&mut self, unit: &str) -> Result<()> {
        self.record(format!("reload {}", unit))
    }

    fn restart_service(&mut self, unit: &str) -> Result<()> {
        self.record(format!("restart {}", unit))
    }

    fn enable_service(&mut self, unit: &str) -> Result<()> {
        self.record(format!("enable {}", unit))
    }

    fn start_service(&mut self, unit: &str) -> Result<()> {
        self.record(format!("start {}", unit))
    }

    fn run_as(&mut self, user: &str, command: &str) -> Result<()> {
        self.record(format!("run-as {} {}", user, command))
    }
}

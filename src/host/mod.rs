// src/host/mod.rs

//! Capability-scoped access to mutable host state
//!
//! Every component that touches the host goes through the `HostController`
//! trait rather than shelling out ad hoc. The vocabulary is deliberately
//! narrow: package queries and installs, repository clones, the
//! create/grant/enable surface of the infrastructure services, and process
//! supervision verbs. `SystemHost` is the real implementation; `FakeHost`
//! records every operation for tests.

mod fake;
mod system;

pub use fake::FakeHost;
pub use system::{SystemHost, SERVICE_BROKER, SERVICE_DATABASE};

use crate::error::Result;
use std::path::Path;

/// Permission patterns for a principal on a namespace, in the order the
/// control surface expects them: configure, write, read.
#[derive(Debug, Clone)]
pub struct Permissions {
    pub configure: String,
    pub write: String,
    pub read: String,
}

impl Permissions {
    /// Full access on everything in the namespace
    pub fn all() -> Self {
        Self {
            configure: ".*".to_string(),
            write: ".*".to_string(),
            read: ".*".to_string(),
        }
    }
}

/// The narrow command vocabulary the pipeline needs from the host
pub trait HostController {
    /// Whether an OS package is already installed
    fn package_installed(&mut self, package: &str) -> Result<bool>;

    /// Install OS packages (no-op entries for already-installed packages)
    fn install_packages(&mut self, packages: &[String]) -> Result<()>;

    /// Clone a source repository to `dest`
    fn clone_repository(&mut self, url: &str, dest: &Path) -> Result<()>;

    /// Whether a namespace (vhost, database) exists on a service
    fn namespace_exists(&mut self, service: &str, namespace: &str) -> Result<bool>;

    /// Whether a principal (user, role) exists on a service
    fn principal_exists(&mut self, service: &str, principal: &str) -> Result<bool>;

    fn create_namespace(&mut self, service: &str, namespace: &str) -> Result<()>;

    fn create_principal(&mut self, service: &str, principal: &str, secret: &str) -> Result<()>;

    fn set_permission(
        &mut self,
        service: &str,
        principal: &str,
        namespace: &str,
        perms: &Permissions,
    ) -> Result<()>;

    fn enable_extension(&mut self, service: &str, namespace: &str, extension: &str) -> Result<()>;

    fn reload_service(&mut self, unit: &str) -> Result<()>;

    fn restart_service(&mut self, unit: &str) -> Result<()>;

    fn enable_service(&mut self, unit: &str) -> Result<()>;

    fn start_service(&mut self, unit: &str) -> Result<()>;

    /// Run a command as an unprivileged user (the single-writer bootstrap)
    fn run_as(&mut self, user: &str, command: &str) -> Result<()>;
}

// src/host/system.rs

//! Real host controller backed by the system control binaries
//!
//! Shells out to the package manager, git, systemctl, and the per-service
//! control endpoints (rabbitmqctl for the broker, psql-as-postgres for the
//! database). Failures are immediate and fatal; there is no retry or
//! backoff anywhere in the pipeline, so none here either.

use super::{HostController, Permissions};
use crate::error::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Service names the descriptors use for control-endpoint dispatch
pub const SERVICE_BROKER: &str = "broker";
pub const SERVICE_DATABASE: &str = "database";

pub struct SystemHost {
    dry_run: bool,
}

impl SystemHost {
    pub fn new() -> Result<Self> {
        // The bootstrap binaries must exist up front; service control
        // endpoints appear only after the package stage and are resolved
        // lazily.
        for name in ["apt-get", "git", "systemctl"] {
            which::which(name).map_err(|_| Error::MissingBinary {
                name: name.to_string(),
            })?;
        }
        Ok(Self { dry_run: false })
    }

    /// Log mutations instead of executing them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn describe(program: &str, args: &[&str]) -> String {
        let mut s = program.to_string();
        for a in args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }

    /// Run a command to completion, capturing output
    fn output(&mut self, program: &str, args: &[&str]) -> Result<std::process::Output> {
        which::which(program).map_err(|_| Error::MissingBinary {
            name: program.to_string(),
        })?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()?;
        Ok(output)
    }

    /// Run a mutating command; failure is fatal
    fn run(&mut self, program: &str, args: &[&str]) -> Result<()> {
        let command = Self::describe(program, args);
        if self.dry_run {
            info!("[dry-run] would run: {}", command);
            return Ok(());
        }
        debug!("running: {}", command);
        let output = self.output(program, args)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run a read-only query, returning stdout on success
    fn query(&mut self, program: &str, args: &[&str]) -> Result<String> {
        let command = Self::describe(program, args);
        let output = self.output(program, args)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run SQL as the database superuser, optionally against a database
    fn psql(&mut self, database: Option<&str>, sql: &str) -> Result<String> {
        let cmd = match database {
            Some(db) => format!("psql -qtA -d {} -c \"{}\"", db, sql),
            None => format!("psql -qtA -c \"{}\"", sql),
        };
        if self.dry_run {
            info!("[dry-run] would run as postgres: {}", cmd);
            return Ok(String::new());
        }
        self.query("su", &["postgres", "-s", "/bin/sh", "-c", &cmd])
    }

    fn unknown_service(service: &str, action: &str) -> Error {
        Error::ControlAction {
            service: service.to_string(),
            action: action.to_string(),
            reason: "unknown control endpoint".to_string(),
        }
    }
}

impl HostController for SystemHost {
    fn package_installed(&mut self, package: &str) -> Result<bool> {
        // dpkg-query exits non-zero for unknown packages; treat as absent
        let output = self.output(
            "dpkg-query",
            &["-W", "-f", "${db:Status-Status}", package],
        )?;
        Ok(output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "installed")
    }

    fn install_packages(&mut self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = vec!["install", "-y", "--no-install-recommends"];
        args.extend(packages.iter().map(String::as_str));
        self.run("apt-get", &args)
    }

    fn clone_repository(&mut self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.display().to_string();
        self.run("git", &["clone", url, &dest])
    }

    fn namespace_exists(&mut self, service: &str, namespace: &str) -> Result<bool> {
        match service {
            SERVICE_BROKER => {
                let out = self.query("rabbitmqctl", &["-q", "list_vhosts"])?;
                Ok(out.lines().any(|l| l.trim() == namespace))
            }
            SERVICE_DATABASE => {
                let out = self.psql(
                    None,
                    &format!("SELECT 1 FROM pg_database WHERE datname = '{}'", namespace),
                )?;
                Ok(out.trim() == "1")
            }
            _ => Err(Self::unknown_service(service, "namespace-exists")),
        }
    }

    fn principal_exists(&mut self, service: &str, principal: &str) -> Result<bool> {
        match service {
            SERVICE_BROKER => {
                let out = self.query("rabbitmqctl", &["-q", "list_users"])?;
                Ok(out
                    .lines()
                    .filter_map(|l| l.split_whitespace().next())
                    .any(|name| name == principal))
            }
            SERVICE_DATABASE => {
                let out = self.psql(
                    None,
                    &format!("SELECT 1 FROM pg_roles WHERE rolname = '{}'", principal),
                )?;
                Ok(out.trim() == "1")
            }
            _ => Err(Self::unknown_service(service, "principal-exists")),
        }
    }

    fn create_namespace(&mut self, service: &str, namespace: &str) -> Result<()> {
        match service {
            SERVICE_BROKER => self.run("rabbitmqctl", &["add_vhost", namespace]),
            SERVICE_DATABASE => {
                self.psql(None, &format!("CREATE DATABASE {}", namespace))?;
                Ok(())
            }
            _ => Err(Self::unknown_service(service, "create-namespace")),
        }
    }

    fn create_principal(&mut self, service: &str, principal: &str, secret: &str) -> Result<()> {
        match service {
            SERVICE_BROKER => self.run("rabbitmqctl", &["add_user", principal, secret]),
            SERVICE_DATABASE => {
                self.psql(
                    None,
                    &format!("CREATE ROLE {} LOGIN PASSWORD '{}'", principal, secret),
                )?;
                Ok(())
            }
            _ => Err(Self::unknown_service(service, "create-principal")),
        }
    }

    fn set_permission(
        &mut self,
        service: &str,
        principal: &str,
        namespace: &str,
        perms: &Permissions,
    ) -> Result<()> {
        match service {
            SERVICE_BROKER => self.run(
                "rabbitmqctl",
                &[
                    "set_permissions",
                    "-p",
                    namespace,
                    principal,
                    &perms.configure,
                    &perms.write,
                    &perms.read,
                ],
            ),
            SERVICE_DATABASE => {
                self.psql(
                    None,
                    &format!(
                        "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
                        namespace, principal
                    ),
                )?;
                Ok(())
            }
            _ => Err(Self::unknown_service(service, "set-permission")),
        }
    }

    fn enable_extension(&mut self, service: &str, namespace: &str, extension: &str) -> Result<()> {
        match service {
            SERVICE_BROKER => self.run("rabbitmq-plugins", &["enable", "--quiet", extension]),
            SERVICE_DATABASE => {
                self.psql(
                    Some(namespace),
                    &format!("CREATE EXTENSION IF NOT EXISTS {}", extension),
                )?;
                Ok(())
            }
            _ => Err(Self::unknown_service(service, "enable-extension")),
        }
    }

    fn reload_service(&mut self, unit: &str) -> Result<()> {
        self.run("systemctl", &["reload-or-restart", unit])
    }

    fn restart_service(&mut self, unit: &str) -> Result<()> {
        self.run("systemctl", &["restart", unit])
    }

    fn enable_service(&mut self, unit: &str) -> Result<()> {
        self.run("systemctl", &["enable", unit])
    }

    fn start_service(&mut self, unit: &str) -> Result<()> {
        self.run("systemctl", &["start", unit])
    }

    fn run_as(&mut self, user: &str, command: &str) -> Result<()> {
        self.run("su", &[user, "-s", "/bin/sh", "-c", command])
    }
}

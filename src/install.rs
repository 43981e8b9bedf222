// src/install.rs

//! OS package and language-runtime installation
//!
//! Leaf stage with no internal state beyond installed/not: the precondition
//! asks the controller about every declared package and `apply` installs
//! whatever is missing in one batch.

use crate::error::Result;
use crate::pipeline::{Context, Stage};
use tracing::info;

/// OS and runtime packages the stack needs on a clean host
pub const BASE_PACKAGES: &[&str] = &[
    "git",
    "curl",
    "gettext",
    "postgresql",
    "rabbitmq-server",
    "haproxy",
    "nginx",
    "mcrouter",
    "memcached",
    "python3",
    "python3-dev",
    "python3-pip",
];

pub struct PackageStage;

impl Stage for PackageStage {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        for package in BASE_PACKAGES {
            if !ctx.host.package_installed(package)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let mut missing = Vec::new();
        for package in BASE_PACKAGES {
            if !ctx.host.package_installed(package)? {
                missing.push(package.to_string());
            }
        }
        info!("installing {} missing package(s)", missing.len());
        ctx.host.install_packages(&missing)
    }
}

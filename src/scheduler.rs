// src/scheduler.rs

//! Periodic job scheduler installation
//!
//! Writes the fixed maintenance job table once, keyed on file presence.
//! An existing definition file is never merged or updated; operators own
//! it after first creation.

use crate::env::HostEnvironment;
use crate::error::Result;
use crate::pipeline::{Context, Stage};
use tracing::{debug, info};

/// (cadence, job invocation) pairs; the executing principal comes from the
/// host environment.
pub const JOBS: &[(&str, &str)] = &[
    ("*/5 * * * *", "appctl jobs recompute-listings"),
    ("0 * * * *", "appctl jobs refresh-rankings"),
    ("*/3 * * * *", "appctl jobs refresh-search-index"),
    ("30 3 * * *", "appctl jobs expire-sessions"),
];

/// Render the job table: cadence fields, principal, invocation
pub fn render_jobs(env: &HostEnvironment) -> String {
    let mut out = String::from("# periodic maintenance jobs generated by drydock\n");
    for (cadence, command) in JOBS {
        out.push_str(&format!("{} {} {}\n", cadence, env.user, command));
    }
    out
}

pub struct SchedulerStage;

impl Stage for SchedulerStage {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        Ok(ctx.env.layout.cron_file.is_file())
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let path = &ctx.env.layout.cron_file;
        if path.is_file() {
            debug!("scheduler definition already present, leaving untouched");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("writing scheduler definition {}", path.display());
        std::fs::write(path, render_jobs(ctx.env))?;
        Ok(())
    }
}

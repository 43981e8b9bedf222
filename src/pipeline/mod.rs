// src/pipeline/mod.rs

//! Stage sequencing and the orchestration driver
//!
//! The pipeline is an explicit ordered list of named stages, each with a
//! `is_satisfied`/`apply` pair. The driver walks the list once, skipping
//! stages whose precondition already holds and aborting on the first
//! failure; there is no partial-success continuation and no retry. The
//! final stage performs the single-writer bootstrap confirmation before
//! any concurrent worker process is started.

use crate::env::HostEnvironment;
use crate::error::Result;
use crate::fetch::FetchStage;
use crate::host::HostController;
use crate::infra::InfraStage;
use crate::install::PackageStage;
use crate::preflight::{self, HostFacts};
use crate::queues::QueueStage;
use crate::scheduler::SchedulerStage;
use crate::supervisor::SupervisorStage;
use crate::synth::SynthStage;
use crate::topology::TopologyStage;
use serde::Serialize;
use tracing::{debug, info};

/// Unit name of the external consumer-manager collaborator
pub const CONSUMER_MANAGER_UNIT: &str = "consumer-manager";

/// Everything a stage may touch while running
pub struct Context<'a> {
    pub env: &'a HostEnvironment,
    pub host: &'a mut dyn HostController,
    pub facts: &'a HostFacts,
}

/// A named pipeline stage with an idempotency precondition
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Whether the stage's desired state already holds (skip `apply`)
    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool>;

    /// Bring the host to the stage's desired state
    fn apply(&self, ctx: &mut Context) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    Applied,
    Skipped,
}

/// Outcome of one stage in a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: &'static str,
    pub status: StageStatus,
}

/// The stage list in dependency order
pub fn standard_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(PreflightStage),
        Box::new(PackageStage),
        Box::new(FetchStage),
        Box::new(InfraStage),
        Box::new(SynthStage),
        Box::new(TopologyStage),
        Box::new(SupervisorStage),
        Box::new(QueueStage),
        Box::new(SchedulerStage),
        Box::new(EnvironmentStage),
        Box::new(ActivateStage),
    ]
}

/// Orchestration driver: walks the stage list once, in order
pub struct Driver<'a> {
    env: &'a HostEnvironment,
    host: &'a mut dyn HostController,
    facts: HostFacts,
}

impl<'a> Driver<'a> {
    /// Driver against the live host, probing facts now
    pub fn new(env: &'a HostEnvironment, host: &'a mut dyn HostController) -> Result<Self> {
        let facts = HostFacts::probe()?;
        Ok(Self { env, host, facts })
    }

    /// Driver with injected facts (tests)
    pub fn with_facts(
        env: &'a HostEnvironment,
        host: &'a mut dyn HostController,
        facts: HostFacts,
    ) -> Self {
        Self { env, host, facts }
    }

    /// Run every stage in order; the first failure aborts the remainder
    pub fn run(&mut self) -> Result<Vec<StageOutcome>> {
        // Export the process-environment contract before anything spawns
        // downstream tooling.
        self.env.apply_process_env();

        let stages = standard_stages();
        let mut outcomes = Vec::with_capacity(stages.len());

        for stage in &stages {
            let mut ctx = Context {
                env: self.env,
                host: &mut *self.host,
                facts: &self.facts,
            };
            if stage.is_satisfied(&mut ctx)? {
                debug!("stage {} already satisfied, skipping", stage.name());
                outcomes.push(StageOutcome {
                    stage: stage.name(),
                    status: StageStatus::Skipped,
                });
                continue;
            }
            info!("applying stage {}", stage.name());
            stage.apply(&mut ctx)?;
            outcomes.push(StageOutcome {
                stage: stage.name(),
                status: StageStatus::Applied,
            });
        }

        info!("provisioning complete ({} stages)", outcomes.len());
        Ok(outcomes)
    }
}

/// Preflight as a stage: read-only, never satisfied in advance
pub struct PreflightStage;

impl Stage for PreflightStage {
    fn name(&self) -> &'static str {
        "preflight"
    }

    fn is_satisfied(&self, _ctx: &mut Context) -> Result<bool> {
        Ok(false)
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        preflight::validate(ctx.env, ctx.facts)
    }
}

/// Writes the profile script carrying the environment contract
pub struct EnvironmentStage;

impl Stage for EnvironmentStage {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        let path = &ctx.env.layout.env_profile;
        match std::fs::read_to_string(path) {
            Ok(existing) => Ok(existing == ctx.env.render_profile()),
            Err(_) => Ok(false),
        }
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let path = &ctx.env.layout.env_profile;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, ctx.env.render_profile())?;
        Ok(())
    }
}

/// Final activation: single-writer bootstrap, then service enable/start
///
/// The bootstrap confirmation runs the application entry once as the
/// operating identity so first-run initialization (schema creation)
/// completes before the consumer-manager spawns concurrent workers.
pub struct ActivateStage;

impl ActivateStage {
    fn bootstrap_command(env: &HostEnvironment) -> String {
        format!(
            "appctl --ini {} bootstrap",
            env.layout.app_config.display()
        )
    }
}

impl Stage for ActivateStage {
    fn name(&self) -> &'static str {
        "activate"
    }

    fn is_satisfied(&self, _ctx: &mut Context) -> Result<bool> {
        // Confirmation re-runs every pipeline execution; starts are no-ops
        // on an already-running stack.
        Ok(false)
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let env = ctx.env;
        ctx.host
            .run_as(&env.user, &Self::bootstrap_command(env))?;

        for unit in env
            .services
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(CONSUMER_MANAGER_UNIT))
        {
            ctx.host.enable_service(unit)?;
            ctx.host.start_service(unit)?;
        }
        Ok(())
    }
}

// src/fetch.rs

//! Idempotent source repository fetching
//!
//! Clones every declared repository into `{source_root}/{name}`. A checkout
//! directory that already exists is skipped outright; keeping it current is
//! an operator concern, not a provisioning one.

use crate::error::Result;
use crate::pipeline::{Context, Stage};
use tracing::{debug, info};

pub struct FetchStage;

impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        Ok(ctx
            .env
            .repositories
            .iter()
            .all(|repo| ctx.env.source_root.join(&repo.name).is_dir()))
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let env = ctx.env;
        std::fs::create_dir_all(&env.source_root)?;
        for repo in &env.repositories {
            let dest = env.source_root.join(&repo.name);
            if dest.is_dir() {
                debug!("checkout {} already present, skipping", repo.name);
                continue;
            }
            info!("cloning {} into {}", repo.url, dest.display());
            ctx.host.clone_repository(&repo.url, &dest)?;
        }
        Ok(())
    }
}

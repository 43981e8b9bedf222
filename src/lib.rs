// src/lib.rs

//! Drydock - single-host web stack provisioning
//!
//! Brings up a reproducible multi-process web application stack (broker,
//! database, cache router, reverse proxy, load balancer, auxiliary
//! services, scheduler, queue consumers) from a clean operating system.
//!
//! # Architecture
//!
//! - Capability-scoped host access: every mutation goes through the
//!   `HostController` trait, never an ad hoc shell-out
//! - Explicit ordered stages: each stage carries an idempotency
//!   precondition and an apply action; the driver walks them once
//! - One source of truth per artifact pair: proxy and balancer configs are
//!   rendered from a single topology so ports and paths cannot drift
//! - First failure aborts; reruns are the recovery mechanism and are safe
//!   because every stage is idempotent

pub mod config;
pub mod env;
mod error;
pub mod fetch;
pub mod host;
pub mod infra;
pub mod install;
pub mod pipeline;
pub mod preflight;
pub mod queues;
pub mod scheduler;
pub mod supervisor;
pub mod synth;
pub mod topology;

pub use config::{ProvisionConfig, Repository};
pub use env::{HostEnvironment, Layout};
pub use error::{Error, Result};
pub use host::{FakeHost, HostController, Permissions, SystemHost};
pub use pipeline::{Driver, Stage, StageOutcome, StageStatus};
pub use preflight::HostFacts;
pub use queues::QueueRegistry;
pub use topology::Topology;

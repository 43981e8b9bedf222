// src/error.rs

//! Error types for the provisioning pipeline
//!
//! The taxonomy is deliberately flat: environment mismatches and failed
//! control actions are fatal, already-configured resources are not errors
//! at all (the idempotency probes short-circuit before any action runs),
//! and the only recoverable condition is the low-memory check.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("insufficient privilege: provisioning must run as root (rerun under sudo)")]
    NotRoot,

    #[error(
        "operating identity `{0}` is unusable: declare a non-empty user distinct \
         from the privileged principal in the config"
    )]
    BadIdentity(String),

    #[error("unsupported architecture `{found}` (requires {required})")]
    UnsupportedArch { found: String, required: &'static str },

    #[error("unsupported operating system {id} {version} (supported: {supported})")]
    UnsupportedOs {
        id: String,
        version: String,
        supported: String,
    },

    #[error(
        "insufficient memory: {available_kb} KB available, {required_kb} KB required; \
         set `allow_low_memory = true` (or pass --allow-low-memory) to override"
    )]
    LowMemory { available_kb: u64, required_kb: u64 },

    #[error("control action `{action}` failed on service `{service}`: {reason}")]
    ControlAction {
        service: String,
        action: String,
        reason: String,
    },

    #[error("command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("required binary `{name}` not found on PATH")]
    MissingBinary { name: String },

    #[error("setup actions for `{service}` completed but its probe is still unsatisfied")]
    ProbeUnsatisfied { service: String },

    #[error("topology inconsistency: {0}")]
    Topology(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

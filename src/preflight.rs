// src/preflight.rs

//! Host capability checks, run before anything mutates the host
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! privilege, operating identity, CPU architecture, OS distribution and
//! version, minimum memory. Only the memory check is overridable; the
//! override is an explicit config flag, with an interactive prompt offered
//! when stdin is a terminal. Nothing here has side effects beyond reading
//! host facts.

use crate::env::HostEnvironment;
use crate::error::{Error, Result};
use std::io::{BufRead, IsTerminal, Write};
use tracing::{debug, warn};

pub const REQUIRED_ARCH: &str = "x86_64";
pub const MIN_MEMORY_KB: u64 = 2_000_000;

/// Supported (distribution id, version) pairs
pub const SUPPORTED_OS: &[(&str, &str)] = &[("ubuntu", "22.04"), ("ubuntu", "24.04")];

/// Snapshot of the host facts the validator inspects
#[derive(Debug, Clone)]
pub struct HostFacts {
    pub is_root: bool,
    pub arch: String,
    pub os_id: String,
    pub os_version: String,
    pub memory_kb: u64,
}

impl HostFacts {
    /// Probe the running host
    pub fn probe() -> Result<Self> {
        let uname = nix::sys::utsname::uname()
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
        let (os_id, os_version) = parse_os_release(&std::fs::read_to_string("/etc/os-release")?);
        let memory_kb = parse_meminfo(&std::fs::read_to_string("/proc/meminfo")?);

        Ok(Self {
            is_root: nix::unistd::Uid::effective().is_root(),
            arch: uname.machine().to_string_lossy().to_string(),
            os_id,
            os_version,
            memory_kb,
        })
    }
}

/// How to resolve the low-memory check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowMemoryPolicy {
    /// Warn and continue (config flag set)
    Allow,
    /// Fail deterministically (non-interactive, no flag)
    Deny,
    /// Ask the operator on the terminal
    Prompt,
}

/// Run every check against probed facts, resolving the low-memory policy
/// from the config flag and terminal presence.
pub fn validate(env: &HostEnvironment, facts: &HostFacts) -> Result<()> {
    let policy = if env.allow_low_memory {
        LowMemoryPolicy::Allow
    } else if std::io::stdin().is_terminal() {
        LowMemoryPolicy::Prompt
    } else {
        LowMemoryPolicy::Deny
    };
    check(env, facts, policy)
}

/// Run every check with an explicit low-memory policy
pub fn check(env: &HostEnvironment, facts: &HostFacts, policy: LowMemoryPolicy) -> Result<()> {
    if !facts.is_root {
        return Err(Error::NotRoot);
    }

    if env.user.is_empty() || env.user == "root" {
        return Err(Error::BadIdentity(env.user.clone()));
    }

    if facts.arch != REQUIRED_ARCH {
        return Err(Error::UnsupportedArch {
            found: facts.arch.clone(),
            required: REQUIRED_ARCH,
        });
    }

    let supported = SUPPORTED_OS
        .iter()
        .any(|(id, version)| facts.os_id == *id && facts.os_version == *version);
    if !supported {
        return Err(Error::UnsupportedOs {
            id: facts.os_id.clone(),
            version: facts.os_version.clone(),
            supported: SUPPORTED_OS
                .iter()
                .map(|(id, v)| format!("{} {}", id, v))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    if facts.memory_kb < MIN_MEMORY_KB {
        let low = Error::LowMemory {
            available_kb: facts.memory_kb,
            required_kb: MIN_MEMORY_KB,
        };
        match policy {
            LowMemoryPolicy::Allow => {
                warn!(
                    "continuing with {} KB of memory (below the {} KB minimum)",
                    facts.memory_kb, MIN_MEMORY_KB
                );
            }
            LowMemoryPolicy::Deny => return Err(low),
            LowMemoryPolicy::Prompt => {
                if !confirm_low_memory(facts.memory_kb)? {
                    return Err(low);
                }
            }
        }
    }

    debug!("preflight checks passed");
    Ok(())
}

fn confirm_low_memory(available_kb: u64) -> Result<bool> {
    eprint!(
        "Host reports {} KB of memory, below the {} KB minimum. Continue anyway? [y/N] ",
        available_kb, MIN_MEMORY_KB
    );
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Pull ID and VERSION_ID out of an os-release document
fn parse_os_release(content: &str) -> (String, String) {
    let mut id = String::new();
    let mut version = String::new();
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("ID=") {
            id = value.trim_matches('"').to_string();
        } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
            version = value.trim_matches('"').to_string();
        }
    }
    (id, version)
}

/// MemTotal in KB from a meminfo document; 0 when absent
fn parse_meminfo(content: &str) -> u64 {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.trim().split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;

    fn good_facts() -> HostFacts {
        HostFacts {
            is_root: true,
            arch: "x86_64".to_string(),
            os_id: "ubuntu".to_string(),
            os_version: "24.04".to_string(),
            memory_kb: 4_000_000,
        }
    }

    fn env() -> HostEnvironment {
        HostEnvironment::from_config(ProvisionConfig::default())
    }

    #[test]
    fn test_all_checks_pass() {
        assert!(check(&env(), &good_facts(), LowMemoryPolicy::Deny).is_ok());
    }

    #[test]
    fn test_requires_root() {
        let mut facts = good_facts();
        facts.is_root = false;
        assert!(matches!(
            check(&env(), &facts, LowMemoryPolicy::Deny),
            Err(Error::NotRoot)
        ));
    }

    #[test]
    fn test_rejects_root_identity() {
        let mut config = ProvisionConfig::default();
        config.user = "root".to_string();
        let env = HostEnvironment::from_config(config);
        assert!(matches!(
            check(&env, &good_facts(), LowMemoryPolicy::Deny),
            Err(Error::BadIdentity(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_arch() {
        let mut facts = good_facts();
        facts.arch = "aarch64".to_string();
        assert!(matches!(
            check(&env(), &facts, LowMemoryPolicy::Deny),
            Err(Error::UnsupportedArch { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_os() {
        let mut facts = good_facts();
        facts.os_version = "18.04".to_string();
        assert!(matches!(
            check(&env(), &facts, LowMemoryPolicy::Deny),
            Err(Error::UnsupportedOs { .. })
        ));
    }

    #[test]
    fn test_low_memory_denied_without_flag() {
        let mut facts = good_facts();
        facts.memory_kb = 1_500_000;
        assert!(matches!(
            check(&env(), &facts, LowMemoryPolicy::Deny),
            Err(Error::LowMemory {
                available_kb: 1_500_000,
                ..
            })
        ));
    }

    #[test]
    fn test_low_memory_allowed_with_flag() {
        let mut facts = good_facts();
        facts.memory_kb = 1_500_000;
        assert!(check(&env(), &facts, LowMemoryPolicy::Allow).is_ok());
    }

    #[test]
    fn test_check_order_privilege_before_memory() {
        // A host failing several checks must report the earliest one
        let mut facts = good_facts();
        facts.is_root = false;
        facts.memory_kb = 0;
        assert!(matches!(
            check(&env(), &facts, LowMemoryPolicy::Deny),
            Err(Error::NotRoot)
        ));
    }

    #[test]
    fn test_parse_os_release() {
        let (id, version) = parse_os_release("NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"24.04\"\n");
        assert_eq!(id, "ubuntu");
        assert_eq!(version, "24.04");
    }

    #[test]
    fn test_parse_meminfo() {
        assert_eq!(
            parse_meminfo("MemTotal:       16314240 kB\nMemFree: 100 kB\n"),
            16_314_240
        );
        assert_eq!(parse_meminfo(""), 0);
    }
}

// src/queues.rs

//! Queue consumer registry
//!
//! One plain file per queue under the registry root, holding the desired
//! consumer count as a single non-negative integer. The directory is the
//! contract surface an external consumer-manager reads to size its worker
//! pools; this component never starts or stops processes. Writes are
//! first-write-wins so operator tuning survives re-provisioning.

use crate::error::{Error, Result};
use crate::pipeline::{Context, Stage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default desired consumer count per queue, applied only on first write
pub const DEFAULT_CONSUMER_COUNTS: &[(&str, u32)] = &[
    ("log_q", 0),
    ("search_q", 0),
    ("scraper_q", 1),
    ("markread_q", 1),
    ("commentstree_q", 1),
    ("newcomments_q", 1),
    ("vote_link_q", 1),
    ("vote_comment_q", 1),
    ("automoderator_q", 0),
];

pub struct QueueRegistry {
    root: PathBuf,
}

impl QueueRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(Error::Config(format!("invalid queue name `{}`", name)));
        }
        Ok(self.root.join(name))
    }

    /// Create the entry with `default` only if absent; an existing entry is
    /// never overwritten. Returns true when the entry was created.
    pub fn set_consumer_count(&self, name: &str, default: u32) -> Result<bool> {
        let path = self.entry_path(name)?;
        if path.is_file() {
            debug!("queue {} already registered, keeping existing count", name);
            return Ok(false);
        }
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(&path, format!("{}\n", default))?;
        info!("registered queue {} with {} consumer(s)", name, default);
        Ok(true)
    }

    /// Read the stored count for a queue, if registered
    pub fn consumer_count(&self, name: &str) -> Result<Option<u32>> {
        let path = self.entry_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let count = content.trim().parse().map_err(|_| {
            Error::Config(format!(
                "registry entry for `{}` holds `{}`, expected a non-negative integer",
                name,
                content.trim()
            ))
        })?;
        Ok(Some(count))
    }

    /// Overwrite an entry regardless of presence (operator CLI affordance)
    pub fn force_consumer_count(&self, name: &str, count: u32) -> Result<()> {
        let path = self.entry_path(name)?;
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(&path, format!("{}\n", count))?;
        Ok(())
    }
}

pub struct QueueStage;

impl Stage for QueueStage {
    fn name(&self) -> &'static str {
        "queue-registry"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        let registry = QueueRegistry::new(&ctx.env.layout.registry_root);
        for (name, _) in DEFAULT_CONSUMER_COUNTS {
            if registry.consumer_count(name)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        let registry = QueueRegistry::new(&ctx.env.layout.registry_root);
        for (name, default) in DEFAULT_CONSUMER_COUNTS {
            registry.set_consumer_count(name, *default)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let temp = tempfile::tempdir().unwrap();
        let registry = QueueRegistry::new(temp.path().join("counts"));

        assert!(registry.set_consumer_count("search_q", 0).unwrap());
        assert!(!registry.set_consumer_count("search_q", 5).unwrap());
        assert_eq!(registry.consumer_count("search_q").unwrap(), Some(0));
    }

    #[test]
    fn test_rerun_with_changed_default_keeps_original() {
        let temp = tempfile::tempdir().unwrap();
        let registry = QueueRegistry::new(temp.path().join("counts"));

        registry.set_consumer_count("automoderator_q", 1).unwrap();
        registry.set_consumer_count("automoderator_q", 2).unwrap();
        assert_eq!(
            registry.consumer_count("automoderator_q").unwrap(),
            Some(1)
        );
        let stored =
            std::fs::read_to_string(temp.path().join("counts/automoderator_q")).unwrap();
        assert_eq!(stored, "1\n");
    }

    #[test]
    fn test_force_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let registry = QueueRegistry::new(temp.path().join("counts"));

        registry.set_consumer_count("vote_link_q", 1).unwrap();
        registry.force_consumer_count("vote_link_q", 4).unwrap();
        assert_eq!(registry.consumer_count("vote_link_q").unwrap(), Some(4));
    }

    #[test]
    fn test_rejects_path_traversal_names() {
        let temp = tempfile::tempdir().unwrap();
        let registry = QueueRegistry::new(temp.path().join("counts"));
        assert!(registry.set_consumer_count("../escape", 1).is_err());
        assert!(registry.set_consumer_count("", 1).is_err());
    }

    #[test]
    fn test_unregistered_queue_reads_none() {
        let temp = tempfile::tempdir().unwrap();
        let registry = QueueRegistry::new(temp.path().join("counts"));
        assert_eq!(registry.consumer_count("nope_q").unwrap(), None);
    }
}

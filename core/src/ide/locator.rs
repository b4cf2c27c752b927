//! Locating the IDE instance that has the target solution open
//!
//! Resolution walks the live-object registry: for each running IDE process,
//! find the registry entry whose display name carries that exact process id,
//! bind it, and check whether the open solution path contains the target
//! solution name. The first instance that matches wins.

use super::{AutomationRegistry, IdeAutomation, RegistryEntry};
use crate::retry::RetryPolicy;
use crate::{CoreError, Result};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// An IDE instance bound to a target solution
#[derive(Clone)]
pub struct IdeSession {
    automation: Arc<dyn IdeAutomation>,
    pid: u32,
    solution_path: String,
}

impl IdeSession {
    pub fn automation(&self) -> Arc<dyn IdeAutomation> {
        Arc::clone(&self.automation)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn solution_path(&self) -> &str {
        &self.solution_path
    }
}

impl std::fmt::Debug for IdeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdeSession")
            .field("pid", &self.pid)
            .field("solution_path", &self.solution_path)
            .finish()
    }
}

/// Finds the IDE instance with a given solution open
pub struct IdeSessionLocator {
    registry: Arc<dyn AutomationRegistry>,
    retry: RetryPolicy,
}

impl IdeSessionLocator {
    pub fn new(registry: Arc<dyn AutomationRegistry>) -> Self {
        Self {
            registry,
            retry: RetryPolicy::transient_automation(),
        }
    }

    #[cfg(test)]
    pub fn with_retry(registry: Arc<dyn AutomationRegistry>, retry: RetryPolicy) -> Self {
        Self { registry, retry }
    }

    /// Find the first running IDE instance whose open solution path contains
    /// `solution_name` (case-insensitive). Returns `Ok(None)` when no
    /// instance matches.
    pub async fn locate(&self, solution_name: &str) -> Result<Option<IdeSession>> {
        let pids = self.registry.ide_process_ids().await?;
        if pids.is_empty() {
            debug!("No IDE processes running");
            return Ok(None);
        }

        let entries = self.registry.running_entries().await?;
        let needle = solution_name.to_lowercase();

        for pid in pids {
            let Some(entry) = Self::entry_for_pid(&entries, pid)? else {
                debug!(pid, "IDE process has no registry entry yet");
                continue;
            };

            let automation = match self.registry.bind(&entry).await {
                Ok(automation) => automation,
                Err(e) => {
                    warn!(pid, error = %e, "Failed to bind IDE automation object");
                    continue;
                }
            };

            // The solution property throws while the IDE is loading; retry
            // before giving up on this instance.
            let handle = Arc::clone(&automation);
            let solution_path = match self.retry.run(|| {
                let handle = Arc::clone(&handle);
                async move { handle.solution_path().await }
            })
            .await
            {
                Ok(path) => path,
                Err(e) => {
                    warn!(pid, error = %e, "Could not read solution from IDE instance");
                    continue;
                }
            };

            if solution_path.to_lowercase().contains(&needle) {
                debug!(pid, solution = %solution_path, "Matched IDE instance");
                return Ok(Some(IdeSession {
                    automation,
                    pid,
                    solution_path,
                }));
            }
            debug!(pid, solution = %solution_path, "IDE instance has a different solution open");
        }

        Ok(None)
    }

    /// Select the registry entry whose moniker display name carries exactly
    /// `pid`. Display names look like `!VisualStudio.DTE.17.0:1234`; the
    /// anchored pattern prevents pid 123 from matching the entry for 1234.
    fn entry_for_pid(entries: &[RegistryEntry], pid: u32) -> Result<Option<RegistryEntry>> {
        let pattern = format!(r"^!VisualStudio\.DTE\.\d+\.\d+:{}$", pid);
        let re = Regex::new(&pattern)
            .map_err(|e| CoreError::automation(format!("Bad moniker pattern: {}", e)))?;
        Ok(entries
            .iter()
            .find(|entry| re.is_match(&entry.display_name))
            .cloned())
    }
}

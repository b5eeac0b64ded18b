//! Run identity
//!
//! One generated run id per `(project_id, run_title)` key, held by whoever
//! owns the cache (normally a single normalizer).

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{EntityRef, TestStatus};

/// Generated id and status of a test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    pub id: String,
    pub title: String,
    pub status: TestStatus,
}

impl RunIdentity {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.title.clone())
    }
}

/// Cache of run identities keyed by `(project_id, run_title)`
#[derive(Debug, Default)]
pub struct RunIdentityCache {
    runs: HashMap<(String, String), RunIdentity>,
}

impl RunIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the identity for a key, creating a RUNNING one with a fresh id on first use
    pub fn get_or_create(&mut self, project_id: &str, run_title: &str) -> &RunIdentity {
        self.runs
            .entry((project_id.to_string(), run_title.to_string()))
            .or_insert_with(|| {
                let id = Uuid::new_v4().to_string();
                debug!("Created run {} for '{}' in project {}", id, run_title, project_id);
                RunIdentity {
                    id,
                    title: run_title.to_string(),
                    status: TestStatus::Running,
                }
            })
    }

    pub fn get(&self, project_id: &str, run_title: &str) -> Option<&RunIdentity> {
        self.runs.get(&(project_id.to_string(), run_title.to_string()))
    }

    /// Record a terminal status for an existing run
    pub fn set_status(&mut self, project_id: &str, run_title: &str, status: TestStatus) -> bool {
        match self.runs.get_mut(&(project_id.to_string(), run_title.to_string())) {
            Some(run) => {
                run.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Run title: the explicit run id if given, else the current git branch
pub fn resolve_run_title(explicit: Option<&str>, repo_dir: Option<&Path>) -> Result<String> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(title) => Ok(title.to_string()),
        None => current_branch(repo_dir),
    }
}

/// Name of the checked-out git branch
pub fn current_branch(repo_dir: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(["rev-parse", "--abbrev-ref", "HEAD"]);
    if let Some(dir) = repo_dir {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .map_err(|e| Error::RunTitle(format!("failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::RunTitle(format!("git rev-parse failed: {}", stderr.trim())));
    }

    let branch = String::from_utf8(output.stdout)
        .map_err(|_| Error::RunTitle("invalid UTF-8 in git output".to_string()))?;
    let branch = branch.trim();

    // Detached HEAD has no branch name to title a run with
    if branch.is_empty() || branch == "HEAD" {
        return Err(Error::RunTitle(
            "no branch checked out; set TESTRELAY_RUN_ID".to_string(),
        ));
    }

    Ok(branch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut cache = RunIdentityCache::new();
        let first = cache.get_or_create("p1", "main").id.clone();
        let second = cache.get_or_create("p1", "main").id.clone();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("p1", "main").unwrap().status, TestStatus::Running);
    }

    #[test]
    fn test_distinct_keys_get_distinct_runs() {
        let mut cache = RunIdentityCache::new();
        let a = cache.get_or_create("p1", "main").id.clone();
        let b = cache.get_or_create("p1", "feature").id.clone();
        let c = cache.get_or_create("p2", "main").id.clone();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_set_status() {
        let mut cache = RunIdentityCache::new();
        assert!(!cache.set_status("p1", "main", TestStatus::Passed));

        cache.get_or_create("p1", "main");
        assert!(cache.set_status("p1", "main", TestStatus::Failed));
        assert_eq!(cache.get("p1", "main").unwrap().status, TestStatus::Failed);
    }

    #[test]
    fn test_explicit_run_title_wins() {
        let title = resolve_run_title(Some(" nightly "), None).unwrap();
        assert_eq!(title, "nightly");
    }

    #[test]
    fn test_branch_lookup_outside_repo_fails_loudly() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_run_title(None, Some(tmp.path())).unwrap_err();
        assert!(matches!(err, Error::RunTitle(_)));
    }
}

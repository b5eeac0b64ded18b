//! Event normalization
//!
//! Turns framework lifecycle data into [`CanonicalMessage`]s. Adapters map
//! their runner's callback arguments onto the input structs below; the
//! normalizer never sees framework-specific shapes.

use chrono::Utc;
use std::collections::HashMap;

use crate::ansi::strip_ansi;
use crate::identity::{RunIdentity, RunIdentityCache};
use crate::types::{
    BrowserInfo, CanonicalMessage, EntityRef, GitInfo, MediaAttachment, SystemInfo, TestStatus,
    TestType,
};

/// Suite creation
#[derive(Debug, Clone, Default)]
pub struct SuiteStart {
    pub suite_id: String,
    pub title: String,
    pub file_name: Option<String>,
    pub test_count: Option<u32>,
    /// Falls back to the normalizer's detected system info
    pub system: Option<SystemInfo>,
    pub test_type: Option<TestType>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Test creation
#[derive(Debug, Clone, Default)]
pub struct TestStart {
    pub test_id: String,
    pub title: String,
    pub file_name: Option<String>,
    pub test_body: Option<String>,
    pub test_suite: EntityRef,
    pub browser: Option<BrowserInfo>,
}

/// Passed test
#[derive(Debug, Clone, Default)]
pub struct TestPass {
    pub test_id: String,
    pub title: String,
    pub duration: Option<u64>,
    pub test_suite: EntityRef,
    pub retries: Option<u32>,
}

/// Failed test
#[derive(Debug, Clone, Default)]
pub struct TestFail {
    pub test_id: String,
    pub title: String,
    pub error: String,
    pub stack: Option<String>,
    pub test_suite: EntityRef,
    pub duration: Option<u64>,
    pub retries: Option<u32>,
    pub media: Option<MediaAttachment>,
}

/// Test that did not execute (pending or skipped)
#[derive(Debug, Clone, Default)]
pub struct TestNotRun {
    pub test_id: String,
    pub title: String,
    pub file_name: Option<String>,
    pub test_suite: EntityRef,
}

/// Suite completion
#[derive(Debug, Clone, Default)]
pub struct SuiteEnd {
    pub suite_id: String,
    pub title: String,
    pub has_failed: bool,
}

/// Builds canonical messages for one reporter instance
#[derive(Debug)]
pub struct EventNormalizer {
    project_id: String,
    run_title: String,
    test_tool: Option<String>,
    git: Option<GitInfo>,
    system: SystemInfo,
    runs: RunIdentityCache,
}

impl EventNormalizer {
    /// Create a normalizer with its own run identity cache
    pub fn new(project_id: impl Into<String>, run_title: impl Into<String>) -> Self {
        Self::with_cache(project_id, run_title, RunIdentityCache::new())
    }

    /// Create a normalizer around an existing cache
    pub fn with_cache(
        project_id: impl Into<String>,
        run_title: impl Into<String>,
        cache: RunIdentityCache,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            run_title: run_title.into(),
            test_tool: None,
            git: None,
            system: SystemInfo::detect(),
            runs: cache,
        }
    }

    pub fn with_test_tool(mut self, tool: impl Into<String>) -> Self {
        self.test_tool = Some(tool.into());
        self
    }

    pub fn with_git(mut self, git: GitInfo) -> Self {
        self.git = Some(git);
        self
    }

    pub fn with_system(mut self, system: SystemInfo) -> Self {
        self.system = system;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn run_title(&self) -> &str {
        &self.run_title
    }

    /// Run identity for this normalizer's key, if a run has started
    pub fn current_run(&self) -> Option<&RunIdentity> {
        self.runs.get(&self.project_id, &self.run_title)
    }

    /// Give the cache back, e.g. to seed another normalizer
    pub fn into_cache(self) -> RunIdentityCache {
        self.runs
    }

    fn message(&self, title: impl Into<String>, status: TestStatus) -> CanonicalMessage {
        CanonicalMessage {
            test_tool: self.test_tool.clone(),
            test_run: self.current_run().map(RunIdentity::entity_ref),
            ..CanonicalMessage::new(self.project_id.clone(), title, status)
        }
    }

    /// Start (or re-announce) the run. Repeated calls reuse the same id.
    pub fn normalize_run_start(&mut self) -> CanonicalMessage {
        let run = self
            .runs
            .get_or_create(&self.project_id, &self.run_title)
            .clone();

        CanonicalMessage {
            rabbit_mq_id: Some(run.id),
            start_time: Some(Utc::now()),
            test_tool: self.test_tool.clone(),
            system: Some(self.system.clone()),
            git: self.git.clone(),
            ..CanonicalMessage::new(self.project_id.clone(), run.title, TestStatus::Running)
        }
    }

    pub fn normalize_suite_start(&self, input: SuiteStart) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.suite_id),
            start_time: Some(Utc::now()),
            file_name: input.file_name,
            test_case_count: input.test_count,
            test_type: input.test_type,
            metadata: input.metadata,
            system: Some(input.system.unwrap_or_else(|| self.system.clone())),
            git: self.git.clone(),
            ..self.message(input.title, TestStatus::Running)
        }
    }

    pub fn normalize_test_start(&self, input: TestStart) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.test_id),
            start_time: Some(Utc::now()),
            file_name: input.file_name,
            test_body: input.test_body,
            test_suite: Some(input.test_suite),
            browser: input.browser,
            ..self.message(input.title, TestStatus::Running)
        }
    }

    pub fn normalize_test_pass(&self, input: TestPass) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.test_id),
            end_time: Some(Utc::now()),
            duration: input.duration,
            retries: input.retries.map(|r| r.to_string()),
            test_suite: Some(input.test_suite),
            ..self.message(input.title, TestStatus::Passed)
        }
    }

    /// Failed test; error and stack are stored without ANSI escapes
    pub fn normalize_test_fail(&self, input: TestFail) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.test_id),
            end_time: Some(Utc::now()),
            duration: input.duration,
            error: Some(strip_ansi(&input.error)),
            stack: input.stack.as_deref().map(strip_ansi),
            retries: input.retries.map(|r| r.to_string()),
            test_suite: Some(input.test_suite),
            media: input.media,
            ..self.message(input.title, TestStatus::Failed)
        }
    }

    pub fn normalize_test_pending(&self, input: TestNotRun) -> CanonicalMessage {
        self.not_run(input, TestStatus::Pending)
    }

    pub fn normalize_test_skip(&self, input: TestNotRun) -> CanonicalMessage {
        self.not_run(input, TestStatus::Skipped)
    }

    fn not_run(&self, input: TestNotRun, status: TestStatus) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.test_id),
            end_time: Some(Utc::now()),
            file_name: input.file_name,
            test_suite: Some(input.test_suite),
            ..self.message(input.title, status)
        }
    }

    pub fn normalize_suite_end(&self, input: SuiteEnd) -> CanonicalMessage {
        CanonicalMessage {
            rabbit_mq_id: Some(input.suite_id),
            end_time: Some(Utc::now()),
            ..self.message(input.title, TestStatus::from_failed(input.has_failed))
        }
    }

    /// Finish the run. Without a prior run start the id and run reference
    /// are left empty rather than invented.
    pub fn normalize_run_end(&mut self, has_failed: bool) -> CanonicalMessage {
        let status = TestStatus::from_failed(has_failed);
        self.runs.set_status(&self.project_id, &self.run_title, status);

        let mut message = self.message(self.run_title.clone(), status);
        message.rabbit_mq_id = message.test_run.as_ref().map(|run| run.id.clone());
        message.end_time = Some(Utc::now());
        message
    }
}

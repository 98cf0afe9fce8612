use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core types for the Gitee PR review pipeline

/// Identifies the pull request whose diff is under review. Built once per
/// run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRequest {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

/// The four fixed agent roles. Syntax, Security and Performance carry
/// non-overlapping review mandates; Summary merges their outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewRole {
    Syntax,
    Security,
    Performance,
    Summary,
}

impl ReviewRole {
    /// The three concurrent reviewer roles, in the fixed order used to
    /// resolve multi-failure outcomes and label the summary input.
    pub const REVIEWERS: [ReviewRole; 3] =
        [ReviewRole::Syntax, ReviewRole::Security, ReviewRole::Performance];

    /// Agent name used in logs and live output.
    pub fn agent_name(&self) -> &'static str {
        match self {
            ReviewRole::Syntax => "SyntaxReviewer",
            ReviewRole::Security => "SecurityReviewer",
            ReviewRole::Performance => "PerformanceReviewer",
            ReviewRole::Summary => "ReportSummarizer",
        }
    }
}

impl fmt::Display for ReviewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

/// Issue severity taxonomy shared by all reviewer mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Highest to lowest, the order findings are grouped in.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        };
        f.write_str(name)
    }
}

/// One prompt pair bound to a role. Built from the diff text (or, for the
/// Summary role, from the three reviewer outputs) and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ReviewTask {
    pub role: ReviewRole,
    pub system_prompt: String,
    pub user_message: String,
}

/// A unit of incremental model output, ordered within one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental text fragment.
    TextDelta(String),
    /// The backend invoked an auxiliary capability; carries its name.
    ToolEvent(String),
}

/// Accumulated result of draining one agent's chunk stream.
#[derive(Debug, Clone)]
pub struct ReviewOutput {
    pub role: ReviewRole,
    pub full_text: String,
}

/// The merged Markdown report, produced once per run.
#[derive(Debug, Clone)]
pub struct FinalReport {
    pub markdown: String,
    pub generated_at: DateTime<Utc>,
}

/// Failure while fetching PR metadata or diff text from the forge.
/// Terminal for the run; the fetch is never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("forge request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forge returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("malformed PR metadata: {0}")]
    Metadata(String),
}

/// Failure from the chat backend, its stream, or its payloads. Terminal
/// for the stage that produced it.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("chat request failed: {0}")]
    Connect(#[from] reqwest::Error),
    #[error("chat backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("chat stream failed: {0}")]
    Stream(String),
    #[error("malformed stream payload: {0}")]
    Malformed(String),
}

/// Report could not be written. The report text is still printed to the
/// console before persistence is attempted.
#[derive(Debug, Error)]
#[error("failed to write report to {}: {source}", .path.display())]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Stage-tagged run failure. Reachable from every non-terminal stage of
/// the pipeline; carries enough context to diagnose without re-running.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("review stage failed in {role}: {source}")]
    Review {
        role: ReviewRole,
        source: BackendError,
    },
    #[error("summarize stage failed: {0}")]
    Summarize(BackendError),
    #[error("{stage} stage timed out after {after:?}")]
    Timeout {
        stage: &'static str,
        after: Duration,
    },
    #[error("run cancelled during {stage} stage")]
    Cancelled { stage: &'static str },
}

impl PipelineError {
    /// Name of the stage the run failed in.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Review { .. } => "review",
            PipelineError::Summarize(_) => "summarize",
            PipelineError::Timeout { stage, .. } | PipelineError::Cancelled { stage } => stage,
        }
    }
}

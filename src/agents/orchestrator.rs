use crate::agents::collector::LiveSink;
use crate::agents::reviewer::ReviewAgent;
use crate::forge::DiffSource;
use crate::llm::{ChatBackend, ReviewPrompts};
use crate::types::{DiffRequest, FinalReport, PipelineError, ReviewOutput, ReviewRole, ReviewTask};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

/// Tunables for one review run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on each pipeline stage; an overrun fails the stage.
    pub stage_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(300),
        }
    }
}

/// Drives one review run through Fetching, Reviewing, Summarizing and
/// Done. Each stage attempts exactly once; any failure, timeout or
/// cancellation aborts the run with a stage-tagged error.
pub struct ReviewOrchestrator {
    diff_source: Arc<dyn DiffSource>,
    agent: ReviewAgent,
    sink: Arc<dyn LiveSink>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl ReviewOrchestrator {
    pub fn new(
        diff_source: Arc<dyn DiffSource>,
        backend: Arc<dyn ChatBackend>,
        sink: Arc<dyn LiveSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            diff_source,
            agent: ReviewAgent::new(backend),
            sink,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the whole run when cancelled. Cancellation tears
    /// down every in-flight request; an interrupted run never resumes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The full pipeline: fetch the diff, run the three reviewers
    /// concurrently, merge their outputs with the summarizer.
    #[instrument(skip(self, request), fields(owner = %request.owner, repo = %request.repo, pr = request.pr_number))]
    pub async fn run(&self, request: &DiffRequest) -> Result<FinalReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = std::time::Instant::now();
        info!(%run_id, "Starting review pipeline");

        let diff = self.fetch_stage(request).await?;
        info!(bytes = diff.len(), "Diff fetched");

        let reviews = self.review_stage(&diff).await?;
        info!("All reviewers finished");

        let summary = self.summarize_stage(&reviews).await?;
        info!(elapsed = ?started.elapsed(), "Review pipeline finished");

        Ok(FinalReport {
            markdown: summary.full_text,
            generated_at: Utc::now(),
        })
    }

    async fn fetch_stage(&self, request: &DiffRequest) -> Result<String, PipelineError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled { stage: "fetch" }),
            fetched = timeout(self.config.stage_timeout, self.diff_source.fetch(request)) => {
                match fetched {
                    Ok(result) => result.map_err(PipelineError::Fetch),
                    Err(_) => Err(PipelineError::Timeout {
                        stage: "fetch",
                        after: self.config.stage_timeout,
                    }),
                }
            }
        }
    }

    async fn review_stage(&self, diff: &str) -> Result<[ReviewOutput; 3], PipelineError> {
        let syntax_task = ReviewPrompts::syntax(diff);
        let security_task = ReviewPrompts::security(diff);
        let performance_task = ReviewPrompts::performance(diff);

        // Join barrier: every reviewer runs to completion before the stage
        // outcome is decided, so a failing reviewer never orphans the
        // other two mid-request.
        let barrier = async {
            tokio::join!(
                self.run_reviewer(syntax_task),
                self.run_reviewer(security_task),
                self.run_reviewer(performance_task),
            )
        };

        let (syntax, security, performance) = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(PipelineError::Cancelled { stage: "review" });
            }
            joined = timeout(self.config.stage_timeout, barrier) => match joined {
                Ok(results) => results,
                Err(_) => {
                    return Err(PipelineError::Timeout {
                        stage: "review",
                        after: self.config.stage_timeout,
                    });
                }
            },
        };

        // The first failure in reviewer order decides the outcome; any
        // surviving outputs are discarded with it.
        Ok([syntax?, security?, performance?])
    }

    async fn run_reviewer(&self, task: ReviewTask) -> Result<ReviewOutput, PipelineError> {
        let role: ReviewRole = task.role;
        let output = self
            .agent
            .run(&task, self.sink.as_ref())
            .await
            .map_err(|source| PipelineError::Review { role, source })?;

        info!(%role, chars = output.full_text.len(), "Reviewer finished");
        Ok(output)
    }

    async fn summarize_stage(
        &self,
        reviews: &[ReviewOutput; 3],
    ) -> Result<ReviewOutput, PipelineError> {
        let task = ReviewPrompts::summary(reviews);
        let summarize = self.agent.run(&task, self.sink.as_ref());

        tokio::select! {
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled { stage: "summarize" }),
            done = timeout(self.config.stage_timeout, summarize) => match done {
                Ok(result) => result.map_err(PipelineError::Summarize),
                Err(_) => Err(PipelineError::Timeout {
                    stage: "summarize",
                    after: self.config.stage_timeout,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::collector::NullSink;
    use crate::llm::ChunkStream;
    use crate::types::{BackendError, FetchError, StreamChunk};
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Behavior {
        Chunks(Vec<&'static str>),
        DelayedChunks(Duration, Vec<&'static str>),
        FailMidStream,
        Hang,
    }

    /// Backend scripted per role; records every call for assertions.
    struct ScriptedBackend {
        behaviors: HashMap<ReviewRole, Behavior>,
        calls: Mutex<Vec<ReviewRole>>,
        summary_inputs: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(behaviors: impl IntoIterator<Item = (ReviewRole, Behavior)>) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
                summary_inputs: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ReviewRole> {
            self.calls.lock().unwrap().clone()
        }

        fn summary_inputs(&self) -> Vec<String> {
            self.summary_inputs.lock().unwrap().clone()
        }
    }

    fn text_chunks(chunks: Vec<&'static str>) -> Vec<Result<StreamChunk, BackendError>> {
        chunks
            .into_iter()
            .map(|chunk| Ok(StreamChunk::TextDelta(chunk.to_string())))
            .collect()
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(&self, task: &ReviewTask) -> Result<ChunkStream, BackendError> {
            self.calls.lock().unwrap().push(task.role);
            if task.role == ReviewRole::Summary {
                self.summary_inputs
                    .lock()
                    .unwrap()
                    .push(task.user_message.clone());
            }

            let behavior = self
                .behaviors
                .get(&task.role)
                .cloned()
                .unwrap_or(Behavior::Chunks(vec!["ok"]));

            match behavior {
                Behavior::Chunks(chunks) => Ok(stream::iter(text_chunks(chunks)).boxed()),
                Behavior::DelayedChunks(delay, chunks) => Ok(stream::once(async move {
                    tokio::time::sleep(delay).await;
                    stream::iter(text_chunks(chunks))
                })
                .flatten()
                .boxed()),
                Behavior::FailMidStream => Ok(stream::iter(vec![
                    Ok(StreamChunk::TextDelta("partial".to_string())),
                    Err(BackendError::Stream("mid-stream disconnect".to_string())),
                ])
                .boxed()),
                Behavior::Hang => {
                    Ok(stream::once(futures::future::pending::<Result<StreamChunk, BackendError>>())
                        .boxed())
                }
            }
        }

        async fn health_check(&self) -> Result<bool, BackendError> {
            Ok(true)
        }
    }

    struct StaticDiffSource(String);

    #[async_trait]
    impl DiffSource for StaticDiffSource {
        async fn fetch(&self, _request: &DiffRequest) -> Result<String, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDiffSource;

    #[async_trait]
    impl DiffSource for FailingDiffSource {
        async fn fetch(&self, _request: &DiffRequest) -> Result<String, FetchError> {
            Err(FetchError::Metadata("metadata unavailable".to_string()))
        }
    }

    struct PendingDiffSource;

    #[async_trait]
    impl DiffSource for PendingDiffSource {
        async fn fetch(&self, _request: &DiffRequest) -> Result<String, FetchError> {
            futures::future::pending().await
        }
    }

    fn orchestrator(
        diff_source: Arc<dyn DiffSource>,
        backend: Arc<ScriptedBackend>,
        config: OrchestratorConfig,
    ) -> ReviewOrchestrator {
        ReviewOrchestrator::new(diff_source, backend, Arc::new(NullSink), config)
    }

    fn request() -> DiffRequest {
        DiffRequest {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            pr_number: 1,
        }
    }

    #[tokio::test]
    async fn summary_receives_all_three_labeled_reviews() {
        let backend = ScriptedBackend::new([
            (ReviewRole::Syntax, Behavior::Chunks(vec!["syntax ", "notes"])),
            (ReviewRole::Security, Behavior::Chunks(vec!["security notes"])),
            (ReviewRole::Performance, Behavior::Chunks(vec!["performance notes"])),
            (ReviewRole::Summary, Behavior::Chunks(vec!["final report"])),
        ]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource("+diff line".to_string())),
            backend.clone(),
            OrchestratorConfig::default(),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.markdown, "final report");

        let summary_inputs = backend.summary_inputs();
        assert_eq!(summary_inputs.len(), 1);
        let input = &summary_inputs[0];
        assert!(input.contains("1. Syntax and style review comments:\nsyntax notes"));
        assert!(input.contains("2. Logic and security review comments:\nsecurity notes"));
        assert!(input.contains("3. Performance review comments:\nperformance notes"));

        let calls = backend.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3], ReviewRole::Summary);
    }

    #[tokio::test]
    async fn fetch_error_aborts_before_any_backend_call() {
        let backend = ScriptedBackend::new([]);
        let orchestrator = orchestrator(
            Arc::new(FailingDiffSource),
            backend.clone(),
            OrchestratorConfig::default(),
        );

        let err = orchestrator.run(&request()).await.unwrap_err();

        assert_eq!(err.stage(), "fetch");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn one_failing_reviewer_fails_the_run_without_summarizing() {
        let backend = ScriptedBackend::new([
            (ReviewRole::Security, Behavior::FailMidStream),
        ]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource("+diff".to_string())),
            backend.clone(),
            OrchestratorConfig::default(),
        );

        let err = orchestrator.run(&request()).await.unwrap_err();

        assert_eq!(err.stage(), "review");
        assert!(matches!(
            err,
            PipelineError::Review {
                role: ReviewRole::Security,
                ..
            }
        ));

        // All three reviewers were started; the summarizer never was.
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls.contains(&ReviewRole::Summary));
    }

    #[tokio::test]
    async fn multi_failure_outcome_follows_reviewer_order() {
        let backend = ScriptedBackend::new([
            (ReviewRole::Syntax, Behavior::FailMidStream),
            (ReviewRole::Performance, Behavior::FailMidStream),
        ]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource("+diff".to_string())),
            backend,
            OrchestratorConfig::default(),
        );

        let err = orchestrator.run(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Review {
                role: ReviewRole::Syntax,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reviewers_run_concurrently_not_sequentially() {
        let backend = ScriptedBackend::new([
            (
                ReviewRole::Syntax,
                Behavior::DelayedChunks(Duration::from_millis(100), vec!["s"]),
            ),
            (
                ReviewRole::Security,
                Behavior::DelayedChunks(Duration::from_millis(300), vec!["s"]),
            ),
            (
                ReviewRole::Performance,
                Behavior::DelayedChunks(Duration::from_millis(200), vec!["s"]),
            ),
            (ReviewRole::Summary, Behavior::Chunks(vec!["report"])),
        ]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource("+diff".to_string())),
            backend,
            OrchestratorConfig::default(),
        );

        let started = tokio::time::Instant::now();
        orchestrator.run(&request()).await.unwrap();
        let elapsed = started.elapsed();

        // Wall time tracks the slowest reviewer, not the sum of all three.
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(550), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn empty_diff_still_runs_the_full_pipeline() {
        let backend = ScriptedBackend::new([
            (ReviewRole::Summary, Behavior::Chunks(vec!["nothing to report"])),
        ]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource(String::new())),
            backend.clone(),
            OrchestratorConfig::default(),
        );

        let report = orchestrator.run(&request()).await.unwrap();

        assert_eq!(report.markdown, "nothing to report");
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_run() {
        let backend = ScriptedBackend::new([]);
        let orchestrator = orchestrator(
            Arc::new(PendingDiffSource),
            backend,
            OrchestratorConfig::default(),
        );

        orchestrator.cancellation_token().cancel();
        let err = orchestrator.run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { stage: "fetch" }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_in_flight_reviewers() {
        let backend = ScriptedBackend::new([(ReviewRole::Security, Behavior::Hang)]);
        let orchestrator = orchestrator(
            Arc::new(StaticDiffSource("+diff".to_string())),
            backend,
            OrchestratorConfig::default(),
        );

        let cancel = orchestrator.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = orchestrator.run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { stage: "review" }));
    }

    #[tokio::test(start_paused = true)]
    async fn stage_timeout_fails_the_stage() {
        let backend = ScriptedBackend::new([]);
        let orchestrator = orchestrator(
            Arc::new(PendingDiffSource),
            backend,
            OrchestratorConfig {
                stage_timeout: Duration::from_secs(1),
            },
        );

        let err = orchestrator.run(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Timeout { stage: "fetch", .. }
        ));
    }
}

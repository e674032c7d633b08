//! Pipeline orchestrator: graphs in, validated code out.
//!
//! Each `TranslationTarget` becomes one job running on its own tokio task.
//! Jobs share the generation client and validator (both stateless per
//! request) and nothing else; a semaphore bounds how many run at once.

pub mod job;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::error::{Diagnostic, DiagnosticKind, ErrorKind, PipelineError, Severity};
use crate::generate::{
    CancelToken, GenerationBackend, GenerationClient, GenerationOptions, GenerationRequest,
    HttpBackend, ModelParameters, load_reference_files,
};
use crate::ir::types::{IrDocument, TargetLanguage};
use crate::lower::{assemble, attach_callees};
use crate::parse::GraphRef;
use crate::serialize::serialize_graph;
use crate::validate::{ResponseValidator, ValidationResult};
use crate::walk::walk;
pub use job::{FailurePoint, IllegalTransition, JobState, PipelineJob};

// =============================================================================
// INPUTS / OUTPUTS
// =============================================================================

/// One graph to translate.
#[derive(Clone)]
pub struct TranslationTarget {
    pub label: String,
    pub graph: Arc<dyn GraphRef>,
    /// Entry node ids. Empty means the graph's own entry nodes.
    pub entries: Vec<String>,
    /// Overrides the configured target language.
    pub target_language: Option<TargetLanguage>,
}

impl TranslationTarget {
    pub fn new(graph: Arc<dyn GraphRef>) -> Self {
        TranslationTarget {
            label: graph.name().to_string(),
            graph,
            entries: Vec::new(),
            target_language: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_language(mut self, language: TargetLanguage) -> Self {
        self.target_language = Some(language);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: usize,
    pub state: JobState,
}

/// Terminal view of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: usize,
    pub label: String,
    pub state: JobState,
    pub failure: Option<PipelineError>,
    pub document: Option<IrDocument>,
    /// Kept for rejected responses too.
    pub result: Option<ValidationResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub attempts: u32,
    /// Generation wall time across all attempts.
    pub elapsed: Option<Duration>,
}

impl JobReport {
    fn new(job_id: usize, label: String) -> Self {
        JobReport {
            job_id,
            label,
            state: JobState::Pending,
            failure: None,
            document: None,
            result: None,
            diagnostics: Vec::new(),
            attempts: 0,
            elapsed: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Ordered by job id, which is submission order.
    pub jobs: Vec<JobReport>,
}

impl BatchResult {
    pub fn job(&self, job_id: usize) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn completed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.state == JobState::Failed)
    }
}

// =============================================================================
// BATCH HANDLE
// =============================================================================

/// Live batch: cancel jobs, watch progress, then collect the result.
pub struct BatchHandle {
    labels: Vec<String>,
    tokens: Vec<CancelToken>,
    tasks: Vec<JoinHandle<JobReport>>,
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl BatchHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns false for an unknown job id.
    pub fn cancel(&self, job_id: usize) -> bool {
        match self.tokens.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for token in &self.tokens {
            token.cancel();
        }
    }

    /// Next progress notification; `None` once every job has finished and
    /// the stream is drained.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    pub fn progress(&mut self) -> &mut mpsc::UnboundedReceiver<ProgressEvent> {
        &mut self.progress
    }

    /// Wait for every job to reach a terminal state.
    pub async fn wait(self) -> BatchResult {
        let mut jobs = Vec::with_capacity(self.tasks.len());
        for (job_id, (task, label)) in self.tasks.into_iter().zip(self.labels).enumerate() {
            match task.await {
                Ok(report) => jobs.push(report),
                Err(e) => {
                    let reason = if e.is_panic() { "panicked" } else { "was aborted" };
                    error!(job_id, error = %e, "job task {}", reason);
                    let mut report = JobReport::new(job_id, label);
                    report.state = JobState::Failed;
                    report.failure = Some(PipelineError::internal(format!(
                        "Job task {}",
                        reason
                    )));
                    jobs.push(report);
                }
            }
        }
        BatchResult { jobs }
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

struct Shared {
    client: GenerationClient,
    validator: ResponseValidator,
    options: GenerationOptions,
    translation_depth: u32,
    semaphore: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Orchestrator over a caller-supplied backend. Backend settings in
    /// `config` are ignored except for the request timeout.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate_limits()?;
        let client = GenerationClient::new(
            backend,
            config.retry.clone(),
            config.backend.request_timeout(),
        );
        let options = GenerationOptions {
            target_language: config.target_language,
            style: config.style.clone(),
            model: ModelParameters::default(),
            reference_files: load_reference_files(&config.reference_source_files),
        };
        Ok(Orchestrator {
            shared: Arc::new(Shared {
                client,
                validator: ResponseValidator::new(config.repair.clone()),
                options,
                translation_depth: config.translation_depth,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            }),
        })
    }

    /// Orchestrator talking HTTP to the configured provider.
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let backend = HttpBackend::new(config.backend.clone())?;
        Orchestrator::new(config, Arc::new(backend))
    }

    /// Start one job per target. Must be called within a Tokio runtime.
    pub fn submit(&self, targets: Vec<TranslationTarget>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut labels = Vec::with_capacity(targets.len());
        let mut tokens = Vec::with_capacity(targets.len());
        let mut tasks = Vec::with_capacity(targets.len());

        info!(jobs = targets.len(), "submitting batch");
        for (job_id, target) in targets.into_iter().enumerate() {
            let token = CancelToken::new();
            labels.push(target.label.clone());
            tokens.push(token.clone());
            let shared = Arc::clone(&self.shared);
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                run_job(shared, job_id, target, token, tx).await
            }));
        }

        BatchHandle {
            labels,
            tokens,
            tasks,
            progress: rx,
        }
    }
}

// -----------------------------------------------------------------------------
// Job runner
// -----------------------------------------------------------------------------

struct Runner {
    job: PipelineJob,
    report: JobReport,
    progress: mpsc::UnboundedSender<ProgressEvent>,
}

impl Runner {
    fn advance(&mut self, next: JobState) {
        match self.job.advance(next) {
            Ok(state) => self.enter(state),
            Err(e) => error!(job_id = self.job.id, error = %e, "job state machine refused transition"),
        }
    }

    fn fail(mut self, failure: PipelineError) -> JobReport {
        warn!(
            job_id = self.job.id,
            label = %self.job.label,
            state = %self.job.state(),
            error = %failure,
            "job failed"
        );
        match self.job.fail(failure.stage, failure.kind) {
            Ok(state) => self.enter(state),
            Err(e) => error!(job_id = self.job.id, error = %e, "job state machine refused transition"),
        }
        self.report.failure = Some(failure);
        self.report
    }

    fn enter(&mut self, state: JobState) {
        self.report.state = state;
        // A dropped receiver only means nobody is watching.
        let _ = self.progress.send(ProgressEvent {
            job_id: self.job.id,
            state,
        });
    }

    fn cancelled(self) -> JobReport {
        let stage = self.job.state().stage();
        self.fail(PipelineError::cancelled(stage))
    }
}

async fn run_job(
    shared: Arc<Shared>,
    job_id: usize,
    target: TranslationTarget,
    cancel: CancelToken,
    progress: mpsc::UnboundedSender<ProgressEvent>,
) -> JobReport {
    let mut runner = Runner {
        job: PipelineJob::new(job_id, target.label.clone()),
        report: JobReport::new(job_id, target.label.clone()),
        progress,
    };
    runner.enter(JobState::Pending);

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return runner.cancelled(),
        permit = Arc::clone(&shared.semaphore).acquire_owned() => permit,
    };
    let _permit = match permit {
        Ok(permit) => permit,
        Err(_) => return runner.cancelled(),
    };

    let graph = target.graph.as_ref();
    let language = target
        .target_language
        .unwrap_or(shared.options.target_language);

    // Walking
    runner.advance(JobState::Walking);
    let walked = match walk(graph, &target.entries) {
        Ok(walked) => walked,
        Err(e) => return runner.fail(e.into()),
    };
    runner.report.diagnostics.extend(walked.diagnostics.iter().cloned());
    info!(
        job_id,
        graph = graph.name(),
        nodes = walked.order.len(),
        back_edges = walked.back_edges.len(),
        "graph walked"
    );
    if cancel.is_cancelled() {
        return runner.cancelled();
    }

    // Serializing + assembling
    let serialized = serialize_graph(graph, &walked);
    let mut document = match assemble(graph, &walked, serialized, language) {
        Ok(document) => document,
        Err(e) => return runner.fail(e),
    };
    let callee_diagnostics = attach_callees(&mut document, graph, shared.translation_depth);
    runner.report.diagnostics.extend(callee_diagnostics);
    runner.report.document = Some(document.clone());
    runner.advance(JobState::Serialized);
    if cancel.is_cancelled() {
        return runner.cancelled();
    }

    // Generating
    runner.advance(JobState::AwaitingGeneration);
    let options = GenerationOptions {
        target_language: language,
        ..shared.options.clone()
    };
    let request = GenerationRequest::new(document, options);
    let response = match shared.client.send(&request, &cancel).await {
        Ok(response) => response,
        Err(e) => return runner.fail(e.into()),
    };
    runner.report.attempts = response.attempts;
    runner.report.elapsed = Some(response.elapsed);
    if cancel.is_cancelled() {
        return runner.cancelled();
    }

    // Validating
    runner.advance(JobState::Validating);
    let result = shared.validator.validate(&response.raw_text, &request.document);
    runner.report.diagnostics.extend(result.diagnostics.iter().cloned());
    if response.attempts > 1 {
        runner.report.diagnostics.push(Diagnostic::new(
            DiagnosticKind::RetryCount,
            Severity::Info,
            format!("Generation succeeded after {} attempts", response.attempts),
        ));
    }

    if result.is_rejected() {
        let reason = result
            .rejection_reason()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| "Generated code was rejected".to_string());
        runner.report.result = Some(result);
        return runner.fail(PipelineError::rejected(reason));
    }

    info!(
        job_id,
        graph = graph.name(),
        outcome = ?result.outcome,
        diagnostics = runner.report.diagnostics.len(),
        "job completed"
    );
    runner.report.result = Some(result);
    runner.advance(JobState::Completed);
    runner.report
}

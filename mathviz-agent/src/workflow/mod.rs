//! # Workflow Orchestrator
//!
//! Drives one problem through the agent graph:
//!
//! ```text
//! classify ─┬─> solve_simple ──────────┐
//!           └─> understand ─> solve ───┴─> validate ─┬─> visualize ─> execute ─┬─> END
//!                              ^                      │                  ^      ├─> debug ─┐
//!                              └──── invalid, budget ─┘                  └──────┼──────────┘
//!                                                                               └─> fallback ─> END
//! ```
//!
//! The loop owns the [`WorkflowState`]; steps return deltas and the routing
//! table picks the next node. A failed step is replaced by its safe default so
//! a run always ends in `success`, `fallback` or `failed`.

pub mod classifier;
mod nodes;
pub mod routing;

pub use classifier::{classify_problem, ErrorClassifier, HeuristicClassifier};
pub use routing::DebugStrategy;

use crate::cancel::CancelToken;
use crate::domain::{Analysis, GradeLevel, Solution};
use crate::executor::RendererExecutor;
use crate::llm::LlmService;
use crate::skills::{SkillCatalog, SkillRepository};
use crate::state::{Status, WorkflowState};
use futures_util::FutureExt;
use mathviz_error::{Error, ErrorKind, Result};
use mathviz_scene::quality::REVIEW_THRESHOLD;
use mathviz_scene::DEFAULT_FONT;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Classify,
    SolveSimple,
    Understand,
    Solve,
    Validate,
    Visualize,
    Execute,
    Debug,
    Fallback,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Classify => "classify",
            Node::SolveSimple => "solve_simple",
            Node::Understand => "understand",
            Node::Solve => "solve",
            Node::Validate => "validate",
            Node::Visualize => "visualize",
            Node::Execute => "execute",
            Node::Debug => "debug",
            Node::Fallback => "fallback",
            Node::End => "end",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub max_solve_attempts: u32,
    pub max_debug_attempts: u32,
    /// Structure-error patches tried before regenerating from scratch
    pub regenerate_structure_after: u32,
    pub enable_understanding: bool,
    pub enable_review: bool,
    /// Programs scoring below this are sent for review
    pub review_threshold: f64,
    /// Hard cap on node transitions per run
    pub max_transitions: usize,
    pub font: String,
    /// Class name of planned fallback scenes
    pub scene_class: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_solve_attempts: 2,
            max_debug_attempts: 3,
            regenerate_structure_after: 1,
            enable_understanding: true,
            enable_review: false,
            review_threshold: REVIEW_THRESHOLD,
            max_transitions: 64,
            font: DEFAULT_FONT.to_string(),
            scene_class: "MathVisualization".to_string(),
        }
    }
}

/// One visited node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub step: usize,
    pub node: Node,
    pub summary: String,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>2}. {:<12} {}", self.step, self.node, self.summary)
    }
}

/// What a caller receives for one problem
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub status: Status,
    pub problem_text: String,
    pub grade_level: GradeLevel,
    pub analysis: Option<Analysis>,
    pub solution: Solution,
    pub code: String,
    pub video_path: Option<PathBuf>,
    pub error: Option<String>,
    pub fallback_content: Option<String>,
    pub quality_score: Option<f64>,
    pub skill_used: Option<String>,
    pub solve_attempts: u32,
    pub debug_attempts: u32,
    pub trace: Vec<TraceEntry>,
}

impl WorkflowResult {
    fn from_state(state: WorkflowState, trace: Vec<TraceEntry>) -> Self {
        let error = match state.status {
            Status::Success => None,
            _ => state.error_message,
        };
        Self {
            status: state.status,
            problem_text: state.problem_text,
            grade_level: state.grade_level,
            analysis: state.analysis,
            solution: state.solution,
            code: state.manim_code,
            video_path: state.video_path,
            error,
            fallback_content: state.fallback_content,
            quality_score: state.quality_score,
            skill_used: state.skill_used,
            solve_attempts: state.solve_attempts,
            debug_attempts: state.debug_attempts,
            trace,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Runs problems through the agent graph.
///
/// Collaborators are shared read-only, so one orchestrator serves any number
/// of concurrent runs.
pub struct Orchestrator<L, E, S = SkillCatalog> {
    llm: Arc<L>,
    executor: Arc<E>,
    skills: Option<Arc<S>>,
    classifier: Arc<dyn ErrorClassifier>,
    config: WorkflowConfig,
}

impl<L, E> Orchestrator<L, E, SkillCatalog> {
    pub fn new(llm: Arc<L>, executor: Arc<E>) -> Self {
        Self {
            llm,
            executor,
            skills: None,
            classifier: Arc::new(HeuristicClassifier),
            config: WorkflowConfig::default(),
        }
    }
}

impl<L, E, S> Orchestrator<L, E, S> {
    pub fn with_skills<T>(self, skills: Arc<T>) -> Orchestrator<L, E, T> {
        Orchestrator {
            llm: self.llm,
            executor: self.executor,
            skills: Some(skills),
            classifier: self.classifier,
            config: self.config,
        }
    }

    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }
}

impl<L, E, S> Orchestrator<L, E, S>
where
    L: LlmService,
    E: RendererExecutor,
    S: SkillRepository,
{
    pub async fn run(&self, problem: &str, grade: GradeLevel) -> WorkflowResult {
        self.run_with_cancel(problem, grade, &CancelToken::new()).await
    }

    #[instrument(skip_all, fields(grade = %grade))]
    pub async fn run_with_cancel(&self, problem: &str, grade: GradeLevel, cancel: &CancelToken) -> WorkflowResult {
        let mut state = WorkflowState::new(problem, grade);
        let mut trace = Vec::new();

        let outcome = AssertUnwindSafe(self.drive(&mut state, &mut trace, cancel))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Some(Error::unexpected(format!("workflow panicked: {}", message)).with_operation("workflow::run"))
            }
        };

        if let Some(err) = failure {
            error!(error = %err, "workflow failed");
            state.status = Status::Failed;
            state.error_message = Some(err.message().to_string());
        }

        info!(status = %state.status, transitions = trace.len(), "workflow finished");
        WorkflowResult::from_state(state, trace)
    }

    async fn drive(&self, state: &mut WorkflowState, trace: &mut Vec<TraceEntry>, cancel: &CancelToken) -> Result<()> {
        let mut node = Node::Classify;

        while node != Node::End {
            if cancel.is_cancelled() {
                return Err(Error::cancelled().with_operation("workflow::drive"));
            }
            if trace.len() >= self.config.max_transitions {
                return Err(Error::step_budget_exceeded(self.config.max_transitions));
            }

            let update = match self.step(node, state, cancel).await {
                Ok(update) => update,
                Err(err) if err.kind() == ErrorKind::Cancelled => {
                    return Err(err.with_operation("workflow::drive"));
                }
                Err(err) => {
                    warn!(%node, error = %err, "step failed, using safe default");
                    self.recover(node, state, &err)
                }
            };
            state.apply(update);

            trace.push(TraceEntry {
                step: trace.len() + 1,
                node,
                summary: summarize(node, state),
            });
            node = routing::next(node, state, &self.config);
        }

        if state.status == Status::Pending {
            state.status = Status::Failed;
        }
        Ok(())
    }
}

fn summarize(node: Node, state: &WorkflowState) -> String {
    match node {
        Node::Classify => state.classification.unwrap_or_default().to_string(),
        Node::Understand => match &state.analysis {
            Some(a) => format!("{} knowledge points", a.knowledge_points.len()),
            None => "no analysis".to_string(),
        },
        Node::SolveSimple | Node::Solve => format!(
            "attempt {}: {} steps",
            state.solve_attempts,
            state.solution.steps.len()
        ),
        Node::Validate if state.is_valid => "valid".to_string(),
        Node::Validate => format!("invalid: {}", state.validation_errors.join("; ")),
        Node::Visualize => format!(
            "{} lines, score {:.0}",
            state.manim_code.lines().count(),
            state.quality_score.unwrap_or(0.0)
        ),
        Node::Execute => match (&state.video_path, &state.error_message) {
            (Some(path), _) => format!("rendered {}", path.display()),
            (None, Some(msg)) => format!("{} error: {}", state.error_type, first_line(msg)),
            (None, None) => "failed".to_string(),
        },
        Node::Debug => format!("attempt {}", state.debug_attempts),
        Node::Fallback => "text fallback".to_string(),
        Node::End => String::new(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Analysis, Classification, Difficulty, ProblemType, SolutionStep, Validation};
    use crate::executor::RenderOutcome;
    use crate::llm::{CodeRequest, SolveRequest};
    use crate::skills::Skill;
    use crate::state::ErrorType;
    use mathviz_scene::QualityMetrics;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const GOOD_CODE: &str = "from manim import *\n\nclass Demo(Scene):\n    def construct(self):\n        t = Text(\"8\", font=\"Noto Sans CJK SC\")\n        t.move_to(ORIGIN)\n        self.play(Write(t))\n";

    #[derive(Default)]
    struct Calls {
        classify: AtomicUsize,
        analyze: AtomicUsize,
        solve: AtomicUsize,
        validate: AtomicUsize,
        generate: AtomicUsize,
        debug: AtomicUsize,
        review: AtomicUsize,
    }

    fn count(c: &AtomicUsize) -> usize {
        c.load(Ordering::SeqCst)
    }

    struct MockLlm {
        calls: Calls,
        fail_all: bool,
        solution_valid: bool,
        code: String,
        classification: Classification,
        review_font: Mutex<Option<String>>,
    }

    impl MockLlm {
        fn new() -> Self {
            Self {
                calls: Calls::default(),
                fail_all: false,
                solution_valid: true,
                code: GOOD_CODE.to_string(),
                classification: Classification::new(ProblemType::Word, Difficulty::Medium),
                review_font: Mutex::new(None),
            }
        }

        fn check(&self, counter: &AtomicUsize) -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            if self.fail_all {
                Err(Error::inference_failed("model offline"))
            } else {
                Ok(())
            }
        }
    }

    impl LlmService for MockLlm {
        async fn classify(&self, _problem: &str) -> Result<Classification> {
            self.check(&self.calls.classify)?;
            Ok(self.classification)
        }

        async fn analyze(&self, _problem: &str, _grade: GradeLevel) -> Result<Analysis> {
            self.check(&self.calls.analyze)?;
            Ok(Analysis {
                knowledge_points: vec!["addition".into()],
                ..Analysis::default()
            })
        }

        async fn solve(&self, _request: SolveRequest<'_>) -> Result<Solution> {
            self.check(&self.calls.solve)?;
            Ok(Solution {
                steps: vec![SolutionStep {
                    step_number: 1,
                    description: "add".into(),
                    operation: "3 + 5".into(),
                    result: "8".into(),
                }],
                answer: "8".into(),
                ..Solution::default()
            })
        }

        async fn validate(&self, _problem: &str, _solution: &Solution) -> Result<Validation> {
            self.check(&self.calls.validate)?;
            Ok(if self.solution_valid {
                Validation::valid()
            } else {
                Validation::invalid("wrong total")
            })
        }

        async fn generate_code(&self, _request: CodeRequest<'_>) -> Result<String> {
            self.check(&self.calls.generate)?;
            Ok(self.code.clone())
        }

        async fn debug(&self, code: &str, _error: &str, _error_type: ErrorType) -> Result<String> {
            self.check(&self.calls.debug)?;
            Ok(format!("{}\n# patched", code))
        }

        async fn review(&self, _code: &str, _metrics: &QualityMetrics, font: &str) -> Result<String> {
            self.check(&self.calls.review)?;
            *self.review_font.lock().unwrap() = Some(font.to_string());
            Ok(GOOD_CODE.to_string())
        }
    }

    struct MockExecutor {
        outcomes: Mutex<VecDeque<RenderOutcome>>,
        default: RenderOutcome,
        calls: AtomicUsize,
        delay: Option<Duration>,
        sources: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn always(outcome: RenderOutcome) -> Self {
            Self::scripted(Vec::new(), outcome)
        }

        fn scripted(outcomes: Vec<RenderOutcome>, default: RenderOutcome) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                default,
                calls: AtomicUsize::new(0),
                delay: None,
                sources: Mutex::new(Vec::new()),
            }
        }
    }

    impl RendererExecutor for MockExecutor {
        async fn execute(&self, source: &str) -> RenderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sources.lock().unwrap().push(source.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default.clone())
        }
    }

    struct PanickingExecutor;

    impl RendererExecutor for PanickingExecutor {
        async fn execute(&self, _source: &str) -> RenderOutcome {
            panic!("renderer exploded")
        }
    }

    fn rendered() -> RenderOutcome {
        RenderOutcome::Rendered {
            video_path: PathBuf::from("/media/Demo.mp4"),
        }
    }

    fn runtime_failure() -> RenderOutcome {
        RenderOutcome::failed("Execution error: NameError: name 'Circl' is not defined")
    }

    fn nodes(result: &WorkflowResult) -> Vec<Node> {
        result.trace.iter().map(|t| t.node).collect()
    }

    #[tokio::test]
    async fn test_simple_problem_happy_path() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::always(rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::ElementaryLower).await;

        assert_eq!(result.status, Status::Success);
        assert!(result.is_success());
        assert_eq!(result.video_path, Some(PathBuf::from("/media/Demo.mp4")));
        assert!(result.error.is_none());
        assert_eq!(
            nodes(&result),
            vec![Node::Classify, Node::SolveSimple, Node::Validate, Node::Visualize, Node::Execute]
        );
        assert_eq!(count(&llm.calls.classify), 0);
        assert_eq!(result.solve_attempts, 1);
        assert_eq!(result.trace[0].summary, "simple/easy");
    }

    #[tokio::test]
    async fn test_complex_problem_goes_through_understanding() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::always(rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec);

        let result = orchestrator
            .run("Tom has 3 apples and buys 5 more. How many now?", GradeLevel::default())
            .await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(count(&llm.calls.classify), 1);
        assert_eq!(count(&llm.calls.analyze), 1);
        assert_eq!(
            nodes(&result)[..4],
            [Node::Classify, Node::Understand, Node::Solve, Node::Validate]
        );
        assert!(result.analysis.is_some());
    }

    #[tokio::test]
    async fn test_retry_ceiling_then_fallback() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::always(runtime_failure()));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(result.status, Status::Fallback);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 4);
        assert_eq!(count(&llm.calls.debug), 3);
        assert_eq!(result.debug_attempts, 3);
        assert_eq!(*nodes(&result).last().unwrap(), Node::Fallback);

        let content = result.fallback_content.unwrap();
        assert!(content.contains("Step 1: add => 8"));
        assert!(content.contains("Answer: 8"));
        assert!(result.error.unwrap().contains("NameError"));

        // Each debug pass patched the previous program
        let sources = exec.sources.lock().unwrap();
        assert_eq!(sources[3].matches("# patched").count(), 3);
    }

    #[tokio::test]
    async fn test_debug_recovers() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::scripted(vec![runtime_failure()], rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.debug_attempts, 1);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_solve_retry_bound() {
        let mut llm = MockLlm::new();
        llm.solution_valid = false;
        let llm = Arc::new(llm);
        let exec = Arc::new(MockExecutor::always(rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec);

        let result = orchestrator.run("How many legs do 3 spiders have?", GradeLevel::default()).await;

        assert_eq!(count(&llm.calls.solve), 2);
        assert_eq!(count(&llm.calls.validate), 2);
        assert_eq!(result.solve_attempts, 2);
        assert_eq!(result.status, Status::Success);
        assert!(nodes(&result).contains(&Node::Visualize));
    }

    #[tokio::test]
    async fn test_model_failures_use_safe_defaults() {
        let mut llm = MockLlm::new();
        llm.fail_all = true;
        let llm = Arc::new(llm);
        let exec = Arc::new(MockExecutor::always(rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let result = orchestrator.run("A word problem about trains", GradeLevel::default()).await;

        // classify falls back to complex/medium, so understanding runs
        assert_eq!(result.trace[0].summary, "complex/medium");
        assert_eq!(count(&llm.calls.solve), 2);
        // empty solutions are invalid without asking the model
        assert_eq!(count(&llm.calls.validate), 0);
        assert!(result.solution.is_empty());

        assert_eq!(result.status, Status::Success);
        let sources = exec.sources.lock().unwrap();
        assert!(sources[0].contains("class MathVisualization(Scene):"));
    }

    #[tokio::test]
    async fn test_validator_error_assumes_valid() {
        struct FlakyValidator(MockLlm);

        impl LlmService for FlakyValidator {
            async fn classify(&self, p: &str) -> Result<Classification> {
                self.0.classify(p).await
            }
            async fn analyze(&self, p: &str, g: GradeLevel) -> Result<Analysis> {
                self.0.analyze(p, g).await
            }
            async fn solve(&self, r: SolveRequest<'_>) -> Result<Solution> {
                self.0.solve(r).await
            }
            async fn validate(&self, _p: &str, _s: &Solution) -> Result<Validation> {
                Err(Error::inference_failed("validator timed out"))
            }
            async fn generate_code(&self, r: CodeRequest<'_>) -> Result<String> {
                self.0.generate_code(r).await
            }
            async fn debug(&self, c: &str, e: &str, t: ErrorType) -> Result<String> {
                self.0.debug(c, e, t).await
            }
            async fn review(&self, c: &str, m: &QualityMetrics, f: &str) -> Result<String> {
                self.0.review(c, m, f).await
            }
        }

        let orchestrator = Orchestrator::new(
            Arc::new(FlakyValidator(MockLlm::new())),
            Arc::new(MockExecutor::always(rendered())),
        );
        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;
        assert_eq!(result.solve_attempts, 1);
        assert_eq!(result.trace[2].summary, "valid");
    }

    #[tokio::test]
    async fn test_structure_errors_regenerate_after_one_patch() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::always(RenderOutcome::failed(
            "Could not find Scene class in code",
        )));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(result.status, Status::Fallback);
        // patch, regenerate, patch
        assert_eq!(count(&llm.calls.debug), 2);
        assert_eq!(count(&llm.calls.generate), 2);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_regenerates() {
        let llm = Arc::new(MockLlm::new());
        let timed_out = RenderOutcome::Failed {
            error_message: "renderer exceeded 180s wall-clock budget".into(),
            timed_out: true,
        };
        let exec = Arc::new(MockExecutor::scripted(vec![timed_out], rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec);

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(count(&llm.calls.debug), 0);
        assert_eq!(count(&llm.calls.generate), 2);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::scripted(vec![runtime_failure()], rendered()));
        let orchestrator =
            Orchestrator::new(llm.clone(), exec).with_classifier(|_: &str| ErrorType::Structure);

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;
        assert_eq!(result.status, Status::Success);
        assert!(result.trace[4].summary.starts_with("structure error"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let orchestrator = Orchestrator::new(
            Arc::new(MockLlm::new()),
            Arc::new(MockExecutor::always(rendered())),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = orchestrator
            .run_with_cancel("2 + 3 = ?", GradeLevel::default(), &cancel)
            .await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert!(result.trace.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_render() {
        let mut exec = MockExecutor::always(rendered());
        exec.delay = Some(Duration::from_secs(30));
        let orchestrator = Orchestrator::new(Arc::new(MockLlm::new()), Arc::new(exec));

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = orchestrator
            .run_with_cancel("2 + 3 = ?", GradeLevel::default(), &cancel)
            .await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(*nodes(&result).last().unwrap(), Node::Visualize);
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let orchestrator = Orchestrator::new(Arc::new(MockLlm::new()), Arc::new(PanickingExecutor));

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;
        assert_eq!(result.status, Status::Failed);
        assert!(result.error.unwrap().contains("renderer exploded"));
    }

    #[tokio::test]
    async fn test_transition_budget() {
        let config = WorkflowConfig {
            max_transitions: 3,
            ..WorkflowConfig::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(MockLlm::new()),
            Arc::new(MockExecutor::always(rendered())),
        )
        .with_config(config);

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.trace.len(), 3);
        assert!(result.error.unwrap().contains("3 transitions"));
    }

    #[tokio::test]
    async fn test_review_replaces_weak_code() {
        let mut llm = MockLlm::new();
        llm.code = "from manim import *\n\nclass Weak(Scene):\n    def construct(self):\n        self.add(Text(\"8\"))\n".into();
        let llm = Arc::new(llm);
        let exec = Arc::new(MockExecutor::always(rendered()));
        let config = WorkflowConfig {
            enable_review: true,
            ..WorkflowConfig::default()
        };
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone()).with_config(config);

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(count(&llm.calls.review), 1);
        assert_eq!(result.code, GOOD_CODE);
        assert!(result.quality_score.unwrap() >= 80.0);
    }

    #[tokio::test]
    async fn test_review_uses_configured_font() {
        let mut llm = MockLlm::new();
        llm.code = "from manim import *\n\nclass Weak(Scene):\n    def construct(self):\n        self.add(Text(\"8\"))\n".into();
        let llm = Arc::new(llm);
        let config = WorkflowConfig {
            enable_review: true,
            font: "Arial".to_string(),
            ..WorkflowConfig::default()
        };
        let orchestrator =
            Orchestrator::new(llm.clone(), Arc::new(MockExecutor::always(rendered()))).with_config(config);

        orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;

        assert_eq!(count(&llm.calls.review), 1);
        assert_eq!(llm.review_font.lock().unwrap().as_deref(), Some("Arial"));
    }

    #[tokio::test]
    async fn test_skill_is_recorded() {
        let mut catalog = SkillCatalog::new();
        catalog.insert(Skill::parse("sums", "# Sums\nKeywords: +\n", None));
        let orchestrator = Orchestrator::new(
            Arc::new(MockLlm::new()),
            Arc::new(MockExecutor::always(rendered())),
        )
        .with_skills(Arc::new(catalog));

        let result = orchestrator.run("2 + 3 = ?", GradeLevel::default()).await;
        assert_eq!(result.skill_used.as_deref(), Some("sums"));
    }

    #[test]
    fn test_concurrent_runs_share_collaborators() {
        let llm = Arc::new(MockLlm::new());
        let exec = Arc::new(MockExecutor::always(rendered()));
        let orchestrator = Orchestrator::new(llm.clone(), exec.clone());

        let results = tokio_test::block_on(futures_util::future::join_all(
            ["2 + 3 = ?", "4 * 5 = ?", "9 - 1 = ?"]
                .iter()
                .map(|p| orchestrator.run(p, GradeLevel::default())),
        ));

        assert!(results.iter().all(|r| r.status == Status::Success));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
        assert_eq!(results[1].problem_text, "4 * 5 = ?");
    }

    #[test]
    fn test_result_serializes() {
        let mut state = WorkflowState::new("p", GradeLevel::Middle);
        state.status = Status::Fallback;
        let result = WorkflowResult::from_state(
            state,
            vec![TraceEntry {
                step: 1,
                node: Node::SolveSimple,
                summary: "attempt 1: 0 steps".into(),
            }],
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "fallback");
        assert_eq!(json["grade_level"], "middle");
        assert_eq!(json["trace"][0]["node"], "solve_simple");
        assert_eq!(result.trace[0].to_string(), " 1. solve_simple attempt 1: 0 steps");
    }
}

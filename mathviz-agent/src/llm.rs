//! Model-backed agents: classification, understanding, solving, validation,
//! code generation, debugging and review.
//!
//! [`LlmService`] is the seam the workflow depends on. [`ProviderLlmService`]
//! implements it over any [`LlmProvider`] with one chat call per operation.

use crate::domain::{Analysis, Classification, GradeLevel, Solution, Validation};
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use crate::skills::Skill;
use crate::state::ErrorType;
use mathviz_error::{Error, Result};
use mathviz_scene::QualityMetrics;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Inputs for the solving agent
#[derive(Debug, Clone, Copy)]
pub struct SolveRequest<'a> {
    pub problem: &'a str,
    pub grade: GradeLevel,
    pub analysis: Option<&'a Analysis>,
    /// Validation errors from the previous attempt
    pub previous_errors: &'a [String],
}

/// Inputs for the code generation agent
#[derive(Debug, Clone, Copy)]
pub struct CodeRequest<'a> {
    pub problem: &'a str,
    pub grade: GradeLevel,
    pub solution: &'a Solution,
    pub analysis: Option<&'a Analysis>,
    pub skill: Option<&'a Skill>,
    pub font: &'a str,
}

#[allow(async_fn_in_trait)]
pub trait LlmService: Send + Sync {
    async fn classify(&self, problem: &str) -> Result<Classification>;

    async fn analyze(&self, problem: &str, grade: GradeLevel) -> Result<Analysis>;

    async fn solve(&self, request: SolveRequest<'_>) -> Result<Solution>;

    async fn validate(&self, problem: &str, solution: &Solution) -> Result<Validation>;

    async fn generate_code(&self, request: CodeRequest<'_>) -> Result<String>;

    /// Patch `code` so it no longer fails with `error`
    async fn debug(&self, code: &str, error: &str, error_type: ErrorType) -> Result<String>;

    /// Improve layout and pacing of working code that should use `font`
    async fn review(&self, code: &str, metrics: &QualityMetrics, font: &str) -> Result<String>;
}

/// Pause before retrying a transient provider failure
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct ProviderLlmService<P> {
    provider: P,
    retry_delay: Duration,
    usage: Mutex<UsageTracker>,
}

impl<P: LlmProvider> ProviderLlmService<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry_delay: RETRY_DELAY,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Snapshot of token usage so far
    pub fn usage(&self) -> UsageTracker {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// One chat call, repeated once when the first failure is transient
    async fn ask(&self, operation: &'static str, system: &str, user: String, json: bool) -> Result<String> {
        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_json_mode(json);

        match self.ask_once(operation, request.clone()).await {
            Err(err) if err.is_retryable() => {
                warn!(operation, error = %err, "transient model failure, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.ask_once(operation, request).await.map_err(Error::persist)
            }
            result => result,
        }
    }

    async fn ask_once(&self, operation: &'static str, request: CompletionRequest) -> Result<String> {
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| Error::from(e).with_operation(operation))?;

        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .track(&response.model, &response.usage);

        let content = response.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(Error::inference_failed("model returned an empty reply").with_operation(operation));
        }
        debug!(operation, chars = content.len(), "model replied");
        Ok(content)
    }

    async fn ask_json<T: DeserializeOwned>(&self, operation: &'static str, system: &str, user: String) -> Result<T> {
        let reply = self.ask(operation, system, user, true).await?;
        serde_json::from_str(extract_json(&reply)).map_err(|e| {
            Error::parse_failed(format!("reply is not the expected JSON: {}", e))
                .with_operation(operation)
                .set_source(e)
        })
    }

    async fn ask_code(&self, operation: &'static str, system: &str, user: String) -> Result<String> {
        let reply = self.ask(operation, system, user, false).await?;
        let code = extract_code(&reply);
        if code.is_empty() {
            return Err(Error::parse_failed("reply contains no code").with_operation(operation));
        }
        Ok(code.to_string())
    }
}

const CLASSIFY_SYSTEM: &str = "You classify math problems. Reply with JSON: \
{\"problem_type\": \"simple|complex|geometry|word\", \"difficulty\": \"easy|medium|hard\"}.";

const ANALYZE_SYSTEM: &str = "You analyze math problems before they are solved. Reply with JSON: \
{\"problem_type\": str, \"knowledge_points\": [str], \"known_conditions\": [str], \
\"question\": str, \"visualization_hint\": str}.";

const SOLVE_SYSTEM: &str = "You are a patient math teacher. Solve the problem step by step. Reply with JSON: \
{\"strategy\": str, \"steps\": [{\"step_number\": int, \"description\": str, \"operation\": str, \
\"result\": str}], \"answer\": str, \"key_points\": [str]}.";

const VALIDATE_SYSTEM: &str = "You check worked solutions for mistakes. Reply with JSON: \
{\"is_valid\": bool, \"errors\": [str]}.";

const CODE_SYSTEM: &str = "You write Manim Community Edition scenes that explain math solutions. \
Return one complete Python program in a ```python block with a single Scene subclass. \
Keep titles at the top edge, results at the bottom edge, fade out old content before new \
content appears, and never let elements overlap.";

const DEBUG_SYSTEM: &str = "You fix Manim Community Edition programs. Return the complete corrected \
program in a ```python block. Change only what the error requires.";

const REVIEW_SYSTEM: &str = "You review Manim Community Edition programs for layout problems. Return \
the complete improved program in a ```python block. Keep the same Scene class name.";

impl<P: LlmProvider> LlmService for ProviderLlmService<P> {
    #[instrument(skip_all)]
    async fn classify(&self, problem: &str) -> Result<Classification> {
        self.ask_json("llm::classify", CLASSIFY_SYSTEM, format!("Problem: {}", problem))
            .await
    }

    #[instrument(skip_all, fields(grade = %grade))]
    async fn analyze(&self, problem: &str, grade: GradeLevel) -> Result<Analysis> {
        let user = format!("Student: {}\nProblem: {}", grade.audience(), problem);
        self.ask_json("llm::analyze", ANALYZE_SYSTEM, user).await
    }

    #[instrument(skip_all, fields(grade = %request.grade))]
    async fn solve(&self, request: SolveRequest<'_>) -> Result<Solution> {
        let mut user = format!(
            "Student: {}\nProblem: {}\n",
            request.grade.audience(),
            request.problem
        );
        if let Some(analysis) = request.analysis {
            user.push_str(&format!(
                "Analysis: {}\n",
                serde_json::to_string(analysis).unwrap_or_default()
            ));
        }
        if !request.previous_errors.is_empty() {
            user.push_str("A previous attempt was rejected:\n");
            for error in request.previous_errors {
                user.push_str(&format!("- {}\n", error));
            }
        }
        self.ask_json("llm::solve", SOLVE_SYSTEM, user).await
    }

    #[instrument(skip_all)]
    async fn validate(&self, problem: &str, solution: &Solution) -> Result<Validation> {
        let user = format!(
            "Problem: {}\nSolution: {}",
            problem,
            serde_json::to_string(solution).unwrap_or_default()
        );
        self.ask_json("llm::validate", VALIDATE_SYSTEM, user).await
    }

    #[instrument(skip_all, fields(skill = request.skill.map(|s| s.name.as_str())))]
    async fn generate_code(&self, request: CodeRequest<'_>) -> Result<String> {
        let mut user = format!(
            "Audience: {}\nProblem: {}\nSolution: {}\nUse font=\"{}\" for every Text.\n",
            request.grade.audience(),
            request.problem,
            serde_json::to_string(request.solution).unwrap_or_default(),
            request.font,
        );
        if let Some(hint) = request.analysis.map(|a| a.visualization_hint.as_str()).filter(|h| !h.is_empty()) {
            user.push_str(&format!("Visualization hint: {}\n", hint));
        }
        if let Some(skill) = request.skill {
            user.push_str(&format!("\nFollow this technique:\n{}\n", skill.prompt));
        }
        self.ask_code("llm::generate_code", CODE_SYSTEM, user).await
    }

    #[instrument(skip_all, fields(error_type = %error_type))]
    async fn debug(&self, code: &str, error: &str, error_type: ErrorType) -> Result<String> {
        let user = format!(
            "The program fails with a {} error:\n{}\n\nProgram:\n```python\n{}\n```",
            error_type, error, code
        );
        self.ask_code("llm::debug", DEBUG_SYSTEM, user).await
    }

    #[instrument(skip_all, fields(score = metrics.score()))]
    async fn review(&self, code: &str, metrics: &QualityMetrics, font: &str) -> Result<String> {
        let mut issues = Vec::new();
        if !metrics.has_required_font {
            issues.push(format!("Text does not use font=\"{}\"", font));
        }
        if metrics.has_layout_issues {
            issues.push("elements are not positioned with to_edge/move_to, or groups are not scaled".to_string());
        }
        if metrics.overlap_risk > 0.0 {
            issues.push(format!("overlap risk {:.1}", metrics.overlap_risk));
        }
        if metrics.scene_transition_count > 5 {
            issues.push("too many FadeOut transitions".to_string());
        }
        let user = format!(
            "Issues:\n- {}\n\nProgram:\n```python\n{}\n```",
            issues.join("\n- "),
            code
        );
        self.ask_code("llm::review", REVIEW_SYSTEM, user).await
    }
}

/// Code inside the first fenced block, or the whole reply when unfenced
pub fn extract_code(reply: &str) -> &str {
    for fence in ["```python", "```py", "```"] {
        if let Some(start) = reply.find(fence) {
            let body = &reply[start + fence.len()..];
            // Skip the rest of the opening fence line
            let body = match body.find('\n') {
                Some(nl) if body[..nl].trim().is_empty() => &body[nl + 1..],
                _ if fence != "```" => continue,
                Some(nl) => &body[nl + 1..],
                None => body,
            };
            let end = body.find("```").unwrap_or(body.len());
            return body[..end].trim_matches('\n').trim_end();
        }
    }
    reply.trim()
}

/// The outermost JSON object in a reply
pub fn extract_json(reply: &str) -> &str {
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => reply.trim(),
    }
}

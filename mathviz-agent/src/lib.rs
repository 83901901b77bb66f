//! # mathviz-agent
//!
//! Turns a math word problem into a rendered Manim animation:
//! 1. The problem is classified and, when it is not trivial, analyzed
//! 2. A model solves it and a second pass validates the solution
//! 3. A program is generated from the solution, sanitized and scored
//! 4. The renderer runs the program in a subprocess
//! 5. Failed renders are patched or regenerated until the debug budget runs out
//! 6. A text rendering of the solution is the last resort
//!
//! The model sits behind [`LlmService`], the renderer behind
//! [`RendererExecutor`], so the whole loop can run against test doubles.

pub mod cancel;
pub mod config;
pub mod domain;
pub mod executor;
pub mod llm;
pub mod provider;
pub mod sanitize;
pub mod skills;
pub mod state;
pub mod workflow;

pub use cancel::CancelToken;
pub use config::Settings;
pub use domain::{
    Analysis, Classification, Difficulty, GradeLevel, ProblemType, Solution, SolutionStep,
    Validation,
};
pub use executor::{ExecutorConfig, ManimExecutor, RenderOutcome, RenderQuality, RendererExecutor};
pub use llm::{CodeRequest, LlmService, ProviderLlmService, SolveRequest};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, OpenAiCompatProvider,
    ProviderConfig, ProviderError, UsageTracker,
};
pub use sanitize::sanitize;
pub use skills::{Skill, SkillCatalog, SkillRepository};
pub use state::{ErrorType, StateUpdate, Status, WorkflowState};
pub use workflow::{
    ErrorClassifier, HeuristicClassifier, Node, Orchestrator, TraceEntry, WorkflowConfig,
    WorkflowResult,
};

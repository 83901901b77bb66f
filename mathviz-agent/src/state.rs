//! Per-request workflow state and the deltas steps return.
//!
//! Steps never mutate [`WorkflowState`] directly. Each returns a
//! [`StateUpdate`] and the orchestrator merges it with [`WorkflowState::apply`].

use crate::domain::{Analysis, Classification, GradeLevel, Solution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Success,
    Failed,
    Fallback,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Fallback => "fallback",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Category of a failed render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    #[default]
    None,
    Syntax,
    Runtime,
    Structure,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::None => "none",
            ErrorType::Syntax => "syntax",
            ErrorType::Runtime => "runtime",
            ErrorType::Structure => "structure",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub problem_text: String,
    pub grade_level: GradeLevel,

    pub classification: Option<Classification>,
    pub analysis: Option<Analysis>,

    pub solution: Solution,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub solve_attempts: u32,

    pub manim_code: String,
    pub skill_used: Option<String>,
    pub quality_score: Option<f64>,

    pub video_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub error_type: ErrorType,
    pub render_timed_out: bool,
    pub debug_attempts: u32,
    /// Consecutive patch attempts spent on a structure error
    pub structure_patches: u32,

    pub status: Status,
    pub fallback_content: Option<String>,
}

impl WorkflowState {
    pub fn new(problem_text: impl Into<String>, grade_level: GradeLevel) -> Self {
        Self {
            problem_text: problem_text.into(),
            grade_level,
            ..Self::default()
        }
    }

    /// Merge a step's delta into the state
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            classification,
            analysis,
            solution,
            is_valid,
            validation_errors,
            solve_attempts,
            manim_code,
            skill_used,
            quality_score,
            video_path,
            error_message,
            error_type,
            render_timed_out,
            debug_attempts,
            structure_patches,
            status,
            fallback_content,
        } = update;

        if let Some(v) = classification {
            self.classification = Some(v);
        }
        if let Some(v) = analysis {
            self.analysis = Some(v);
        }
        if let Some(v) = solution {
            self.solution = v;
        }
        if let Some(v) = is_valid {
            self.is_valid = v;
        }
        if let Some(v) = validation_errors {
            self.validation_errors = v;
        }
        if let Some(v) = solve_attempts {
            self.solve_attempts = v;
        }
        if let Some(v) = manim_code {
            self.manim_code = v;
        }
        if let Some(v) = skill_used {
            self.skill_used = Some(v);
        }
        if let Some(v) = quality_score {
            self.quality_score = Some(v);
        }
        if let Some(v) = video_path {
            self.video_path = v;
        }
        if let Some(v) = error_message {
            self.error_message = v;
        }
        if let Some(v) = error_type {
            self.error_type = v;
        }
        if let Some(v) = render_timed_out {
            self.render_timed_out = v;
        }
        if let Some(v) = debug_attempts {
            self.debug_attempts = v;
        }
        if let Some(v) = structure_patches {
            self.structure_patches = v;
        }
        if let Some(v) = status {
            self.status = v;
        }
        if let Some(v) = fallback_content {
            self.fallback_content = Some(v);
        }
    }
}

/// Partial update returned by a workflow step.
///
/// `None` leaves a field untouched. Fields that can be cleared use a nested
/// `Option`, so `Some(None)` resets them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub classification: Option<Classification>,
    pub analysis: Option<Analysis>,
    pub solution: Option<Solution>,
    pub is_valid: Option<bool>,
    pub validation_errors: Option<Vec<String>>,
    pub solve_attempts: Option<u32>,
    pub manim_code: Option<String>,
    pub skill_used: Option<String>,
    pub quality_score: Option<f64>,
    pub video_path: Option<Option<PathBuf>>,
    pub error_message: Option<Option<String>>,
    pub error_type: Option<ErrorType>,
    pub render_timed_out: Option<bool>,
    pub debug_attempts: Option<u32>,
    pub structure_patches: Option<u32>,
    pub status: Option<Status>,
    pub fallback_content: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

//! Problem, solution and classification types exchanged with the model.
//!
//! Models answer in JSON that is only roughly shaped like these types, so the
//! deserializers accept numbers where strings are expected and vice versa.

use mathviz_error::Error;
use mathviz_scene::{SolutionOutline, StepOutline};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audience of the explanation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    /// Grades 1-3
    ElementaryLower,
    /// Grades 4-6
    #[default]
    ElementaryUpper,
    Middle,
    High,
    Advanced,
}

impl GradeLevel {
    pub const ALL: [GradeLevel; 5] = [
        GradeLevel::ElementaryLower,
        GradeLevel::ElementaryUpper,
        GradeLevel::Middle,
        GradeLevel::High,
        GradeLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeLevel::ElementaryLower => "elementary_lower",
            GradeLevel::ElementaryUpper => "elementary_upper",
            GradeLevel::Middle => "middle",
            GradeLevel::High => "high",
            GradeLevel::Advanced => "advanced",
        }
    }

    /// Audience wording used in prompts
    pub fn audience(&self) -> &'static str {
        match self {
            GradeLevel::ElementaryLower => "a child in grades 1-3",
            GradeLevel::ElementaryUpper => "a child in grades 4-6",
            GradeLevel::Middle => "a middle school student",
            GradeLevel::High => "a high school student",
            GradeLevel::Advanced => "a university student",
        }
    }

    /// Directory name of the grade-specific skill folder
    pub fn skill_folder(&self) -> &'static str {
        match self {
            GradeLevel::ElementaryLower | GradeLevel::ElementaryUpper => "elementary",
            GradeLevel::Middle => "middle_school",
            GradeLevel::High => "high_school",
            GradeLevel::Advanced => "university",
        }
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        GradeLevel::ALL
            .into_iter()
            .find(|g| g.as_str() == normalized)
            .ok_or_else(|| {
                Error::invalid_argument(format!("unknown grade level '{}'", s))
                    .with_context("expected", "elementary_lower|elementary_upper|middle|high|advanced")
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Simple,
    #[default]
    Complex,
    Geometry,
    Word,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Simple => "simple",
            ProblemType::Complex => "complex",
            ProblemType::Geometry => "geometry",
            ProblemType::Word => "word",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.problem_type.as_str(), self.difficulty.as_str())
    }
}

/// Routing decision for a problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default, deserialize_with = "lenient_enum")]
    pub problem_type: ProblemType,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub difficulty: Difficulty,
}

impl Classification {
    pub fn new(problem_type: ProblemType, difficulty: Difficulty) -> Self {
        Self {
            problem_type,
            difficulty,
        }
    }

    /// Simple problems skip the understanding step
    pub fn is_simple(&self) -> bool {
        self.problem_type == ProblemType::Simple || self.difficulty == Difficulty::Easy
    }
}

/// What the understanding step learned about a problem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default, deserialize_with = "lenient_string")]
    pub problem_type: String,
    #[serde(default)]
    pub knowledge_points: Vec<String>,
    #[serde(default)]
    pub known_conditions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub question: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub visualization_hint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionStep {
    #[serde(default, deserialize_with = "lenient_usize")]
    pub step_number: usize,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub operation: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    #[serde(default, deserialize_with = "lenient_string")]
    pub strategy: String,
    #[serde(default)]
    pub steps: Vec<SolutionStep>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl Solution {
    /// No steps and no answer
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.answer.trim().is_empty()
    }

    /// Outline for deterministic scene planning
    pub fn to_outline(&self, problem: &str) -> SolutionOutline {
        SolutionOutline {
            problem: problem.to_string(),
            steps: self
                .steps
                .iter()
                .map(|s| StepOutline {
                    description: s.description.clone(),
                    result: Some(s.result.clone()).filter(|r| !r.trim().is_empty()),
                })
                .collect(),
            answer: Some(self.answer.clone()).filter(|a| !a.trim().is_empty()),
        }
    }

    /// Plain-text rendering used by fallback output
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            let number = if step.step_number == 0 { i + 1 } else { step.step_number };
            out.push_str(&format!("Step {}: {}", number, step.description.trim()));
            if !step.result.trim().is_empty() {
                out.push_str(&format!(" => {}", step.result.trim()));
            }
            out.push('\n');
        }
        if !self.answer.trim().is_empty() {
            out.push_str(&format!("Answer: {}\n", self.answer.trim()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Default for Validation {
    fn default() -> Self {
        Self::valid()
    }
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
        }
    }
}

fn default_true() -> bool {
    true
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Unknown labels fall back to the default variant
fn lenient_enum<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let value = match value {
        serde_json::Value::String(s) => serde_json::Value::String(s.trim().to_ascii_lowercase()),
        other => other,
    };
    Ok(serde_json::from_value(value).unwrap_or_default())
}

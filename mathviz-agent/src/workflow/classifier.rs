//! Heuristics that run before or instead of a model call.

use crate::domain::{Classification, Difficulty, ProblemType};
use crate::state::ErrorType;
use regex::Regex;
use std::sync::OnceLock;

/// Maps a render failure message to the kind of fix it needs
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, message: &str) -> ErrorType;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&str) -> ErrorType + Send + Sync,
{
    fn classify(&self, message: &str) -> ErrorType {
        self(message)
    }
}

/// Keyword rules over the lower-cased message
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl ErrorClassifier for HeuristicClassifier {
    fn classify(&self, message: &str) -> ErrorType {
        let lower = message.to_lowercase();
        if lower.contains("syntaxerror") || lower.contains("indentationerror") {
            ErrorType::Syntax
        } else if lower.contains("nameerror") || lower.contains("attributeerror") {
            ErrorType::Runtime
        } else if lower.contains("scene") || lower.contains("class") {
            ErrorType::Structure
        } else {
            ErrorType::Runtime
        }
    }
}

const GEOMETRY_KEYWORDS: &[&str] = &[
    "三角形", "圆", "正方形", "长方形", "梯形", "面积", "周长", "体积", "角度",
    "triangle", "circle", "square", "rectangle", "trapezoid", "polygon", "area",
    "perimeter", "volume", "angle", "radius",
];

fn arithmetic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\d+(?:\.\d+)?(?:\s*[-+*/×÷xX]\s*\d+(?:\.\d+)?)+\s*[=＝]\s*[?？]?\s*$")
            .expect("arithmetic regex")
    })
}

/// Classify obvious problems without asking the model
pub fn classify_problem(problem: &str) -> Option<Classification> {
    if arithmetic_regex().is_match(problem) {
        return Some(Classification::new(ProblemType::Simple, Difficulty::Easy));
    }

    let lower = problem.to_lowercase();
    if GEOMETRY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(Classification::new(ProblemType::Geometry, Difficulty::Medium));
    }
    None
}

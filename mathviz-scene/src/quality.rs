//! Heuristic quality scoring for generated scene code.
//!
//! The score decides whether a program is worth a review pass before it is
//! rendered. Every signal is a plain text heuristic; nothing is executed.

use crate::builder::DEFAULT_FONT;
use crate::pysyntax;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::info;

/// Scores below this ask for a review
pub const REVIEW_THRESHOLD: f64 = 70.0;

/// Scores at or above this skip review entirely
pub const GOOD_ENOUGH_THRESHOLD: f64 = 80.0;

fn scene_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*[A-Za-z_][A-Za-z0-9_.]*Scene\s*\)\s*:")
            .expect("scene class regex")
    })
}

/// Name of the first `Scene` subclass defined in `code`
pub fn scene_class_name(code: &str) -> Option<&str> {
    scene_class_regex()
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Signals extracted from one program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub has_required_font: bool,
    pub has_layout_issues: bool,
    /// Number of `FadeOut` calls
    pub scene_transition_count: usize,
    pub transform_count: usize,
    pub syntax_valid: bool,
    pub has_scene_class: bool,
    /// 0.0 ..= 1.0
    pub overlap_risk: f64,
}

impl QualityMetrics {
    /// Score in `0.0 ..= 100.0`
    pub fn score(&self) -> f64 {
        let mut score = 100.0;

        if !self.has_required_font {
            score -= 20.0;
        }
        if self.has_layout_issues {
            score -= 15.0;
        }
        if !self.syntax_valid {
            score -= 30.0;
        }
        if !self.has_scene_class {
            score -= 30.0;
        }
        if self.scene_transition_count > 5 {
            score -= (self.scene_transition_count - 5) as f64 * 5.0;
        }
        score += (self.transform_count as f64 * 3.0).min(15.0);
        score -= self.overlap_risk * 20.0;

        score.clamp(0.0, 100.0)
    }

    pub fn needs_review(&self) -> bool {
        self.score() < REVIEW_THRESHOLD
    }

    pub fn is_good_enough(&self) -> bool {
        self.score() >= GOOD_ENOUGH_THRESHOLD
    }
}

#[derive(Debug, Clone)]
pub struct CodeQualityAnalyzer {
    font: String,
}

impl Default for CodeQualityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_FONT)
    }
}

impl CodeQualityAnalyzer {
    pub fn new(font: impl Into<String>) -> Self {
        Self { font: font.into() }
    }

    pub fn analyze(&self, code: &str) -> QualityMetrics {
        let has_required_font = code.contains(&format!("font=\"{}\"", self.font))
            || code.contains(&format!("font='{}'", self.font));

        let has_to_edge = code.contains(".to_edge(");
        let has_move_to = code.contains(".move_to(");
        let has_scale = code.contains(".scale(");

        let text_count = code.matches("Text(").count();
        let vgroup_count = code.matches("VGroup").count();
        let positioning = code.matches(".to_edge(").count()
            + code.matches(".move_to(").count()
            + code.matches(".next_to(").count();

        let has_layout_issues =
            !(has_to_edge || has_move_to) || (vgroup_count > 0 && !has_scale);

        let mut overlap_risk: f64 = 0.0;
        if text_count > 5 && !has_to_edge {
            overlap_risk += 0.3;
        }
        if vgroup_count > 3 && !has_scale {
            overlap_risk += 0.2;
        }
        if text_count + vgroup_count > positioning {
            overlap_risk += 0.3;
        }

        let metrics = QualityMetrics {
            has_required_font,
            has_layout_issues,
            scene_transition_count: code.matches("FadeOut").count(),
            transform_count: code.matches("Transform").count(),
            syntax_valid: pysyntax::is_valid(code),
            has_scene_class: scene_class_name(code).is_some(),
            overlap_risk: overlap_risk.min(1.0),
        };

        info!(
            score = metrics.score(),
            needs_review = metrics.needs_review(),
            "code quality analyzed"
        );
        metrics
    }
}

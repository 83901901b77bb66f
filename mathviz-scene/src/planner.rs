//! Deterministic planning of a whole explanation scene from a solved problem.
//!
//! The planner drives a [`SceneCodeBuilder`]: the problem title stays pinned
//! in the top zone, each step shows its label and result, and the screen is
//! cleared between steps. It never needs a model call, so its output doubles
//! as the fallback program when generated code is unusable.

use crate::builder::{AnimationKind, SceneCodeBuilder, TextStyle};
use crate::geometry::Zone;
use mathviz_error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Longest problem text shown verbatim in the title
const TITLE_CHARS: usize = 60;

/// Scale applied to the title once it has been read
const TITLE_SHRINK: f64 = 0.6;

/// One step of a worked solution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutline {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// A worked solution ready to be animated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionOutline {
    pub problem: String,
    #[serde(default)]
    pub steps: Vec<StepOutline>,
    #[serde(default)]
    pub answer: Option<String>,
}

pub struct ScenePlanner {
    builder: SceneCodeBuilder,
}

impl Default for ScenePlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenePlanner {
    pub fn new() -> Self {
        Self::with_builder(SceneCodeBuilder::new())
    }

    pub fn with_builder(builder: SceneCodeBuilder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &SceneCodeBuilder {
        &self.builder
    }

    pub fn into_builder(self) -> SceneCodeBuilder {
        self.builder
    }

    /// Show the problem statement and pin it as a persistent title
    pub fn plan_problem_display(&mut self, problem: &str) -> Result<()> {
        let content = truncate(problem, TITLE_CHARS);
        let style = TextStyle::sized(32).persistent();

        if self.place_text("problem_text", &content, &[Zone::Top, Zone::Center], &style)? {
            self.builder.wait(2.0);
            self.builder
                .animate_property("problem_text", "scale", &TITLE_SHRINK.to_string(), &[])?;
            self.builder.wait(0.5);
        }
        Ok(())
    }

    /// Visualize step `number`: label on top, result at the bottom
    pub fn plan_step(&mut self, number: usize, step: &StepOutline) -> Result<()> {
        if number > 1 {
            self.builder.clear_scene();
        }

        let description = if step.description.trim().is_empty() {
            format!("Step {}", number)
        } else {
            step.description.trim().to_string()
        };
        self.builder.start_step(number, &description);

        if !step.description.trim().is_empty() {
            self.place_text(
                &format!("step_label_{}", number),
                &description,
                &[Zone::Top, Zone::Center],
                &TextStyle::sized(28),
            )?;
        }

        if let Some(result) = step.result.as_deref().filter(|r| !r.trim().is_empty()) {
            self.place_text(
                &format!("result_{}", number),
                result.trim(),
                &[Zone::Bottom, Zone::Center],
                &TextStyle::sized(40).color("GREEN"),
            )?;
        }

        self.builder.wait(2.0);
        Ok(())
    }

    /// Close with the final answer, highlighted in the centre
    pub fn plan_final_answer(&mut self, answer: &str) -> Result<()> {
        self.builder.clear_scene();
        let content = format!("Answer: {}", answer.trim());
        if self.place_text("final_answer", &content, &[Zone::Center, Zone::Bottom], &TextStyle::sized(40).color("YELLOW"))? {
            self.builder
                .play_animation(AnimationKind::Indicate, &["final_answer"], &[])?;
        }
        self.builder.wait(2.0);
        Ok(())
    }

    /// Plan a complete program for `outline`
    pub fn plan_solution(mut self, outline: &SolutionOutline, class_name: &str) -> Result<String> {
        info!(steps = outline.steps.len(), "planning scene from solution");

        self.plan_problem_display(&outline.problem)?;
        for (i, step) in outline.steps.iter().enumerate() {
            self.plan_step(i + 1, step)?;
        }
        if let Some(answer) = outline.answer.as_deref().filter(|a| !a.trim().is_empty()) {
            self.plan_final_answer(answer)?;
        }

        self.builder.build(class_name)
    }

    /// Create `content` in the first zone with room and write it on screen.
    ///
    /// Returns whether the text was placed.
    fn place_text(&mut self, name: &str, content: &str, zones: &[Zone], style: &TextStyle) -> Result<bool> {
        for zone in zones {
            if self.builder.create_text(name, content, *zone, style)?.is_code() {
                self.builder
                    .play_animation(AnimationKind::Write, &[name], &[])?;
                return Ok(true);
            }
            debug!(element = name, %zone, "zone full, trying next");
        }
        Ok(false)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

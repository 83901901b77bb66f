//! One async step per workflow node.
//!
//! A step reads the state, awaits its collaborator through the cancel token
//! and returns a [`StateUpdate`]. When a step fails, [`Orchestrator::recover`]
//! supplies the safe update for that node instead.

use super::classifier::classify_problem;
use super::routing::{debug_strategy, DebugStrategy};
use super::{Node, Orchestrator, WorkflowConfig};
use crate::cancel::CancelToken;
use crate::domain::{Classification, Solution, Validation};
use crate::executor::{RenderOutcome, RendererExecutor};
use crate::llm::{CodeRequest, LlmService, SolveRequest};
use crate::sanitize::sanitize;
use crate::skills::SkillRepository;
use crate::state::{ErrorType, StateUpdate, Status, WorkflowState};
use mathviz_error::{Error, Result};
use mathviz_scene::{check_source, CodeQualityAnalyzer, SceneCodeBuilder, ScenePlanner};
use tracing::{debug, info, warn};

impl<L, E, S> Orchestrator<L, E, S>
where
    L: LlmService,
    E: RendererExecutor,
    S: SkillRepository,
{
    pub(super) async fn step(&self, node: Node, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        match node {
            Node::Classify => self.classify(state, cancel).await,
            Node::SolveSimple => self.solve(state, cancel, true).await,
            Node::Understand => self.understand(state, cancel).await,
            Node::Solve => self.solve(state, cancel, false).await,
            Node::Validate => self.validate(state, cancel).await,
            Node::Visualize => self.visualize(state, cancel).await,
            Node::Execute => self.execute(state, cancel).await,
            Node::Debug => self.debug(state, cancel).await,
            Node::Fallback => Ok(fallback(state)),
            Node::End => Ok(StateUpdate::new()),
        }
    }

    /// Safe update for `node` after its step failed with `err`
    pub(super) fn recover(&self, node: Node, state: &WorkflowState, err: &Error) -> StateUpdate {
        match node {
            Node::Classify => StateUpdate {
                classification: Some(Classification::default()),
                ..StateUpdate::new()
            },
            Node::SolveSimple => StateUpdate {
                solution: Some(Solution::default()),
                solve_attempts: Some(1),
                ..StateUpdate::new()
            },
            Node::Solve => StateUpdate {
                solution: Some(Solution::default()),
                solve_attempts: Some(state.solve_attempts + 1),
                ..StateUpdate::new()
            },
            Node::Validate => StateUpdate {
                is_valid: Some(true),
                validation_errors: Some(Vec::new()),
                ..StateUpdate::new()
            },
            Node::Visualize => StateUpdate {
                manim_code: Some(fallback_program(state, &self.config)),
                ..StateUpdate::new()
            },
            Node::Execute => StateUpdate {
                video_path: Some(None),
                error_message: Some(Some(err.message().to_string())),
                error_type: Some(ErrorType::Runtime),
                render_timed_out: Some(false),
                ..StateUpdate::new()
            },
            Node::Debug => StateUpdate {
                debug_attempts: Some(state.debug_attempts + 1),
                ..StateUpdate::new()
            },
            Node::Understand | Node::Fallback | Node::End => StateUpdate::new(),
        }
    }

    async fn classify(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let classification = match classify_problem(&state.problem_text) {
            Some(c) => {
                debug!(?c, "classified without the model");
                c
            }
            None => cancel.run(self.llm.classify(&state.problem_text)).await??,
        };
        Ok(StateUpdate {
            classification: Some(classification),
            ..StateUpdate::new()
        })
    }

    async fn understand(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let analysis = cancel
            .run(self.llm.analyze(&state.problem_text, state.grade_level))
            .await??;
        Ok(StateUpdate {
            analysis: Some(analysis),
            ..StateUpdate::new()
        })
    }

    async fn solve(&self, state: &WorkflowState, cancel: &CancelToken, simple: bool) -> Result<StateUpdate> {
        let request = SolveRequest {
            problem: &state.problem_text,
            grade: state.grade_level,
            analysis: if simple { None } else { state.analysis.as_ref() },
            previous_errors: &state.validation_errors,
        };
        let solution = cancel.run(self.llm.solve(request)).await??;
        info!(steps = solution.steps.len(), "solved");

        Ok(StateUpdate {
            solution: Some(solution),
            solve_attempts: Some(if simple { 1 } else { state.solve_attempts + 1 }),
            ..StateUpdate::new()
        })
    }

    async fn validate(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let validation = if state.solution.is_empty() {
            Validation::invalid("solution is empty")
        } else {
            cancel
                .run(self.llm.validate(&state.problem_text, &state.solution))
                .await??
        };
        Ok(StateUpdate {
            is_valid: Some(validation.is_valid),
            validation_errors: Some(validation.errors),
            ..StateUpdate::new()
        })
    }

    async fn visualize(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let skill = self
            .skills
            .as_ref()
            .and_then(|s| s.find_best_match(&state.problem_text, state.grade_level));

        let request = CodeRequest {
            problem: &state.problem_text,
            grade: state.grade_level,
            solution: &state.solution,
            analysis: state.analysis.as_ref(),
            skill,
            font: &self.config.font,
        };
        let mut code = sanitize(&cancel.run(self.llm.generate_code(request)).await??);

        let analyzer = CodeQualityAnalyzer::new(self.config.font.clone());
        let mut metrics = analyzer.analyze(&code);

        if self.config.enable_review && metrics.score() < self.config.review_threshold {
            let reviewed = cancel.run(self.llm.review(&code, &metrics, &self.config.font)).await?;
            match reviewed {
                Ok(reviewed) => {
                    let reviewed = sanitize(&reviewed);
                    match check_source(&reviewed) {
                        Ok(()) => {
                            metrics = analyzer.analyze(&reviewed);
                            code = reviewed;
                        }
                        Err(issue) => warn!(%issue, "reviewed code rejected"),
                    }
                }
                Err(err) => warn!(error = %err, "review failed, keeping generated code"),
            }
        }

        Ok(StateUpdate {
            manim_code: Some(code),
            skill_used: skill.map(|s| s.name.clone()),
            quality_score: Some(metrics.score()),
            ..StateUpdate::new()
        })
    }

    async fn execute(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let outcome = cancel.run(self.executor.execute(&state.manim_code)).await?;

        Ok(match outcome {
            RenderOutcome::Rendered { video_path } => StateUpdate {
                video_path: Some(Some(video_path)),
                error_message: Some(None),
                error_type: Some(ErrorType::None),
                render_timed_out: Some(false),
                status: Some(Status::Success),
                ..StateUpdate::new()
            },
            RenderOutcome::Failed {
                error_message,
                timed_out,
            } => {
                let error_type = if timed_out {
                    ErrorType::Runtime
                } else {
                    self.classifier.classify(&error_message)
                };
                warn!(%error_type, timed_out, "render failed");
                StateUpdate {
                    video_path: Some(None),
                    error_message: Some(Some(error_message)),
                    error_type: Some(error_type),
                    render_timed_out: Some(timed_out),
                    ..StateUpdate::new()
                }
            }
        })
    }

    async fn debug(&self, state: &WorkflowState, cancel: &CancelToken) -> Result<StateUpdate> {
        let attempt = state.debug_attempts + 1;
        let strategy = debug_strategy(state, &self.config);
        info!(attempt, ?strategy, error_type = %state.error_type, "debugging");

        let (code, structure_patches) = match strategy {
            DebugStrategy::Regenerate => {
                let request = CodeRequest {
                    problem: &state.problem_text,
                    grade: state.grade_level,
                    solution: &state.solution,
                    analysis: state.analysis.as_ref(),
                    skill: None,
                    font: &self.config.font,
                };
                let code = match cancel.run(self.llm.generate_code(request)).await? {
                    Ok(code) => code,
                    Err(err) => {
                        warn!(error = %err, "regeneration failed, using planned scene");
                        fallback_program(state, &self.config)
                    }
                };
                (code, 0)
            }
            DebugStrategy::Patch => {
                let error = state.error_message.as_deref().unwrap_or_default();
                let code = cancel
                    .run(self.llm.debug(&state.manim_code, error, state.error_type))
                    .await??;
                let patches = if state.error_type == ErrorType::Structure {
                    state.structure_patches + 1
                } else {
                    0
                };
                (code, patches)
            }
        };

        Ok(StateUpdate {
            manim_code: Some(sanitize(&code)),
            debug_attempts: Some(attempt),
            structure_patches: Some(structure_patches),
            ..StateUpdate::new()
        })
    }
}

/// Text-only rendering of the worked solution
fn fallback(state: &WorkflowState) -> StateUpdate {
    let mut content = format!("Problem: {}\n\n", state.problem_text.trim());
    if state.solution.is_empty() {
        content.push_str("No worked solution is available.\n");
    } else {
        content.push_str(&state.solution.render_text());
    }
    if let Some(error) = state.error_message.as_deref() {
        debug!(error, "falling back to text output");
    }

    StateUpdate {
        status: Some(Status::Fallback),
        fallback_content: Some(content),
        ..StateUpdate::new()
    }
}

/// Deterministic scene planned from the solution, used when generation fails
pub(super) fn fallback_program(state: &WorkflowState, config: &WorkflowConfig) -> String {
    let outline = state.solution.to_outline(&state.problem_text);
    let planner = ScenePlanner::with_builder(SceneCodeBuilder::new().with_font(config.font.clone()));
    match planner.plan_solution(&outline, &config.scene_class) {
        Ok(code) => code,
        Err(err) => {
            warn!(error = %err, "scene planning failed, emitting title card");
            title_card(&state.problem_text, &config.scene_class, &config.font)
        }
    }
}

fn title_card(problem: &str, class_name: &str, font: &str) -> String {
    let text: String = problem
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '\n' | '\r'))
        .take(30)
        .collect();
    format!(
        "from manim import *\n\nclass {class_name}(Scene):\n    def construct(self):\n        \
         title = Text(\"{text}\", font=\"{font}\", font_size=32)\n        \
         title.move_to(ORIGIN)\n        self.play(Write(title))\n        self.wait(2)\n"
    )
}

//! Transition table of the workflow graph.
//!
//! Every function here is pure: the next node depends only on the node that
//! just ran, the merged state and the configured budgets.

use super::{Node, WorkflowConfig};
use crate::state::{ErrorType, WorkflowState};

/// How the debug step repairs a failed program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugStrategy {
    /// Ask the model to fix the failing program
    Patch,
    /// Generate a new program from the solution
    Regenerate,
}

pub fn next(node: Node, state: &WorkflowState, config: &WorkflowConfig) -> Node {
    match node {
        Node::Classify => after_classify(state, config),
        Node::SolveSimple | Node::Solve => Node::Validate,
        Node::Understand => Node::Solve,
        Node::Validate => after_validate(state, config),
        Node::Visualize | Node::Debug => Node::Execute,
        Node::Execute => after_execute(state, config),
        Node::Fallback | Node::End => Node::End,
    }
}

pub fn after_classify(state: &WorkflowState, config: &WorkflowConfig) -> Node {
    let classification = state.classification.unwrap_or_default();
    if classification.is_simple() {
        Node::SolveSimple
    } else if config.enable_understanding {
        Node::Understand
    } else {
        Node::Solve
    }
}

pub fn after_validate(state: &WorkflowState, config: &WorkflowConfig) -> Node {
    if state.is_valid || state.solve_attempts >= config.max_solve_attempts {
        Node::Visualize
    } else {
        Node::Solve
    }
}

pub fn after_execute(state: &WorkflowState, config: &WorkflowConfig) -> Node {
    if state.video_path.is_some() {
        Node::End
    } else if state.debug_attempts >= config.max_debug_attempts {
        Node::Fallback
    } else {
        Node::Debug
    }
}

pub fn debug_strategy(state: &WorkflowState, config: &WorkflowConfig) -> DebugStrategy {
    let structure_persists = state.error_type == ErrorType::Structure
        && state.structure_patches >= config.regenerate_structure_after;

    if state.manim_code.trim().is_empty() || state.render_timed_out || structure_persists {
        DebugStrategy::Regenerate
    } else {
        DebugStrategy::Patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Classification, Difficulty, GradeLevel, ProblemType};
    use std::path::PathBuf;

    fn state() -> WorkflowState {
        WorkflowState::new("p", GradeLevel::default())
    }

    #[test]
    fn test_classify_routes() {
        let config = WorkflowConfig::default();
        let mut s = state();

        s.classification = Some(Classification::new(ProblemType::Simple, Difficulty::Medium));
        assert_eq!(next(Node::Classify, &s, &config), Node::SolveSimple);

        s.classification = Some(Classification::new(ProblemType::Word, Difficulty::Easy));
        assert_eq!(next(Node::Classify, &s, &config), Node::SolveSimple);

        s.classification = Some(Classification::new(ProblemType::Geometry, Difficulty::Hard));
        assert_eq!(next(Node::Classify, &s, &config), Node::Understand);

        let config = WorkflowConfig {
            enable_understanding: false,
            ..WorkflowConfig::default()
        };
        assert_eq!(next(Node::Classify, &s, &config), Node::Solve);

        s.classification = None;
        assert_eq!(next(Node::Classify, &s, &WorkflowConfig::default()), Node::Understand);
    }

    #[test]
    fn test_validate_retry_bound() {
        let config = WorkflowConfig::default();
        let mut s = state();

        s.is_valid = false;
        s.solve_attempts = 1;
        assert_eq!(next(Node::Validate, &s, &config), Node::Solve);

        s.solve_attempts = 2;
        assert_eq!(next(Node::Validate, &s, &config), Node::Visualize);

        s.is_valid = true;
        s.solve_attempts = 1;
        assert_eq!(next(Node::Validate, &s, &config), Node::Visualize);
    }

    #[test]
    fn test_execute_routes() {
        let config = WorkflowConfig::default();
        let mut s = state();

        s.video_path = Some(PathBuf::from("out.mp4"));
        assert_eq!(next(Node::Execute, &s, &config), Node::End);

        s.video_path = None;
        for attempts in 0..3 {
            s.debug_attempts = attempts;
            assert_eq!(next(Node::Execute, &s, &config), Node::Debug);
        }
        s.debug_attempts = 3;
        assert_eq!(next(Node::Execute, &s, &config), Node::Fallback);
    }

    #[test]
    fn test_fixed_edges() {
        let config = WorkflowConfig::default();
        let s = state();
        assert_eq!(next(Node::SolveSimple, &s, &config), Node::Validate);
        assert_eq!(next(Node::Understand, &s, &config), Node::Solve);
        assert_eq!(next(Node::Solve, &s, &config), Node::Validate);
        assert_eq!(next(Node::Visualize, &s, &config), Node::Execute);
        assert_eq!(next(Node::Debug, &s, &config), Node::Execute);
        assert_eq!(next(Node::Fallback, &s, &config), Node::End);
    }

    #[test]
    fn test_debug_strategy() {
        let config = WorkflowConfig::default();
        let mut s = state();
        assert_eq!(debug_strategy(&s, &config), DebugStrategy::Regenerate);

        s.manim_code = "class S(Scene): pass".into();
        s.error_type = ErrorType::Runtime;
        assert_eq!(debug_strategy(&s, &config), DebugStrategy::Patch);

        s.render_timed_out = true;
        assert_eq!(debug_strategy(&s, &config), DebugStrategy::Regenerate);

        s.render_timed_out = false;
        s.error_type = ErrorType::Structure;
        assert_eq!(debug_strategy(&s, &config), DebugStrategy::Patch);

        s.structure_patches = 1;
        assert_eq!(debug_strategy(&s, &config), DebugStrategy::Regenerate);
    }
}

//! # mathviz-scene
//!
//! Layout-safe construction of Manim scenes.
//!
//! - [`geometry`]: screen zones and bounding boxes
//! - [`state`]: the scene registry that places elements without overlap
//! - [`builder`]: code emission on top of the registry
//! - [`planner`]: whole-scene plans from a worked solution
//! - [`pysyntax`]: structural checks on Python source
//! - [`quality`]: heuristic scoring of generated programs
//!
//! ## Example
//!
//! ```rust
//! use mathviz_scene::{SceneCodeBuilder, TextStyle, Zone};
//!
//! let mut builder = SceneCodeBuilder::new();
//! let emission = builder
//!     .create_text("title", "Counting apples", Zone::Top, &TextStyle::default())
//!     .unwrap();
//! assert!(emission.is_code());
//!
//! let program = builder.build("CountingScene").unwrap();
//! assert!(program.contains("class CountingScene(Scene):"));
//! ```

pub mod builder;
pub mod geometry;
pub mod planner;
pub mod pysyntax;
pub mod quality;
pub mod state;

pub use builder::{
    AnimationKind, Arrangement, Emission, MathStyle, Operation, OperationKind, SceneCodeBuilder,
    ShapeGroup, TextStyle, DEFAULT_FONT,
};
pub use geometry::{BoundingBox, Zone, DEFAULT_MARGIN, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use planner::{ScenePlanner, SolutionOutline, StepOutline};
pub use pysyntax::{check_source, SyntaxIssue};
pub use quality::{scene_class_name, CodeQualityAnalyzer, QualityMetrics};
pub use state::{
    ElementExport, ElementRequest, ElementType, Placement, SceneElement, SceneExport,
    SceneStateManager, TransformCheck,
};

//! # Scene Code Builder
//!
//! Structured construction of a Manim `Scene`. Every visual is registered with
//! the [`SceneStateManager`] before any code is emitted, so positioning lines
//! in the output never overlap at the time they are written.
//!
//! Each builder call appends one immutable [`Operation`] to an ordered log;
//! [`SceneCodeBuilder::build`] replays the log into a complete program.

use crate::geometry::Zone;
use crate::state::{ElementRequest, ElementType, SceneExport, SceneStateManager, TransformCheck};
use mathviz_error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Font used for `Text` mobjects; must cover CJK glyphs
pub const DEFAULT_FONT: &str = "Noto Sans CJK SC";

/// Scale applied to every shape group after arrangement
pub const GROUP_SCALE: f64 = 0.7;

const INDENT: &str = "        ";

// ============================================================================
// Operation log
// ============================================================================

/// What an operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    StepMarker,
    CreateText,
    CreateMath,
    CreateGroup,
    Animation,
    AnimateProperty,
    ClearScene,
    Wait,
    Comment,
}

/// One entry of the builder log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Unindented Manim code, one statement per line
    pub code: String,
    /// Element names this operation touches
    pub affects: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Outcome of a create call
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// The element was registered and this code creates it
    Code(String),
    /// Nothing was registered or emitted
    Skipped { reason: String },
}

impl Emission {
    pub fn is_code(&self) -> bool {
        matches!(self, Emission::Code(_))
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Emission::Code(code) => Some(code),
            Emission::Skipped { .. } => None,
        }
    }
}

// ============================================================================
// Styles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_size: u32,
    pub color: String,
    pub persistent: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 36,
            color: "WHITE".to_string(),
            persistent: false,
        }
    }
}

impl TextStyle {
    pub fn sized(font_size: u32) -> Self {
        Self {
            font_size,
            ..Self::default()
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MathStyle {
    pub font_size: u32,
    pub persistent: bool,
}

impl Default for MathStyle {
    fn default() -> Self {
        Self {
            font_size: 40,
            persistent: false,
        }
    }
}

/// How the members of a shape group are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arrangement {
    #[default]
    Grid,
    Row,
    Column,
}

/// A group of identical shapes used to visualize a quantity
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeGroup {
    /// Manim class name, e.g. `Circle`
    pub shape: String,
    pub count: usize,
    pub arrangement: Arrangement,
    pub color: String,
    pub persistent: bool,
    /// Extra constructor arguments, rendered as `key=value`
    pub params: Vec<(String, String)>,
}

impl ShapeGroup {
    pub fn new(shape: impl Into<String>, count: usize) -> Self {
        Self {
            shape: shape.into(),
            count,
            arrangement: Arrangement::Grid,
            color: "BLUE".to_string(),
            persistent: false,
            params: Vec::new(),
        }
    }

    pub fn arranged(mut self, arrangement: Arrangement) -> Self {
        self.arrangement = arrangement;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn grid_shape(&self) -> (usize, usize) {
        let cols = self.count.min(5);
        let rows = self.count.div_ceil(cols);
        (rows, cols)
    }

    /// Estimated on-screen size before the group scale is applied
    pub fn estimated_size(&self) -> (f64, f64) {
        let count = self.count as f64;
        match self.arrangement {
            Arrangement::Grid => {
                let (rows, cols) = self.grid_shape();
                (cols as f64 * 0.5, rows as f64 * 0.5)
            }
            Arrangement::Row => (count * 0.4, 0.4),
            Arrangement::Column => (0.4, count * 0.4),
        }
    }
}

/// Manim animation constructors the builder knows how to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Write,
    Create,
    FadeIn,
    FadeOut,
    Transform,
    TransformFromCopy,
    Indicate,
    LaggedStart,
}

impl AnimationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationKind::Write => "Write",
            AnimationKind::Create => "Create",
            AnimationKind::FadeIn => "FadeIn",
            AnimationKind::FadeOut => "FadeOut",
            AnimationKind::Transform => "Transform",
            AnimationKind::TransformFromCopy => "TransformFromCopy",
            AnimationKind::Indicate => "Indicate",
            AnimationKind::LaggedStart => "LaggedStart",
        }
    }

    fn needs_pair(&self) -> bool {
        matches!(self, AnimationKind::Transform | AnimationKind::TransformFromCopy)
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a layout-safe Manim scene one operation at a time
#[derive(Debug, Clone)]
pub struct SceneCodeBuilder {
    scene: SceneStateManager,
    operations: Vec<Operation>,
    font: String,
}

impl Default for SceneCodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneCodeBuilder {
    pub fn new() -> Self {
        Self::with_scene(SceneStateManager::new())
    }

    pub fn with_scene(scene: SceneStateManager) -> Self {
        Self {
            scene,
            operations: Vec::new(),
            font: DEFAULT_FONT.to_string(),
        }
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }

    pub fn scene(&self) -> &SceneStateManager {
        &self.scene
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn export_state(&self) -> SceneExport {
        self.scene.export_state()
    }

    fn push(&mut self, kind: OperationKind, code: String, affects: Vec<String>) -> String {
        self.push_with(kind, code.clone(), affects, BTreeMap::new());
        code
    }

    fn push_with(
        &mut self,
        kind: OperationKind,
        code: String,
        affects: Vec<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        debug!(?kind, affects = ?affects, "operation recorded");
        self.operations.push(Operation {
            kind,
            code,
            affects,
            metadata,
        });
    }

    /// Register `request` and, if it fits, record `code` followed by the
    /// positioning line
    fn place(
        &mut self,
        kind: OperationKind,
        request: ElementRequest,
        code: String,
    ) -> Result<Emission> {
        let name = request.name.clone();
        let zone = request.zone;

        let placement = self.scene.add_element(request)?;
        let Some(position) = placement.move_to_line(&name) else {
            return Ok(Emission::Skipped {
                reason: placement.message().to_string(),
            });
        };

        let code = format!("{}\n{}", code, position);
        let mut metadata = BTreeMap::new();
        metadata.insert("zone".to_string(), serde_json::Value::from(zone.as_str()));
        self.push_with(kind, code.clone(), vec![name], metadata);
        Ok(Emission::Code(code))
    }

    // ------------------------------------------------------------------------
    // Step structure
    // ------------------------------------------------------------------------

    /// Start a new explanation step; snapshots the scene
    pub fn start_step(&mut self, number: usize, description: &str) -> String {
        self.scene.next_step();
        let code = format!(
            "\n# ========== Step {}: {} ==========",
            number,
            single_line(description)
        );
        let mut metadata = BTreeMap::new();
        metadata.insert("step".to_string(), serde_json::Value::from(number));
        metadata.insert(
            "description".to_string(),
            serde_json::Value::from(description),
        );
        self.push_with(OperationKind::StepMarker, code.clone(), Vec::new(), metadata);
        code
    }

    // ------------------------------------------------------------------------
    // Element creation
    // ------------------------------------------------------------------------

    pub fn create_text(
        &mut self,
        name: &str,
        content: &str,
        zone: Zone,
        style: &TextStyle,
    ) -> Result<Emission> {
        check_identifier(name, "builder::create_text")?;
        let font_size = f64::from(style.font_size);
        let width = (content.chars().count() as f64 * font_size / 72.0).min(10.0);
        let height = font_size / 36.0;

        let request = ElementRequest::new(name, ElementType::Text, zone, width, height)
            .persistent(style.persistent)
            .with_meta("content", content)
            .with_meta("font_size", style.font_size);

        let code = format!(
            "{} = Text(\"{}\", font=\"{}\", font_size={}, color={})",
            name,
            escape_text(content),
            self.font,
            style.font_size,
            style.color
        );
        self.place(OperationKind::CreateText, request, code)
    }

    pub fn create_math(
        &mut self,
        name: &str,
        latex: &str,
        zone: Zone,
        style: &MathStyle,
    ) -> Result<Emission> {
        check_identifier(name, "builder::create_math")?;
        let font_size = f64::from(style.font_size);
        let width = (latex.chars().count() as f64 * font_size / 80.0).min(8.0);
        let height = font_size / 36.0;

        let request = ElementRequest::new(name, ElementType::Math, zone, width, height)
            .persistent(style.persistent)
            .with_meta("latex", latex);

        let code = format!(
            "{} = MathTex(r\"{}\", font_size={})",
            name,
            raw_latex(latex),
            style.font_size
        );
        self.place(OperationKind::CreateMath, request, code)
    }

    pub fn create_shape_group(&mut self, name: &str, group: &ShapeGroup, zone: Zone) -> Result<Emission> {
        check_identifier(name, "builder::create_shape_group")?;
        check_identifier(&group.shape, "builder::create_shape_group")?;
        if group.count == 0 {
            return Err(Error::invalid_argument(format!(
                "shape group '{}' must contain at least one shape",
                name
            ))
            .with_operation("builder::create_shape_group"));
        }

        let (width, height) = group.estimated_size();
        let request = ElementRequest::new(name, ElementType::Group, zone, width, height)
            .persistent(group.persistent)
            .with_meta("shape_type", group.shape.as_str())
            .with_meta("count", group.count);

        let extra: String = group
            .params
            .iter()
            .map(|(k, v)| format!(", {}={}", k, v))
            .collect();
        let arrange = match group.arrangement {
            Arrangement::Grid => {
                let (rows, cols) = group.grid_shape();
                format!("{}.arrange_in_grid(rows={}, cols={}, buff=0.15)", name, rows, cols)
            }
            Arrangement::Row => format!("{}.arrange(RIGHT, buff=0.15)", name),
            Arrangement::Column => format!("{}.arrange(DOWN, buff=0.15)", name),
        };

        let code = [
            format!(
                "{} = VGroup(*[{}(color={}, fill_opacity=0.7{}) for _ in range({})])",
                name, group.shape, group.color, extra, group.count
            ),
            arrange,
            format!("{}.scale({})", name, GROUP_SCALE),
        ]
        .join("\n");
        self.place(OperationKind::CreateGroup, request, code)
    }

    // ------------------------------------------------------------------------
    // Animation
    // ------------------------------------------------------------------------

    /// Play one animation over `targets`.
    ///
    /// `FadeOut` unregisters its targets. `Transform` and `TransformFromCopy`
    /// take exactly a source and a target; an unsafe `Transform` is logged but
    /// still emitted.
    pub fn play_animation(
        &mut self,
        kind: AnimationKind,
        targets: &[&str],
        params: &[(&str, &str)],
    ) -> Result<String> {
        if targets.is_empty() {
            return Err(Error::invalid_argument(format!("{} needs at least one target", kind))
                .with_operation("builder::play_animation"));
        }
        if kind.needs_pair() && targets.len() != 2 {
            return Err(Error::invalid_argument(format!(
                "{} needs exactly 2 targets (source, target), got {}",
                kind,
                targets.len()
            ))
            .with_operation("builder::play_animation"));
        }

        for target in targets {
            if self.scene.get_element(target).is_none() {
                warn!(element = *target, animation = %kind, "animating an element that is not on screen");
            }
        }

        let animations = match kind {
            AnimationKind::Transform | AnimationKind::TransformFromCopy => {
                let (source, target) = (targets[0], targets[1]);
                if kind == AnimationKind::Transform {
                    self.check_transform(source, target);
                }
                vec![format!("{}({}, {})", kind, source, target)]
            }
            AnimationKind::LaggedStart => {
                let inner: Vec<String> = targets.iter().map(|t| format!("FadeIn({})", t)).collect();
                vec![format!("LaggedStart({})", inner.join(", "))]
            }
            _ => targets.iter().map(|t| format!("{}({})", kind, t)).collect(),
        };

        if kind == AnimationKind::FadeOut {
            for target in targets {
                self.scene.remove_element(target);
            }
        }

        let code = play_call(&animations.join(", "), params);
        Ok(self.push(
            OperationKind::Animation,
            code,
            targets.iter().map(|t| t.to_string()).collect(),
        ))
    }

    fn check_transform(&mut self, source: &str, target: &str) {
        let (width, height) = self
            .scene
            .get_element(target)
            .map(|e| (e.bbox.width(), e.bbox.height()))
            .unwrap_or((1.0, 1.0));

        match self.scene.suggest_transform_target(source, width, height) {
            TransformCheck::Safe { .. } => {}
            check => warn!(source, target, reason = %check.message(), "transform is not layout-safe"),
        }
    }

    /// Animate a property change with `.animate`, e.g. `set_color(RED)`.
    ///
    /// A numeric `scale` is checked against the layout first and skipped when
    /// the grown element would collide with a neighbour.
    pub fn animate_property(
        &mut self,
        target: &str,
        property: &str,
        value: &str,
        params: &[(&str, &str)],
    ) -> Result<Emission> {
        let Some(element) = self.scene.get_element(target) else {
            return Err(Error::element_not_found(target).with_operation("builder::animate_property"));
        };
        check_identifier(property, "builder::animate_property")?;

        if property == "scale" {
            if let Ok(factor) = value.trim().parse::<f64>() {
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(Error::invalid_argument(format!(
                        "scale factor must be positive, got {}",
                        value
                    ))
                    .with_operation("builder::animate_property"));
                }
                let (width, height) = (element.bbox.width() * factor, element.bbox.height() * factor);
                let check = self.scene.suggest_transform_target(target, width, height);
                if !check.can_transform() {
                    warn!(element = target, factor, reason = %check.message(), "scale skipped");
                    return Ok(Emission::Skipped {
                        reason: check.message(),
                    });
                }
            }
        } else if matches!(property, "shift" | "move_to" | "to_edge" | "next_to") {
            warn!(element = target, property, "element moved outside the layout registry");
        }

        let code = play_call(&format!("{}.animate.{}({})", target, property, value), params);
        self.push(OperationKind::AnimateProperty, code.clone(), vec![target.to_string()]);
        Ok(Emission::Code(code))
    }

    /// Fade out and unregister every non-persistent element.
    ///
    /// Returns `None` when there is nothing to clear.
    pub fn clear_scene(&mut self) -> Option<String> {
        let names: Vec<String> = self
            .scene
            .list_elements(None)
            .into_iter()
            .filter(|e| !e.persistent)
            .map(|e| e.name.clone())
            .collect();
        if names.is_empty() {
            return None;
        }

        self.scene.clear_non_persistent();
        let fades: Vec<String> = names.iter().map(|n| format!("FadeOut({})", n)).collect();
        let code = play_call(&fades.join(", "), &[]);
        Some(self.push(OperationKind::ClearScene, code, names))
    }

    pub fn wait(&mut self, duration: f64) -> String {
        self.push(OperationKind::Wait, format!("self.wait({})", duration), Vec::new())
    }

    pub fn add_comment(&mut self, text: &str) -> String {
        self.push(
            OperationKind::Comment,
            format!("# {}", single_line(text)),
            Vec::new(),
        )
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// The replayed operation log, indented for `construct`
    pub fn body(&self) -> String {
        let mut lines = Vec::new();
        for op in &self.operations {
            for line in op.code.lines() {
                if line.is_empty() {
                    lines.push(String::new());
                } else {
                    lines.push(format!("{}{}", INDENT, line));
                }
            }
        }

        let has_statement = lines.iter().any(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        });
        if !has_statement {
            lines.push(format!("{}pass", INDENT));
        }
        lines.join("\n")
    }

    /// Complete Manim program with the layout report appended as comments
    pub fn build(&self, class_name: &str) -> Result<String> {
        check_identifier(class_name, "builder::build")?;

        let report: Vec<String> = self
            .scene
            .generate_layout_report()
            .lines()
            .map(|l| format!("# {}", l))
            .collect();

        Ok(format!(
            "from manim import *\n\nclass {}(Scene):\n    def construct(self):\n{}\n\n{}\n",
            class_name,
            self.body(),
            report.join("\n")
        ))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn play_call(animations: &str, params: &[(&str, &str)]) -> String {
    let mut code = format!("self.play({}", animations);
    for (key, value) in params {
        code.push_str(&format!(", {}={}", key, value));
    }
    code.push(')');
    code
}

fn check_identifier(name: &str, operation: &'static str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("'{}' is not a valid identifier", name))
            .with_operation(operation))
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape `text` for a double-quoted Python string literal
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Make `latex` safe inside `r"..."`: no bare quotes, no trailing odd backslash
fn raw_latex(latex: &str) -> String {
    let mut out: String = latex
        .chars()
        .filter(|c| *c != '"' && *c != '\n' && *c != '\r')
        .collect();
    let trailing = out.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathviz_error::ErrorKind;

    #[test]
    fn test_create_text_emits_font_and_position() {
        let mut builder = SceneCodeBuilder::new();
        let emission = builder
            .create_text("title", "Apples", Zone::Top, &TextStyle::default())
            .unwrap();

        let code = emission.code().unwrap();
        assert!(code.starts_with(
            "title = Text(\"Apples\", font=\"Noto Sans CJK SC\", font_size=36, color=WHITE)"
        ));
        assert!(code.ends_with("title.move_to([0.00, 3.25, 0])"));

        let bbox = builder.scene().get_element("title").unwrap().bbox;
        assert!((bbox.width() - 3.0).abs() < 1e-9);
        assert!((bbox.height() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_text_width_is_capped() {
        let mut builder = SceneCodeBuilder::new();
        let long = "x".repeat(200);
        builder
            .create_text("long", &long, Zone::Center, &TextStyle::default())
            .unwrap();
        assert_eq!(builder.scene().get_element("long").unwrap().bbox.width(), 10.0);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut builder = SceneCodeBuilder::new();
        let emission = builder
            .create_text("quote", "say \"hi\"\\", Zone::Center, &TextStyle::default())
            .unwrap();
        assert!(emission.code().unwrap().contains(r#"Text("say \"hi\"\\""#));
    }

    #[test]
    fn test_create_math() {
        let mut builder = SceneCodeBuilder::new();
        let emission = builder
            .create_math("eq", r"3 + 5 = 8", Zone::Center, &MathStyle::default())
            .unwrap();

        assert!(emission.code().unwrap().starts_with(r#"eq = MathTex(r"3 + 5 = 8", font_size=40)"#));
        let bbox = builder.scene().get_element("eq").unwrap().bbox;
        assert!((bbox.width() - 4.5).abs() < 1e-9);
        assert_eq!(raw_latex(r"\frac{1}{2}\"), r"\frac{1}{2}\ ");
    }

    #[test]
    fn test_shape_group_grid() {
        let mut builder = SceneCodeBuilder::new();
        let group = ShapeGroup::new("Circle", 7).with_param("radius", "0.2");
        let code = builder
            .create_shape_group("apples", &group, Zone::Center)
            .unwrap()
            .code()
            .unwrap()
            .to_string();

        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(
            lines[0],
            "apples = VGroup(*[Circle(color=BLUE, fill_opacity=0.7, radius=0.2) for _ in range(7)])"
        );
        assert_eq!(lines[1], "apples.arrange_in_grid(rows=2, cols=5, buff=0.15)");
        assert_eq!(lines[2], "apples.scale(0.7)");
        assert!(lines[3].starts_with("apples.move_to("));

        let bbox = builder.scene().get_element("apples").unwrap().bbox;
        assert_eq!((bbox.width(), bbox.height()), (2.5, 1.0));
    }

    #[test]
    fn test_shape_group_sizes() {
        assert_eq!(ShapeGroup::new("Square", 3).estimated_size(), (1.5, 0.5));
        let row = ShapeGroup::new("Square", 5).arranged(Arrangement::Row).estimated_size();
        assert!((row.0 - 2.0).abs() < 1e-9 && (row.1 - 0.4).abs() < 1e-9);
        let column = ShapeGroup::new("Square", 5).arranged(Arrangement::Column).estimated_size();
        assert!((column.0 - 0.4).abs() < 1e-9 && (column.1 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_shape_group_is_rejected() {
        let mut builder = SceneCodeBuilder::new();
        let err = builder
            .create_shape_group("none", &ShapeGroup::new("Circle", 0), Zone::Center)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_full_zone_is_skipped() {
        let mut builder = SceneCodeBuilder::new();
        let style = TextStyle::sized(36);
        for name in ["a", "b", "c"] {
            assert!(builder.create_text(name, "abcdef", Zone::Top, &style).unwrap().is_code());
        }
        let emission = builder.create_text("d", "abcdef", Zone::Top, &style).unwrap();

        assert_eq!(
            emission,
            Emission::Skipped {
                reason: "top region full".into()
            }
        );
        assert_eq!(builder.operations().len(), 3);
    }

    #[test]
    fn test_text_taller_than_zone_is_skipped() {
        let mut builder = SceneCodeBuilder::new();
        let emission = builder
            .create_text("title", "Hello", Zone::Top, &TextStyle::sized(60))
            .unwrap();

        assert_eq!(
            emission,
            Emission::Skipped {
                reason: "top region full".into()
            }
        );
        assert!(builder.scene().get_element("title").is_none());
        assert!(builder.operations().is_empty());

        let emission = builder
            .create_text("title", "Hello", Zone::Center, &TextStyle::sized(60))
            .unwrap();
        assert!(emission.is_code());
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut builder = SceneCodeBuilder::new();
        let style = TextStyle::default();
        assert!(builder.create_text("1abc", "x", Zone::Top, &style).is_err());
        assert!(builder.create_text("a b", "x", Zone::Top, &style).is_err());
        assert!(builder.build("Bad Name").is_err());
        assert!(builder.scene().is_empty());
    }

    #[test]
    fn test_fade_out_unregisters() {
        let mut builder = SceneCodeBuilder::new();
        builder.create_text("a", "one", Zone::Top, &TextStyle::default()).unwrap();
        builder.create_text("b", "two", Zone::Center, &TextStyle::default()).unwrap();

        let code = builder
            .play_animation(AnimationKind::FadeOut, &["a", "b"], &[("run_time", "0.5")])
            .unwrap();
        assert_eq!(code, "self.play(FadeOut(a), FadeOut(b), run_time=0.5)");
        assert!(builder.scene().is_empty());
    }

    #[test]
    fn test_transform_needs_two_targets() {
        let mut builder = SceneCodeBuilder::new();
        let err = builder
            .play_animation(AnimationKind::Transform, &["a"], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(builder.operations().is_empty());
    }

    #[test]
    fn test_unsafe_transform_is_still_emitted() {
        let mut builder = SceneCodeBuilder::new();
        builder.create_text("a", "ab", Zone::Center, &TextStyle::default()).unwrap();
        builder
            .create_text("wide", "abcdefghijklmnopqrst", Zone::Bottom, &TextStyle::default())
            .unwrap();
        builder.create_text("b", "ab", Zone::Center, &TextStyle::default()).unwrap();
        let before = builder.scene().get_element("a").unwrap().bbox;

        let code = builder
            .play_animation(AnimationKind::Transform, &["a", "wide"], &[])
            .unwrap();
        assert_eq!(code, "self.play(Transform(a, wide))");
        assert_eq!(builder.scene().get_element("a").unwrap().bbox, before);
    }

    #[test]
    fn test_animate_property_unknown_target() {
        let mut builder = SceneCodeBuilder::new();
        let err = builder
            .animate_property("ghost", "set_color", "RED", &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ElementNotFound);
    }

    #[test]
    fn test_animate_scale_is_revalidated() {
        let mut builder = SceneCodeBuilder::new();
        builder.create_text("a", "ab", Zone::Center, &TextStyle::default()).unwrap();
        builder.create_text("b", "ab", Zone::Center, &TextStyle::default()).unwrap();

        let grown = builder.animate_property("a", "scale", "9", &[]).unwrap();
        assert!(!grown.is_code());

        let shrunk = builder
            .animate_property("a", "scale", "0.5", &[("run_time", "1")])
            .unwrap();
        assert_eq!(shrunk.code(), Some("self.play(a.animate.scale(0.5), run_time=1)"));
        let bbox = builder.scene().get_element("a").unwrap().bbox;
        assert!((bbox.width() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_clear_scene_keeps_persistent() {
        let mut builder = SceneCodeBuilder::new();
        builder
            .create_text("title", "Problem", Zone::Top, &TextStyle::default().persistent())
            .unwrap();
        builder.create_text("x", "one", Zone::Center, &TextStyle::default()).unwrap();
        builder.create_text("y", "two", Zone::Bottom, &TextStyle::default()).unwrap();

        assert_eq!(
            builder.clear_scene().as_deref(),
            Some("self.play(FadeOut(x), FadeOut(y))")
        );
        assert_eq!(builder.scene().len(), 1);
        assert!(builder.clear_scene().is_none());
    }

    #[test]
    fn test_build_program() {
        let mut builder = SceneCodeBuilder::new();
        builder.start_step(1, "Count the apples");
        builder.create_text("label", "Apples", Zone::Top, &TextStyle::default()).unwrap();
        builder.play_animation(AnimationKind::Write, &["label"], &[]).unwrap();
        builder.wait(1.5);
        builder.add_comment("done");

        let program = builder.build("AppleScene").unwrap();
        assert!(program.starts_with("from manim import *\n\nclass AppleScene(Scene):\n    def construct(self):\n"));
        assert!(program.contains("\n        # ========== Step 1: Count the apples =========="));
        assert!(program.contains("\n        label.move_to([0.00, 3.25, 0])"));
        assert!(program.contains("\n        self.play(Write(label))"));
        assert!(program.contains("\n        self.wait(1.5)"));
        assert!(program.contains("# === Scene layout (step 1) ==="));
        assert_eq!(builder.scene().current_step(), 1);
    }

    #[test]
    fn test_empty_build_has_a_statement() {
        let mut builder = SceneCodeBuilder::new();
        builder.add_comment("nothing yet");
        let program = builder.build("Empty").unwrap();
        assert!(program.contains("        # nothing yet\n        pass"));
    }

    #[test]
    fn test_operation_log_replays_body() {
        let mut builder = SceneCodeBuilder::new();
        builder.create_text("a", "one", Zone::Top, &TextStyle::default()).unwrap();
        builder.wait(1.0);

        let kinds: Vec<_> = builder.operations().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::CreateText, OperationKind::Wait]);
        assert_eq!(builder.operations()[0].affects, vec!["a".to_string()]);
        assert_eq!(builder.operations()[0].metadata["zone"], "top");

        let replayed: Vec<String> = builder
            .operations()
            .iter()
            .flat_map(|op| op.code.lines().map(|l| format!("{}{}", INDENT, l)))
            .collect();
        assert_eq!(replayed.join("\n"), builder.body());
    }
}

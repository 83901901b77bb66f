//! # Scene State Manager
//!
//! The authoritative registry of what is on screen and where. Every element
//! is placed through [`SceneStateManager::add_element`], which searches a
//! fixed list of candidate positions inside the element's zone and only
//! accepts one that keeps the configured margin to every neighbour.
//!
//! ## Design Philosophy
//!
//! - A full zone or an unsafe transform is an expected outcome, returned as a
//!   value ([`Placement::ZoneFull`], [`TransformCheck::WouldOverlap`])
//! - Programming mistakes (duplicate names, nonsense sizes) are errors
//! - Listing order is insertion order so layouts are reproducible

use crate::geometry::{BoundingBox, Zone, DEFAULT_MARGIN};
use mathviz_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Horizontal inset of the left/right candidates from the zone edge
const SIDE_INSET: f64 = 0.5;

/// Vertical inset of the top/bottom candidates from the zone edge
const EDGE_INSET: f64 = 0.3;

/// What kind of visual an element is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Math,
    Shape,
    Group,
    Animated,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Text => "text",
            ElementType::Math => "math",
            ElementType::Shape => "shape",
            ElementType::Group => "group",
            ElementType::Animated => "animated",
        }
    }
}

/// A placed visual primitive or group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneElement {
    /// Variable name in the generated scene
    pub name: String,
    pub element_type: ElementType,
    pub zone: Zone,
    pub bbox: BoundingBox,
    /// Stacking order
    pub layer: i32,
    /// Survives `clear_non_persistent`
    pub persistent: bool,
    /// Containing group, if any
    pub parent: Option<String>,
    pub created_at_step: usize,
    /// Renderer-specific parameters (content, font size, shape type, ...)
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Parameters for [`SceneStateManager::add_element`]
#[derive(Debug, Clone)]
pub struct ElementRequest {
    pub name: String,
    pub element_type: ElementType,
    pub zone: Zone,
    pub width: f64,
    pub height: f64,
    pub persistent: bool,
    pub parent: Option<String>,
    pub layer: i32,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ElementRequest {
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        zone: Zone,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            name: name.into(),
            element_type,
            zone,
            width,
            height,
            persistent: false,
            parent: None,
            layer: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of a placement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// The element is registered at `bbox`
    Placed {
        bbox: BoundingBox,
        /// Renderer-agnostic instruction, e.g. `move element to (0.00, 3.25)`
        directive: String,
    },
    /// No candidate position was free; nothing was registered
    ZoneFull { zone: Zone, message: String },
}

impl Placement {
    pub fn is_placed(&self) -> bool {
        matches!(self, Placement::Placed { .. })
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Placement::Placed { bbox, .. } => Some(*bbox),
            Placement::ZoneFull { .. } => None,
        }
    }

    /// The positioning directive, or the capacity message when the zone is full
    pub fn message(&self) -> &str {
        match self {
            Placement::Placed { directive, .. } => directive,
            Placement::ZoneFull { message, .. } => message,
        }
    }

    /// Manim line that moves `name` to the placed position
    pub fn move_to_line(&self, name: &str) -> Option<String> {
        self.bbox().map(|bbox| {
            let (x, y) = bbox.center();
            format!("{}.move_to([{:.2}, {:.2}, 0])", name, x, y)
        })
    }
}

/// Result of [`SceneStateManager::suggest_transform_target`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransformCheck {
    /// The resize was committed to the source element
    Safe { source: String },
    /// Resizing in place would collide with `other`; state is untouched
    WouldOverlap { source: String, other: String },
    /// No element with that name is on screen
    UnknownSource { source: String },
}

impl TransformCheck {
    pub fn can_transform(&self) -> bool {
        matches!(self, TransformCheck::Safe { .. })
    }

    pub fn message(&self) -> String {
        match self {
            TransformCheck::Safe { source } => format!("transform of {} is safe", source),
            TransformCheck::WouldOverlap { other, .. } => {
                format!("would overlap with {}; use FadeOut + FadeIn instead", other)
            }
            TransformCheck::UnknownSource { source } => format!("element {} does not exist", source),
        }
    }
}

/// Serializable summary of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementExport {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub zone: Zone,
    pub position: (f64, f64),
    pub size: (f64, f64),
    pub persistent: bool,
}

/// Serializable summary of the whole scene, for handing state between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneExport {
    pub current_step: usize,
    pub elements: BTreeMap<String, ElementExport>,
    pub zone_utilization: BTreeMap<Zone, usize>,
}

/// Registry of live scene elements for one generated scene
#[derive(Debug, Clone)]
pub struct SceneStateManager {
    /// Live elements in insertion order
    elements: Vec<SceneElement>,
    current_step: usize,
    /// One full snapshot per `next_step`
    history: Vec<Vec<SceneElement>>,
    margin: f64,
}

impl Default for SceneStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStateManager {
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_MARGIN)
    }

    /// Use a custom safety margin between elements
    pub fn with_margin(margin: f64) -> Self {
        Self {
            elements: Vec::new(),
            current_step: 0,
            history: Vec::new(),
            margin,
        }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    // ========================================================================
    // Steps and history
    // ========================================================================

    /// Snapshot the current elements and advance the step counter
    pub fn next_step(&mut self) {
        self.history.push(self.elements.clone());
        self.current_step += 1;
        debug!(step = self.current_step, "scene advanced to next step");
    }

    /// All snapshots, oldest first
    pub fn history(&self) -> &[Vec<SceneElement>] {
        &self.history
    }

    /// Elements that were live when `step` ended
    pub fn snapshot_at(&self, step: usize) -> Option<&[SceneElement]> {
        self.history.get(step).map(|s| s.as_slice())
    }

    /// Live elements created during `step`
    pub fn created_at(&self, step: usize) -> Vec<&SceneElement> {
        self.elements
            .iter()
            .filter(|e| e.created_at_step == step)
            .collect()
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Place a new element without overlapping anything already in its zone.
    ///
    /// Returns `Ok(Placement::ZoneFull)` when every candidate position is taken;
    /// nothing is registered in that case.
    pub fn add_element(&mut self, request: ElementRequest) -> Result<Placement> {
        if self.get_element(&request.name).is_some() {
            return Err(Error::duplicate_element(&request.name)
                .with_operation("scene::add_element"));
        }
        if !(request.width.is_finite() && request.height.is_finite())
            || request.width <= 0.0
            || request.height <= 0.0
        {
            return Err(Error::invalid_argument(format!(
                "element '{}' has invalid size {}x{}",
                request.name, request.width, request.height
            ))
            .with_operation("scene::add_element"));
        }

        let Some(bbox) = self.find_safe_position(request.zone, request.width, request.height)
        else {
            warn!(zone = %request.zone, element = %request.name, "zone has no room left");
            return Ok(Placement::ZoneFull {
                zone: request.zone,
                message: format!("{} region full", request.zone),
            });
        };

        let (x, y) = bbox.center();
        let directive = format!("move element to ({:.2}, {:.2})", x, y);

        info!(element = %request.name, zone = %request.zone, %bbox, "element placed");
        self.elements.push(SceneElement {
            name: request.name,
            element_type: request.element_type,
            zone: request.zone,
            bbox,
            layer: request.layer,
            persistent: request.persistent,
            parent: request.parent,
            created_at_step: self.current_step,
            metadata: request.metadata,
        });

        Ok(Placement::Placed { bbox, directive })
    }

    /// First free candidate position in `zone`, if any
    fn find_safe_position(&self, zone: Zone, width: f64, height: f64) -> Option<BoundingBox> {
        let zone_bbox = zone.bounds();
        let (cx, cy) = zone_bbox.center();

        let occupied: Vec<&BoundingBox> = self
            .elements
            .iter()
            .filter(|e| e.zone == zone)
            .map(|e| &e.bbox)
            .collect();

        if occupied.is_empty() {
            return Some(BoundingBox::from_center(cx, cy, width, height))
                .filter(|candidate| zone_bbox.contains(candidate));
        }

        let candidates = [
            (cx, cy),
            (zone_bbox.x_min + width / 2.0 + SIDE_INSET, cy),
            (zone_bbox.x_max - width / 2.0 - SIDE_INSET, cy),
            (cx, zone_bbox.y_max - height / 2.0 - EDGE_INSET),
            (cx, zone_bbox.y_min + height / 2.0 + EDGE_INSET),
        ];

        candidates
            .iter()
            .map(|&(x, y)| BoundingBox::from_center(x, y, width, height))
            .find(|candidate| {
                zone_bbox.contains(candidate)
                    && !occupied.iter().any(|b| candidate.overlaps(b, self.margin))
            })
    }

    /// Remove an element; returns whether it existed
    pub fn remove_element(&mut self, name: &str) -> bool {
        match self.elements.iter().position(|e| e.name == name) {
            Some(idx) => {
                self.elements.remove(idx);
                debug!(element = name, "element removed");
                true
            }
            None => false,
        }
    }

    /// Drop every non-persistent element; returns how many were removed
    pub fn clear_non_persistent(&mut self) -> usize {
        let before = self.elements.len();
        self.elements.retain(|e| e.persistent);
        let removed = before - self.elements.len();
        info!(removed, "cleared non-persistent elements");
        removed
    }

    pub fn get_element(&self, name: &str) -> Option<&SceneElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Live elements, optionally restricted to one zone, in insertion order
    pub fn list_elements(&self, zone: Option<Zone>) -> Vec<&SceneElement> {
        self.elements
            .iter()
            .filter(|e| zone.map_or(true, |z| e.zone == z))
            .collect()
    }

    /// Whether two live elements overlap; false if either is missing
    pub fn check_overlap(&self, a: &str, b: &str) -> bool {
        match (self.get_element(a), self.get_element(b)) {
            (Some(a), Some(b)) => a.bbox.overlaps(&b.bbox, self.margin),
            _ => false,
        }
    }

    /// Check whether `source` can grow or shrink in place to `width` x `height`.
    ///
    /// The hypothetical box keeps the source's centre and is tested against
    /// every other live element. Only a `Safe` verdict commits the new size.
    pub fn suggest_transform_target(&mut self, source: &str, width: f64, height: f64) -> TransformCheck {
        let Some(idx) = self.elements.iter().position(|e| e.name == source) else {
            return TransformCheck::UnknownSource {
                source: source.to_string(),
            };
        };

        let target = self.elements[idx].bbox.resized(width, height);
        let conflict = self
            .elements
            .iter()
            .enumerate()
            .find(|(i, e)| *i != idx && target.overlaps(&e.bbox, self.margin));

        if let Some((_, other)) = conflict {
            return TransformCheck::WouldOverlap {
                source: source.to_string(),
                other: other.name.clone(),
            };
        }

        self.elements[idx].bbox = target;
        TransformCheck::Safe {
            source: source.to_string(),
        }
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Human-readable dump of every zone and its elements
    pub fn generate_layout_report(&self) -> String {
        let mut report = vec![format!("=== Scene layout (step {}) ===", self.current_step)];

        for zone in Zone::ALL {
            let elements = self.list_elements(Some(zone));
            report.push(format!(
                "{} zone ({} elements):",
                zone.as_str().to_uppercase(),
                elements.len()
            ));
            for elem in elements {
                let (x, y) = elem.bbox.center();
                report.push(format!(
                    "  - {}: {}, at ({:.1}, {:.1}), size {:.1}x{:.1}{}",
                    elem.name,
                    elem.element_type.as_str(),
                    x,
                    y,
                    elem.bbox.width(),
                    elem.bbox.height(),
                    if elem.persistent { ", persistent" } else { "" }
                ));
            }
        }

        report.join("\n")
    }

    /// Serializable summary for passing scene state across agent boundaries
    pub fn export_state(&self) -> SceneExport {
        let elements = self
            .elements
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    ElementExport {
                        element_type: e.element_type,
                        zone: e.zone,
                        position: e.bbox.center(),
                        size: (e.bbox.width(), e.bbox.height()),
                        persistent: e.persistent,
                    },
                )
            })
            .collect();

        let zone_utilization = Zone::ALL
            .iter()
            .map(|&z| (z, self.elements.iter().filter(|e| e.zone == z).count()))
            .collect();

        SceneExport {
            current_step: self.current_step,
            elements,
            zone_utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, zone: Zone, width: f64, height: f64) -> ElementRequest {
        ElementRequest::new(name, ElementType::Text, zone, width, height)
    }

    fn assert_layout_invariants(scene: &SceneStateManager) {
        let elements = scene.list_elements(None);
        for (i, a) in elements.iter().enumerate() {
            for b in &elements[i + 1..] {
                if a.zone == b.zone {
                    assert!(
                        !a.bbox.overlaps(&b.bbox, scene.margin()),
                        "{} overlaps {}",
                        a.name,
                        b.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_first_element_is_centered() {
        let mut scene = SceneStateManager::new();
        let placement = scene.add_element(text("a", Zone::Top, 2.0, 1.0)).unwrap();

        let bbox = placement.bbox().unwrap();
        assert_eq!(bbox.center(), Zone::Top.bounds().center());
        assert_eq!(placement.message(), "move element to (0.00, 3.25)");
        assert_eq!(
            placement.move_to_line("a").as_deref(),
            Some("a.move_to([0.00, 3.25, 0])")
        );
    }

    #[test]
    fn test_zone_exhaustion() {
        let mut scene = SceneStateManager::new();
        for name in ["a", "b", "c"] {
            let placement = scene.add_element(text(name, Zone::Top, 3.0, 1.0)).unwrap();
            assert!(placement.is_placed(), "{} should fit", name);
        }

        let placement = scene.add_element(text("d", Zone::Top, 3.0, 1.0)).unwrap();
        assert!(!placement.is_placed());
        assert_eq!(placement.message(), "top region full");
        assert!(scene.get_element("d").is_none());

        assert_eq!(scene.len(), 3);
        assert_layout_invariants(&scene);
    }

    fn approx(actual: (f64, f64), expected: (f64, f64)) -> bool {
        (actual.0 - expected.0).abs() < 1e-9 && (actual.1 - expected.1).abs() < 1e-9
    }

    #[test]
    fn test_candidate_order() {
        let mut scene = SceneStateManager::new();
        for name in ["center", "left", "right", "upper", "lower"] {
            let placement = scene.add_element(text(name, Zone::Center, 2.0, 0.6)).unwrap();
            assert!(placement.is_placed(), "{} should fit", name);
        }

        let center = |name: &str| scene.get_element(name).unwrap().bbox.center();
        assert!(approx(center("center"), (0.0, 0.0)));
        assert!(approx(center("left"), (-4.5, 0.0)));
        assert!(approx(center("right"), (4.5, 0.0)));
        assert!(approx(center("upper"), (0.0, 1.4)));
        assert!(approx(center("lower"), (0.0, -1.4)));

        let placement = scene.add_element(text("extra", Zone::Center, 2.0, 0.6)).unwrap();
        assert_eq!(placement.message(), "center region full");
        assert_layout_invariants(&scene);
    }

    #[test]
    fn test_placements_stay_inside_zone() {
        let mut scene = SceneStateManager::new();
        let sizes = [(4.0, 1.0), (1.0, 0.5), (2.5, 0.8), (6.0, 1.2), (0.5, 0.5), (3.0, 0.6)];
        for zone in Zone::ALL {
            for (i, (w, h)) in sizes.iter().enumerate() {
                let name = format!("{}_{}", zone, i);
                if let Placement::Placed { bbox, .. } =
                    scene.add_element(text(&name, zone, *w, *h)).unwrap()
                {
                    assert!(zone.bounds().contains(&bbox), "{} escaped {}", name, zone);
                }
            }
        }
        assert_layout_invariants(&scene);
    }

    #[test]
    fn test_oversized_element_never_fits() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Bottom, 1.0, 0.5)).unwrap();
        let placement = scene.add_element(text("b", Zone::Bottom, 1.0, 2.0)).unwrap();
        assert_eq!(
            placement,
            Placement::ZoneFull {
                zone: Zone::Bottom,
                message: "bottom region full".into()
            }
        );
    }

    #[test]
    fn test_oversized_first_element_is_rejected() {
        let mut scene = SceneStateManager::new();

        let placement = scene.add_element(text("tall", Zone::Top, 2.0, 2.0)).unwrap();
        assert!(!placement.is_placed());
        assert!(scene.is_empty());

        let placement = scene.add_element(text("wide", Zone::Center, 12.5, 1.0)).unwrap();
        assert!(!placement.is_placed());
        assert!(scene.get_element("wide").is_none());

        let placement = scene.add_element(text("fits", Zone::Top, 2.0, 1.5)).unwrap();
        assert!(Zone::Top.bounds().contains(&placement.bbox().unwrap()));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Top, 1.0, 1.0)).unwrap();
        let err = scene.add_element(text("a", Zone::Bottom, 1.0, 1.0)).unwrap_err();

        assert_eq!(err.kind(), mathviz_error::ErrorKind::DuplicateElement);
        assert_eq!(scene.get_element("a").unwrap().zone, Zone::Top);
    }

    #[test]
    fn test_invalid_size_is_rejected() {
        let mut scene = SceneStateManager::new();
        assert!(scene.add_element(text("a", Zone::Top, 0.0, 1.0)).is_err());
        assert!(scene.add_element(text("b", Zone::Top, f64::NAN, 1.0)).is_err());
        assert!(scene.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Top, 1.0, 1.0)).unwrap();
        scene.add_element(text("b", Zone::Center, 1.0, 1.0)).unwrap();

        assert!(scene.remove_element("a"));
        assert!(!scene.remove_element("a"));
        assert!(!scene.remove_element("missing"));
        assert_eq!(scene.len(), 1);
        assert!(scene.get_element("b").is_some());
    }

    #[test]
    fn test_clear_non_persistent() {
        let mut scene = SceneStateManager::new();
        scene
            .add_element(text("title", Zone::Top, 3.0, 1.0).persistent(true))
            .unwrap();
        scene.add_element(text("note", Zone::Center, 3.0, 1.0)).unwrap();

        assert_eq!(scene.clear_non_persistent(), 1);
        let names: Vec<_> = scene.list_elements(None).iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["title".to_string()]);
    }

    #[test]
    fn test_removed_space_is_reused() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Top, 3.0, 1.0)).unwrap();
        scene.add_element(text("b", Zone::Top, 3.0, 1.0)).unwrap();
        scene.remove_element("a");

        let placement = scene.add_element(text("c", Zone::Top, 3.0, 1.0)).unwrap();
        assert_eq!(placement.bbox().unwrap().center(), Zone::Top.bounds().center());
    }

    #[test]
    fn test_list_elements_keeps_insertion_order() {
        let mut scene = SceneStateManager::new();
        for name in ["z", "a", "m"] {
            scene.add_element(text(name, Zone::Center, 1.0, 0.5)).unwrap();
        }
        scene.add_element(text("t", Zone::Top, 1.0, 0.5)).unwrap();

        let all: Vec<_> = scene.list_elements(None).iter().map(|e| e.name.as_str()).collect();
        assert_eq!(all, vec!["z", "a", "m", "t"]);
        assert_eq!(scene.list_elements(Some(Zone::Top)).len(), 1);
    }

    #[test]
    fn test_check_overlap() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Center, 2.0, 1.0)).unwrap();
        scene.add_element(text("b", Zone::Center, 2.0, 1.0)).unwrap();

        assert!(!scene.check_overlap("a", "b"));
        assert!(scene.check_overlap("a", "a"));
        assert!(!scene.check_overlap("a", "missing"));
    }

    #[test]
    fn test_transform_blocked_leaves_state_untouched() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Center, 2.0, 1.0)).unwrap();
        scene.add_element(text("b", Zone::Center, 2.0, 1.0)).unwrap();
        let before = scene.get_element("a").unwrap().bbox;

        let check = scene.suggest_transform_target("a", 9.0, 1.0);
        assert_eq!(
            check,
            TransformCheck::WouldOverlap {
                source: "a".into(),
                other: "b".into()
            }
        );
        assert!(!check.can_transform());
        assert!(check.message().contains("would overlap with b"));
        assert_eq!(scene.get_element("a").unwrap().bbox, before);
    }

    #[test]
    fn test_transform_safe_commits_resize() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Center, 2.0, 1.0)).unwrap();

        let check = scene.suggest_transform_target("a", 4.0, 1.5);
        assert!(check.can_transform());

        let bbox = scene.get_element("a").unwrap().bbox;
        assert_eq!(bbox.center(), (0.0, 0.0));
        assert_eq!((bbox.width(), bbox.height()), (4.0, 1.5));
    }

    #[test]
    fn test_transform_checks_other_zones() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("title", Zone::Top, 2.0, 1.0)).unwrap();
        scene.add_element(text("body", Zone::Center, 2.0, 1.0)).unwrap();

        let check = scene.suggest_transform_target("body", 2.0, 5.0);
        assert!(matches!(check, TransformCheck::WouldOverlap { ref other, .. } if other == "title"));
    }

    #[test]
    fn test_transform_unknown_source() {
        let mut scene = SceneStateManager::new();
        let check = scene.suggest_transform_target("ghost", 1.0, 1.0);
        assert_eq!(check, TransformCheck::UnknownSource { source: "ghost".into() });
    }

    #[test]
    fn test_placement_is_deterministic() {
        let run = || {
            let mut scene = SceneStateManager::new();
            let mut boxes = Vec::new();
            for i in 0..8 {
                let zone = Zone::ALL[i % 3];
                let placement = scene
                    .add_element(text(&format!("e{}", i), zone, 1.0 + i as f64 * 0.3, 0.6))
                    .unwrap();
                boxes.push(placement.bbox());
            }
            boxes
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_history_and_steps() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("a", Zone::Top, 1.0, 1.0)).unwrap();
        scene.next_step();
        scene.add_element(text("b", Zone::Center, 1.0, 1.0)).unwrap();
        scene.next_step();

        assert_eq!(scene.current_step(), 2);
        assert_eq!(scene.history().len(), 2);
        assert_eq!(scene.snapshot_at(0).unwrap().len(), 1);
        assert_eq!(scene.snapshot_at(1).unwrap().len(), 2);
        assert!(scene.snapshot_at(2).is_none());
        assert_eq!(scene.created_at(1)[0].name, "b");
    }

    #[test]
    fn test_export_state() {
        let mut scene = SceneStateManager::new();
        scene
            .add_element(
                text("title", Zone::Top, 2.0, 1.0)
                    .persistent(true)
                    .with_meta("content", "Apples"),
            )
            .unwrap();
        scene.add_element(text("x", Zone::Center, 1.0, 1.0)).unwrap();

        let export = scene.export_state();
        assert_eq!(export.current_step, 0);
        assert_eq!(export.zone_utilization[&Zone::Top], 1);
        assert_eq!(export.zone_utilization[&Zone::Bottom], 0);
        assert!(export.elements["title"].persistent);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["elements"]["title"]["type"], "text");
        assert_eq!(json["zone_utilization"]["center"], 1);
    }

    #[test]
    fn test_layout_report_lists_every_zone() {
        let mut scene = SceneStateManager::new();
        scene.add_element(text("answer", Zone::Bottom, 2.0, 1.0)).unwrap();

        let report = scene.generate_layout_report();
        assert!(report.contains("TOP zone (0 elements)"));
        assert!(report.contains("BOTTOM zone (1 elements)"));
        assert!(report.contains("answer: text, at (0.0, "));
        assert!(report.contains("size 2.0x1.0"));
    }
}

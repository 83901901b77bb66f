//! # Screen Geometry
//!
//! Fixed screen zones and axis-aligned bounding boxes in Manim's coordinate
//! space (a 14 x 8 frame centred on the origin).
//!
//! The zone table is part of the public contract: generated code relies on
//! the exact boundaries to keep titles, main visuals and results apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Manim frame width in scene units
pub const SCREEN_WIDTH: f64 = 14.0;

/// Manim frame height in scene units
pub const SCREEN_HEIGHT: f64 = 8.0;

/// Default gap that must separate two elements
pub const DEFAULT_MARGIN: f64 = 0.3;

/// A named region of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Titles and step labels
    Top,
    /// Main visuals
    Center,
    /// Results and answers
    Bottom,
}

impl Zone {
    /// All zones, top to bottom
    pub const ALL: [Zone; 3] = [Zone::Top, Zone::Center, Zone::Bottom];

    /// The fixed region this zone covers
    pub const fn bounds(&self) -> BoundingBox {
        match self {
            Zone::Top => BoundingBox {
                x_min: -6.0,
                y_min: 2.5,
                x_max: 6.0,
                y_max: 4.0,
            },
            Zone::Center => BoundingBox {
                x_min: -6.0,
                y_min: -2.0,
                x_max: 6.0,
                y_max: 2.0,
            },
            Zone::Bottom => BoundingBox {
                x_min: -6.0,
                y_min: -4.0,
                x_max: 6.0,
                y_max: -2.5,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Top => "top",
            Zone::Center => "center",
            Zone::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Zone {
    type Err = mathviz_error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Zone::Top),
            "center" | "centre" => Ok(Zone::Center),
            "bottom" => Ok(Zone::Bottom),
            other => Err(mathviz_error::Error::invalid_argument(format!(
                "unknown zone '{}'",
                other
            ))),
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        debug_assert!(x_max >= x_min, "malformed box: x_max < x_min");
        debug_assert!(y_max >= y_min, "malformed box: y_max < y_min");
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Box of the given size centred on `(cx, cy)`
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Same centre, new size
    pub fn resized(&self, width: f64, height: f64) -> Self {
        let (cx, cy) = self.center();
        Self::from_center(cx, cy, width, height)
    }

    /// Whether `other` lies fully inside this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x_min >= self.x_min
            && other.x_max <= self.x_max
            && other.y_min >= self.y_min
            && other.y_max <= self.y_max
    }

    /// Whether the boxes come closer than `margin` on both axes.
    ///
    /// Equivalent to growing each box by `margin / 2` on every side and testing
    /// for intersection; touching counts as overlapping. The gaps are computed
    /// from both directions so the predicate is exactly commutative.
    pub fn overlaps(&self, other: &BoundingBox, margin: f64) -> bool {
        let gap_x = (other.x_min - self.x_max).max(self.x_min - other.x_max);
        let gap_y = (other.y_min - self.y_max).max(self.y_min - other.y_max);
        !(gap_x > margin || gap_y > margin)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}] .. [{:.2}, {:.2}]",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

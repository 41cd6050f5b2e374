//! Interactive brush strokes on a [`FlowFieldGrid`].
//!
//! A [`Brush`] bundles the mode, radius and strength chosen by the user and
//! is applied once per drag sample with the cursor position and the drag
//! direction.

use std::fmt;
use std::str::FromStr;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::grid::FlowFieldGrid;

/// What a brush stroke does to the cells under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrushMode {
    /// Align cells with the drag direction.
    #[default]
    Directional,
    /// Rotate cells around the cursor.
    Swirl,
    /// Point cells toward the cursor.
    Attract,
    /// Point cells away from the cursor.
    Repel,
}

const BRUSH_MODE_NAMES: &[&str] = &["directional", "swirl", "attract", "repel"];

impl BrushMode {
    pub fn name(self) -> &'static str {
        match self {
            BrushMode::Directional => "directional",
            BrushMode::Swirl => "swirl",
            BrushMode::Attract => "attract",
            BrushMode::Repel => "repel",
        }
    }

    pub fn list_names() -> &'static [&'static str] {
        BRUSH_MODE_NAMES
    }
}

impl FromStr for BrushMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "directional" | "direction" => Ok(BrushMode::Directional),
            "swirl" => Ok(BrushMode::Swirl),
            "attract" => Ok(BrushMode::Attract),
            "repel" => Ok(BrushMode::Repel),
            _ => Err(FlowError::UnknownBrushMode(s.to_string())),
        }
    }
}

impl fmt::Display for BrushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User-facing brush settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub mode: BrushMode,
    /// World-space radius.
    pub radius: f64,
    /// Blend strength at the centre, in [0, 1].
    pub strength: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            mode: BrushMode::Directional,
            radius: 3.0,
            strength: 0.5,
        }
    }
}

impl Brush {
    pub fn new(mode: BrushMode, radius: f64, strength: f64) -> Self {
        Self {
            mode,
            radius,
            strength,
        }
    }

    /// Applies one drag sample at `cursor`. `drag` is only used by
    /// [`BrushMode::Directional`]; a zero drag leaves the field unchanged.
    pub fn apply(&self, grid: &mut FlowFieldGrid, cursor: DVec2, drag: DVec2) {
        match self.mode {
            BrushMode::Directional => grid.apply_brush(cursor, self.radius, drag, self.strength),
            BrushMode::Swirl => grid.apply_swirl_brush(cursor, self.radius, self.strength),
            BrushMode::Attract => {
                grid.apply_radial_brush(cursor, self.radius, self.strength, false)
            }
            BrushMode::Repel => grid.apply_radial_brush(cursor, self.radius, self.strength, true),
        }
    }
}

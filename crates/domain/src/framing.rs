//! Camera framing heuristic for street-level imagery

use crate::model::{FieldValue, Lot};

/// Name of the optional lot column holding the building's floor count
pub const FLOORS_FIELD: &str = "floors";

/// Field of view and pitch, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub fov: u32,
    pub pitch: f64,
}

impl Default for Framing {
    /// Typical two-story building
    fn default() -> Self {
        Self {
            fov: 65,
            pitch: 10.0,
        }
    }
}

/// Pick framing parameters from a building's floor count.
///
/// Tiers overlap, so they are checked in a fixed order and the first match
/// wins. Absent or non-numeric input falls through to the default.
pub fn aim_camera(floors: Option<&FieldValue>) -> Framing {
    let default = Framing::default();
    let Some(floors) = floors.and_then(FieldValue::as_f64) else {
        return default;
    };

    let (fov, pitch) = if floors == 3.0 {
        (72, default.pitch)
    } else if floors == 4.0 {
        (76, 15.0)
    } else if floors >= 10.0 {
        (90, 30.0)
    } else if floors >= 8.0 {
        (90, 25.0)
    } else if floors == 6.0 {
        (86, default.pitch)
    } else if floors >= 5.0 {
        (81, 20.0)
    } else {
        (default.fov, default.pitch)
    };

    Framing { fov, pitch }
}

/// Framing for a lot, read from its `floors` column when present
pub fn aim_camera_at(lot: &Lot) -> Framing {
    aim_camera(lot.extra.get(FLOORS_FIELD))
}

//! Class-aware distance between positions and nearest-position lookup.
//!
//! Gantries compare on `X Y Z` only.  Hexapods also compare rotary axes,
//! with each squared rotary difference scaled by [`ROTARY_WEIGHT`]:
//!
//! ```text
//! d = sqrt(dx² + dy² + dz² + ROTARY_WEIGHT · (du² + dv² + dw²))
//! ```

use std::collections::BTreeMap;

use motionsvc_types::{DeviceClass, Position};

/// Scale applied to squared rotary differences for hexapods.
pub const ROTARY_WEIGHT: f64 = 0.1;

/// Distance between `a` and `b` as seen by a device of `class`.
pub fn position_distance(class: DeviceClass, a: &Position, b: &Position) -> f64 {
    let (dx, dy, dz) = (a.x - b.x, a.y - b.y, a.z - b.z);
    let linear = dx * dx + dy * dy + dz * dz;
    match class {
        DeviceClass::Gantry => linear.sqrt(),
        DeviceClass::Hexapod => {
            let (du, dv, dw) = (a.u - b.u, a.v - b.v, a.w - b.w);
            (linear + ROTARY_WEIGHT * (du * du + dv * dv + dw * dw)).sqrt()
        }
    }
}

/// The taught position nearest to `live`, with its distance.  Ties go to
/// the name that sorts first.
pub fn closest_position<'a>(
    class: DeviceClass,
    live: &Position,
    positions: &'a BTreeMap<String, Position>,
) -> Option<(&'a str, f64)> {
    positions
        .iter()
        .map(|(name, p)| (name.as_str(), position_distance(class, live, p)))
        .filter(|(_, d)| d.is_finite())
        .fold(None, |best, (name, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((name, d)),
        })
}

/// Name of the nearest taught position if it lies within `tolerance`
/// (inclusive) of `live`.
pub fn match_position(
    class: DeviceClass,
    live: &Position,
    positions: &BTreeMap<String, Position>,
    tolerance: f64,
) -> Option<String> {
    closest_position(class, live, positions)
        .filter(|(_, d)| *d <= tolerance)
        .map(|(name, _)| name.to_string())
}

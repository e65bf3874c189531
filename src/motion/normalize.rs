// Angle normalization
//
// Maps a raw joint angle into a clamped progress ratio in [0, 1] given the
// plan's configured range. Pure function, no state.

/// Normalize `angle` against the plan's `[angle_min, angle_max]` range.
///
/// A misconfigured plan with `angle_max <= angle_min` substitutes
/// `angle_max = angle_min + 1` so a running session degrades instead of
/// dividing by zero. Output is always in `[0, 1]`.
pub fn normalize(angle: f64, angle_min: f64, angle_max: f64) -> f64 {
    let angle_max = if angle_max <= angle_min {
        angle_min + 1.0
    } else {
        angle_max
    };
    ((angle - angle_min) / (angle_max - angle_min)).clamp(0.0, 1.0)
}

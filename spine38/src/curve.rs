//! Keyframe interpolation curves.
//!
//! A Bezier segment is not solved exactly. It is sampled once, when the curve is built, into nine
//! forward-difference points of `y` as a function of `x` in the unit square; evaluation is then a
//! linear scan over those points.

/// Number of `(x, y)` samples stored per Bezier curve.
pub const BEZIER_SAMPLES: usize = 9;

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier(BezierCurve),
}

/// Precomputed samples of a cubic Bezier between `(0,0)` and `(1,1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BezierCurve {
    points: [[f32; 2]; BEZIER_SAMPLES],
}

impl BezierCurve {
    pub fn new(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let tmpx = (-cx1 * 2.0 + cx2) * 0.03;
        let tmpy = (-cy1 * 2.0 + cy2) * 0.03;
        let dddfx = ((cx1 - cx2) * 3.0 + 1.0) * 0.006;
        let dddfy = ((cy1 - cy2) * 3.0 + 1.0) * 0.006;
        let mut ddfx = tmpx * 2.0 + dddfx;
        let mut ddfy = tmpy * 2.0 + dddfy;
        let mut dfx = cx1 * 0.3 + tmpx + dddfx * 0.16666667;
        let mut dfy = cy1 * 0.3 + tmpy + dddfy * 0.16666667;

        let mut x = dfx;
        let mut y = dfy;
        let mut points = [[0.0f32; 2]; BEZIER_SAMPLES];
        for point in &mut points {
            *point = [x, y];
            dfx += ddfx;
            dfy += ddfy;
            ddfx += dddfx;
            ddfy += dddfy;
            x += dfx;
            y += dfy;
        }
        Self { points }
    }

    fn percent(&self, percent: f32) -> f32 {
        let mut prev = [0.0f32, 0.0f32];
        for &[x, y] in &self.points {
            if x >= percent {
                return prev[1] + (y - prev[1]) * (percent - prev[0]) / (x - prev[0]);
            }
            prev = [x, y];
        }
        let [x, y] = prev;
        y + (1.0 - y) * (percent - x) / (1.0 - x)
    }
}

impl Curve {
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        Self::Bezier(BezierCurve::new(cx1, cy1, cx2, cy2))
    }

    /// Maps a linear fraction of the way between two keys to the eased fraction.
    pub fn percent(&self, percent: f32) -> f32 {
        let percent = percent.clamp(0.0, 1.0);
        match self {
            Self::Linear => percent,
            Self::Stepped => 0.0,
            Self::Bezier(b) => b.percent(percent),
        }
    }
}

/// Index of the first frame whose time is greater than `time`.
///
/// Callers handle `time` before the first frame and at or after the last frame, so the result is
/// always a valid "next" frame with a valid previous frame.
pub(crate) fn search<T>(frames: &[T], time: f32, frame_time: impl Fn(&T) -> f32) -> usize {
    frames
        .partition_point(|f| frame_time(f) <= time)
        .clamp(1, frames.len().saturating_sub(1).max(1))
}

/// Index of the last frame whose time is less than or equal to `time`.
pub(crate) fn search1<T>(frames: &[T], time: f32, frame_time: impl Fn(&T) -> f32) -> usize {
    frames
        .partition_point(|f| frame_time(f) <= time)
        .saturating_sub(1)
}

/// Curve-adjusted fraction between `prev` and `next` frame times.
pub(crate) fn frame_percent(curve: &Curve, time: f32, prev_time: f32, next_time: f32) -> f32 {
    let span = next_time - prev_time;
    if span <= 0.0 {
        return 1.0;
    }
    curve.percent((time - prev_time) / span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_is_identity_and_clamped() {
        let c = Curve::Linear;
        for i in 0..=20 {
            let p = i as f32 / 20.0;
            assert_eq!(c.percent(p), p);
        }
        assert_eq!(c.percent(-1.0), 0.0);
        assert_eq!(c.percent(2.0), 1.0);
    }

    #[test]
    fn stepped_holds_previous_value() {
        assert_eq!(Curve::Stepped.percent(0.0), 0.0);
        assert_eq!(Curve::Stepped.percent(0.99), 0.0);
    }

    #[test]
    fn bezier_is_monotonic_and_hits_endpoints() {
        for (cx1, cy1, cx2, cy2) in [
            (0.25, 0.1, 0.25, 1.0),
            (0.42, 0.0, 0.58, 1.0),
            (0.0, 0.0, 1.0, 1.0),
            (0.9, 0.1, 0.1, 0.9),
        ] {
            let c = Curve::bezier(cx1, cy1, cx2, cy2);
            let mut last = c.percent(0.0);
            assert!(last.abs() < 1e-6);
            for i in 1..=200 {
                let v = c.percent(i as f32 / 200.0);
                assert!(v + 1e-6 >= last, "curve ({cx1},{cy1},{cx2},{cy2}) decreased at {i}");
                last = v;
            }
            assert!((c.percent(1.0) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn ease_in_out_is_slow_at_the_start() {
        let c = Curve::bezier(0.42, 0.0, 0.58, 1.0);
        assert!(c.percent(0.1) < 0.1);
        assert!(c.percent(0.9) > 0.9);
        assert!((c.percent(0.5) - 0.5).abs() < 0.02);
    }

    #[test]
    fn search_brackets_the_query_time() {
        let times = [0.0f32, 1.0, 2.0, 3.0];
        assert_eq!(search(&times, 0.5, |t| *t), 1);
        assert_eq!(search(&times, 1.0, |t| *t), 2);
        assert_eq!(search(&times, 2.9, |t| *t), 3);
        assert_eq!(search1(&times, 0.0, |t| *t), 0);
        assert_eq!(search1(&times, 1.5, |t| *t), 1);
        assert_eq!(search1(&times, 9.0, |t| *t), 3);
    }
}

//! Per-hand fingertip tracking: velocity and pinch classification.

use serde::Serialize;

use crate::config::Thresholds;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FingerState {
    pub index: Point,
    pub thumb: Point,
    /// Index position as of the prior update; `None` until one has happened.
    pub previous_index: Option<Point>,
    pub last_update_ms: Option<f64>,
}

/// Partial update merged into a [`FingerState`]; absent points keep their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerUpdate {
    pub index: Option<Point>,
    pub thumb: Option<Point>,
}

impl FingerState {
    /// Merge `update` sampled at `now_ms` and return the index-fingertip speed
    /// against the previous sample.
    pub fn apply(&mut self, update: FingerUpdate, now_ms: f64) -> f32 {
        let dt_secs = self
            .last_update_ms
            .map(|last| ((now_ms - last) / 1000.0) as f32)
            .unwrap_or(0.0);
        let prior_index = self.index;

        if let Some(index) = update.index {
            self.index = index;
        }
        if let Some(thumb) = update.thumb {
            self.thumb = thumb;
        }

        let speed = velocity(self.index, self.previous_index, dt_secs);

        // only now does the consumed sample become "previous"
        self.previous_index = Some(update.index.unwrap_or(prior_index));
        self.last_update_ms = Some(now_ms);
        speed
    }
}

/// Distance per second between consecutive samples; zero without a previous
/// sample or a positive elapsed time.
pub fn velocity(current: Point, previous: Option<Point>, dt_secs: f32) -> f32 {
    match previous {
        Some(prev) if dt_secs.is_finite() && dt_secs > 0.0 => {
            let v = current.distance(prev) / dt_secs;
            if v.is_finite() { v } else { 0.0 }
        }
        _ => 0.0,
    }
}

/// Exponential moving average of a distance. The first sample passes through
/// unchanged; `alpha` is the weight of the newest sample.
pub fn smooth(previous: Option<f32>, sample: f32, alpha: f32) -> f32 {
    match previous {
        Some(prev) if prev.is_finite() => prev + alpha * (sample - prev),
        _ => sample,
    }
}

/// Pinch test on an index-to-thumb distance. With `release_distance` set a
/// touching hand stays touching until the distance reaches it.
pub fn is_pinched(distance: f32, was_touching: bool, th: &Thresholds) -> bool {
    let limit = if was_touching {
        th.release_distance.unwrap_or(th.pinch_distance)
    } else {
        th.pinch_distance
    };
    distance < limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            pinch_distance: 50.0,
            release_distance: None,
            min_handedness_score: 0.0,
            smooth_ema: 1.0,
        }
    }

    fn at(x: f32, y: f32) -> FingerUpdate {
        FingerUpdate {
            index: Some(Point::new(x, y)),
            thumb: Some(Point::new(x, y)),
        }
    }

    #[test]
    fn pinch_threshold() {
        let th = thresholds();
        let index = Point::new(0.0, 0.0);
        assert!(is_pinched(index.distance(Point::new(30.0, 0.0)), false, &th));
        assert!(!is_pinched(index.distance(Point::new(60.0, 0.0)), false, &th));
        assert!(!is_pinched(50.0, false, &th));
    }

    #[test]
    fn hysteresis_holds_until_release() {
        let mut th = thresholds();
        th.release_distance = Some(70.0);
        assert!(!is_pinched(60.0, false, &th));
        assert!(is_pinched(60.0, true, &th));
        assert!(!is_pinched(70.0, true, &th));
    }

    #[test]
    fn smoothing_off_passes_samples_through() {
        assert_eq!(smooth(None, 80.0, 1.0), 80.0);
        assert_eq!(smooth(Some(80.0), 20.0, 1.0), 20.0);
    }

    #[test]
    fn smoothing_eases_a_sudden_close() {
        let mut th = thresholds();
        th.smooth_ema = 0.5;
        // fingers snap from 100 px apart to 10 px
        let mut d = smooth(None, 100.0, th.smooth_ema);
        assert_eq!(d, 100.0);
        let mut touching = false;
        let mut frames_to_pinch = 0;
        for _ in 0..5 {
            d = smooth(Some(d), 10.0, th.smooth_ema);
            frames_to_pinch += 1;
            touching = is_pinched(d, touching, &th);
            if touching {
                break;
            }
        }
        // 55, then 32.5
        assert!(touching);
        assert_eq!(frames_to_pinch, 2);
    }

    #[test]
    fn velocity_degenerate_cases() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(velocity(p, None, 1.0), 0.0);
        assert_eq!(velocity(p, Some(Point::default()), 0.0), 0.0);
        assert_eq!(velocity(p, Some(Point::default()), -0.5), 0.0);
        assert_eq!(velocity(p, Some(Point::default()), 0.5), 10.0);
    }

    #[test]
    fn first_sample_has_no_velocity() {
        let mut f = FingerState::default();
        assert_eq!(f.apply(at(100.0, 100.0), 1000.0), 0.0);
        assert_eq!(f.previous_index, Some(Point::new(100.0, 100.0)));
    }

    #[test]
    fn velocity_lags_one_sample() {
        let mut f = FingerState::default();
        f.apply(at(0.0, 0.0), 0.0);
        // 30 px in 100 ms
        let v = f.apply(at(30.0, 0.0), 100.0);
        assert!((v - 300.0).abs() < 1e-3);
        // measured from the second sample, not the first
        let v = f.apply(at(40.0, 0.0), 200.0);
        assert!((v - 100.0).abs() < 1e-3);
        assert_eq!(f.previous_index, Some(Point::new(40.0, 0.0)));
    }

    #[test]
    fn same_tick_update_reports_zero() {
        let mut f = FingerState::default();
        f.apply(at(0.0, 0.0), 500.0);
        assert_eq!(f.apply(at(80.0, 0.0), 500.0), 0.0);
    }

    #[test]
    fn partial_update_keeps_other_point() {
        let mut f = FingerState::default();
        f.apply(at(10.0, 10.0), 0.0);
        f.apply(
            FingerUpdate {
                index: None,
                thumb: Some(Point::new(20.0, 20.0)),
            },
            16.0,
        );
        assert_eq!(f.index, Point::new(10.0, 10.0));
        assert_eq!(f.thumb, Point::new(20.0, 20.0));
        assert_eq!(f.previous_index, Some(Point::new(10.0, 10.0)));
    }
}

//! Per-frame reduction of detector output into derived hand state.
//!
//! [`reduce`] is pure: it takes the previous [`HandsState`] and one frame and
//! returns the next state. The frame loop owns the shared store and the
//! read-modify-write around it.

use log::debug;

use crate::config::{FrameSize, Profile, TargetMapping, Thresholds};
use crate::landmarks::{FrameDetection, Hand, Landmark, extract, perceived_hand};
use crate::state::HandsState;
use crate::tracker::{FingerUpdate, Point};

#[derive(Debug, Clone)]
pub struct GestureConfig {
    pub frame: FrameSize,
    pub thresholds: Thresholds,
    pub targets: TargetMapping,
}

impl GestureConfig {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            frame: profile.capture.frame_size(),
            thresholds: profile.thresholds.clone(),
            targets: profile.targets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    HandFound(Hand),
    HandLost(Hand),
    PinchStart(Hand),
    PinchEnd(Hand),
}

/// Which semantic hands appear in `frame`, with their landmark sets.
/// The first entry to claim a hand wins.
pub fn scan_hands(frame: &FrameDetection, min_score: f32) -> [Option<&[Landmark]>; 2] {
    let mut seen: [Option<&[Landmark]>; 2] = [None, None];
    for (handedness, landmarks) in frame.entries() {
        let Some(hand) = handedness.and_then(|h| perceived_hand(h, min_score)) else {
            continue;
        };
        let slot = &mut seen[hand.slot()];
        if slot.is_some() {
            debug!("{hand} hand reported twice in one frame; keeping the first");
            continue;
        }
        *slot = Some(landmarks);
    }
    seen
}

/// Map a reference landmark to a control target.
///
/// The point is flipped on both axes to match the mirrored display and
/// clamped to the unit square. [`TargetMapping::assign`] names the
/// parameters it drives.
pub fn map_target(reference: Landmark) -> Point {
    Point::new(
        (1.0 - reference.x).clamp(0.0, 1.0),
        (1.0 - reference.y).clamp(0.0, 1.0),
    )
}

pub fn reduce(
    prev: &HandsState,
    frame: &FrameDetection,
    now_ms: f64,
    cfg: &GestureConfig,
) -> HandsState {
    let mut next = prev.clone();
    let seen = scan_hands(frame, cfg.thresholds.min_handedness_score);

    for hand in Hand::BOTH {
        let Some(landmarks) = seen[hand.slot()] else {
            next.release(hand, &cfg.targets);
            continue;
        };
        next.hand_mut(hand).active = true;

        let points = match extract(landmarks) {
            Ok(points) => points,
            Err(e) => {
                debug!("{hand} hand: skipping update: {e}");
                continue;
            }
        };
        let update = FingerUpdate {
            index: Some(cfg.frame.to_pixels(points.index)),
            thumb: Some(cfg.frame.to_pixels(points.thumb)),
        };
        next.set_finger_state(hand, update, now_ms, &cfg.thresholds);
        next.hand_mut(hand).target = map_target(points.reference);
    }

    next.refresh_parameters(&cfg.targets);
    next.frames += 1;
    next.timestamp_ms = now_ms;
    next
}

pub fn transitions(prev: &HandsState, next: &HandsState) -> Vec<GestureEvent> {
    let mut out = Vec::new();
    for hand in Hand::BOTH {
        let (a, b) = (prev.hand(hand), next.hand(hand));
        match (a.active, b.active) {
            (false, true) => out.push(GestureEvent::HandFound(hand)),
            (true, false) => out.push(GestureEvent::HandLost(hand)),
            _ => {}
        }
        match (a.touching, b.touching) {
            (false, true) => out.push(GestureEvent::PinchStart(hand)),
            (true, false) => out.push(GestureEvent::PinchEnd(hand)),
            _ => {}
        }
    }
    out
}

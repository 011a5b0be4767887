//! Derived hand state shared between the frame loop and its readers.

use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use crate::config::{Thresholds, TargetMapping};
use crate::landmarks::Hand;
use crate::tracker::{FingerState, FingerUpdate, Point, is_pinched, smooth};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandState {
    pub active: bool,
    pub touching: bool,
    /// Index-fingertip speed in capture pixels per second.
    pub velocity: f32,
    /// Smoothed index-to-thumb distance the pinch test ran on.
    pub pinch_distance: Option<f32>,
    /// Normalized, mirror-corrected control target.
    pub target: Point,
    pub fingers: FingerState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandsState {
    pub left: HandState,
    pub right: HandState,
    /// Control parameter name -> value, derived from both targets.
    pub parameters: BTreeMap<String, f32>,
    pub frames: u64,
    pub timestamp_ms: f64,
}

pub type SharedState = Arc<Mutex<HandsState>>;

impl HandsState {
    pub fn new(targets: &TargetMapping) -> Self {
        let rest = targets.rest_point();
        let hand = HandState {
            target: rest,
            ..HandState::default()
        };
        let mut st = Self {
            left: hand.clone(),
            right: hand,
            parameters: BTreeMap::new(),
            frames: 0,
            timestamp_ms: 0.0,
        };
        st.refresh_parameters(targets);
        st
    }

    pub fn shared(targets: &TargetMapping) -> SharedState {
        Arc::new(Mutex::new(Self::new(targets)))
    }

    pub fn hand(&self, hand: Hand) -> &HandState {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    pub fn hand_mut(&mut self, hand: Hand) -> &mut HandState {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    /// Merge a partial finger update for `hand` and recompute its touching
    /// flag, smoothed distance and velocity in the same step.
    pub fn set_finger_state(
        &mut self,
        hand: Hand,
        update: FingerUpdate,
        now_ms: f64,
        th: &Thresholds,
    ) {
        let st = self.hand_mut(hand);
        st.velocity = st.fingers.apply(update, now_ms);
        let gap = st.fingers.index.distance(st.fingers.thumb);
        let eased = smooth(st.pinch_distance, gap, th.smooth_ema);
        st.pinch_distance = Some(eased);
        st.touching = is_pinched(eased, st.touching, th);
    }

    /// Hand left the frame: clear presence and pinch, park the target at rest.
    pub fn release(&mut self, hand: Hand, targets: &TargetMapping) {
        let st = self.hand_mut(hand);
        st.active = false;
        st.touching = false;
        st.velocity = 0.0;
        st.pinch_distance = None;
        st.target = targets.rest_point();
    }

    /// Release both hands, e.g. once the frame stream is gone.
    pub fn release_all(&mut self, targets: &TargetMapping) {
        for hand in Hand::BOTH {
            self.release(hand, targets);
        }
        self.refresh_parameters(targets);
    }

    pub fn refresh_parameters(&mut self, targets: &TargetMapping) {
        self.parameters.clear();
        for hand in Hand::BOTH {
            for (name, value) in targets.assign(hand, self.hand(hand).target) {
                self.parameters.insert(name.to_string(), value);
            }
        }
    }
}

//! Detector output types, hand-swap correction and landmark extraction.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;
/// Middle-finger knuckle; steadier than a fingertip under fast motion.
pub const MIDDLE_FINGER_MCP: usize = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    #[cfg(test)]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handedness {
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Handedness {
    #[cfg(test)]
    pub fn labelled(label: &str, score: f32) -> Self {
        Self {
            score: Some(score),
            index: 0,
            category_name: label.to_string(),
            display_name: Some(label.to_string()),
        }
    }
}

/// One frame of detector output. `handednesses[i]` pairs with `landmarks[i]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetection {
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
    #[serde(default, alias = "handedness", deserialize_with = "null_as_empty")]
    pub handednesses: Vec<Vec<Handedness>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub landmarks: Vec<Vec<Landmark>>,
}

fn null_as_empty<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
}

impl FrameDetection {
    #[cfg(test)]
    pub fn empty(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_hand(mut self, handedness: Handedness, landmarks: Vec<Landmark>) -> Self {
        self.handednesses.push(vec![handedness]);
        self.landmarks.push(landmarks);
        self
    }

    /// Each detected entry as (top handedness category, landmark set).
    /// A missing landmark set yields an empty slice.
    pub fn entries(&self) -> impl Iterator<Item = (Option<&Handedness>, &[Landmark])> {
        self.handednesses.iter().enumerate().map(|(i, cats)| {
            let landmarks = self.landmarks.get(i).map(Vec::as_slice).unwrap_or(&[]);
            (cats.first(), landmarks)
        })
    }
}

/// A hand as the user perceives it on the mirrored display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Left" => Some(Self::Left),
            "Right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a detector label onto the hand the user sees.
///
/// The detector classifies the unmirrored frame while the feed is shown
/// mirrored, so "Left" from the detector is the user's right hand. This is
/// the only place a raw label is read; everything downstream works on
/// [`Hand`]. Missing, unrecognised or under-confident labels yield `None`.
pub fn perceived_hand(handedness: &Handedness, min_score: f32) -> Option<Hand> {
    let score = handedness.score?;
    if !score.is_finite() || score < min_score {
        return None;
    }
    let label = handedness.display_name.as_deref()?;
    Hand::from_label(label).map(Hand::opposite)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandPoints {
    pub index: Landmark,
    pub thumb: Landmark,
    pub reference: Landmark,
}

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("landmark {index} missing (hand has {len} points)")]
    Missing { index: usize, len: usize },
    #[error("landmark {index} has non-finite coordinates")]
    NonFinite { index: usize },
}

fn point_at(landmarks: &[Landmark], index: usize) -> Result<Landmark, ExtractError> {
    let lm = landmarks.get(index).copied().ok_or(ExtractError::Missing {
        index,
        len: landmarks.len(),
    })?;
    if !lm.is_finite() {
        return Err(ExtractError::NonFinite { index });
    }
    Ok(lm)
}

pub fn extract(landmarks: &[Landmark]) -> Result<HandPoints, ExtractError> {
    Ok(HandPoints {
        index: point_at(landmarks, INDEX_FINGER_TIP)?,
        thumb: point_at(landmarks, THUMB_TIP)?,
        reference: point_at(landmarks, MIDDLE_FINGER_MCP)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_hand() -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(i as f32 / 100.0, 0.5))
            .collect()
    }

    #[test]
    fn detector_labels_are_swapped() {
        assert_eq!(
            perceived_hand(&Handedness::labelled("Left", 0.9), 0.0),
            Some(Hand::Right)
        );
        assert_eq!(
            perceived_hand(&Handedness::labelled("Right", 0.9), 0.0),
            Some(Hand::Left)
        );
    }

    #[test]
    fn swapping_twice_is_identity() {
        for hand in Hand::BOTH {
            assert_eq!(hand.opposite().opposite(), hand);
        }
    }

    #[test]
    fn unusable_labels_are_not_present() {
        let mut h = Handedness::labelled("Left", 0.9);
        h.display_name = None;
        assert_eq!(perceived_hand(&h, 0.0), None);

        assert_eq!(perceived_hand(&Handedness::labelled("left", 0.9), 0.0), None);

        let mut h = Handedness::labelled("Right", 0.9);
        h.score = None;
        assert_eq!(perceived_hand(&h, 0.0), None);

        assert_eq!(perceived_hand(&Handedness::labelled("Right", 0.4), 0.5), None);
        assert_eq!(
            perceived_hand(&Handedness::labelled("Right", f32::NAN), 0.0),
            None
        );
    }

    #[test]
    fn extracts_semantic_points() {
        let hand = full_hand();
        let pts = extract(&hand).unwrap();
        assert_eq!(pts.index, hand[8]);
        assert_eq!(pts.thumb, hand[4]);
        assert_eq!(pts.reference, hand[9]);
    }

    #[test]
    fn short_or_broken_sets_yield_no_data() {
        let hand = full_hand();
        assert_eq!(
            extract(&hand[..8]),
            Err(ExtractError::Missing { index: 8, len: 8 })
        );
        assert!(extract(&[]).is_err());

        let mut hand = full_hand();
        hand[4].x = f32::INFINITY;
        assert_eq!(extract(&hand), Err(ExtractError::NonFinite { index: 4 }));
    }

    #[test]
    fn decodes_landmarker_result() {
        let json = r#"{
            "timestampMs": 12.5,
            "handednesses": [[{"score": 0.97, "index": 1, "categoryName": "Left", "displayName": "Left"}]],
            "landmarks": [[{"x": 0.1, "y": 0.2, "z": -0.01}]]
        }"#;
        let frame: FrameDetection = serde_json::from_str(json).unwrap();
        assert_eq!(frame.timestamp_ms, Some(12.5));
        let entries: Vec<_> = frame.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.and_then(|h| h.display_name.as_deref()), Some("Left"));
        assert_eq!(entries[0].1.len(), 1);
    }

    #[test]
    fn null_and_missing_arrays_mean_no_hands() {
        let frame: FrameDetection =
            serde_json::from_str(r#"{"handedness": null, "landmarks": null}"#).unwrap();
        assert_eq!(frame.entries().count(), 0);
        let frame: FrameDetection = serde_json::from_str("{}").unwrap();
        assert_eq!(frame.entries().count(), 0);
    }

    #[test]
    fn handedness_without_landmarks_pairs_with_empty_set() {
        let mut frame = FrameDetection::empty(0.0);
        frame.handednesses.push(vec![Handedness::labelled("Right", 0.8)]);
        let (h, lms) = frame.entries().next().unwrap();
        assert!(h.is_some());
        assert!(lms.is_empty());
    }
}

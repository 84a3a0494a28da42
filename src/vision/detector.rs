//! Face detection wire types and primary-face selection.
//!
//! The detector itself is a black box on the other side of the UDP bridge; it
//! reports zero or more detections per frame with relative (0-1) bounding
//! boxes, exactly as MediaPipe face detection emits them.

use serde::Deserialize;

/// One face detection in relative coordinates.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Detection {
    /// Detector confidence, 0.0 - 1.0
    pub score: f32,
    /// Relative bounding box: top-left corner plus size, all 0.0 - 1.0
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
}

/// One datagram from the detector bridge: frame geometry plus the detections
/// found in that frame. An empty detection list means "no face this frame".
#[derive(Debug, Clone, Deserialize)]
pub struct FramePacket {
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// The single tracked face for one frame, in pixel coordinates.
///
/// Transient: nothing outlives the tick that produced it except the last-seen
/// direction recorded in region state.
#[derive(Debug, Clone, Copy)]
pub struct FaceObservation {
    /// Bounding-box center X in pixels
    pub cx: f32,
    /// Bounding-box center Y in pixels
    pub cy: f32,
    pub score: f32,
}

impl FramePacket {
    /// Select the highest-confidence detection above the confidence floor.
    ///
    /// When several faces are present only the most confident one is tracked;
    /// the rest are ignored. Documented simplification.
    pub fn primary_face(&self, min_confidence: f32) -> Option<FaceObservation> {
        let w = self.frame_width as f32;
        let h = self.frame_height as f32;

        self.detections
            .iter()
            .filter(|d| d.score >= min_confidence)
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|d| FaceObservation {
                cx: (d.xmin + d.width / 2.0) * w,
                cy: (d.ymin + d.height / 2.0) * h,
                score: d.score,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(score: f32, xmin: f32, ymin: f32) -> Detection {
        Detection {
            score,
            xmin,
            ymin,
            width: 0.2,
            height: 0.25,
        }
    }

    #[test]
    fn test_no_detections_means_no_face() {
        let packet = FramePacket {
            frame_width: 640,
            frame_height: 480,
            detections: vec![],
        };
        assert!(packet.primary_face(0.45).is_none());
    }

    #[test]
    fn test_highest_confidence_wins() {
        let packet = FramePacket {
            frame_width: 640,
            frame_height: 480,
            detections: vec![det(0.6, 0.0, 0.0), det(0.9, 0.4, 0.375), det(0.7, 0.7, 0.7)],
        };
        let face = packet.primary_face(0.45).unwrap();
        assert_eq!(face.score, 0.9);
        // 0.4*640 + 0.2*640/2 = 320, 0.375*480 + 0.25*480/2 = 240
        assert_eq!(face.cx, 320.0);
        assert_eq!(face.cy, 240.0);
    }

    #[test]
    fn test_confidence_floor_filters() {
        let packet = FramePacket {
            frame_width: 640,
            frame_height: 480,
            detections: vec![det(0.3, 0.1, 0.1)],
        };
        assert!(packet.primary_face(0.45).is_none());
    }
}

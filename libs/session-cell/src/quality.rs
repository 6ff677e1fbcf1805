use serde::{Deserialize, Serialize};

/// Discrete connection quality levels with the policy predicates the
/// selective streaming layer keys off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    #[serde(rename = "excellent")]
    Excellent,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "fair")]
    Fair,
    #[serde(rename = "poor")]
    Poor,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ConnectionQuality {
    /// Maps a raw vendor score in [0, 1] onto a discrete level.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConnectionQuality::Excellent
        } else if score >= 0.6 {
            ConnectionQuality::Good
        } else if score >= 0.4 {
            ConnectionQuality::Fair
        } else if score >= 0.2 {
            ConnectionQuality::Poor
        } else {
            ConnectionQuality::Unknown
        }
    }

    pub fn can_receive_high_quality_video(&self) -> bool {
        matches!(self, ConnectionQuality::Excellent | ConnectionQuality::Good)
    }

    pub fn should_use_audio_only(&self) -> bool {
        matches!(self, ConnectionQuality::Poor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_thresholds() {
        assert_eq!(ConnectionQuality::from_score(0.95), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_score(0.8), ConnectionQuality::Excellent);
        assert_eq!(ConnectionQuality::from_score(0.7), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::from_score(0.5), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::from_score(0.3), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::from_score(0.1), ConnectionQuality::Unknown);
    }

    #[test]
    fn policy_predicates() {
        assert!(ConnectionQuality::Good.can_receive_high_quality_video());
        assert!(!ConnectionQuality::Fair.can_receive_high_quality_video());
        assert!(ConnectionQuality::Poor.should_use_audio_only());
        assert!(!ConnectionQuality::Unknown.should_use_audio_only());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pose label produced by the external classifier for one hand in one frame.
///
/// Labels carry no structure; the engine only ever compares them for equality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GestureLabel {
    OpenPalm,
    Fist,
    ThumbsUp,
    OneFinger,
    TwoFingers,
    ThreeFingers,
    RingAndPinky,
    Pinky,
    /// A hand was seen but its pose matched nothing in the classifier table.
    Unknown,
    /// No hand, or input too broken to classify.
    NoGesture,
}

impl Default for GestureLabel {
    fn default() -> Self {
        GestureLabel::NoGesture
    }
}

impl GestureLabel {
    pub const ALL: [GestureLabel; 10] = [
        GestureLabel::OpenPalm,
        GestureLabel::Fist,
        GestureLabel::ThumbsUp,
        GestureLabel::OneFinger,
        GestureLabel::TwoFingers,
        GestureLabel::ThreeFingers,
        GestureLabel::RingAndPinky,
        GestureLabel::Pinky,
        GestureLabel::Unknown,
        GestureLabel::NoGesture,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            GestureLabel::OpenPalm => "Open Palm",
            GestureLabel::Fist => "Fist",
            GestureLabel::ThumbsUp => "Thumbs Up",
            GestureLabel::OneFinger => "One Finger",
            GestureLabel::TwoFingers => "Two Fingers",
            GestureLabel::ThreeFingers => "Three Fingers",
            GestureLabel::RingAndPinky => "Ring and Pinky",
            GestureLabel::Pinky => "Pinky",
            GestureLabel::Unknown => "Unknown",
            GestureLabel::NoGesture => "None",
        }
    }

    /// True for labels that describe an actual recognised pose.
    pub fn is_pose(&self) -> bool {
        !matches!(self, GestureLabel::Unknown | GestureLabel::NoGesture)
    }

    /// Strict lookup accepting display names ("Open Palm") and identifiers
    /// ("open_palm", "open-palm"), case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "openpalm" | "palm" => Some(GestureLabel::OpenPalm),
            "fist" => Some(GestureLabel::Fist),
            "thumbsup" => Some(GestureLabel::ThumbsUp),
            "onefinger" => Some(GestureLabel::OneFinger),
            "twofingers" => Some(GestureLabel::TwoFingers),
            "threefingers" => Some(GestureLabel::ThreeFingers),
            "ringandpinky" => Some(GestureLabel::RingAndPinky),
            "pinky" => Some(GestureLabel::Pinky),
            "unknown" => Some(GestureLabel::Unknown),
            "none" | "nogesture" => Some(GestureLabel::NoGesture),
            _ => None,
        }
    }

    /// Lookup used on classifier output: anything malformed becomes `NoGesture`
    /// so detector noise never surfaces as an error.
    pub fn parse_lossy(name: Option<&str>) -> Self {
        name.and_then(Self::from_name).unwrap_or(GestureLabel::NoGesture)
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Physical hand as reported by the landmark detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn other(&self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

impl Default for Hand {
    fn default() -> Self {
        Hand::Right
    }
}

/// Logical stream position. The primary slot carries activation authority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandSlot {
    Primary,
    Secondary,
}

impl HandSlot {
    /// Slots in priority order.
    pub const ALL: [HandSlot; 2] = [HandSlot::Primary, HandSlot::Secondary];

    pub fn index(&self) -> usize {
        match self {
            HandSlot::Primary => 0,
            HandSlot::Secondary => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_accepts_display_and_identifier_forms() {
        assert_eq!(GestureLabel::from_name("Open Palm"), Some(GestureLabel::OpenPalm));
        assert_eq!(GestureLabel::from_name("open_palm"), Some(GestureLabel::OpenPalm));
        assert_eq!(GestureLabel::from_name("RING-AND-PINKY"), Some(GestureLabel::RingAndPinky));
        assert_eq!(GestureLabel::from_name("None"), Some(GestureLabel::NoGesture));
        assert_eq!(GestureLabel::from_name("wave"), None);
    }

    #[test]
    fn malformed_labels_become_no_gesture() {
        assert_eq!(GestureLabel::parse_lossy(Some("¯\\_(ツ)_/¯")), GestureLabel::NoGesture);
        assert_eq!(GestureLabel::parse_lossy(None), GestureLabel::NoGesture);
        assert_eq!(GestureLabel::parse_lossy(Some("Fist")), GestureLabel::Fist);
    }

    #[test]
    fn display_names_round_trip() {
        for label in GestureLabel::ALL {
            assert_eq!(GestureLabel::from_name(label.display_name()), Some(label));
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&GestureLabel::ThumbsUp).unwrap();
        assert_eq!(json, "\"thumbs_up\"");
        let hand: Hand = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(hand, Hand::Left);
    }
}

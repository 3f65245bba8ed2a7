use serde::{Deserialize, Serialize};
use std::fmt;

use super::{GestureLabel, Hand};

/// Action requested from the OS-automation collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenBrowser,
    OpenMusic,
    NextTrack,
    PreviousTrack,
    PlayPause,
    VolumeUp,
    VolumeDown,
    Mute,
    /// The trigger was valid but nothing is bound to it.
    Unmapped,
}

impl Action {
    /// Right hand drives apps and media, left hand drives volume.
    pub fn resolve(hand: Hand, label: GestureLabel) -> Action {
        match hand {
            Hand::Right => match label {
                GestureLabel::OneFinger => Action::OpenBrowser,
                GestureLabel::TwoFingers => Action::OpenMusic,
                GestureLabel::RingAndPinky => Action::NextTrack,
                GestureLabel::Pinky => Action::PreviousTrack,
                GestureLabel::OpenPalm
                | GestureLabel::Fist
                | GestureLabel::ThumbsUp
                | GestureLabel::ThreeFingers
                | GestureLabel::Unknown
                | GestureLabel::NoGesture => Action::Unmapped,
            },
            Hand::Left => match label {
                GestureLabel::OneFinger => Action::VolumeUp,
                GestureLabel::TwoFingers => Action::VolumeDown,
                GestureLabel::ThreeFingers => Action::Mute,
                GestureLabel::Pinky => Action::PlayPause,
                GestureLabel::OpenPalm
                | GestureLabel::Fist
                | GestureLabel::ThumbsUp
                | GestureLabel::RingAndPinky
                | GestureLabel::Unknown
                | GestureLabel::NoGesture => Action::Unmapped,
            },
        }
    }

    pub fn is_mapped(&self) -> bool {
        *self != Action::Unmapped
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::OpenBrowser => "Opening Browser",
            Action::OpenMusic => "Opening Music",
            Action::NextTrack => "Next Track",
            Action::PreviousTrack => "Previous Track",
            Action::PlayPause => "Play/Pause",
            Action::VolumeUp => "Volume Up",
            Action::VolumeDown => "Volume Down",
            Action::Mute => "Mute",
            Action::Unmapped => "No action bound",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

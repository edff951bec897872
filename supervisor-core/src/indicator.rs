/// Status LED colors and the indicator contract
use serde::{Deserialize, Serialize};

/// The four states the status LED can show
///
/// - Blue: an update is being downloaded
/// - Green: firmware is up to date
/// - Red: no connectivity, or the last update attempt failed
/// - Off: nothing decided yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LedColor {
    Red,
    Green,
    Blue,
    #[default]
    Off,
}

impl LedColor {
    /// Channel levels for a common-cathode RGB LED
    pub fn rgb(self) -> (bool, bool, bool) {
        match self {
            LedColor::Red => (true, false, false),
            LedColor::Green => (false, true, false),
            LedColor::Blue => (false, false, true),
            LedColor::Off => (false, false, false),
        }
    }
}

/// Passive LED collaborator. Setting a color is assumed to always succeed.
pub trait StatusIndicator: Send {
    fn set(&mut self, color: LedColor);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_color_drives_one_channel() {
        for color in [LedColor::Red, LedColor::Green, LedColor::Blue] {
            let (r, g, b) = color.rgb();
            assert_eq!([r, g, b].iter().filter(|on| **on).count(), 1);
        }
        assert_eq!(LedColor::Off.rgb(), (false, false, false));
    }

    #[test]
    fn test_default_is_off() {
        assert_eq!(LedColor::default(), LedColor::Off);
    }
}

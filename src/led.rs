use anyhow::Result;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::sys::EspError;

use supervisor_core::{LedColor, StatusIndicator};

/// Discrete RGB status LED, one GPIO per channel, active high
pub struct RgbLed {
    red: PinDriver<'static, AnyOutputPin, Output>,
    green: PinDriver<'static, AnyOutputPin, Output>,
    blue: PinDriver<'static, AnyOutputPin, Output>,
}

impl RgbLed {
    pub fn new(red: AnyOutputPin, green: AnyOutputPin, blue: AnyOutputPin) -> Result<Self> {
        let mut led = Self {
            red: PinDriver::output(red)?,
            green: PinDriver::output(green)?,
            blue: PinDriver::output(blue)?,
        };
        led.apply(LedColor::Off)?;
        Ok(led)
    }

    fn apply(&mut self, color: LedColor) -> Result<(), EspError> {
        let (r, g, b) = color.rgb();
        self.red.set_level(r.into())?;
        self.green.set_level(g.into())?;
        self.blue.set_level(b.into())?;
        Ok(())
    }
}

impl StatusIndicator for RgbLed {
    fn set(&mut self, color: LedColor) {
        if let Err(e) = self.apply(color) {
            log::warn!("Failed to set status LED to {:?}: {:?}", color, e);
        }
    }
}

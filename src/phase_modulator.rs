//! Burst-fire drive for zero-crossing solid state relays.
//!
//! A power fraction is approximated by spreading `floor(window * power)` ON
//! ticks evenly across a window of fast timer ticks. The relay is never
//! switched mid half-cycle; the SSR itself waits for the zero crossing.

use core::fmt;
use embassy_time::{Duration, Ticker};
use embedded_hal::digital::OutputPin;

use crate::config::Element;
use crate::log::*;
use crate::process_image::ProcessImage;

pub const DEFAULT_WINDOW: u32 = 125;

/// Below this fraction the relay is held OFF.
const MIN_POWER: f32 = 0.01;
/// Power changes smaller than this do not re-plan the window.
const POWER_EPSILON: f32 = 0.001;

#[derive(Debug, Clone)]
pub struct BurstFireModulator {
    window: u32,
    power_level: f32,
    /// Level the current pulse plan was computed for.
    planned_level: f32,
    on_pulses: u32,
    off_pulses: u32,
    increment: f32,
    tracking: f32,
}

impl BurstFireModulator {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            power_level: 0.0,
            planned_level: 0.0,
            on_pulses: 0,
            off_pulses: window.max(1),
            increment: 0.0,
            tracking: 0.0,
        }
    }

    pub fn power_level(&self) -> f32 {
        self.power_level
    }

    /// Set the power fraction, clamped to 0..1. Non-finite input is taken
    /// as zero.
    pub fn set_power_level(&mut self, power: f32) {
        let power = if power.is_finite() {
            power.clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.power_level = power;
        let delta = power - self.planned_level;
        if delta <= POWER_EPSILON && delta >= -POWER_EPSILON {
            return;
        }

        self.planned_level = power;
        // Truncation is floor for non-negative values.
        self.on_pulses = (self.window as f32 * power) as u32;
        self.off_pulses = self.window - self.on_pulses.min(self.window);
        self.increment = if self.on_pulses == 0 {
            0.0
        } else {
            self.off_pulses as f32 / self.on_pulses as f32
        };
    }

    /// Decide the relay state for one tick.
    pub fn tick(&mut self) -> bool {
        if self.power_level < MIN_POWER || self.on_pulses == 0 {
            self.tracking = 0.0;
            return false;
        }

        if self.tracking <= 0.0 {
            self.tracking = (self.tracking + self.increment).max(-1.0);
            true
        } else {
            self.tracking -= 1.0;
            false
        }
    }
}

#[derive(Debug)]
pub enum SsrError<E> {
    Pin(E),
}

impl<E: fmt::Debug> fmt::Display for SsrError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsrError::Pin(e) => write!(f, "SSR pin error: {:?}", e),
        }
    }
}

/// One relay output paired with its modulator.
pub struct SsrDriver<P> {
    pin: P,
    modulator: BurstFireModulator,
}

impl<P: OutputPin> SsrDriver<P> {
    pub fn new(pin: P, window: u32) -> Self {
        Self {
            pin,
            modulator: BurstFireModulator::new(window),
        }
    }

    pub fn set_power_level(&mut self, power: f32) {
        self.modulator.set_power_level(power);
    }

    /// Drive the pin for one tick. If the write fails the pin is driven low
    /// before the error is returned.
    pub fn tick(&mut self) -> Result<bool, SsrError<P::Error>> {
        let on = self.modulator.tick();
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };

        match result {
            Ok(()) => Ok(on),
            Err(e) => {
                let _ = self.pin.set_low();
                Err(SsrError::Pin(e))
            }
        }
    }

    pub fn force_off(&mut self) -> Result<(), SsrError<P::Error>> {
        self.modulator.set_power_level(0.0);
        self.pin.set_low().map_err(SsrError::Pin)
    }
}

/// Run the relay for `element` forever, following its published power.
pub async fn drive_element<P>(
    mut driver: SsrDriver<P>,
    image: &'static ProcessImage,
    element: Element,
    tick_ms: u32,
) -> !
where
    P: OutputPin,
    P::Error: fmt::Debug,
{
    info!("Starting SSR drive for {} element", element.to_str());
    if driver.force_off().is_err() {
        error!("Failed to drive {} SSR low at start", element.to_str());
    }

    let mut ticker = Ticker::every(Duration::from_millis(tick_ms.max(1).into()));
    let mut failing = false;
    loop {
        driver.set_power_level(image.element_power(element));
        match driver.tick() {
            Ok(_) => failing = false,
            Err(_) if !failing => {
                error!("{} SSR write failed, relay forced off", element.to_str());
                failing = true;
            }
            Err(_) => {}
        }
        ticker.next().await;
    }
}

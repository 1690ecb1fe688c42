//! Simulated SSR outputs for the host build.
//!
//! The relay pins only count how many ticks they spent ON; the thermal
//! model reads those counters back as the delivered heat.

use core::convert::Infallible;
use core::sync::atomic::Ordering;
use embedded_hal::digital::{ErrorType, OutputPin};
use portable_atomic::AtomicU32;

use crate::config::Element;
use crate::phase_modulator::{drive_element, SsrDriver};
use crate::process_image::ProcessImage;

/// ON ticks delivered per element since the last `take_on_ticks`.
pub static RELAY_ON_TICKS: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

pub struct SimulatedRelay {
    element: Element,
}

impl SimulatedRelay {
    pub fn new(element: Element) -> Self {
        Self { element }
    }
}

impl ErrorType for SimulatedRelay {
    type Error = Infallible;
}

impl OutputPin for SimulatedRelay {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        RELAY_ON_TICKS[self.element.index()].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub fn take_on_ticks(element: Element) -> u32 {
    RELAY_ON_TICKS[element.index()].swap(0, Ordering::Relaxed)
}

#[embassy_executor::task(pool_size = 2)]
pub async fn element_task(
    image: &'static ProcessImage,
    element: Element,
    window: u32,
    tick_ms: u32,
) -> ! {
    let driver = SsrDriver::new(SimulatedRelay::new(element), window);
    drive_element(driver, image, element, tick_ms).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_ticks_are_counted_per_element() {
        let mut driver = SsrDriver::new(SimulatedRelay::new(Element::Upper), 10);
        driver.set_power_level(1.0);
        take_on_ticks(Element::Upper);
        for _ in 0..10 {
            driver.tick().unwrap();
        }
        assert_eq!(take_on_ticks(Element::Upper), 10);
        assert_eq!(take_on_ticks(Element::Upper), 0);
    }
}

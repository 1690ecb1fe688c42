//! SSR outputs on plain GPIO. The relays switch at the mains zero crossing
//! themselves, so the pins are driven straight from the burst-fire tick.

use embassy_rp::gpio::{AnyPin, Level, Output};
use embassy_rp::Peri;

use crate::config::Element;
use crate::phase_modulator::{drive_element, SsrDriver};
use crate::process_image::ProcessImage;

#[embassy_executor::task(pool_size = 2)]
pub async fn element_task(
    image: &'static ProcessImage,
    element: Element,
    pin: Peri<'static, AnyPin>,
    window: u32,
    tick_ms: u32,
) -> ! {
    let relay = Output::new(pin, Level::Low);
    drive_element(SsrDriver::new(relay, window), image, element, tick_ms).await
}

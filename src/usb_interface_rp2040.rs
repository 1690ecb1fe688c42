use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::rom_data::reset_to_usb_boot;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_usb_logger::ReceiverHandler;

use core::str;
use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Timer;

use crate::console::parse_event;
use crate::status::CURRENT_STATE;
use crate::{USBResources, INPUT_EVENT_CHANNEL};

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

struct Handler;

impl ReceiverHandler for Handler {
    async fn handle_data(&self, data: &[u8]) {
        let Ok(data) = str::from_utf8(data) else {
            return;
        };
        let data = data.trim();

        // elf2uf2-term sends this on exit; drop into the bootloader.
        if data == "q" || data == "elf2uf2-term" {
            reset_to_usb_boot(0, 0);
        } else if let Some(event) = parse_event(data) {
            debug!("USB event: {}", Debug2Format(&event));
            INPUT_EVENT_CHANNEL.send(event).await;
        } else {
            warn!("Unknown command: {}", data);
        }
    }

    fn new() -> Self {
        Self
    }
}

#[embassy_executor::task]
async fn logger_task(driver: Driver<'static, USB>) {
    embassy_usb_logger::run!(1024, ::log::LevelFilter::Info, driver, Handler);
}

#[embassy_executor::task]
pub async fn usb_task(spawner: Spawner, r: USBResources) {
    let driver = Driver::new(r.usb, Irqs);
    spawner.spawn(unwrap!(logger_task(driver)));

    let mut receiver = unwrap!(CURRENT_STATE.receiver());
    loop {
        let status = receiver.get().await;
        match status.to_json() {
            Ok(json) => ::log::info!("{}", json.as_str()),
            Err(_) => warn!("Status did not fit the JSON buffer"),
        }
        Timer::after_secs(1).await;
    }
}

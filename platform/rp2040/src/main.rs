#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::i2c::{Config, I2c, InterruptHandler};
use embassy_rp::peripherals::I2C0;
use embassy_sync::mutex::Mutex;
use reflow_oven::config::{Element, OvenConfig};
use reflow_oven::control_loop::control_loop_task;
use reflow_oven::heater::element_task;
use reflow_oven::inputs::interface_task;
use reflow_oven::outputs::output_task;
use reflow_oven::oven::oven_task;
use reflow_oven::process_image::ProcessImage;
use reflow_oven::profile_library::ProfileLibrary;
use reflow_oven::{temperature_sensor::run_temperature_sensor, usb_interface::usb_task};
use reflow_oven::{split_resources, AssignedResources, I2c0Bus};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

static IMAGE: ProcessImage = ProcessImage::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let r = split_resources!(p);

    bind_interrupts!(struct Irqs {
        I2C0_IRQ => InterruptHandler<I2C0>;
    });

    // Shared I2C bus
    let i2c = I2c::new_async(r.i2c.i2c, r.i2c.scl, r.i2c.sda, Irqs, Config::default());
    static I2C_BUS: StaticCell<I2c0Bus> = StaticCell::new();
    let i2c_bus = I2C_BUS.init(Mutex::new(i2c));

    static LIBRARY: StaticCell<ProfileLibrary> = StaticCell::new();
    let library = LIBRARY.init(ProfileLibrary::with_builtin());

    let config = OvenConfig::default();
    info!("Reflow oven {}", reflow_oven::VERSION);

    spawner.spawn(unwrap!(element_task(
        &IMAGE,
        Element::Lower,
        r.elements.lower_ssr.into(),
        config.ssr_window,
        config.ssr_tick_ms
    )));
    spawner.spawn(unwrap!(element_task(
        &IMAGE,
        Element::Upper,
        r.elements.upper_ssr.into(),
        config.ssr_window,
        config.ssr_tick_ms
    )));
    spawner.spawn(unwrap!(run_temperature_sensor(i2c_bus)));
    spawner.spawn(unwrap!(control_loop_task(&IMAGE, config)));
    spawner.spawn(unwrap!(oven_task(&IMAGE, library, config)));

    spawner.spawn(unwrap!(usb_task(spawner, r.usb)));
    spawner.spawn(unwrap!(interface_task(spawner, r.inputs)));
    spawner.spawn(unwrap!(output_task(spawner, r.outputs)));
}

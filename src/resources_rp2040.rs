use assign_resources::assign_resources;
pub use embassy_rp::i2c;
use embassy_rp::i2c::I2c;
use embassy_rp::peripherals;
use embassy_rp::peripherals::I2C0;
use embassy_rp::Peri;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;

/// Both thermocouple amplifiers share this bus.
pub type I2c0Bus = Mutex<NoopRawMutex, I2c<'static, I2C0, i2c::Async>>;

assign_resources! {
    inputs: InputResources {
        door_switch: PIN_4,
        start_button: PIN_5,
        stop_button: PIN_12,
        up_button: PIN_13,
        down_button: PIN_14,
    },
    outputs: OutputResources {
        fan: PIN_17,
        buzzer: PIN_19,
        start_button_light: PIN_3,
    },
    elements: ElementResources {
        lower_ssr: PIN_6,
        upper_ssr: PIN_7,
    },
    usb: USBResources {
        usb: USB,
    },
    i2c: I2CResources {
        i2c: I2C0,
        sda: PIN_20,
        scl: PIN_21,
    },
}

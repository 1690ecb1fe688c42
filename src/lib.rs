#![cfg_attr(not(test), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(feature = "std", feature = "rp2040"))]
compile_error!("features `std` and `rp2040` are mutually exclusive");

#[cfg(feature = "rp2040")]
pub mod inputs_rp2040;
#[cfg(feature = "rp2040")]
pub use inputs_rp2040 as inputs;

#[cfg(feature = "rp2040")]
pub use defmt as log;

#[cfg(feature = "std")]
pub use log;

#[cfg(feature = "std")]
pub mod inputs_std;
#[cfg(feature = "std")]
pub use inputs_std as inputs;

#[cfg(feature = "rp2040")]
pub mod outputs_rp2040;
#[cfg(feature = "rp2040")]
pub use outputs_rp2040 as outputs;

#[cfg(feature = "std")]
pub mod outputs_std;
#[cfg(feature = "std")]
pub use outputs_std as outputs;

pub mod config;
pub mod console;
pub mod control_loop;
pub mod fault_arbiter;
pub mod mcp9600;
pub mod oven;
pub mod phase_modulator;
pub mod pid;
pub mod process_image;
pub mod profile;
pub mod profile_engine;
pub mod profile_library;
pub mod ring_history;
pub mod status;

#[cfg(feature = "rp2040")]
pub mod resources_rp2040;
#[cfg(feature = "rp2040")]
pub use resources_rp2040 as resources;
#[cfg(feature = "rp2040")]
pub use resources::*;

#[cfg(feature = "rp2040")]
pub mod heater_rp2040;
#[cfg(feature = "rp2040")]
pub use heater_rp2040 as heater;

#[cfg(feature = "std")]
pub mod heater_std;
#[cfg(feature = "std")]
pub use heater_std as heater;

#[cfg(feature = "rp2040")]
pub mod temperature_sensor_mcp9600;
#[cfg(feature = "rp2040")]
pub use temperature_sensor_mcp9600 as temperature_sensor;

#[cfg(feature = "std")]
pub mod temperature_sensor_mock;
#[cfg(feature = "std")]
pub use temperature_sensor_mock as temperature_sensor;

#[cfg(feature = "rp2040")]
pub mod usb_interface_rp2040;
#[cfg(feature = "rp2040")]
pub use usb_interface_rp2040 as usb_interface;

#[cfg(feature = "std")]
pub mod usb_interface_std;
#[cfg(feature = "std")]
pub use usb_interface_std as usb_interface;

pub static VERSION: &str = "v0.1";

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::watch::Watch;
use serde::{Deserialize, Serialize};

use crate::config::{Element, PidTuning};
use crate::fault_arbiter::{CollaboratorFault, SensorReading};

/// Keypad keys the orchestration loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Start,
    Stop,
    Up,
    Down,
    Preset(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Key(Key),
    DoorStateChanged(bool), // true = open, false = closed
    LoadProfile(heapless::String<32>),
    Retune { element: Element, tuning: PidTuning },
    /// Point a preset slot at the selected library profile.
    AssignPreset(u8),
    SetControlRate(u32),
    CollaboratorFault { fault: CollaboratorFault, active: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    LedOn,
    LedOff,
    Blink(u32, u32),
}

impl LedState {
    pub const SLOW_FLASH: LedState = LedState::Blink(450, 450);
    pub const FAST_FLASH: LedState = LedState::Blink(120, 120);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepLength {
    Short,
    Long,
}

impl BeepLength {
    pub fn as_millis(&self) -> u64 {
        match self {
            BeepLength::Short => 250,
            BeepLength::Long => 1600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputCommand {
    SetFanSpeed(f32),
    SetStartButtonLight(LedState),
    Beep(BeepLength),
    SilenceBuzzer,
}

pub static INPUT_EVENT_CHANNEL: Channel<CriticalSectionRawMutex, Event, 4> = Channel::new();
pub static OUTPUT_COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, OutputCommand, 8> =
    Channel::new();
/// Latest pair of thermocouple readings, published by the sensor task.
pub static SENSOR_READINGS: Watch<CriticalSectionRawMutex, [SensorReading; 2], 2> = Watch::new();

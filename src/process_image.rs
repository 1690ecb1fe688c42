//! Scalars shared between the orchestration scan, the control loop and the
//! SSR tasks.
//!
//! Each field has exactly one writer:
//!
//! | field                         | writer             |
//! |-------------------------------|--------------------|
//! | oven / enclosure temperature  | orchestration scan |
//! | setpoint                      | orchestration scan |
//! | element power, fan speed      | orchestration scan |
//! | fault bits                    | orchestration scan |
//! | controller outputs            | control loop       |

use core::sync::atomic::Ordering;
use portable_atomic::{AtomicF32, AtomicU32};

use crate::config::Element;
use crate::fault_arbiter::FaultCodes;
use crate::pid::CurrentValueSource;

pub struct ProcessImage {
    oven_temperature: AtomicF32,
    enclosure_temperature: AtomicF32,
    setpoint: AtomicF32,
    fan_speed: AtomicF32,
    faults: AtomicU32,
    element_power: [AtomicF32; 2],
    controller_output: [AtomicF32; 2],
}

impl ProcessImage {
    pub const fn new() -> Self {
        Self {
            oven_temperature: AtomicF32::new(0.0),
            enclosure_temperature: AtomicF32::new(0.0),
            setpoint: AtomicF32::new(0.0),
            fan_speed: AtomicF32::new(0.0),
            faults: AtomicU32::new(0),
            element_power: [AtomicF32::new(0.0), AtomicF32::new(0.0)],
            controller_output: [AtomicF32::new(0.0), AtomicF32::new(0.0)],
        }
    }

    pub fn oven_temperature(&self) -> f32 {
        self.oven_temperature.load(Ordering::Relaxed)
    }

    pub fn set_oven_temperature(&self, celsius: f32) {
        self.oven_temperature.store(celsius, Ordering::Relaxed);
    }

    pub fn enclosure_temperature(&self) -> f32 {
        self.enclosure_temperature.load(Ordering::Relaxed)
    }

    pub fn set_enclosure_temperature(&self, celsius: f32) {
        self.enclosure_temperature.store(celsius, Ordering::Relaxed);
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint.load(Ordering::Relaxed)
    }

    pub fn set_setpoint(&self, celsius: f32) {
        self.setpoint.store(celsius, Ordering::Relaxed);
    }

    pub fn fan_speed(&self) -> f32 {
        self.fan_speed.load(Ordering::Relaxed)
    }

    pub fn set_fan_speed(&self, speed: f32) {
        self.fan_speed.store(speed, Ordering::Relaxed);
    }

    pub fn faults(&self) -> FaultCodes {
        FaultCodes::from_bits_truncate(self.faults.load(Ordering::Relaxed))
    }

    pub fn set_faults(&self, faults: FaultCodes) {
        self.faults.store(faults.bits(), Ordering::Relaxed);
    }

    /// Power fraction 0..1 the SSR for `element` should deliver.
    pub fn element_power(&self, element: Element) -> f32 {
        self.element_power[element.index()].load(Ordering::Relaxed)
    }

    pub fn set_element_power(&self, element: Element, fraction: f32) {
        self.element_power[element.index()].store(fraction, Ordering::Relaxed);
    }

    /// Latest loop controller output, 0..100.
    pub fn controller_output(&self, element: Element) -> f32 {
        self.controller_output[element.index()].load(Ordering::Relaxed)
    }

    pub fn set_controller_output(&self, element: Element, value: f32) {
        self.controller_output[element.index()].store(value, Ordering::Relaxed);
    }

    /// Measured oven temperature as seen by the loop controllers.
    pub fn oven_temperature_source(&self) -> OvenTemperature<'_> {
        OvenTemperature(self)
    }
}

impl Default for ProcessImage {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub struct OvenTemperature<'a>(&'a ProcessImage);

impl CurrentValueSource for OvenTemperature<'_> {
    fn read(&self) -> f32 {
        self.0.oven_temperature()
    }
}

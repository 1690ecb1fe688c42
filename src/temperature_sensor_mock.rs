//! Thermal simulation standing in for the two thermocouple amplifiers.
//!
//! Heat input follows the ON ticks the simulated relays actually delivered,
//! and the fan speed published by the scan multiplies the losses. Faults
//! can be injected per channel from the console.

use core::sync::atomic::Ordering;
use embassy_time::{Duration, Ticker};
use portable_atomic::AtomicU8;

use crate::config::Element;
use crate::fault_arbiter::{SensorReading, ThermocoupleFault};
use crate::heater::take_on_ticks;
use crate::log::*;
use crate::process_image::ProcessImage;
use crate::SENSOR_READINGS;

const UPDATE_INTERVAL_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    None,
    OpenCircuit,
    /// The amplifier stops answering, reported as an all-zero reading.
    BusSilent,
}

impl SimulatedFault {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SimulatedFault::OpenCircuit,
            2 => SimulatedFault::BusSilent,
            _ => SimulatedFault::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SimulatedFault::None => 0,
            SimulatedFault::OpenCircuit => 1,
            SimulatedFault::BusSilent => 2,
        }
    }
}

static INJECTED_FAULTS: [AtomicU8; 2] = [AtomicU8::new(0), AtomicU8::new(0)];

/// Inject a fault on thermocouple `channel` (0 or 1).
pub fn inject_fault(channel: usize, fault: SimulatedFault) {
    if let Some(slot) = INJECTED_FAULTS.get(channel) {
        slot.store(fault.as_u8(), Ordering::Relaxed);
    }
}

pub fn injected_fault(channel: usize) -> SimulatedFault {
    INJECTED_FAULTS
        .get(channel)
        .map(|slot| SimulatedFault::from_u8(slot.load(Ordering::Relaxed)))
        .unwrap_or(SimulatedFault::None)
}

#[derive(Debug, Clone)]
pub struct ThermalModel {
    pub ambient: f32,
    /// Degrees per second with both elements at full power.
    pub max_heating_rate: f32,
    /// Fraction of the excess over ambient lost per second.
    pub loss_coefficient: f32,
    /// Loss multiplier at full fan speed.
    pub fan_boost: f32,
    /// Share of the oven's excess over ambient that leaks into the enclosure.
    pub enclosure_coupling: f32,
    oven: f32,
    noise_phase: u32,
}

impl ThermalModel {
    pub fn new(ambient: f32) -> Self {
        Self {
            ambient,
            max_heating_rate: 2.5,
            loss_coefficient: 0.008,
            fan_boost: 3.0,
            enclosure_coupling: 0.04,
            oven: ambient,
            noise_phase: 0,
        }
    }

    pub fn oven_temperature(&self) -> f32 {
        self.oven
    }

    pub fn enclosure_temperature(&self) -> f32 {
        self.ambient + (self.oven - self.ambient) * self.enclosure_coupling
    }

    /// Advance by `dt` seconds with the given element duties (0..1) and
    /// fan speed (0..1).
    pub fn step(&mut self, dt: f32, lower: f32, upper: f32, fan: f32) {
        let duty = (lower.clamp(0.0, 1.0) + upper.clamp(0.0, 1.0)) / 2.0;
        let heat_input = self.max_heating_rate * duty;
        let loss = self.loss_coefficient
            * (self.oven - self.ambient)
            * (1.0 + (self.fan_boost - 1.0) * fan.clamp(0.0, 1.0));
        self.oven = (self.oven + (heat_input - loss) * dt).max(self.ambient);
    }

    /// Readings for both channels, each with its injected fault applied.
    pub fn readings(&mut self, faults: [SimulatedFault; 2]) -> [SensorReading; 2] {
        self.noise_phase = (self.noise_phase + 7) % 20;
        let noise = self.noise_phase as f32 / 100.0 - 0.1;
        let cold = self.enclosure_temperature();

        let mut readings = [SensorReading::default(); 2];
        for (channel, reading) in readings.iter_mut().enumerate() {
            // The thermocouples sit at slightly different spots.
            let hot = self.oven + noise + channel as f32 * 0.4;
            *reading = match faults[channel] {
                SimulatedFault::None => SensorReading::new(hot, cold, ThermocoupleFault::empty()),
                SimulatedFault::OpenCircuit => {
                    SensorReading::new(0.0, cold, ThermocoupleFault::OPEN_CIRCUIT)
                }
                SimulatedFault::BusSilent => SensorReading::default(),
            };
        }
        readings
    }
}

#[embassy_executor::task]
pub async fn run_temperature_sensor(image: &'static ProcessImage, ssr_tick_ms: u32) -> ! {
    let mut model = ThermalModel::new(25.0);
    info!(
        "Thermal model: max_rate={}°C/s, loss={}, fan boost={}",
        model.max_heating_rate, model.loss_coefficient, model.fan_boost
    );

    let sender = SENSOR_READINGS.sender();
    let ticks_per_update = (UPDATE_INTERVAL_MS / ssr_tick_ms.max(1)).max(1) as f32;
    let dt = UPDATE_INTERVAL_MS as f32 / 1000.0;
    let mut ticker = Ticker::every(Duration::from_millis(UPDATE_INTERVAL_MS.into()));
    loop {
        let lower = take_on_ticks(Element::Lower) as f32 / ticks_per_update;
        let upper = take_on_ticks(Element::Upper) as f32 / ticks_per_update;
        model.step(dt, lower, upper, image.fan_speed());

        let readings = model.readings([injected_fault(0), injected_fault(1)]);
        trace!(
            "Simulated oven {}°C, enclosure {}°C",
            model.oven_temperature(),
            model.enclosure_temperature()
        );
        sender.send(readings);
        ticker.next().await;
    }
}

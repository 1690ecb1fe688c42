//! Sensor fusion and fault bookkeeping.
//!
//! Two thermocouple amplifiers watch the same chamber. Each scan the arbiter
//! decides which of their readings to trust, keeps the published fault bits
//! current and counts consecutive cycles without a trusted value. A
//! persistent loss of both channels, or an enclosure that stays too hot, is
//! reported back so the scan can abort the running profile.

use crate::config::OvenConfig;
use crate::log::*;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Global health bits, published with the status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaultCodes: u32 {
        /// Thermocouple 1 gives no reading.
        const THERM1_FAIL  = 1;
        /// Thermocouple 2 gives no reading.
        const THERM2_FAIL  = 2;
        /// Amplifier 1 does not answer on the bus.
        const TSENSE1_FAIL = 4;
        /// Amplifier 2 does not answer on the bus.
        const TSENSE2_FAIL = 8;
        const OVEN_FAN_FAIL = 16;
        /// Port expander unreachable.
        const IO_BUS_FAIL  = 32;
        const DISPLAY_FAIL = 64;
        const NO_NETWORK   = 128;
    }
}

impl FaultCodes {
    pub const THERMOCOUPLES: FaultCodes = FaultCodes::THERM1_FAIL.union(FaultCodes::THERM2_FAIL);
    pub const SENSOR_BUSES: FaultCodes = FaultCodes::TSENSE1_FAIL.union(FaultCodes::TSENSE2_FAIL);

    pub fn all_thermocouples_failed(&self) -> bool {
        self.contains(Self::THERMOCOUPLES)
    }

    pub fn all_sensor_buses_failed(&self) -> bool {
        self.contains(Self::SENSOR_BUSES)
    }
}

/// Health bits owned by collaborators outside the sensor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollaboratorFault {
    Fan,
    IoBus,
    Display,
    Network,
}

impl CollaboratorFault {
    pub fn code(&self) -> FaultCodes {
        match self {
            CollaboratorFault::Fan => FaultCodes::OVEN_FAN_FAIL,
            CollaboratorFault::IoBus => FaultCodes::IO_BUS_FAIL,
            CollaboratorFault::Display => FaultCodes::DISPLAY_FAIL,
            CollaboratorFault::Network => FaultCodes::NO_NETWORK,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            CollaboratorFault::Fan => "fan",
            CollaboratorFault::IoBus => "io",
            CollaboratorFault::Display => "display",
            CollaboratorFault::Network => "network",
        }
    }
}

bitflags::bitflags! {
    /// Fault code reported by a thermocouple amplifier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ThermocoupleFault: u8 {
        const OPEN_CIRCUIT = 1;
        const SHORT_TO_GROUND = 2;
        const SHORT_TO_SUPPLY = 4;
    }
}

/// One poll of one amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    /// Thermocouple (chamber) temperature.
    pub hot: f32,
    /// Cold-junction (enclosure) temperature.
    pub cold: f32,
    pub fault: ThermocoupleFault,
}

impl SensorReading {
    pub const fn new(hot: f32, cold: f32, fault: ThermocoupleFault) -> Self {
        Self { hot, cold, fault }
    }

    /// The bus driver reports zero for both junctions when nothing replied.
    pub fn bus_silent(&self) -> bool {
        self.hot == 0.0 && self.cold == 0.0
    }
}

pub const REASON_SENSOR_BUS: &str = "sensor bus failure";
pub const REASON_THERMOCOUPLES: &str = "dual thermocouple failure";

/// What the scan has to act on after an arbitration pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Verdict {
    /// Abort reason if a running profile must stop.
    pub abort: Option<&'static str>,
    /// The enclosure has been over temperature for long enough to trip.
    pub overheated: bool,
}

// Counters saturate here so recovery is quick once readings return.
const COUNTER_CEILING: u8 = 10;

pub struct FaultArbiter {
    faults: FaultCodes,
    oven_temperature: f32,
    enclosure_temperature: f32,
    thermocouple_misses: u8,
    bus_misses: u8,
    overheat_cycles: u8,
    failure_limit: u8,
    overheat_limit: u8,
    max_enclosure_temperature: f32,
}

impl FaultArbiter {
    pub fn new(config: &OvenConfig) -> Self {
        Self {
            faults: FaultCodes::empty(),
            oven_temperature: 0.0,
            enclosure_temperature: 0.0,
            thermocouple_misses: 0,
            bus_misses: 0,
            overheat_cycles: 0,
            failure_limit: config.sensor_failure_limit,
            overheat_limit: config.overheat_limit,
            max_enclosure_temperature: config.max_enclosure_temperature,
        }
    }

    pub fn faults(&self) -> FaultCodes {
        self.faults
    }

    /// Raise or clear a fault reported by another collaborator.
    pub fn set_fault(&mut self, fault: CollaboratorFault, active: bool) {
        self.faults.set(fault.code(), active);
    }

    pub fn oven_temperature(&self) -> f32 {
        self.oven_temperature
    }

    pub fn enclosure_temperature(&self) -> f32 {
        self.enclosure_temperature
    }

    pub fn evaluate(&mut self, readings: &[SensorReading; 2]) -> Verdict {
        const THERM: [FaultCodes; 2] = [FaultCodes::THERM1_FAIL, FaultCodes::THERM2_FAIL];
        const TSENSE: [FaultCodes; 2] = [FaultCodes::TSENSE1_FAIL, FaultCodes::TSENSE2_FAIL];

        let previous = self.faults;
        for (channel, reading) in readings.iter().enumerate() {
            let silent = reading.bus_silent() || !reading.cold.is_finite();
            let open = !reading.fault.is_empty() || !reading.hot.is_finite();
            self.faults.set(THERM[channel], open || silent);
            self.faults.set(TSENSE[channel], silent);
        }
        if self.faults != previous {
            warn!("Sensor faults changed: {:#x}", self.faults.bits());
        }

        let mut verdict = Verdict::default();

        match fuse(
            self.faults,
            THERM,
            readings[0].hot,
            readings[1].hot,
        ) {
            Some(t) => {
                self.oven_temperature = t;
                self.thermocouple_misses = 0;
            }
            None => {
                self.thermocouple_misses = (self.thermocouple_misses + 1).min(COUNTER_CEILING);
            }
        }

        match fuse(
            self.faults,
            TSENSE,
            readings[0].cold,
            readings[1].cold,
        ) {
            Some(t) => {
                self.enclosure_temperature = t;
                self.bus_misses = 0;
            }
            None => {
                self.bus_misses = (self.bus_misses + 1).min(COUNTER_CEILING);
            }
        }

        // A dead bus also silences the thermocouples; name the root cause.
        if self.bus_misses > self.failure_limit {
            verdict.abort = Some(REASON_SENSOR_BUS);
        } else if self.thermocouple_misses > self.failure_limit {
            verdict.abort = Some(REASON_THERMOCOUPLES);
        }

        if self.enclosure_temperature > self.max_enclosure_temperature {
            self.overheat_cycles = (self.overheat_cycles + 1).min(COUNTER_CEILING);
            verdict.overheated = self.overheat_cycles > self.overheat_limit;
        } else {
            self.overheat_cycles = 0;
        }

        verdict
    }
}

/// Average both channels when healthy, fall back to the healthy one, or
/// report no trusted value.
fn fuse(faults: FaultCodes, flags: [FaultCodes; 2], first: f32, second: f32) -> Option<f32> {
    match (faults.contains(flags[0]), faults.contains(flags[1])) {
        (false, false) => Some((first + second) / 2.0),
        (true, false) => Some(second),
        (false, true) => Some(first),
        (true, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTHY: SensorReading = SensorReading::new(200.0, 30.0, ThermocoupleFault::empty());
    const SILENT: SensorReading = SensorReading::new(0.0, 0.0, ThermocoupleFault::empty());

    fn arbiter() -> FaultArbiter {
        FaultArbiter::new(&OvenConfig::default())
    }

    #[test]
    fn averages_healthy_channels() {
        let mut arbiter = arbiter();
        let verdict = arbiter.evaluate(&[
            SensorReading::new(200.0, 30.0, ThermocoupleFault::empty()),
            SensorReading::new(210.0, 32.0, ThermocoupleFault::empty()),
        ]);
        assert_eq!(verdict, Verdict::default());
        assert_eq!(arbiter.oven_temperature(), 205.0);
        assert_eq!(arbiter.enclosure_temperature(), 31.0);
        assert!(arbiter.faults().is_empty());
    }

    #[test]
    fn fails_over_to_the_healthy_thermocouple() {
        let mut arbiter = arbiter();
        arbiter.evaluate(&[
            SensorReading::new(999.0, 31.0, ThermocoupleFault::OPEN_CIRCUIT),
            SensorReading::new(180.0, 33.0, ThermocoupleFault::empty()),
        ]);
        assert_eq!(arbiter.faults(), FaultCodes::THERM1_FAIL);
        assert_eq!(arbiter.oven_temperature(), 180.0);
        // The cold junction of a channel with an open thermocouple still counts.
        assert_eq!(arbiter.enclosure_temperature(), 32.0);
    }

    #[test]
    fn silent_bus_marks_both_flags_and_uses_other_channel() {
        let mut arbiter = arbiter();
        arbiter.evaluate(&[HEALTHY, SILENT]);
        assert_eq!(
            arbiter.faults(),
            FaultCodes::THERM2_FAIL | FaultCodes::TSENSE2_FAIL
        );
        assert_eq!(arbiter.oven_temperature(), 200.0);
        assert_eq!(arbiter.enclosure_temperature(), 30.0);
    }

    #[test]
    fn total_loss_keeps_last_value_then_escalates() {
        let mut arbiter = arbiter();
        arbiter.evaluate(&[HEALTHY, HEALTHY]);

        for _ in 0..5 {
            let verdict = arbiter.evaluate(&[SILENT, SILENT]);
            assert_eq!(verdict.abort, None);
            assert_eq!(arbiter.oven_temperature(), 200.0);
        }
        let verdict = arbiter.evaluate(&[SILENT, SILENT]);
        assert_eq!(verdict.abort, Some(REASON_SENSOR_BUS));
        assert!(arbiter.faults().all_sensor_buses_failed());

        // One good cycle clears the count.
        let verdict = arbiter.evaluate(&[HEALTHY, SILENT]);
        assert_eq!(verdict.abort, None);
    }

    #[test]
    fn open_thermocouples_escalate_separately() {
        let mut arbiter = arbiter();
        let open = SensorReading::new(0.0, 25.0, ThermocoupleFault::OPEN_CIRCUIT);
        let mut last = Verdict::default();
        for _ in 0..6 {
            last = arbiter.evaluate(&[open, open]);
        }
        assert_eq!(last.abort, Some(REASON_THERMOCOUPLES));
        assert!(!arbiter.faults().all_sensor_buses_failed());
    }

    #[test]
    fn enclosure_must_stay_hot_to_trip() {
        let mut arbiter = arbiter();
        let hot = SensorReading::new(200.0, 55.0, ThermocoupleFault::empty());
        assert!(!arbiter.evaluate(&[hot, hot]).overheated);
        assert!(!arbiter.evaluate(&[hot, hot]).overheated);
        assert!(!arbiter.evaluate(&[hot, hot]).overheated);
        // A single cool cycle resets the count.
        arbiter.evaluate(&[HEALTHY, HEALTHY]);
        for _ in 0..3 {
            assert!(!arbiter.evaluate(&[hot, hot]).overheated);
        }
        assert!(arbiter.evaluate(&[hot, hot]).overheated);
    }

    #[test]
    fn collaborator_faults_do_not_touch_sensor_bits() {
        let mut arbiter = arbiter();
        arbiter.set_fault(CollaboratorFault::Network, true);
        arbiter.set_fault(CollaboratorFault::Fan, true);
        assert_eq!(arbiter.faults(), FaultCodes::NO_NETWORK | FaultCodes::OVEN_FAN_FAIL);
        arbiter.evaluate(&[HEALTHY, HEALTHY]);
        assert_eq!(arbiter.faults(), FaultCodes::NO_NETWORK | FaultCodes::OVEN_FAN_FAIL);
        arbiter.set_fault(CollaboratorFault::Fan, false);
        assert_eq!(arbiter.faults(), FaultCodes::NO_NETWORK);
    }
}

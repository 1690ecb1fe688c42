//! Runs a loaded profile against the clock.
//!
//! The engine owns the run state (index, gates, elapsed-time clock, abort
//! reason) and the actuation it asks for: whether the elements may be
//! driven, the fan speed, the start-button LED, a pending beep and the
//! control setpoint. The orchestration scan feeds it inputs and copies the
//! actuation out; nothing else mutates it.

use embassy_time::{Duration, Instant};
use serde::Serialize;

use crate::config::OvenConfig;
use crate::fault_arbiter::FaultCodes;
use crate::log::*;
use crate::profile::{DatapointFlags, Profile, ProfileDatapoint, MAX_DATAPOINTS, ONE_SHOT_GATES};
use crate::{BeepLength, LedState};

pub const REASON_DOOR_OPENED: &str = "door opened";
pub const REASON_CANCELLED: &str = "cancelled";
pub const REASON_OVERHEAT: &str = "enclosure overheat";

/// After a run the fan stops on door open once the chamber is below this.
const FAN_STOP_TEMPERATURE: f32 = 30.0;
/// Profiles starting at or above this temperature preset the bias to 50.
const HOT_START_TEMPERATURE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    NotStarted,
    Running,
    Aborted,
    Finished,
}

impl ProcessState {
    pub fn to_str(&self) -> &'static str {
        match self {
            ProcessState::NotStarted => "NotStarted",
            ProcessState::Running => "Running",
            ProcessState::Aborted => "Aborted",
            ProcessState::Finished => "Finished",
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Success,
    AlreadyRunning,
    NoProfileLoaded,
    DoorAjar,
    NoThermocouple,
    SensorBusFailure,
    EnclosureTooHot,
}

impl StartOutcome {
    pub fn to_str(&self) -> &'static str {
        match self {
            StartOutcome::Success => "Started",
            StartOutcome::AlreadyRunning => "Already running",
            StartOutcome::NoProfileLoaded => "No profile loaded",
            StartOutcome::DoorAjar => "Door ajar",
            StartOutcome::NoThermocouple => "No thermocouple",
            StartOutcome::SensorBusFailure => "Sensor bus failure",
            StartOutcome::EnclosureTooHot => "Enclosure too hot",
        }
    }
}

#[cfg(feature = "rp2040")]
impl defmt::Format for StartOutcome {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.to_str())
    }
}

/// Measurements the engine looks at each scan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineInputs {
    pub oven_temperature: f32,
    pub enclosure_temperature: f32,
    pub door_open: bool,
    pub faults: FaultCodes,
}

pub struct ProfileEngine {
    profile: Option<Profile>,
    state: ProcessState,
    current_index: usize,
    /// One-shot gates already satisfied in this run, per datapoint.
    cleared: [DatapointFlags; MAX_DATAPOINTS],

    // elapsed = elapsed_base + (now - anchor) while running
    elapsed_base: Duration,
    anchor: Instant,
    run_started: Instant,
    run_time: Duration,

    abort_reason: &'static str,
    start_limit: f32,

    target_temperature: f32,
    setpoint: f32,
    elements_enabled: bool,
    fan_speed: f32,
    led: LedState,
    pending_beep: Option<BeepLength>,
}

impl ProfileEngine {
    pub fn new(config: &OvenConfig) -> Self {
        Self {
            profile: None,
            state: ProcessState::NotStarted,
            current_index: 0,
            cleared: [DatapointFlags::empty(); MAX_DATAPOINTS],
            elapsed_base: Duration::from_ticks(0),
            anchor: Instant::from_ticks(0),
            run_started: Instant::from_ticks(0),
            run_time: Duration::from_ticks(0),
            abort_reason: "",
            start_limit: config.max_enclosure_temperature - config.enclosure_start_margin,
            target_temperature: 0.0,
            setpoint: 0.0,
            elements_enabled: false,
            fan_speed: 0.0,
            led: LedState::LedOff,
            pending_beep: None,
        }
    }

    /// Replace the loaded profile. Refused while a run is in progress.
    pub fn load(&mut self, profile: Profile) -> bool {
        if self.state == ProcessState::Running {
            warn!("Cannot load {} while running", profile.name.as_str());
            return false;
        }
        info!(
            "Loaded profile {} ({} datapoints)",
            profile.name.as_str(),
            profile.len()
        );
        self.target_temperature = profile.datapoints()[0].temperature;
        self.setpoint = self.target_temperature;
        self.profile = Some(profile);
        self.reset();
        true
    }

    /// Return a finished or aborted run to NotStarted.
    pub fn reset(&mut self) {
        if self.state == ProcessState::Running {
            return;
        }
        self.state = ProcessState::NotStarted;
        self.current_index = 0;
        self.elapsed_base = Duration::from_ticks(0);
        self.run_time = Duration::from_ticks(0);
        self.abort_reason = "";
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn abort_reason(&self) -> Option<&'static str> {
        match self.state {
            ProcessState::Aborted => Some(self.abort_reason),
            _ => None,
        }
    }

    /// Target shown to the user, interpolated on `LERP_FROM` segments.
    pub fn target_temperature(&self) -> f32 {
        self.target_temperature
    }

    /// Setpoint for the loop controllers.
    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn elements_enabled(&self) -> bool {
        self.elements_enabled
    }

    pub fn fan_speed(&self) -> f32 {
        self.fan_speed
    }

    pub fn set_fan_speed(&mut self, speed: f32) {
        self.fan_speed = speed.clamp(0.0, 1.0);
    }

    pub fn led(&self) -> LedState {
        self.led
    }

    pub fn take_beep(&mut self) -> Option<BeepLength> {
        self.pending_beep.take()
    }

    /// Bias both loop controllers start from for the loaded profile.
    pub fn initial_bias(&self) -> f32 {
        match self.point(0) {
            Some(first) if first.temperature >= HOT_START_TEMPERATURE => 50.0,
            _ => 0.0,
        }
    }

    /// Profile time. Frozen while gated and once the run has ended.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.state {
            ProcessState::Running => self.elapsed_base + now.saturating_duration_since(self.anchor),
            _ => self.elapsed_base,
        }
    }

    /// Wall-clock time since start, frozen when the run ends.
    pub fn run_time(&self, now: Instant) -> Duration {
        match self.state {
            ProcessState::Running => now.saturating_duration_since(self.run_started),
            _ => self.run_time,
        }
    }

    pub fn start(&mut self, now: Instant, inputs: &EngineInputs) -> StartOutcome {
        if self.state == ProcessState::Running {
            return StartOutcome::AlreadyRunning;
        }
        let first = match self.point(0) {
            Some(point) => point,
            None => return StartOutcome::NoProfileLoaded,
        };
        if inputs.door_open && !first.flags.contains(DatapointFlags::NO_ABORT_DOOR_OPEN) {
            return StartOutcome::DoorAjar;
        }
        if inputs.faults.all_thermocouples_failed() {
            return StartOutcome::NoThermocouple;
        }
        if inputs.faults.all_sensor_buses_failed() {
            return StartOutcome::SensorBusFailure;
        }
        if inputs.enclosure_temperature > self.start_limit {
            return StartOutcome::EnclosureTooHot;
        }

        self.state = ProcessState::Running;
        self.current_index = 0;
        self.cleared = [DatapointFlags::empty(); MAX_DATAPOINTS];
        self.elapsed_base = Duration::from_ticks(0);
        self.anchor = now;
        self.run_started = now;
        self.run_time = Duration::from_ticks(0);
        self.abort_reason = "";
        self.target_temperature = first.temperature;
        self.setpoint = first.temperature;
        self.elements_enabled = true;
        self.led = LedState::LedOn;

        if let Some(profile) = &self.profile {
            info!("Starting profile {}", profile.name.as_str());
        }
        StartOutcome::Success
    }

    /// Stop the run: elements off, LED off, long beep.
    pub fn abort(&mut self, now: Instant, reason: &'static str) {
        self.end_run(now);
        self.state = ProcessState::Aborted;
        self.abort_reason = reason;
        self.led = LedState::LedOff;
        self.pending_beep = Some(BeepLength::Long);
        warn!("Profile aborted: {}", reason);
    }

    /// Enclosure over-temperature: elements off, fan to full and any
    /// running profile aborted.
    pub fn trip_overheat(&mut self, now: Instant) {
        if self.state == ProcessState::Running {
            self.abort(now, REASON_OVERHEAT);
            self.led = LedState::FAST_FLASH;
        }
        self.elements_enabled = false;
        self.fan_speed = 1.0;
    }

    pub fn tick(&mut self, now: Instant, inputs: &EngineInputs) {
        if self.state != ProcessState::Running {
            self.teardown(inputs);
            return;
        }

        // Each pass either settles on a datapoint or advances the index, so
        // this ends after at most one pass per datapoint.
        while self.state == ProcessState::Running && self.step(now, inputs) {}
    }

    /// Returns true when the index advanced and the new datapoint needs
    /// evaluating in the same scan.
    fn step(&mut self, now: Instant, inputs: &EngineInputs) -> bool {
        let index = self.current_index;
        let point = match self.point(index) {
            Some(point) => point,
            None => {
                self.finish(now);
                return false;
            }
        };
        let previous = index.checked_sub(1).and_then(|i| self.point(i));
        let hold_at = previous
            .map(|p| p.offset())
            .unwrap_or(Duration::from_ticks(0));
        let flags = self.active_flags(index, point.flags);

        if flags.contains(DatapointFlags::COOLING) {
            self.fan_speed = 1.0;
        }

        self.target_temperature = match previous {
            Some(previous) if flags.contains(DatapointFlags::LERP_FROM) => {
                interpolate(&previous, &point, self.elapsed(now))
            }
            _ => point.temperature,
        };

        if flags.contains(DatapointFlags::WAIT_FOR_TEMPERATURE) {
            if inputs.oven_temperature < self.target_temperature {
                self.hold(now, hold_at);
            } else {
                self.clear_gate(now, hold_at, index, DatapointFlags::WAIT_FOR_TEMPERATURE);
            }
        }

        if flags.contains(DatapointFlags::INSERT_ITEM_NOTIFICATION) {
            self.hold(now, hold_at);
            if inputs.door_open {
                self.clear_gate(now, hold_at, index, DatapointFlags::INSERT_ITEM_NOTIFICATION);
            }
        }

        let cooling = flags.contains(DatapointFlags::COOLING);
        if inputs.door_open && !cooling {
            if flags.contains(DatapointFlags::NO_ABORT_DOOR_OPEN) {
                self.hold(now, hold_at);
            } else {
                self.abort(now, REASON_DOOR_OPENED);
                return false;
            }
        }

        let flags = self.active_flags(index, point.flags);
        if flags.contains(DatapointFlags::NO_ABORT_DOOR_OPEN) && !cooling {
            if !inputs.door_open && !flags.contains(DatapointFlags::INSERT_ITEM_NOTIFICATION) {
                self.clear_gate(now, hold_at, index, DatapointFlags::NO_ABORT_DOOR_OPEN);
            } else {
                self.hold(now, hold_at);
            }
        }

        self.setpoint = if point.flags.contains(DatapointFlags::NEXT_TEMPERATURE) {
            self.point(index + 1)
                .map(|next| next.temperature)
                .unwrap_or(point.temperature)
        } else {
            point.temperature
        };

        if self.elapsed(now) > point.offset() {
            self.current_index += 1;
            match self.point(self.current_index) {
                None => {
                    self.finish(now);
                    return false;
                }
                Some(next) => {
                    debug!("Advanced to datapoint {}", self.current_index);
                    if next.flags.contains(DatapointFlags::BEEP) {
                        self.pending_beep = Some(BeepLength::Short);
                    }
                    return true;
                }
            }
        }
        false
    }

    pub fn status_text(&self) -> &'static str {
        match self.state {
            ProcessState::Aborted => self.abort_reason,
            ProcessState::Finished => "Complete",
            ProcessState::NotStarted => "Press Start",
            ProcessState::Running => {
                let flags = match self.point(self.current_index) {
                    Some(point) => self.active_flags(self.current_index, point.flags),
                    None => DatapointFlags::empty(),
                };
                if flags.contains(DatapointFlags::COOLING) {
                    "Cooling"
                } else if flags.contains(DatapointFlags::INSERT_ITEM_NOTIFICATION) {
                    "Insert item now"
                } else if flags.contains(DatapointFlags::NO_ABORT_DOOR_OPEN) {
                    "Close door to continue"
                } else if flags.contains(DatapointFlags::WAIT_FOR_TEMPERATURE) {
                    "Heating"
                } else {
                    "Baking"
                }
            }
        }
    }

    fn point(&self, index: usize) -> Option<ProfileDatapoint> {
        self.profile.as_ref()?.get(index).copied()
    }

    fn active_flags(&self, index: usize, flags: DatapointFlags) -> DatapointFlags {
        flags.difference(self.cleared[index] & ONE_SHOT_GATES)
    }

    /// Mark `gate` satisfied for this run. The clock restarts from the hold
    /// point so time spent gated is never counted.
    fn clear_gate(&mut self, now: Instant, at: Duration, index: usize, gate: DatapointFlags) {
        self.cleared[index].insert(gate);
        self.hold(now, at);
    }

    /// Pin the profile clock at `at`.
    fn hold(&mut self, now: Instant, at: Duration) {
        self.elapsed_base = at;
        self.anchor = now;
    }

    fn finish(&mut self, now: Instant) {
        self.end_run(now);
        self.state = ProcessState::Finished;
        self.current_index = self.current_index.min(self.len().saturating_sub(1));
        self.led = LedState::SLOW_FLASH;
        self.pending_beep = Some(BeepLength::Long);
        info!("Profile complete");
    }

    fn end_run(&mut self, now: Instant) {
        self.elapsed_base = self.elapsed(now);
        self.run_time = self.run_time(now);
        self.elements_enabled = false;
    }

    fn teardown(&mut self, inputs: &EngineInputs) {
        let ended = matches!(self.state, ProcessState::Finished | ProcessState::Aborted);
        if ended && inputs.door_open {
            self.led = LedState::LedOff;
            if inputs.oven_temperature < FAN_STOP_TEMPERATURE {
                self.fan_speed = 0.0;
            }
        }
    }

    fn len(&self) -> usize {
        self.profile.as_ref().map(Profile::len).unwrap_or(0)
    }
}

/// Linear interpolation from `previous` to `point` by profile time. A zero
/// span steps straight to `point`.
fn interpolate(previous: &ProfileDatapoint, point: &ProfileDatapoint, elapsed: Duration) -> f32 {
    let span = point.offset().as_millis().saturating_sub(previous.offset().as_millis());
    if span == 0 {
        return point.temperature;
    }
    let since = elapsed.as_millis().saturating_sub(previous.offset().as_millis());
    let fraction = since as f32 / span as f32;
    if fraction >= 1.0 {
        point.temperature
    } else {
        previous.temperature + fraction * (point.temperature - previous.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn engine_with(points: &[ProfileDatapoint]) -> ProfileEngine {
        let mut engine = ProfileEngine::new(&OvenConfig::default());
        assert!(engine.load(Profile::new("test", points).unwrap()));
        engine
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    fn closed(oven: f32) -> EngineInputs {
        EngineInputs {
            oven_temperature: oven,
            enclosure_temperature: 25.0,
            door_open: false,
            faults: FaultCodes::empty(),
        }
    }

    fn open(oven: f32) -> EngineInputs {
        EngineInputs {
            door_open: true,
            ..closed(oven)
        }
    }

    const NONE: DatapointFlags = DatapointFlags::empty();

    #[rstest]
    #[case(EngineInputs { door_open: true, ..closed(20.0) }, StartOutcome::DoorAjar)]
    #[case(EngineInputs { faults: FaultCodes::THERMOCOUPLES, ..closed(20.0) }, StartOutcome::NoThermocouple)]
    #[case(EngineInputs { faults: FaultCodes::SENSOR_BUSES, ..closed(20.0) }, StartOutcome::SensorBusFailure)]
    #[case(EngineInputs { enclosure_temperature: 35.5, ..closed(20.0) }, StartOutcome::EnclosureTooHot)]
    #[case(EngineInputs { enclosure_temperature: 35.0, ..closed(20.0) }, StartOutcome::Success)]
    #[case(EngineInputs { faults: FaultCodes::THERM1_FAIL, ..closed(20.0) }, StartOutcome::Success)]
    fn start_preconditions(#[case] inputs: EngineInputs, #[case] expected: StartOutcome) {
        let mut engine = engine_with(&[ProfileDatapoint::new(60, 100.0, NONE)]);
        assert_eq!(engine.start(at(0), &inputs), expected);
        let running = expected == StartOutcome::Success;
        assert_eq!(engine.is_running(), running);
        assert_eq!(engine.elements_enabled(), running);
    }

    #[test]
    fn start_needs_a_profile() {
        let mut engine = ProfileEngine::new(&OvenConfig::default());
        assert_eq!(engine.start(at(0), &closed(20.0)), StartOutcome::NoProfileLoaded);
    }

    #[test]
    fn door_precondition_respects_first_datapoint() {
        let mut engine =
            engine_with(&[ProfileDatapoint::new(0, 25.0, DatapointFlags::NO_ABORT_DOOR_OPEN)]);
        assert_eq!(engine.start(at(0), &open(20.0)), StartOutcome::Success);
        assert_eq!(engine.start(at(1), &open(20.0)), StartOutcome::AlreadyRunning);
    }

    #[test]
    fn advances_and_finishes() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(10, 100.0, NONE),
            ProfileDatapoint::new(20, 150.0, DatapointFlags::BEEP),
        ]);
        engine.start(at(0), &closed(20.0));
        assert_eq!(engine.led(), LedState::LedOn);

        engine.tick(at(5), &closed(20.0));
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.setpoint(), 100.0);

        engine.tick(at(11), &closed(20.0));
        assert_eq!(engine.current_index(), 1);
        assert_eq!(engine.take_beep(), Some(BeepLength::Short));
        assert_eq!(engine.setpoint(), 150.0);

        engine.tick(at(21), &closed(20.0));
        assert_eq!(engine.state(), ProcessState::Finished);
        assert!(!engine.elements_enabled());
        assert_eq!(engine.led(), LedState::SLOW_FLASH);
        assert_eq!(engine.take_beep(), Some(BeepLength::Long));
        assert_eq!(engine.status_text(), "Complete");
        assert_eq!(engine.run_time(at(100)), Duration::from_secs(21));
    }

    #[test]
    fn late_tick_consumes_several_boundaries() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(10, 100.0, NONE),
            ProfileDatapoint::new(20, 120.0, NONE),
            ProfileDatapoint::new(30, 140.0, NONE),
            ProfileDatapoint::new(40, 160.0, NONE),
        ]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(35), &closed(20.0));
        assert_eq!(engine.current_index(), 3);
        assert_eq!(engine.setpoint(), 160.0);
    }

    #[test]
    fn zero_length_segments_do_not_loop() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(0, 100.0, NONE),
            ProfileDatapoint::new(0, 120.0, DatapointFlags::LERP_FROM),
            ProfileDatapoint::new(0, 140.0, DatapointFlags::LERP_FROM),
        ]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(1), &closed(20.0));
        assert_eq!(engine.state(), ProcessState::Finished);
    }

    #[test]
    fn interpolation_is_exact_at_boundaries() {
        let previous = ProfileDatapoint::new(60, 150.0, NONE);
        let point = ProfileDatapoint::new(120, 217.0, DatapointFlags::LERP_FROM);
        assert_eq!(interpolate(&previous, &point, Duration::from_secs(60)), 150.0);
        assert_eq!(interpolate(&previous, &point, Duration::from_secs(90)), 183.5);
        assert_eq!(interpolate(&previous, &point, Duration::from_secs(120)), 217.0);

        let step = ProfileDatapoint::new(60, 200.0, DatapointFlags::LERP_FROM);
        assert_eq!(interpolate(&previous, &step, Duration::from_secs(60)), 200.0);
    }

    #[test]
    fn next_temperature_leads_the_setpoint() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(30, 150.0, DatapointFlags::NEXT_TEMPERATURE),
            ProfileDatapoint::new(60, 217.0, DatapointFlags::LERP_FROM),
        ]);
        engine.start(at(0), &closed(100.0));
        engine.tick(at(10), &closed(100.0));
        assert_eq!(engine.setpoint(), 217.0);
        assert_eq!(engine.target_temperature(), 150.0);
    }

    #[test]
    fn wait_gate_holds_clock_then_clears_once() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(0, 25.0, DatapointFlags::WAIT_FOR_TEMPERATURE),
            ProfileDatapoint::new(60, 150.0, NONE),
        ]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(30), &closed(20.0));
        assert_eq!(engine.elapsed(at(30)), Duration::from_secs(0));
        assert_eq!(engine.status_text(), "Heating");

        engine.tick(at(40), &closed(26.0));
        assert_eq!(engine.current_index(), 0);
        // Gate is cleared; dropping below again does not re-arm it.
        engine.tick(at(41), &closed(10.0));
        assert_eq!(engine.current_index(), 1);
        assert_eq!(engine.elapsed(at(41)), Duration::from_secs(1));
        assert_eq!(engine.status_text(), "Baking");
    }

    #[test]
    fn insert_item_waits_for_door_then_for_close() {
        let insert = DatapointFlags::INSERT_ITEM_NOTIFICATION | DatapointFlags::NO_ABORT_DOOR_OPEN;
        let mut engine = engine_with(&[
            ProfileDatapoint::new(10, 100.0, NONE),
            ProfileDatapoint::new(20, 100.0, insert),
            ProfileDatapoint::new(80, 120.0, NONE),
        ]);
        engine.start(at(0), &closed(100.0));
        engine.tick(at(11), &closed(100.0));
        assert_eq!(engine.current_index(), 1);
        assert_eq!(engine.status_text(), "Insert item now");

        engine.tick(at(50), &closed(100.0));
        assert_eq!(engine.elapsed(at(50)), Duration::from_secs(10));

        engine.tick(at(55), &open(100.0));
        assert!(engine.is_running());
        assert_eq!(engine.status_text(), "Close door to continue");
        assert_eq!(engine.elapsed(at(55)), Duration::from_secs(10));

        engine.tick(at(60), &closed(100.0));
        assert_eq!(engine.status_text(), "Baking");
        engine.tick(at(65), &closed(100.0));
        assert_eq!(engine.elapsed(at(65)), Duration::from_secs(15));

        // No longer tolerated once the gate has been used.
        engine.tick(at(66), &open(100.0));
        assert_eq!(engine.abort_reason(), Some(REASON_DOOR_OPENED));
    }

    #[test]
    fn door_open_aborts_unless_cooling() {
        let mut engine = engine_with(&[
            ProfileDatapoint::new(10, 200.0, NONE),
            ProfileDatapoint::new(40, 50.0, DatapointFlags::COOLING),
        ]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(11), &closed(200.0));
        engine.tick(at(12), &open(190.0));
        assert!(engine.is_running());
        assert_eq!(engine.fan_speed(), 1.0);
        assert_eq!(engine.status_text(), "Cooling");

        let mut engine = engine_with(&[ProfileDatapoint::new(10, 200.0, NONE)]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(3), &open(20.0));
        assert_eq!(engine.state(), ProcessState::Aborted);
        assert_eq!(engine.status_text(), REASON_DOOR_OPENED);
        assert_eq!(engine.led(), LedState::LedOff);
        assert_eq!(engine.take_beep(), Some(BeepLength::Long));
        assert_eq!(engine.elapsed(at(100)), Duration::from_secs(3));
    }

    #[test]
    fn rerun_rearms_gates_without_touching_the_profile() {
        let points = [
            ProfileDatapoint::new(0, 25.0, DatapointFlags::WAIT_FOR_TEMPERATURE),
            ProfileDatapoint::new(5, 25.0, NONE),
        ];
        let mut engine = engine_with(&points);
        engine.start(at(0), &closed(30.0));
        engine.tick(at(1), &closed(30.0));
        engine.tick(at(7), &closed(30.0));
        assert_eq!(engine.state(), ProcessState::Finished);
        assert_eq!(engine.profile().unwrap().datapoints(), &points[..]);

        assert_eq!(engine.start(at(100), &closed(20.0)), StartOutcome::Success);
        engine.tick(at(150), &closed(20.0));
        assert_eq!(engine.elapsed(at(150)), Duration::from_secs(0));
        assert_eq!(engine.status_text(), "Heating");
    }

    #[test]
    fn teardown_after_run() {
        let mut engine = engine_with(&[ProfileDatapoint::new(1, 50.0, DatapointFlags::COOLING)]);
        engine.start(at(0), &closed(20.0));
        engine.tick(at(1), &closed(60.0));
        engine.tick(at(2), &closed(60.0));
        assert_eq!(engine.state(), ProcessState::Finished);
        assert_eq!(engine.fan_speed(), 1.0);

        engine.tick(at(3), &open(40.0));
        assert_eq!(engine.led(), LedState::LedOff);
        assert_eq!(engine.fan_speed(), 1.0);
        engine.tick(at(4), &open(29.0));
        assert_eq!(engine.fan_speed(), 0.0);
    }

    #[test]
    fn overheat_aborts_and_flashes() {
        let mut engine = engine_with(&[ProfileDatapoint::new(100, 200.0, NONE)]);
        engine.start(at(0), &closed(20.0));
        engine.trip_overheat(at(5));
        assert_eq!(engine.abort_reason(), Some(REASON_OVERHEAT));
        assert_eq!(engine.led(), LedState::FAST_FLASH);
        assert_eq!(engine.fan_speed(), 1.0);
        assert!(!engine.elements_enabled());
    }

    #[test]
    fn initial_bias_follows_first_temperature() {
        assert_eq!(
            engine_with(&[ProfileDatapoint::new(0, 150.0, NONE)]).initial_bias(),
            50.0
        );
        assert_eq!(
            engine_with(&[ProfileDatapoint::new(0, 49.0, NONE)]).initial_bias(),
            0.0
        );
    }

    #[test]
    fn load_is_refused_while_running() {
        let mut engine = engine_with(&[ProfileDatapoint::new(100, 200.0, NONE)]);
        engine.start(at(0), &closed(20.0));
        let other = Profile::new("other", &[ProfileDatapoint::new(1, 1.0, NONE)]).unwrap();
        assert!(!engine.load(other));
        assert_eq!(engine.profile().unwrap().name.as_str(), "test");
    }

    proptest! {
        #[test]
        fn wait_gate_never_lets_clock_pass_the_datapoint(
            steps in proptest::collection::vec((1u64..5000, 0.0f32..149.0), 1..60)
        ) {
            let mut engine = engine_with(&[
                ProfileDatapoint::new(30, 100.0, NONE),
                ProfileDatapoint::new(90, 150.0, DatapointFlags::WAIT_FOR_TEMPERATURE),
                ProfileDatapoint::new(200, 150.0, NONE),
            ]);
            engine.start(Instant::from_millis(0), &closed(100.0));
            let mut now = 0u64;
            let mut last_index = 0;
            for (step, oven) in steps {
                now += step;
                let instant = Instant::from_millis(now);
                engine.tick(instant, &closed(oven));
                prop_assert!(engine.current_index() >= last_index);
                last_index = engine.current_index();
                if engine.current_index() == 1 {
                    prop_assert!(engine.elapsed(instant) <= Duration::from_secs(90));
                }
                prop_assert!(engine.current_index() < 2);
            }
        }
    }
}

//! The orchestration scan.
//!
//! `Oven` is the explicit owner of the run: it polls the arbiter, ticks the
//! profile engine, publishes setpoint and element power into the process
//! image and turns user events into engine operations. Output and control
//! commands are queued during a scan and flushed by `oven_task`, so a scan
//! never blocks.

use core::fmt;
use embassy_time::{Duration, Instant, Ticker};
use heapless::{String, Vec};

use crate::config::{Element, OvenConfig};
use crate::control_loop::{ControlCommand, CONTROL_COMMANDS};
use crate::fault_arbiter::{FaultArbiter, SensorReading};
use crate::log::*;
use crate::process_image::ProcessImage;
use crate::profile_engine::{EngineInputs, ProfileEngine, StartOutcome, REASON_CANCELLED};
use crate::profile_library::{LibraryError, ProfileLibrary};
use crate::status::{LoadMonitor, OvenStatus, CURRENT_STATE};
use crate::{
    Event, Key, LedState, OutputCommand, INPUT_EVENT_CHANNEL, OUTPUT_COMMAND_CHANNEL,
    SENSOR_READINGS,
};

/// Unexpected fault inside the scan. Always handled by failing safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenError {
    NonFiniteOutput { element: Element },
    NonFiniteSetpoint,
}

impl OvenError {
    pub fn to_str(&self) -> &'static str {
        match self {
            OvenError::NonFiniteOutput { .. } => "Non-finite controller output",
            OvenError::NonFiniteSetpoint => "Non-finite setpoint",
        }
    }
}

impl fmt::Display for OvenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OvenError::NonFiniteOutput { element } => {
                write!(f, "{} on {} element", self.to_str(), element.to_str())
            }
            OvenError::NonFiniteSetpoint => write!(f, "{}", self.to_str()),
        }
    }
}

#[cfg(feature = "rp2040")]
impl defmt::Format for OvenError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.to_str())
    }
}

const FAULT_STATE: &str = "Fault";
const FAULT_TEXT: &str = "Fault - outputs disabled";

pub struct Oven<'a> {
    image: &'a ProcessImage,
    library: &'a mut ProfileLibrary,
    arbiter: FaultArbiter,
    engine: ProfileEngine,
    selected: usize,
    door_open: bool,
    failed: bool,

    sent_led: Option<LedState>,
    sent_fan: Option<f32>,
    outputs: Vec<OutputCommand, 8>,
    control: Vec<ControlCommand, 4>,
}

impl<'a> Oven<'a> {
    pub fn new(config: &OvenConfig, image: &'a ProcessImage, library: &'a mut ProfileLibrary) -> Self {
        Self {
            image,
            library,
            arbiter: FaultArbiter::new(config),
            engine: ProfileEngine::new(config),
            selected: 0,
            door_open: false,
            failed: false,
            sent_led: None,
            sent_fan: None,
            outputs: Vec::new(),
            control: Vec::new(),
        }
    }

    pub fn engine(&self) -> &ProfileEngine {
        &self.engine
    }

    pub fn arbiter(&self) -> &FaultArbiter {
        &self.arbiter
    }

    pub fn door_open(&self) -> bool {
        self.door_open
    }

    /// One orchestration cycle.
    pub fn scan(&mut self, now: Instant, readings: &[SensorReading; 2]) -> Result<(), OvenError> {
        let verdict = self.arbiter.evaluate(readings);
        self.image.set_oven_temperature(self.arbiter.oven_temperature());
        self.image.set_enclosure_temperature(self.arbiter.enclosure_temperature());
        self.image.set_faults(self.arbiter.faults());

        if let Some(reason) = verdict.abort {
            if self.engine.is_running() {
                self.engine.abort(now, reason);
            }
        }

        let inputs = self.engine_inputs();
        self.engine.tick(now, &inputs);

        if verdict.overheated {
            self.engine.trip_overheat(now);
        }

        let setpoint = self.engine.setpoint();
        if !setpoint.is_finite() {
            return Err(OvenError::NonFiniteSetpoint);
        }
        self.image.set_setpoint(setpoint);

        for element in Element::ALL {
            let output = self.image.controller_output(element);
            if !output.is_finite() {
                return Err(OvenError::NonFiniteOutput { element });
            }
            let power = if self.engine.elements_enabled() {
                (output / 100.0).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.image.set_element_power(element, power);
        }

        let fan = self.engine.fan_speed();
        self.image.set_fan_speed(fan);
        if self.sent_fan != Some(fan) {
            self.sent_fan = Some(fan);
            self.queue_output(OutputCommand::SetFanSpeed(fan));
        }

        let led = self.engine.led();
        if self.sent_led != Some(led) {
            self.sent_led = Some(led);
            self.queue_output(OutputCommand::SetStartButtonLight(led));
        }

        if let Some(length) = self.engine.take_beep() {
            self.queue_output(OutputCommand::Beep(length));
        }
        Ok(())
    }

    pub fn handle_event(&mut self, now: Instant, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(now, key),
            Event::DoorStateChanged(open) => {
                debug!("Door {}", if open { "opened" } else { "closed" });
                self.door_open = open;
            }
            Event::LoadProfile(name) => {
                if let Err(e) = self.load_named(&name) {
                    warn!("Cannot load {}: {}", name.as_str(), e.to_str());
                }
            }
            Event::Retune { element, tuning } => {
                self.queue_control(ControlCommand::Retune { element, tuning });
            }
            Event::AssignPreset(slot) => self.assign_preset(slot),
            Event::SetControlRate(hz) => self.queue_control(ControlCommand::SetTickRate(hz)),
            Event::CollaboratorFault { fault, active } => {
                if active {
                    warn!("{} fault reported", fault.to_str());
                } else {
                    info!("{} fault cleared", fault.to_str());
                }
                self.arbiter.set_fault(fault, active);
                self.image.set_faults(self.arbiter.faults());
            }
        }
    }

    fn assign_preset(&mut self, slot: u8) {
        if self.engine.is_running() {
            return;
        }
        let Some(name) = self.selected_name() else {
            warn!("No profile selected for preset {}", slot);
            return;
        };
        match self.library.set_preset(slot as usize, &name) {
            Ok(()) => info!("Preset {} is now {}", slot, name.as_str()),
            Err(e) => warn!("Cannot assign preset {}: {}", slot, e.to_str()),
        }
    }

    fn selected_name(&self) -> Option<String<32>> {
        self.library
            .name_at(self.selected)
            .and_then(|name| String::try_from(name).ok())
    }

    fn handle_key(&mut self, now: Instant, key: Key) {
        match key {
            Key::Start => {
                self.start(now);
            }
            Key::Stop => {
                if self.engine.is_running() {
                    self.engine.abort(now, REASON_CANCELLED);
                } else {
                    self.engine.reset();
                }
            }
            Key::Up | Key::Down => {
                if self.engine.is_running() || self.library.is_empty() {
                    return;
                }
                let count = self.library.len();
                self.selected = match key {
                    Key::Up => (self.selected + 1) % count,
                    _ => (self.selected + count - 1) % count,
                };
                if let Some(name) = self.selected_name() {
                    if let Err(e) = self.load_named(&name) {
                        warn!("Cannot load {}: {}", name.as_str(), e.to_str());
                    }
                }
            }
            Key::Preset(slot) => {
                if self.engine.is_running() {
                    return;
                }
                match self.library.load_preset(slot as usize) {
                    Ok(profile) => {
                        if let Some(index) = self.library.position(&profile.name) {
                            self.selected = index;
                        }
                        self.engine.load(profile);
                    }
                    Err(e) => warn!("Preset {} unavailable: {}", slot, e.to_str()),
                }
            }
        }
    }

    /// Start the loaded profile, loading the selected one first if nothing
    /// is loaded yet.
    pub fn start(&mut self, now: Instant) -> StartOutcome {
        if self.engine.profile().is_none() {
            if let Some(name) = self.selected_name() {
                if let Err(e) = self.load_named(&name) {
                    warn!("Cannot load {}: {}", name.as_str(), e.to_str());
                }
            }
        }

        let inputs = self.engine_inputs();
        let outcome = self.engine.start(now, &inputs);
        match outcome {
            StartOutcome::Success => {
                self.queue_control(ControlCommand::PresetBias(self.engine.initial_bias()));
            }
            other => warn!("Start refused: {}", other.to_str()),
        }
        outcome
    }

    fn load_named(&mut self, name: &str) -> Result<(), LibraryError> {
        if self.engine.is_running() {
            return Ok(());
        }
        let profile = self.library.load(name)?;
        if let Some(index) = self.library.position(name) {
            self.selected = index;
        }
        self.engine.load(profile);
        Ok(())
    }

    /// Force every actuator to its safe state. Control never resumes.
    pub fn fail_safe(&mut self) {
        self.failed = true;
        for element in Element::ALL {
            self.image.set_element_power(element, 0.0);
        }
        self.image.set_fan_speed(1.0);
        self.outputs.clear();
        self.control.clear();
        self.queue_output(OutputCommand::SetFanSpeed(1.0));
        self.queue_output(OutputCommand::SilenceBuzzer);
        self.queue_output(OutputCommand::SetStartButtonLight(LedState::FAST_FLASH));
    }

    pub fn status(&self, now: Instant, cpu_load: u8) -> OvenStatus {
        let (state, status) = if self.failed {
            (FAULT_STATE, FAULT_TEXT)
        } else {
            (self.engine.state().to_str(), self.engine.status_text())
        };
        OvenStatus {
            state,
            status,
            oven_temperature: self.arbiter.oven_temperature(),
            enclosure_temperature: self.arbiter.enclosure_temperature(),
            setpoint: self.image.setpoint(),
            target_temperature: self.engine.target_temperature(),
            lower_power: self.image.element_power(Element::Lower) * 100.0,
            upper_power: self.image.element_power(Element::Upper) * 100.0,
            fan_speed: self.image.fan_speed(),
            faults: self.arbiter.faults().bits(),
            door_ajar: self.door_open,
            cpu_load,
            elapsed_seconds: self.engine.elapsed(now).as_secs() as u32,
            run_seconds: self.engine.run_time(now).as_secs() as u32,
            profile: self
                .engine
                .profile()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
        }
    }

    pub fn take_output_commands(&mut self) -> Vec<OutputCommand, 8> {
        core::mem::take(&mut self.outputs)
    }

    pub fn take_control_commands(&mut self) -> Vec<ControlCommand, 4> {
        core::mem::take(&mut self.control)
    }

    fn engine_inputs(&self) -> EngineInputs {
        EngineInputs {
            oven_temperature: self.arbiter.oven_temperature(),
            enclosure_temperature: self.arbiter.enclosure_temperature(),
            door_open: self.door_open,
            faults: self.arbiter.faults(),
        }
    }

    fn queue_output(&mut self, command: OutputCommand) {
        if self.outputs.push(command).is_err() {
            warn!("Output queue full, command dropped");
        }
    }

    fn queue_control(&mut self, command: ControlCommand) {
        if self.control.push(command).is_err() {
            warn!("Control queue full, command dropped");
        }
    }

    async fn flush(&mut self) {
        for command in self.take_output_commands() {
            OUTPUT_COMMAND_CHANNEL.send(command).await;
        }
        for command in self.take_control_commands() {
            CONTROL_COMMANDS.send(command).await;
        }
    }
}

#[embassy_executor::task]
pub async fn oven_task(
    image: &'static ProcessImage,
    library: &'static mut ProfileLibrary,
    config: OvenConfig,
) {
    let mut oven = Oven::new(&config, image, library);
    let events = INPUT_EVENT_CHANNEL.receiver();
    let mut sensors = match SENSOR_READINGS.receiver() {
        Some(receiver) => receiver,
        None => {
            error!("No sensor receiver available");
            return;
        }
    };

    info!("Waiting for first sensor readings");
    let mut readings = sensors.get().await;

    let mut load = LoadMonitor::new(Instant::now());
    let mut ticker = Ticker::every(Duration::from_millis(config.scan_period_ms.max(1).into()));
    loop {
        let started = Instant::now();
        while let Ok(event) = events.try_receive() {
            oven.handle_event(started, event);
        }
        if let Some(latest) = sensors.try_get() {
            readings = latest;
        }

        if let Err(e) = oven.scan(started, &readings) {
            error!("Scan failed, entering fail-safe: {}", e);
            oven.fail_safe();
            oven.flush().await;
            CURRENT_STATE
                .sender()
                .send(oven.status(Instant::now(), load.load_percent()));
            core::future::pending::<()>().await;
        }
        oven.flush().await;

        let finished = Instant::now();
        load.record(finished.saturating_duration_since(started), finished);
        CURRENT_STATE
            .sender()
            .send(oven.status(finished, load.load_percent()));
        ticker.next().await;
    }
}

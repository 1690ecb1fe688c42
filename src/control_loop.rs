//! The periodic activity that owns and ticks the element controllers.
//!
//! One `DeltaPid` per element, all reading the same oven temperature and
//! setpoint. The loop runs on its own ticker so its cadence does not depend
//! on the orchestration scan; the scan talks to it only through
//! `CONTROL_COMMANDS` and the process image.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Ticker};

use crate::config::{Element, OvenConfig, PidTuning};
use crate::log::*;
use crate::pid::{CurrentValueSource, DeltaPid};
use crate::process_image::{OvenTemperature, ProcessImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Set the integral bias of every controller.
    PresetBias(f32),
    Retune { element: Element, tuning: PidTuning },
    /// Change the shared tick rate; resizes every derivative history.
    SetTickRate(u32),
}

pub static CONTROL_COMMANDS: Channel<CriticalSectionRawMutex, ControlCommand, 4> = Channel::new();

pub struct ControlLoop<S> {
    controllers: [DeltaPid<S>; 2],
    tick_rate_hz: u32,
}

impl<S: CurrentValueSource + Clone> ControlLoop<S> {
    pub fn new(config: &OvenConfig, source: S) -> Self {
        let rate = config.control_rate_hz.max(1);
        let controllers = Element::ALL.map(|element| {
            DeltaPid::new(*config.tuning(element), rate).with_source(source.clone())
        });
        Self {
            controllers,
            tick_rate_hz: rate,
        }
    }

    pub fn controller(&self, element: Element) -> &DeltaPid<S> {
        &self.controllers[element.index()]
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate_hz
    }

    pub fn period(&self) -> Duration {
        Duration::from_hz(self.tick_rate_hz as u64)
    }

    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::PresetBias(bias) => {
                debug!("Presetting controller bias to {}", bias);
                for pid in self.controllers.iter_mut() {
                    pid.set_bias(bias);
                }
            }
            ControlCommand::Retune { element, tuning } => {
                info!("Retuning {} element", element.to_str());
                self.controllers[element.index()].retune(tuning);
            }
            ControlCommand::SetTickRate(hz) => {
                let hz = hz.max(1);
                info!("Control loop rate now {} Hz", hz);
                self.tick_rate_hz = hz;
                for pid in self.controllers.iter_mut() {
                    pid.set_tick_rate(hz);
                }
            }
        }
    }

    /// Tick every controller against `setpoint`, returning the outputs in
    /// element order.
    pub fn tick(&mut self, setpoint: f32) -> [f32; 2] {
        let mut outputs = [0.0; 2];
        for (pid, output) in self.controllers.iter_mut().zip(outputs.iter_mut()) {
            pid.set_setpoint(setpoint);
            pid.tick();
            *output = pid.value();
        }
        outputs
    }
}

#[embassy_executor::task]
pub async fn control_loop_task(image: &'static ProcessImage, config: OvenConfig) {
    let mut control: ControlLoop<OvenTemperature<'static>> =
        ControlLoop::new(&config, image.oven_temperature_source());
    info!("Control loop running at {} Hz", control.tick_rate());

    let mut ticker = Ticker::every(control.period());
    loop {
        while let Ok(command) = CONTROL_COMMANDS.try_receive() {
            let rate = control.tick_rate();
            control.apply(command);
            if control.tick_rate() != rate {
                ticker = Ticker::every(control.period());
            }
        }

        let outputs = control.tick(image.setpoint());
        for element in Element::ALL {
            image.set_controller_output(element, outputs[element.index()]);
        }
        ticker.next().await;
    }
}

//! Delta-style loop controller suitable for no_std embedded use.
//!
//! - Proportional band with a linear ramp to ±50 at the band edge
//! - Integral term kept as a persistent bias in 0..100, moved at a rate
//!   given in units per minute and scaled down near the setpoint
//! - Derivative taken over a ring of past measurements one derivative time
//!   long, weighted by a band around the setpoint
//! - Output clamped to 0..100
//!
//! Example
//! ```ignore
//! let mut pid = DeltaPid::new(PidTuning::LOWER_ELEMENT, 10).with_source(&oven_temperature);
//! pid.set_setpoint(180.0);
//! pid.tick(); // called at the configured rate
//! let power = pid.value();
//! ```

use crate::config::PidTuning;
use crate::ring_history::RingHistory;

/// Largest derivative history the controller keeps, in samples.
pub const MAX_DERIVATIVE_SAMPLES: usize = 512;

const HALF_SCALE: f32 = 50.0;
const DEFAULT_BIAS: f32 = 50.0;

/// Supplies the measured process value to a controller.
pub trait CurrentValueSource {
    fn read(&self) -> f32;
}

impl<T: CurrentValueSource + ?Sized> CurrentValueSource for &T {
    fn read(&self) -> f32 {
        (**self).read()
    }
}

#[derive(Debug, Clone)]
pub struct DeltaPid<S> {
    tuning: PidTuning,
    tick_rate_hz: u32,

    setpoint: f32,
    source: Option<S>,

    // State
    bias: f32,
    history: RingHistory<MAX_DERIVATIVE_SAMPLES>,
    value: f32,
}

impl<S: CurrentValueSource> DeltaPid<S> {
    /// Create a controller with no current-value source attached.
    /// Defaults: setpoint=0, bias=50, output=0.
    pub fn new(tuning: PidTuning, tick_rate_hz: u32) -> Self {
        let mut pid = Self {
            tuning,
            tick_rate_hz,
            setpoint: 0.0,
            source: None,
            bias: DEFAULT_BIAS,
            history: RingHistory::new(),
            value: 0.0,
        };
        pid.resize_history();
        pid
    }

    /// Builder: attach the current-value source.
    pub fn with_source(mut self, source: S) -> Self {
        self.set_source(source);
        self
    }

    pub fn set_source(&mut self, source: S) {
        self.source = Some(source);
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    /// Replace the tuning. A changed derivative time resizes the history.
    pub fn retune(&mut self, tuning: PidTuning) {
        let resize = tuning.derivative_time != self.tuning.derivative_time;
        self.tuning = tuning;
        if resize {
            self.resize_history();
        }
    }

    pub fn tuning(&self) -> &PidTuning {
        &self.tuning
    }

    pub fn set_tick_rate(&mut self, tick_rate_hz: u32) {
        self.tick_rate_hz = tick_rate_hz;
        self.resize_history();
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate_hz
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.bias = clamp(bias, 0.0, 100.0);
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    /// Last computed output, 0..100.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Run one control step. Without a source, or with a non-finite
    /// measurement, the previous output is held.
    pub fn tick(&mut self) {
        let current = match &self.source {
            Some(source) => source.read(),
            None => return,
        };
        if !current.is_finite() {
            return;
        }

        let offset = current - self.setpoint;
        let half_deadband = self.tuning.deadband / 2.0;
        let distance = magnitude(offset);

        // Explicit no-action zone: output and bias stay where they are.
        if distance < half_deadband {
            return;
        }

        let proportional = self.proportional(offset, distance - half_deadband);
        self.integrate(offset, distance - half_deadband);
        let derivative = self.derivative(current, distance - half_deadband);

        self.value = clamp(proportional + self.bias + derivative, 0.0, 100.0);
    }

    fn proportional(&self, offset: f32, beyond_deadband: f32) -> f32 {
        if self.tuning.proportional_band <= 0.0 {
            return 0.0;
        }

        let half_band = self.tuning.proportional_band / 2.0;
        let ramp = half_band - self.tuning.deadband / 2.0;
        let magnitude = if ramp > 0.0 {
            clamp(beyond_deadband / ramp * HALF_SCALE, 0.0, HALF_SCALE)
        } else {
            HALF_SCALE
        };

        let proportional = magnitude * sign(offset);
        if self.tuning.reverse_acting {
            -proportional
        } else {
            proportional
        }
    }

    fn integrate(&mut self, offset: f32, beyond_deadband: f32) {
        if self.tuning.integral_rate > 0.0 && self.tick_rate_hz > 0 {
            let half_reset = self.tuning.integral_reset_band / 2.0;
            let rate = if beyond_deadband >= half_reset {
                self.tuning.integral_rate
            } else {
                beyond_deadband / half_reset * self.tuning.integral_rate
            };

            let step = rate / (60.0 * self.tick_rate_hz as f32) * sign(offset);
            if self.tuning.reverse_acting {
                self.bias -= step;
            } else {
                self.bias += step;
            }
        }
        self.bias = clamp(self.bias, 0.0, 100.0);
    }

    fn derivative(&mut self, current: f32, beyond_deadband: f32) -> f32 {
        if self.tuning.derivative_gain <= 0.0 || self.tuning.derivative_time <= 0.0 {
            return 0.0;
        }
        if self.history.size() == 0 {
            return 0.0;
        }

        let past = self.history.push(current);

        let half_band = self.tuning.derivative_band / 2.0;
        let weight = if beyond_deadband >= half_band {
            0.0
        } else {
            1.0 - beyond_deadband / half_band
        };

        let derivative = (current - past) * self.tuning.derivative_gain * weight;
        if self.tuning.reverse_acting {
            -derivative
        } else {
            derivative
        }
    }

    fn resize_history(&mut self) {
        let samples = self.tuning.derivative_time * self.tick_rate_hz as f32;
        let samples = if samples > 0.0 { samples as usize } else { 0 };
        self.history.resize(samples);
    }
}

#[inline]
fn clamp(x: f32, min: f32, max: f32) -> f32 {
    if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}

#[inline]
fn magnitude(x: f32) -> f32 {
    if x < 0.0 {
        -x
    } else {
        x
    }
}

#[inline]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use proptest::prelude::*;

    struct Thermometer(Cell<f32>);

    impl CurrentValueSource for Thermometer {
        fn read(&self) -> f32 {
            self.0.get()
        }
    }

    fn proportional_only(band: f32, deadband: f32) -> PidTuning {
        PidTuning {
            proportional_band: band,
            deadband,
            ..PidTuning::default()
        }
    }

    #[test]
    fn holds_output_without_source() {
        let mut pid: DeltaPid<Thermometer> = DeltaPid::new(PidTuning::LOWER_ELEMENT, 10);
        pid.set_setpoint(200.0);
        pid.tick();
        assert_eq!(pid.value(), 0.0);
        assert_eq!(pid.bias(), 50.0);
    }

    #[test]
    fn proportional_ramps_to_half_scale_at_band_edge() {
        let sensor = Thermometer(Cell::new(95.0));
        let mut pid = DeltaPid::new(proportional_only(10.0, 0.0), 10).with_source(&sensor);
        pid.set_bias(0.0);
        pid.set_setpoint(100.0);

        // Direct acting, 5 below setpoint: full negative swing, clamped at 0.
        pid.tick();
        assert_eq!(pid.value(), 0.0);

        sensor.0.set(102.5);
        pid.tick();
        assert!((pid.value() - 25.0).abs() < 1e-4);

        sensor.0.set(150.0);
        pid.tick();
        assert!((pid.value() - 50.0).abs() < 1e-4);
    }

    #[test]
    fn reverse_acting_raises_output_below_setpoint() {
        let sensor = Thermometer(Cell::new(97.5));
        let tuning = PidTuning {
            reverse_acting: true,
            ..proportional_only(10.0, 0.0)
        };
        let mut pid = DeltaPid::new(tuning, 10).with_source(&sensor);
        pid.set_setpoint(100.0);
        pid.tick();
        // bias 50 + 25 from the proportional ramp
        assert!((pid.value() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn proportional_starts_at_deadband_edge() {
        let sensor = Thermometer(Cell::new(103.0));
        let mut pid = DeltaPid::new(proportional_only(10.0, 2.0), 10).with_source(&sensor);
        pid.set_bias(0.0);
        pid.set_setpoint(100.0);
        pid.tick();
        // 2 degrees past the deadband edge of a 4 degree ramp
        assert!((pid.value() - 25.0).abs() < 1e-4);
    }

    #[test]
    fn deadband_leaves_output_and_bias_untouched() {
        let sensor = Thermometer(Cell::new(150.0));
        let tuning = PidTuning {
            integral_rate: 60.0,
            integral_reset_band: 2.0,
            ..proportional_only(10.0, 4.0)
        };
        let mut pid = DeltaPid::new(tuning, 1).with_source(&sensor);
        pid.set_setpoint(100.0);
        pid.tick();
        let (value, bias) = (pid.value(), pid.bias());

        sensor.0.set(101.5);
        pid.tick();
        assert_eq!(pid.value(), value);
        assert_eq!(pid.bias(), bias);
    }

    #[test]
    fn integral_moves_bias_at_rate_per_minute() {
        let sensor = Thermometer(Cell::new(90.0));
        let tuning = PidTuning {
            integral_rate: 60.0,
            integral_reset_band: 4.0,
            reverse_acting: true,
            ..PidTuning::default()
        };
        let mut pid = DeltaPid::new(tuning, 1).with_source(&sensor);
        pid.set_setpoint(100.0);

        // 60 units per minute at 1 Hz is one unit per tick, full rate because
        // the error is outside the reset band.
        pid.tick();
        assert!((pid.bias() - 51.0).abs() < 1e-4);

        // Inside the reset band the rate scales with the error: 1 of 2 -> half.
        sensor.0.set(99.0);
        pid.tick();
        assert!((pid.bias() - 51.5).abs() < 1e-4);
    }

    #[test]
    fn derivative_opposes_a_rising_measurement_when_reverse_acting() {
        let sensor = Thermometer(Cell::new(100.0));
        let tuning = PidTuning {
            derivative_time: 2.0,
            derivative_gain: 1.0,
            derivative_band: 100.0,
            reverse_acting: true,
            ..PidTuning::default()
        };
        let mut pid = DeltaPid::new(tuning, 1).with_source(&sensor);
        pid.set_setpoint(50.0);
        pid.set_bias(50.0);

        pid.tick();
        assert_eq!(pid.value(), 50.0);
        sensor.0.set(110.0);
        pid.tick();
        // 60 degrees off setpoint is outside half the derivative band: no weight
        assert_eq!(pid.value(), 50.0);

        pid.set_setpoint(110.0);
        sensor.0.set(120.0);
        pid.tick();
        // compared against the sample two ticks ago (100): rise 20, weight 1 - 10/50
        assert!((pid.value() - (50.0 - 20.0 * 0.8)).abs() < 1e-4);
    }

    #[test]
    fn retuning_derivative_time_resizes_history() {
        let mut pid: DeltaPid<Thermometer> = DeltaPid::new(PidTuning::LOWER_ELEMENT, 10);
        assert_eq!(pid.history.size(), 190);
        pid.set_tick_rate(20);
        assert_eq!(pid.history.size(), 380);
        pid.retune(PidTuning::UPPER_ELEMENT);
        assert_eq!(pid.history.size(), 200);
        pid.set_tick_rate(1000);
        assert_eq!(pid.history.size(), MAX_DERIVATIVE_SAMPLES);
    }

    #[test]
    fn integral_step_survives_an_extreme_tick_rate() {
        let sensor = Thermometer(Cell::new(90.0));
        let tuning = PidTuning {
            integral_rate: 600.0,
            derivative_time: 1.0,
            reverse_acting: true,
            ..PidTuning::default()
        };
        let mut pid = DeltaPid::new(tuning, u32::MAX).with_source(&sensor);
        pid.set_setpoint(100.0);
        pid.tick();
        assert!(pid.bias().is_finite());
        assert!((pid.bias() - 50.0).abs() < 1e-3);
        assert_eq!(pid.history.size(), MAX_DERIVATIVE_SAMPLES);
    }

    proptest! {
        #[test]
        fn output_and_bias_stay_clamped(
            readings in proptest::collection::vec(-50.0f32..400.0, 1..60),
            setpoint in 0.0f32..300.0,
            band in 0.0f32..40.0,
            rate in 0.0f32..600.0,
            gain in 0.0f32..20.0,
            reverse in any::<bool>(),
        ) {
            let sensor = Thermometer(Cell::new(0.0));
            let tuning = PidTuning {
                proportional_band: band,
                deadband: 0.5,
                integral_rate: rate,
                integral_reset_band: 10.0,
                derivative_time: 1.0,
                derivative_gain: gain,
                derivative_band: 60.0,
                reverse_acting: reverse,
            };
            let mut pid = DeltaPid::new(tuning, 5).with_source(&sensor);
            pid.set_setpoint(setpoint);
            for reading in readings {
                sensor.0.set(reading);
                pid.tick();
                prop_assert!((0.0..=100.0).contains(&pid.value()));
                prop_assert!((0.0..=100.0).contains(&pid.bias()));
            }
        }
    }
}

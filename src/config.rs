//! Tuning and limits for the oven.
//!
//! `OvenConfig::default()` carries the factory values. The host binary can
//! replace them with a JSON document decoded through `serde-json-core`.

use serde::{Deserialize, Serialize};

/// The two independently driven heating elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    /// Resistive element at the bottom of the chamber.
    Lower,
    /// Quartz element at the top of the chamber.
    Upper,
}

impl Element {
    pub const ALL: [Element; 2] = [Element::Lower, Element::Upper];

    pub fn index(&self) -> usize {
        match self {
            Element::Lower => 0,
            Element::Upper => 1,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Element::Lower => "lower",
            Element::Upper => "upper",
        }
    }
}

/// Tuning of one delta-style loop controller.
///
/// Bands are full widths in °C centred on the setpoint, the integral rate is
/// in output units per minute and the derivative time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidTuning {
    pub proportional_band: f32,
    pub deadband: f32,
    pub integral_rate: f32,
    pub integral_reset_band: f32,
    pub derivative_time: f32,
    pub derivative_gain: f32,
    pub derivative_band: f32,
    pub reverse_acting: bool,
}

impl PidTuning {
    pub const LOWER_ELEMENT: PidTuning = PidTuning {
        proportional_band: 10.0,
        deadband: 0.0,
        integral_rate: 9.0,
        integral_reset_band: 15.0,
        derivative_time: 19.0,
        derivative_gain: 2.0,
        derivative_band: 65.0,
        reverse_acting: true,
    };

    pub const UPPER_ELEMENT: PidTuning = PidTuning {
        proportional_band: 5.0,
        deadband: 0.0,
        integral_rate: 11.0,
        integral_reset_band: 11.0,
        derivative_time: 10.0,
        derivative_gain: 3.0,
        derivative_band: 60.0,
        reverse_acting: true,
    };
}

impl Default for PidTuning {
    fn default() -> Self {
        Self {
            proportional_band: 0.0,
            deadband: 0.0,
            integral_rate: 0.0,
            integral_reset_band: 0.0,
            derivative_time: 0.0,
            derivative_gain: 0.0,
            derivative_band: 0.0,
            reverse_acting: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvenConfig {
    pub lower_element: PidTuning,
    pub upper_element: PidTuning,
    /// Loop controller tick rate shared by both elements.
    pub control_rate_hz: u32,
    /// Period of the orchestration scan.
    pub scan_period_ms: u32,
    /// Period of the SSR burst-fire tick.
    pub ssr_tick_ms: u32,
    /// Number of SSR ticks a power level is spread across.
    pub ssr_window: u32,
    pub max_enclosure_temperature: f32,
    /// A profile only starts while the enclosure is at most
    /// `max_enclosure_temperature - enclosure_start_margin`.
    pub enclosure_start_margin: f32,
    /// Consecutive cycles without a trusted reading before a running
    /// profile is aborted.
    pub sensor_failure_limit: u8,
    /// Consecutive over-temperature cycles before the enclosure trips.
    pub overheat_limit: u8,
}

impl OvenConfig {
    pub fn tuning(&self, element: Element) -> &PidTuning {
        match element {
            Element::Lower => &self.lower_element,
            Element::Upper => &self.upper_element,
        }
    }
}

impl Default for OvenConfig {
    fn default() -> Self {
        Self {
            lower_element: PidTuning::LOWER_ELEMENT,
            upper_element: PidTuning::UPPER_ELEMENT,
            control_rate_hz: 10,
            scan_period_ms: 30,
            ssr_tick_ms: 10,
            ssr_window: 125,
            max_enclosure_temperature: 50.0,
            enclosure_start_margin: 15.0,
            sensor_failure_limit: 5,
            overheat_limit: 3,
        }
    }
}

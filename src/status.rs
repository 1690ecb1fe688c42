//! Published oven status and the scan load estimate.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::watch::Watch;
use embassy_time::{Duration, Instant};
use heapless::String;
use serde::Serialize;

/// Large enough for a full `OvenStatus` with a maximum length profile name.
pub const STATUS_JSON_CAPACITY: usize = 512;

/// Snapshot consumed by the read-only status interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OvenStatus {
    /// Process state name, or "Fault" once the scan has failed safe.
    pub state: &'static str,
    pub status: &'static str,
    pub oven_temperature: f32,
    pub enclosure_temperature: f32,
    pub setpoint: f32,
    pub target_temperature: f32,
    /// Controller outputs actually applied, 0..100.
    pub lower_power: f32,
    pub upper_power: f32,
    pub fan_speed: f32,
    pub faults: u32,
    pub door_ajar: bool,
    pub cpu_load: u8,
    pub elapsed_seconds: u32,
    pub run_seconds: u32,
    pub profile: String<32>,
}

impl OvenStatus {
    pub fn to_json(&self) -> Result<String<STATUS_JSON_CAPACITY>, serde_json_core::ser::Error> {
        serde_json_core::to_string(self)
    }
}

pub static CURRENT_STATE: Watch<CriticalSectionRawMutex, OvenStatus, 2> = Watch::new();

const LOAD_WINDOW: Duration = Duration::from_secs(1);

/// Busy time over wall time, reported once per one-second window.
pub struct LoadMonitor {
    window_start: Instant,
    busy: Duration,
    load_percent: u8,
}

impl LoadMonitor {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            busy: Duration::from_ticks(0),
            load_percent: 0,
        }
    }

    /// Account `busy` time of work that ended at `now`.
    pub fn record(&mut self, busy: Duration, now: Instant) {
        self.busy += busy;
        let wall = now.saturating_duration_since(self.window_start);
        if wall >= LOAD_WINDOW {
            let percent = self.busy.as_micros() * 100 / wall.as_micros().max(1);
            self.load_percent = percent.min(100) as u8;
            self.busy = Duration::from_ticks(0);
            self.window_start = now;
        }
    }

    pub fn load_percent(&self) -> u8 {
        self.load_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_json() {
        let status = OvenStatus {
            state: "Running",
            status: "Baking",
            oven_temperature: 150.5,
            enclosure_temperature: 31.0,
            setpoint: 180.0,
            target_temperature: 170.0,
            lower_power: 80.0,
            upper_power: 60.0,
            fan_speed: 0.0,
            faults: 3,
            door_ajar: false,
            cpu_load: 12,
            elapsed_seconds: 95,
            run_seconds: 97,
            profile: String::try_from("Lead Free").unwrap(),
        };
        let json = status.to_json().unwrap();
        assert!(json.starts_with(r#"{"state":"Running","status":"Baking","oven_temperature":150.5"#));
        assert!(json.contains(r#""faults":3"#));
        assert!(json.ends_with(r#""profile":"Lead Free"}"#));
    }

    #[test]
    fn load_is_reported_per_window() {
        let mut monitor = LoadMonitor::new(Instant::from_millis(0));
        monitor.record(Duration::from_millis(100), Instant::from_millis(400));
        assert_eq!(monitor.load_percent(), 0);
        monitor.record(Duration::from_millis(150), Instant::from_millis(1000));
        assert_eq!(monitor.load_percent(), 25);

        monitor.record(Duration::from_millis(5000), Instant::from_millis(2000));
        assert_eq!(monitor.load_percent(), 100);
    }
}

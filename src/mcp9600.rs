use core::fmt;
use embedded_hal_async::i2c::I2c;

use crate::fault_arbiter::ThermocoupleFault;

/// MCP9600 I2C default address base
pub const MCP9600_I2C_BASE_ADDR: u8 = 0x60;

/// MCP9600 Register addresses
mod reg {
    pub const TH: u8 = 0x00;
    pub const TC: u8 = 0x02;
    pub const STATUS: u8 = 0x04;
    pub const SENSOR_CONFIG: u8 = 0x05;
    pub const DEVICE_CONFIG: u8 = 0x06;
    pub const DEVICE_ID: u8 = 0x20;
}

/// MCP9600 Device ID
const DEVICE_ID: u8 = 0x40;

/// K-type thermocouple, filter off
const SENSOR_CONFIG_K_TYPE: u8 = 0x00;
/// Normal mode, 0.0625 °C cold-junction resolution, 18-bit ADC
const DEVICE_CONFIG_NORMAL: u8 = 0x00;

/// Scaling factor for temperature registers (°C/LSB)
const TEMP_SCALE: f32 = 0.0625;

bitflags::bitflags! {
    /// STATUS register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const ALERT1        = 0b0000_0001;
        const ALERT2        = 0b0000_0010;
        const ALERT3        = 0b0000_0100;
        const ALERT4        = 0b0000_1000;
        /// Input range exceeded; open circuit on the MCP9601
        const OPEN_CIRCUIT  = 0b0001_0000;
        /// MCP9601 only
        const SHORT_CIRCUIT = 0b0010_0000;
        const TH_UPDATE     = 0b0100_0000;
        const BURST_DONE    = 0b1000_0000;
    }
}

impl Status {
    pub fn thermocouple_fault(&self) -> ThermocoupleFault {
        let mut fault = ThermocoupleFault::empty();
        if self.contains(Status::OPEN_CIRCUIT) {
            fault |= ThermocoupleFault::OPEN_CIRCUIT;
        }
        if self.contains(Status::SHORT_CIRCUIT) {
            fault |= ThermocoupleFault::SHORT_TO_GROUND;
        }
        fault
    }
}

/// MCP9600 driver error
#[derive(Debug)]
pub enum Error<I2cE> {
    I2c(I2cE),
    BadDeviceId(u8),
}

impl<I2cE: fmt::Debug> fmt::Display for Error<I2cE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {:?}", e),
            Error::BadDeviceId(id) => write!(f, "Bad device ID {:#04x}", id),
        }
    }
}

/// MCP9600 driver
pub struct Mcp9600<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C: I2c> Mcp9600<I2C> {
    pub const fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr }
    }

    /// Verify the device ID and select K-type, normal mode.
    pub async fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        let mut id = [0u8; 2];
        self.i2c
            .write_read(self.addr, &[reg::DEVICE_ID], &mut id)
            .await
            .map_err(Error::I2c)?;
        if id[0] != DEVICE_ID {
            return Err(Error::BadDeviceId(id[0]));
        }

        self.i2c
            .write(self.addr, &[reg::SENSOR_CONFIG, SENSOR_CONFIG_K_TYPE])
            .await
            .map_err(Error::I2c)?;
        self.i2c
            .write(self.addr, &[reg::DEVICE_CONFIG, DEVICE_CONFIG_NORMAL])
            .await
            .map_err(Error::I2c)
    }

    /// Hot-junction (thermocouple) temperature
    pub async fn read_hot_c(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.read_temp16(reg::TH).await? as f32 * TEMP_SCALE)
    }

    /// Cold-junction (device) temperature
    pub async fn read_cold_c(&mut self) -> Result<f32, Error<I2C::Error>> {
        Ok(self.read_temp16(reg::TC).await? as f32 * TEMP_SCALE)
    }

    pub async fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[reg::STATUS], &mut buf)
            .await
            .map_err(Error::I2c)?;
        Ok(Status::from_bits_truncate(buf[0]))
    }

    async fn read_temp16(&mut self, reg: u8) -> Result<i16, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .await
            .map_err(Error::I2c)?;
        Ok(parse_temp16(buf))
    }
}

/// Big-endian, two's complement
fn parse_temp16(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_temp16_positive() {
        // 128 * 0.0625 = 8.0°C
        assert_eq!(parse_temp16([0x00, 0x80]), 128);
    }

    #[test]
    fn parse_temp16_negative() {
        assert_eq!(parse_temp16([0xFF, 0x80]), -128);
    }

    #[test]
    fn status_maps_to_thermocouple_fault() {
        let status = Status::OPEN_CIRCUIT | Status::TH_UPDATE;
        assert_eq!(status.thermocouple_fault(), ThermocoupleFault::OPEN_CIRCUIT);
        assert!(Status::BURST_DONE.thermocouple_fault().is_empty());
        assert_eq!(
            Status::SHORT_CIRCUIT.thermocouple_fault(),
            ThermocoupleFault::SHORT_TO_GROUND
        );
    }
}
